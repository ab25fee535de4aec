//! Error types for the mathgen library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MathGenError`] — **Fatal**: the request cannot produce any artefact
//!   (unsupported upload, model unreachable, model not configured). Returned
//!   as `Err(MathGenError)` from [`crate::solve::Solver::solve`].
//!
//! * [`CompileError`] — **Degraded**: the model produced LaTeX but the
//!   typesetter rejected it. The source is still published, so this error is
//!   stored inside [`crate::output::Artifacts::SourceOnly`] rather than
//!   propagated.
//!
//! The `Display` text of every variant is what the HTTP layer shows the user.

use std::path::PathBuf;
use thiserror::Error;

/// Upper bound on the compiler detail surfaced to callers.
pub const MAX_COMPILE_DETAIL_CHARS: usize = 500;

/// All fatal errors returned by the mathgen library.
#[derive(Debug, Error)]
pub enum MathGenError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Upload extension is neither PDF nor a supported image.
    #[error("Invalid file type. Please upload PDF or image.")]
    UnsupportedFileType { file_name: String },

    /// The upload carried no bytes.
    #[error("Uploaded file '{file_name}' is empty")]
    EmptyUpload { file_name: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// A page could not be rasterised.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error("Failed to bind to pdfium library: {0}\nSet PDFIUM_LIB_PATH=/path/to/libpdfium or use the pdftoppm rasterizer.")]
    PdfiumBindingFailed(String),

    /// The external rasterizer could not be run or exited unsuccessfully.
    #[error("Rasterizer '{program}' failed: {detail}")]
    RasterizerFailed { program: String, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// No API key was configured for the language-model endpoint.
    #[error("Language model API key not configured")]
    ModelNotConfigured,

    /// The model call exceeded the configured bound.
    #[error("Model request timed out after {secs}s. Try a smaller file or lower detail level.")]
    ModelTimeout { secs: u64 },

    /// Transport-level failure talking to the model endpoint.
    #[error("Model request failed: {reason}")]
    ModelRequestFailed { reason: String },

    /// The model endpoint answered with a non-success status.
    #[error("{message}")]
    ModelApiError { status: u16, message: String },

    /// The model answered 2xx but the body is not a usable completion.
    #[error("{detail}")]
    MalformedModelResponse { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Scratch storage could not be created or written.
    #[error("Failed to {action} '{path}': {source}")]
    Scratch {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write an artefact into the public download directory.
    #[error("Failed to publish '{path}': {source}")]
    PublishFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MathGenError {
    /// True for errors caused by what the client sent rather than by us or
    /// an upstream service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MathGenError::UnsupportedFileType { .. } | MathGenError::EmptyUpload { .. }
        )
    }
}

/// A non-fatal typesetting failure.
///
/// Stored in [`crate::output::Artifacts::SourceOnly`]; the `.tex` source is
/// still published so the user can fix and compile it locally.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    /// The compiler executable could not be started at all.
    #[error("Could not start '{program}': {detail}")]
    Spawn { program: String, detail: String },

    /// The compiler ran and exited with a failure status.
    #[error("{program} exited with {status}: {log}")]
    Failed {
        program: String,
        status: String,
        log: String,
    },

    /// The compiler reported success but produced no PDF.
    #[error("Compiler finished but '{path}' was not produced")]
    MissingOutput { path: PathBuf },
}

impl CompileError {
    /// User-facing detail, bounded to [`MAX_COMPILE_DETAIL_CHARS`] characters.
    pub fn details(&self) -> String {
        truncate_chars(&self.to_string(), MAX_COMPILE_DETAIL_CHARS)
    }
}

/// Truncate on a char boundary, appending an ellipsis when shortened.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_file_type_message() {
        let e = MathGenError::UnsupportedFileType {
            file_name: "notes.docx".into(),
        };
        assert!(e.to_string().starts_with("Invalid file type"));
        assert!(e.is_client_error());
    }

    #[test]
    fn model_timeout_names_the_bound() {
        let e = MathGenError::ModelTimeout { secs: 240 };
        assert!(e.to_string().contains("240s"), "got: {e}");
        assert!(!e.is_client_error());
    }

    #[test]
    fn compile_details_are_bounded() {
        let e = CompileError::Failed {
            program: "xelatex".into(),
            status: "exit status: 1".into(),
            log: "x".repeat(2000),
        };
        let details = e.details();
        assert_eq!(details.chars().count(), MAX_COMPILE_DETAIL_CHARS + 1);
        assert!(details.ends_with('\u{2026}'));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("数学题目", 2), "数学\u{2026}");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
