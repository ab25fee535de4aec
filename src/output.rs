//! Result types returned by [`crate::solve::Solver::solve`].

use crate::error::CompileError;
use serde::Serialize;

/// Warning attached to the response when the model hit its token limit.
pub const TRUNCATION_WARNING: &str =
    "Response was truncated due to token limit. Some solutions may be incomplete.";

/// Outcome of one solve request that produced LaTeX.
#[derive(Debug, Clone)]
pub struct SolveOutput {
    /// The final, sanitized LaTeX source (identical to the published `.tex`).
    pub latex: String,
    pub artifacts: Artifacts,
    /// The model reported a length-limited stop.
    pub truncated: bool,
    /// The repair heuristic ran.
    pub repaired: bool,
    pub stats: SolveStats,
}

impl SolveOutput {
    /// User-facing warning, present only when the model was cut off.
    pub fn warning(&self) -> Option<&'static str> {
        self.truncated.then_some(TRUNCATION_WARNING)
    }

    pub fn is_compiled(&self) -> bool {
        matches!(self.artifacts, Artifacts::Compiled { .. })
    }

    /// Download name of the `.tex` file; always published.
    pub fn tex_file(&self) -> &str {
        match &self.artifacts {
            Artifacts::Compiled { tex_file, .. } | Artifacts::SourceOnly { tex_file, .. } => {
                tex_file
            }
        }
    }
}

/// Files published to the download directory.
#[derive(Debug, Clone)]
pub enum Artifacts {
    /// Compilation succeeded; both files are available.
    Compiled { pdf_file: String, tex_file: String },
    /// Compilation failed; only the source was kept.
    SourceOnly { tex_file: String, error: CompileError },
}

/// Timing and token figures for one request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SolveStats {
    /// Number of attachments sent to the model.
    pub attachments: usize,
    /// False when a PDF was sent as-is instead of page images.
    pub rasterized: bool,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub render_duration_ms: u64,
    pub model_duration_ms: u64,
    pub compile_duration_ms: u64,
    pub total_duration_ms: u64,
}
