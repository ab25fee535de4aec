//! Upload intake: classify the uploaded file and park it in scratch storage.
//!
//! External rasterizers need a file-system path, so the upload bytes are
//! written into a per-request `TempDir`. The directory is removed when the
//! returned [`StoredUpload`] is dropped, on every exit path, panics included.

use crate::error::MathGenError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// What kind of sheet the user uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Pdf,
    Image { mime_type: &'static str },
}

impl UploadKind {
    /// Classify by extension, case-insensitively: `.pdf`, `.png`, `.jpg`,
    /// `.jpeg`. Anything else is a client error.
    pub fn from_file_name(file_name: &str) -> Result<Self, MathGenError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("pdf") => Ok(UploadKind::Pdf),
            Some("png") => Ok(UploadKind::Image {
                mime_type: "image/png",
            }),
            Some("jpg") | Some("jpeg") => Ok(UploadKind::Image {
                mime_type: "image/jpeg",
            }),
            _ => Err(MathGenError::UnsupportedFileType {
                file_name: file_name.to_string(),
            }),
        }
    }
}

/// The upload written to a private scratch directory.
pub struct StoredUpload {
    pub kind: UploadKind,
    /// Path of the stored file inside the scratch directory.
    pub path: PathBuf,
    /// Kept alive so the directory survives until processing completes.
    scratch: TempDir,
}

impl StoredUpload {
    /// The per-request scratch directory; rasterizer output goes here too.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

/// Write the upload under a fresh scratch directory beneath `scratch_root`.
///
/// The client-supplied name is reduced to a fixed stem plus the validated
/// extension, so it can never escape the scratch directory.
pub async fn store_upload(
    scratch_root: &Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<StoredUpload, MathGenError> {
    let kind = UploadKind::from_file_name(file_name)?;
    if bytes.is_empty() {
        return Err(MathGenError::EmptyUpload {
            file_name: file_name.to_string(),
        });
    }

    tokio::fs::create_dir_all(scratch_root)
        .await
        .map_err(|source| MathGenError::Scratch {
            action: "create scratch root",
            path: scratch_root.to_path_buf(),
            source,
        })?;

    let scratch = tempfile::Builder::new()
        .prefix("mathgen-upload-")
        .tempdir_in(scratch_root)
        .map_err(|source| MathGenError::Scratch {
            action: "create scratch directory",
            path: scratch_root.to_path_buf(),
            source,
        })?;

    let ext = match kind {
        UploadKind::Pdf => "pdf",
        UploadKind::Image { mime_type } if mime_type == "image/png" => "png",
        UploadKind::Image { .. } => "jpg",
    };
    let path = scratch.path().join(format!("upload.{ext}"));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| MathGenError::Scratch {
            action: "write upload",
            path: path.clone(),
            source,
        })?;

    debug!("Stored {} bytes of '{}' at {}", bytes.len(), file_name, path.display());
    Ok(StoredUpload {
        kind,
        path,
        scratch,
    })
}
