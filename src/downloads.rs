//! The public download directory.
//!
//! Generated pairs are stored as `solutions_<millis>.tex` / `.pdf` and are
//! never deleted. [`DownloadStore::validate_name`] is the single place a
//! requested name is checked before anything touches the disk.

use crate::error::MathGenError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

static RE_DOWNLOAD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^solutions_\d+\.(?:tex|pdf)$").unwrap());

/// Route that serves stored files.
pub const DOWNLOAD_ROUTE: &str = "/api/download";

/// Why a requested download name was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadNameError {
    #[error("File name required")]
    Missing,
    #[error("Invalid file name")]
    Invalid,
}

/// Names of a freshly published pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedNames {
    pub tex_file: String,
    pub pdf_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DownloadStore {
    dir: PathBuf,
}

impl DownloadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the `.tex` source and, when given, copy the compiled PDF, both
    /// under one millisecond-timestamp stem.
    pub async fn publish(
        &self,
        latex: &str,
        compiled_pdf: Option<&Path>,
    ) -> Result<PublishedNames, MathGenError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| MathGenError::PublishFailed {
                path: self.dir.clone(),
                source,
            })?;

        let stem = format!("solutions_{}", chrono::Utc::now().timestamp_millis());
        let tex_file = format!("{stem}.tex");
        let tex_path = self.dir.join(&tex_file);
        tokio::fs::write(&tex_path, latex)
            .await
            .map_err(|source| MathGenError::PublishFailed {
                path: tex_path.clone(),
                source,
            })?;

        let pdf_file = match compiled_pdf {
            Some(src) => {
                let pdf_file = format!("{stem}.pdf");
                let pdf_path = self.dir.join(&pdf_file);
                tokio::fs::copy(src, &pdf_path)
                    .await
                    .map_err(|source| MathGenError::PublishFailed {
                        path: pdf_path.clone(),
                        source,
                    })?;
                Some(pdf_file)
            }
            None => None,
        };

        info!("Published {} (pdf: {})", tex_file, pdf_file.is_some());
        Ok(PublishedNames { tex_file, pdf_file })
    }

    /// Check a client-supplied name.
    ///
    /// Empty → [`DownloadNameError::Missing`]; anything with `..`, `/` or `\`,
    /// or not shaped like `solutions_<digits>.tex|pdf` →
    /// [`DownloadNameError::Invalid`].
    pub fn validate_name(name: Option<&str>) -> Result<&str, DownloadNameError> {
        let name = name.unwrap_or("");
        if name.is_empty() {
            return Err(DownloadNameError::Missing);
        }
        if name.contains("..") || name.contains('/') || name.contains('\\') {
            return Err(DownloadNameError::Invalid);
        }
        if !RE_DOWNLOAD_NAME.is_match(name) {
            return Err(DownloadNameError::Invalid);
        }
        Ok(name)
    }

    /// Read a validated name. `Ok(None)` when the file does not exist.
    pub async fn read(&self, name: &str) -> std::io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Content type served for a stored name.
pub fn content_type_for(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("pdf") => "application/pdf",
        Some("tex") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Client-facing URL of a stored name.
pub fn download_url(name: &str) -> String {
    format!("{DOWNLOAD_ROUTE}?file={name}")
}
