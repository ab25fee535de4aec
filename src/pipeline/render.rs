//! PDF rasterisation: turn every page of an uploaded PDF into an image.
//!
//! Two backends sit behind the [`Rasterizer`] trait:
//!
//! * [`PdfiumRasterizer`] renders in-process through `pdfium-render`. pdfium
//!   keeps thread-local state and is not async-safe, so the work runs inside
//!   `tokio::task::spawn_blocking`. The longest edge is capped in pixels
//!   rather than by DPI so a poster-sized page cannot exhaust memory.
//! * [`PdftoppmRasterizer`] shells out to poppler's `pdftoppm`.
//!
//! Any error (or zero pages) is handled by the caller, which falls back to
//! sending the PDF itself.

use crate::error::MathGenError;
use crate::pipeline::encode::{encode_page, PageImage};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Turns a PDF on disk into page images, in page order.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// `work_dir` is a scratch directory the implementation may write into.
    async fn rasterize(&self, pdf_path: &Path, work_dir: &Path)
        -> Result<Vec<PageImage>, MathGenError>;
}

// ── pdfium ───────────────────────────────────────────────────────────────────

/// In-process rendering via pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    max_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(max_pixels: u32) -> Self {
        Self { max_pixels }
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(
        &self,
        pdf_path: &Path,
        _work_dir: &Path,
    ) -> Result<Vec<PageImage>, MathGenError> {
        let path = pdf_path.to_path_buf();
        let max_pixels = self.max_pixels;

        tokio::task::spawn_blocking(move || render_pages_blocking(&path, max_pixels))
            .await
            .map_err(|e| MathGenError::Internal(format!("Render task panicked: {}", e)))?
    }
}

/// Bind `PDFIUM_LIB_PATH` when set (file or directory), else the system
/// library.
fn bind_pdfium() -> Result<Pdfium, MathGenError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(raw) => {
            let path = PathBuf::from(raw);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| MathGenError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn render_pages_blocking(pdf_path: &Path, max_pixels: u32) -> Result<Vec<PageImage>, MathGenError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| MathGenError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            MathGenError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        let encoded = encode_page(&image).map_err(|e| MathGenError::RasterisationFailed {
            page: idx + 1,
            detail: e.to_string(),
        })?;
        results.push(encoded);
    }

    Ok(results)
}

// ── pdftoppm ─────────────────────────────────────────────────────────────────

/// External `pdftoppm -png` rasterizer.
#[derive(Debug, Clone)]
pub struct PdftoppmRasterizer {
    program: String,
    dpi: u32,
}

impl PdftoppmRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self {
            program: "pdftoppm".to_string(),
            dpi,
        }
    }

    /// Use a different executable (e.g. an absolute path).
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl Rasterizer for PdftoppmRasterizer {
    async fn rasterize(
        &self,
        pdf_path: &Path,
        work_dir: &Path,
    ) -> Result<Vec<PageImage>, MathGenError> {
        let prefix = work_dir.join("page");
        let output = Command::new(&self.program)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(pdf_path)
            .arg(&prefix)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MathGenError::RasterizerFailed {
                program: self.program.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(MathGenError::RasterizerFailed {
                program: self.program.clone(),
                detail: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let pages = collect_page_files(work_dir).await?;
        let mut images = Vec::with_capacity(pages.len());
        for path in &pages {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| MathGenError::Scratch {
                    action: "read rendered page",
                    path: path.clone(),
                    source,
                })?;
            images.push(PageImage::from_bytes("image/png", &bytes));
        }
        debug!("pdftoppm produced {} page images", images.len());
        Ok(images)
    }
}

/// `page-*.png` files in `dir`, in page order.
///
/// pdftoppm zero-pads the page number to the width of the page count, so a
/// plain name sort is page order.
async fn collect_page_files(dir: &Path) -> Result<Vec<PathBuf>, MathGenError> {
    let scratch_err = |source| MathGenError::Scratch {
        action: "list rendered pages",
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(scratch_err)?;
    let mut pages = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(scratch_err)? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("page") && name.ends_with(".png") {
            pages.push(entry.path());
        }
    }
    pages.sort();
    Ok(pages)
}
