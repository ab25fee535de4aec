//! End-to-end generation for one uploaded sheet.
//!
//! [`Solver::solve`] runs the pipeline strictly in sequence: scratch write,
//! optional rasterisation, one model call, post-processing, one compiler
//! run, publication. Scratch and build directories are `TempDir`s, so they
//! are removed on every exit path.

use crate::config::{DetailLevel, DocumentInfo, RasterizerKind, SolutionLanguage, SolverConfig};
use crate::downloads::DownloadStore;
use crate::error::MathGenError;
use crate::output::{Artifacts, SolveOutput, SolveStats};
use crate::pipeline::compile::{Compiler, XelatexCompiler};
use crate::pipeline::encode::PageImage;
use crate::pipeline::input::{self, StoredUpload, UploadKind};
use crate::pipeline::llm::{Attachment, GenerationRequest, VisionModel};
use crate::pipeline::postprocess;
use crate::pipeline::render::{PdfiumRasterizer, PdftoppmRasterizer, Rasterizer};
use crate::prompts;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// File name of the LaTeX source inside the build directory.
const SOURCE_FILE_NAME: &str = "solutions.tex";

/// One user request.
#[derive(Debug, Clone, Default)]
pub struct SolveRequest {
    /// Client-supplied name; only its extension is used.
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Free-text instruction appended to the prompt.
    pub prompt: Option<String>,
    pub detail: DetailLevel,
    pub language: Option<SolutionLanguage>,
    pub info: DocumentInfo,
}

/// Runs solve requests. Cheap to share behind an `Arc`; holds no
/// per-request state.
pub struct Solver {
    config: SolverConfig,
    model: Arc<dyn VisionModel>,
    rasterizer: Arc<dyn Rasterizer>,
    compiler: Arc<dyn Compiler>,
    store: DownloadStore,
}

impl Solver {
    /// Build a solver with the rasterizer and compiler named in `config`.
    pub fn new(config: SolverConfig, model: Arc<dyn VisionModel>) -> Self {
        let rasterizer: Arc<dyn Rasterizer> = match config.rasterizer {
            RasterizerKind::Pdfium => Arc::new(PdfiumRasterizer::new(config.max_rendered_pixels)),
            RasterizerKind::Pdftoppm => Arc::new(PdftoppmRasterizer::new(config.dpi)),
        };
        let compiler = Arc::new(XelatexCompiler::new(config.latex_engine.clone()));
        let store = DownloadStore::new(config.download_dir.clone());
        Self {
            config,
            model,
            rasterizer,
            compiler,
            store,
        }
    }

    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The download directory this solver publishes into.
    pub fn store(&self) -> &DownloadStore {
        &self.store
    }

    /// Generate, compile and publish solutions for one sheet.
    ///
    /// # Returns
    /// `Ok(SolveOutput)` whenever LaTeX was produced, including when the
    /// compiler rejected it (see [`Artifacts::SourceOnly`]).
    ///
    /// # Errors
    /// Unsupported or empty upload, model failures, and disk failures in the
    /// scratch or download directories.
    pub async fn solve(&self, request: SolveRequest) -> Result<SolveOutput, MathGenError> {
        let request_id = Uuid::new_v4();
        let span = info_span!("process", %request_id);
        self.solve_inner(request).instrument(span).await
    }

    async fn solve_inner(&self, request: SolveRequest) -> Result<SolveOutput, MathGenError> {
        let total_start = Instant::now();
        let cb = self.config.progress_callback.as_ref();
        info!(
            "Processing '{}' ({} bytes, detail: {})",
            request.file_name,
            request.bytes.len(),
            request.detail.as_str()
        );

        // ── Step 1: Store upload ─────────────────────────────────────────
        // Classification happens here; an unsupported type fails before
        // anything is written.
        let stored =
            input::store_upload(&self.config.scratch_root, &request.file_name, &request.bytes)
                .await?;
        if let Some(cb) = cb {
            cb.on_solve_start(&request.file_name);
        }

        // ── Step 2: Attachments ──────────────────────────────────────────
        let render_start = Instant::now();
        let (attachments, rasterized) = self.attachments(&stored, &request).await;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;
        if let Some(cb) = cb {
            cb.on_pages_ready(attachments.len(), rasterized);
        }

        // ── Step 3: Model call ───────────────────────────────────────────
        let instruction =
            prompts::build_instruction(request.detail, request.language, request.prompt.as_deref());
        debug!("Instruction is {} chars", instruction.len());

        if let Some(cb) = cb {
            cb.on_generation_start();
        }
        let model_start = Instant::now();
        let attachment_count = attachments.len();
        let reply = self
            .model
            .generate(GenerationRequest {
                instruction,
                attachments,
            })
            .await?;
        let model_duration_ms = model_start.elapsed().as_millis() as u64;
        let truncated = reply.is_truncated();
        info!(
            "Model reply: {} chars in {}ms (finish: {})",
            reply.text.len(),
            model_duration_ms,
            reply.finish_reason.as_deref().unwrap_or("unknown")
        );
        if let Some(cb) = cb {
            cb.on_generation_complete(reply.text.len(), truncated);
        }

        // ── Step 4: Post-process ─────────────────────────────────────────
        let prepared = postprocess::prepare_latex(&reply.text, truncated, &request.info);

        // ── Step 5: Compile ──────────────────────────────────────────────
        let build_dir = tempfile::Builder::new()
            .prefix("mathgen-build-")
            .tempdir_in(&self.config.scratch_root)
            .map_err(|source| MathGenError::Scratch {
                action: "create build directory",
                path: self.config.scratch_root.clone(),
                source,
            })?;
        let tex_path = build_dir.path().join(SOURCE_FILE_NAME);
        tokio::fs::write(&tex_path, &prepared.latex)
            .await
            .map_err(|source| MathGenError::Scratch {
                action: "write LaTeX source",
                path: tex_path.clone(),
                source,
            })?;

        if let Some(cb) = cb {
            cb.on_compile_start();
        }
        let compile_start = Instant::now();
        let compiled = self.compiler.compile(&tex_path).await;
        let compile_duration_ms = compile_start.elapsed().as_millis() as u64;

        // ── Step 6: Publish ──────────────────────────────────────────────
        let artifacts = match compiled {
            Ok(pdf_path) => {
                info!("Compiled in {}ms", compile_duration_ms);
                let names = self.store.publish(&prepared.latex, Some(&pdf_path)).await?;
                match names.pdf_file {
                    Some(pdf_file) => Artifacts::Compiled {
                        pdf_file,
                        tex_file: names.tex_file,
                    },
                    None => {
                        return Err(MathGenError::Internal(
                            "Compiled PDF was not published".into(),
                        ))
                    }
                }
            }
            Err(e) => {
                error!("LaTeX compilation failed: {}", e.details());
                let names = self.store.publish(&prepared.latex, None).await?;
                Artifacts::SourceOnly {
                    tex_file: names.tex_file,
                    error: e,
                }
            }
        };

        let compiled = matches!(artifacts, Artifacts::Compiled { .. });
        if let Some(cb) = cb {
            cb.on_solve_complete(compiled);
        }

        let stats = SolveStats {
            attachments: attachment_count,
            rasterized,
            prompt_tokens: reply.prompt_tokens,
            completion_tokens: reply.completion_tokens,
            render_duration_ms,
            model_duration_ms,
            compile_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Done in {}ms (compiled: {}, truncated: {}, repaired: {})",
            stats.total_duration_ms, compiled, truncated, prepared.repaired
        );

        Ok(SolveOutput {
            latex: prepared.latex,
            artifacts,
            truncated,
            repaired: prepared.repaired,
            stats,
        })
    }

    /// Page images for the model, or the PDF itself when rasterisation
    /// fails or yields nothing. The flag is false for the PDF fallback.
    async fn attachments(
        &self,
        stored: &StoredUpload,
        request: &SolveRequest,
    ) -> (Vec<Attachment>, bool) {
        match stored.kind {
            UploadKind::Image { mime_type } => (
                vec![Attachment::Image(PageImage::from_bytes(mime_type, &request.bytes))],
                true,
            ),
            UploadKind::Pdf => {
                match self
                    .rasterizer
                    .rasterize(&stored.path, stored.scratch_dir())
                    .await
                {
                    Ok(pages) if !pages.is_empty() => {
                        info!("Rasterised {} page(s)", pages.len());
                        (pages.into_iter().map(Attachment::Image).collect(), true)
                    }
                    Ok(_) => {
                        warn!("Rasterizer produced no pages, sending the PDF directly");
                        (vec![pdf_attachment(request)], false)
                    }
                    Err(e) => {
                        warn!("Rasterisation failed ({}), sending the PDF directly", e);
                        (vec![pdf_attachment(request)], false)
                    }
                }
            }
        }
    }
}

fn pdf_attachment(request: &SolveRequest) -> Attachment {
    Attachment::Pdf {
        file_name: request.file_name.clone(),
        data: STANDARD.encode(&request.bytes),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
