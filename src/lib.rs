//! # mathgen
//!
//! Turn a photographed or scanned math problem sheet into a typeset
//! solution manual using a vision language model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (PDF / PNG / JPEG)
//!  │
//!  ├─ 1. Input     store in a per-request scratch TempDir
//!  ├─ 2. Render    rasterise PDF pages (pdfium or pdftoppm); PDF fallback
//!  ├─ 3. Model     one vision-model call, reply normalised to text
//!  ├─ 4. Repair    heal truncated LaTeX (unclosed braces / environments)
//!  ├─ 5. Polish    fences, font directive, preamble, sanitizer
//!  ├─ 6. Compile   xelatex, no shell escape
//!  └─ 7. Publish   solutions_<millis>.tex / .pdf in the download directory
//! ```
//!
//! The [`server`] module puts this behind a small cookie-session web
//! service; the `mathgen` binary runs that service or a one-off local solve.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mathgen::{ModelConfig, OpenRouterClient, SolveRequest, Solver, SolverConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let model = OpenRouterClient::new(ModelConfig {
//!         api_key: std::env::var("OPENROUTER_API_KEY").ok(),
//!         ..Default::default()
//!     })?;
//!     let solver = Solver::new(SolverConfig::builder().build()?, Arc::new(model));
//!
//!     let output = solver
//!         .solve(SolveRequest {
//!             file_name: "sheet.pdf".into(),
//!             bytes: std::fs::read("sheet.pdf")?,
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("tex: {}", output.tex_file());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `mathgen` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod downloads;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod server;
pub mod session;
pub mod solve;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use auth::{AuthBackend, AuthError, AuthOutcome, HttpAuthBackend};
pub use config::{
    DetailLevel, DocumentInfo, ModelConfig, RasterizerKind, SolutionLanguage, SolverConfig,
    SolverConfigBuilder,
};
pub use downloads::DownloadStore;
pub use error::{CompileError, MathGenError};
pub use output::{Artifacts, SolveOutput, SolveStats, TRUNCATION_WARNING};
pub use pipeline::compile::{Compiler, XelatexCompiler};
pub use pipeline::llm::{OpenRouterClient, VisionModel};
pub use pipeline::render::Rasterizer;
pub use pipeline::repair::{needs_repair, repair_latex};
pub use pipeline::sanitize::sanitize_latex;
pub use progress::{NoopProgressCallback, ProgressCallback, SolveProgressCallback};
pub use server::{build_router, AppState};
pub use session::{CookiePolicy, SessionPayload};
pub use solve::{SolveRequest, Solver};
