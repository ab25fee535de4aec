//! Progress-callback trait for per-stage solve events.
//!
//! Inject an [`Arc<dyn SolveProgressCallback>`] via
//! [`crate::config::SolverConfigBuilder::progress_callback`] to receive
//! events as the orchestrator moves through its stages. The CLI uses this to
//! drive a spinner; the HTTP service leaves it unset and relies on tracing.
//!
//! # Example
//!
//! ```rust
//! use mathgen::{SolveProgressCallback, SolverConfig};
//! use std::sync::Arc;
//!
//! struct PrintStages;
//!
//! impl SolveProgressCallback for PrintStages {
//!     fn on_generation_complete(&self, chars: usize, truncated: bool) {
//!         eprintln!("model replied with {chars} chars (truncated: {truncated})");
//!     }
//! }
//!
//! let config = SolverConfig::builder()
//!     .progress_callback(Arc::new(PrintStages))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by [`crate::solve::Solver`] as a request moves through the pipeline.
///
/// Implementations must be `Send + Sync`; the HTTP service runs many solves
/// concurrently. All methods have default no-op implementations.
pub trait SolveProgressCallback: Send + Sync {
    /// The upload passed validation and is about to be stored.
    fn on_solve_start(&self, file_name: &str) {
        let _ = file_name;
    }

    /// Attachments for the model are ready.
    ///
    /// # Arguments
    /// * `count`      — number of attachments (pages, or 1 for the PDF fallback)
    /// * `rasterized` — false when the PDF is sent as-is
    fn on_pages_ready(&self, count: usize, rasterized: bool) {
        let _ = (count, rasterized);
    }

    /// The model request is about to be sent.
    fn on_generation_start(&self) {}

    /// The model replied.
    ///
    /// # Arguments
    /// * `chars`     — length of the normalised reply
    /// * `truncated` — the model reported a length-limited stop
    fn on_generation_complete(&self, chars: usize, truncated: bool) {
        let _ = (chars, truncated);
    }

    /// The LaTeX compiler is about to run.
    fn on_compile_start(&self) {}

    /// Artefacts were published.
    ///
    /// # Arguments
    /// * `compiled` — a PDF was produced; false means source-only
    fn on_solve_complete(&self, compiled: bool) {
        let _ = compiled;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl SolveProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::SolverConfig`].
pub type ProgressCallback = Arc<dyn SolveProgressCallback>;
