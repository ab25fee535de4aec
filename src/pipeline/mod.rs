//! Pipeline stages for sheet-to-solutions generation.
//!
//! Each submodule implements exactly one step, so each is independently
//! testable and the external tools (rasterizer, model, compiler) sit behind
//! traits the orchestrator can swap.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ postprocess ──▶ compile
//! (upload)  (pages)    (base64)   (VLM)   (repair,       (xelatex)
//!                                          sanitize)
//! ```
//!
//! 1. [`input`]       — classify the upload and store it in scratch space
//! 2. [`render`]      — rasterise PDF pages (pdfium or pdftoppm)
//! 3. [`encode`]      — base64 page images for the request body
//! 4. [`llm`]         — one call to the vision model, reply normalised to text
//! 5. [`postprocess`] — fences, fonts, preamble; drives [`repair`] and
//!    [`sanitize`]
//! 6. [`compile`]     — run the LaTeX engine

pub mod compile;
pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
pub mod repair;
pub mod sanitize;
