//! Configuration types for solution generation.
//!
//! Pipeline behaviour is controlled through [`SolverConfig`], built via its
//! [`SolverConfigBuilder`]; the language-model endpoint is described by
//! [`ModelConfig`]. Per-request choices made by the user (detail level,
//! language, document metadata) are small enums/structs that parse leniently
//! from form values.
//!
//! # Design choice: builder over constructor
//! Callers set only what they care about and rely on documented defaults for
//! the rest; `build()` is the single place constraints are checked.

use crate::error::MathGenError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default chat-completions endpoint.
pub const DEFAULT_MODEL_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default vision model identifier.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o";

/// Default bound on one model call: 4 minutes, long generations included.
pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 240_000;

/// Configuration for the upload → LaTeX → PDF pipeline.
///
/// # Example
/// ```rust
/// use mathgen::SolverConfig;
///
/// let config = SolverConfig::builder()
///     .download_dir("/srv/mathgen/downloads")
///     .latex_engine("lualatex")
///     .build()
///     .unwrap();
/// assert_eq!(config.latex_engine, "lualatex");
/// ```
#[derive(Clone)]
pub struct SolverConfig {
    /// Root under which per-request scratch and compile directories are
    /// created. Default: the system temp dir.
    pub scratch_root: PathBuf,

    /// Public download directory; artefacts here are never deleted.
    /// Default: `./downloads`.
    pub download_dir: PathBuf,

    /// LaTeX engine executable. Default: `xelatex` (needed for xeCJK).
    pub latex_engine: String,

    /// Which rasterizer turns PDF pages into images. Default: pdfium.
    pub rasterizer: RasterizerKind,

    /// Rendering DPI for the `pdftoppm` rasterizer. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Longest rendered edge in pixels for the pdfium rasterizer. Default: 2000.
    ///
    /// A safety cap independent of DPI so a poster-sized page cannot exhaust
    /// memory or exceed the model's upload limit.
    pub max_rendered_pixels: u32,

    /// Optional per-stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir(),
            download_dir: PathBuf::from("downloads"),
            latex_engine: "xelatex".to_string(),
            rasterizer: RasterizerKind::default(),
            dpi: 150,
            max_rendered_pixels: 2000,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverConfig")
            .field("scratch_root", &self.scratch_root)
            .field("download_dir", &self.download_dir)
            .field("latex_engine", &self.latex_engine)
            .field("rasterizer", &self.rasterizer)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn SolveProgressCallback>"),
            )
            .finish()
    }
}

impl SolverConfig {
    /// Create a new builder for `SolverConfig`.
    pub fn builder() -> SolverConfigBuilder {
        SolverConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`SolverConfig`].
#[derive(Debug)]
pub struct SolverConfigBuilder {
    config: SolverConfig,
}

impl SolverConfigBuilder {
    pub fn scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_root = dir.into();
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = dir.into();
        self
    }

    pub fn latex_engine(mut self, program: impl Into<String>) -> Self {
        self.config.latex_engine = program.into();
        self
    }

    pub fn rasterizer(mut self, kind: RasterizerKind) -> Self {
        self.config.rasterizer = kind;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SolverConfig, MathGenError> {
        let c = &self.config;
        if c.latex_engine.trim().is_empty() {
            return Err(MathGenError::InvalidConfig(
                "LaTeX engine must not be empty".into(),
            ));
        }
        if c.download_dir.as_os_str().is_empty() {
            return Err(MathGenError::InvalidConfig(
                "Download directory must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Connection settings for the vision language-model endpoint.
#[derive(Clone)]
pub struct ModelConfig {
    /// Bearer token. `None` makes every call fail with
    /// [`MathGenError::ModelNotConfigured`] instead of failing at startup.
    pub api_key: Option<String>,
    /// Chat-completions URL.
    pub endpoint: String,
    /// Model identifier sent in the request body.
    pub model: String,
    /// Hard bound on one call, in milliseconds. Default: 240 000.
    pub timeout_ms: u64,
    /// Maximum tokens the model may generate. Default: 16 000.
    ///
    /// A full solution manual for a multi-page sheet easily exceeds 8 000
    /// tokens; hitting this limit is what produces truncated LaTeX.
    pub max_tokens: usize,
    /// Value of the `HTTP-Referer` attribution header.
    pub http_referer: String,
    /// Value of the `X-Title` attribution header.
    pub app_title: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_MODEL_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_ms: DEFAULT_MODEL_TIMEOUT_MS,
            max_tokens: 16_000,
            http_referer: "http://localhost:3000".to_string(),
            app_title: "Solution Manual Generator".to_string(),
        }
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout_ms", &self.timeout_ms)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Backend used to turn PDF pages into images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterizerKind {
    /// In-process rendering through pdfium. (default)
    #[default]
    Pdfium,
    /// External `pdftoppm` executable from poppler-utils.
    Pdftoppm,
}

impl FromStr for RasterizerKind {
    type Err = MathGenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdfium" => Ok(RasterizerKind::Pdfium),
            "pdftoppm" | "poppler" => Ok(RasterizerKind::Pdftoppm),
            other => Err(MathGenError::InvalidConfig(format!(
                "Unknown rasterizer '{other}' (expected pdfium or pdftoppm)"
            ))),
        }
    }
}

/// How much working the generated solutions show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    /// Final answers only.
    Simple,
    /// Main steps and key equations. (default)
    #[default]
    Usual,
    /// Full derivations with commentary.
    Detailed,
}

impl DetailLevel {
    /// Parse a form value; anything unrecognised (or absent) is `Usual`.
    pub fn from_form(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("simple") => DetailLevel::Simple,
            Some("detailed") => DetailLevel::Detailed,
            _ => DetailLevel::Usual,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetailLevel::Simple => "simple",
            DetailLevel::Usual => "usual",
            DetailLevel::Detailed => "detailed",
        }
    }
}

/// Language the explanations should be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolutionLanguage {
    English,
    Chinese,
}

impl SolutionLanguage {
    /// Parse a form value (`en`, `zh`, or the full name). Unknown → `None`,
    /// meaning the model keeps the language of the problem sheet.
    pub fn from_form(value: Option<&str>) -> Option<Self> {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("en") | Some("english") => Some(SolutionLanguage::English),
            Some("zh") | Some("zh-cn") | Some("chinese") => Some(SolutionLanguage::Chinese),
            _ => None,
        }
    }

    /// Name used inside the instruction text.
    pub fn display_name(self) -> &'static str {
        match self {
            SolutionLanguage::English => "English",
            SolutionLanguage::Chinese => "Simplified Chinese",
        }
    }
}

/// Optional document metadata supplied by the richer upload form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub course: Option<String>,
}

impl DocumentInfo {
    /// Build from raw form values, dropping blank entries.
    pub fn from_form(title: Option<String>, author: Option<String>, course: Option<String>) -> Self {
        fn clean(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        Self {
            title: clean(title),
            author: clean(author),
            course: clean(course),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author.is_none() && self.course.is_none()
    }
}
