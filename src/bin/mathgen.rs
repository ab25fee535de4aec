//! CLI binary for mathgen.
//!
//! `mathgen serve` runs the web service; `mathgen solve` runs one sheet
//! through the pipeline locally. Both map flags (or their environment
//! variables, `.env` included) onto the library configuration.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use mathgen::auth::DEFAULT_AUTH_URL;
use mathgen::config::{DEFAULT_MODEL, DEFAULT_MODEL_ENDPOINT, DEFAULT_MODEL_TIMEOUT_MS};
use mathgen::downloads::download_url;
use mathgen::server::{self, DEFAULT_MAX_UPLOAD_BYTES};
use mathgen::{
    AppState, Artifacts, CookiePolicy, DetailLevel, DocumentInfo, HttpAuthBackend, ModelConfig,
    OpenRouterClient, ProgressCallback, RasterizerKind, SolutionLanguage, SolveProgressCallback,
    SolveRequest, Solver, SolverConfig,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner with one log line per finished stage.
struct SpinnerCallback {
    bar: ProgressBar,
}

impl SpinnerCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl SolveProgressCallback for SpinnerCallback {
    fn on_solve_start(&self, file_name: &str) {
        self.bar.set_message(format!("reading {file_name}"));
    }

    fn on_pages_ready(&self, count: usize, rasterized: bool) {
        if rasterized {
            self.bar
                .println(format!("  {} {} page image(s)", green("✓"), count));
        } else {
            self.bar.println(format!(
                "  {} rasteriser unavailable, sending the PDF itself",
                yellow("⚠")
            ));
        }
    }

    fn on_generation_start(&self) {
        self.bar.set_prefix("Solving");
        self.bar.set_message("waiting for the model…");
    }

    fn on_generation_complete(&self, chars: usize, truncated: bool) {
        let note = if truncated {
            yellow("  (truncated, will repair)")
        } else {
            String::new()
        };
        self.bar.println(format!(
            "  {} model reply {}{}",
            green("✓"),
            dim(&format!("{chars} chars")),
            note
        ));
    }

    fn on_compile_start(&self) {
        self.bar.set_prefix("Compiling");
        self.bar.set_message("running LaTeX…");
    }

    fn on_solve_complete(&self, compiled: bool) {
        self.bar.finish_and_clear();
        if compiled {
            eprintln!("{} solutions compiled", green("✔"));
        } else {
            eprintln!("{} compilation failed, LaTeX source saved", red("✘"));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the web service on the default address
  mathgen serve

  # Solve one sheet locally, detailed, in Chinese
  mathgen solve homework.pdf --detail detailed --language zh --title "Homework 3"

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY       Model API key (required for generation)
  OPENROUTER_API_URL       Chat-completions endpoint
  OPENROUTER_MODEL         Vision model ID (default openai/gpt-4o)
  OPENROUTER_TIMEOUT_MS    Bound on one model call (default 240000)
  AUTH_SERVICE_URL         Credential verification endpoint
  MATHGEN_DOWNLOAD_DIR     Where generated files are published
  PDFIUM_LIB_PATH          Path to libpdfium (pdfium rasterizer)

A .env file in the working directory is read on startup."#;

/// Generate LaTeX solution manuals from math problem sheets.
#[derive(Parser, Debug)]
#[command(
    name = "mathgen",
    version,
    about = "Generate LaTeX solution manuals from math problem sheets",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    model: ModelArgs,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "MATHGEN_VERBOSE")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Model API key.
    #[arg(long, global = true, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Chat-completions endpoint.
    #[arg(long, global = true, env = "OPENROUTER_API_URL", default_value = DEFAULT_MODEL_ENDPOINT)]
    api_url: String,

    /// Vision model ID.
    #[arg(long, global = true, env = "OPENROUTER_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Bound on one model call, in milliseconds.
    #[arg(long, global = true, env = "OPENROUTER_TIMEOUT_MS", default_value_t = DEFAULT_MODEL_TIMEOUT_MS)]
    timeout_ms: u64,

    /// `HTTP-Referer` attribution header.
    #[arg(long, global = true, env = "OPENROUTER_HTTP_REFERER", default_value = "http://localhost:3000")]
    http_referer: String,

    /// `X-Title` attribution header.
    #[arg(long, global = true, env = "OPENROUTER_X_TITLE", default_value = "Solution Manual Generator")]
    x_title: String,

    /// Maximum tokens the model may generate.
    #[arg(long, global = true, env = "MATHGEN_MAX_TOKENS", default_value_t = 16_000)]
    max_tokens: usize,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Public download directory.
    #[arg(long, global = true, env = "MATHGEN_DOWNLOAD_DIR", default_value = "./downloads")]
    download_dir: PathBuf,

    /// Root for per-request scratch directories (default: system temp dir).
    #[arg(long, global = true, env = "MATHGEN_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// LaTeX engine executable.
    #[arg(long, global = true, env = "MATHGEN_LATEX_ENGINE", default_value = "xelatex")]
    latex_engine: String,

    /// PDF rasterizer.
    #[arg(long, global = true, env = "MATHGEN_RASTERIZER", value_enum, default_value = "pdfium")]
    rasterizer: RasterizerArg,

    /// Rendering DPI for pdftoppm (72–400).
    #[arg(long, global = true, env = "MATHGEN_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web service.
    Serve(ServeArgs),
    /// Solve one sheet locally and publish the results.
    Solve(SolveArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "MATHGEN_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Credential verification endpoint.
    #[arg(long, env = "AUTH_SERVICE_URL", default_value = DEFAULT_AUTH_URL)]
    auth_url: String,

    /// Mark the session cookie `Secure` (HTTPS deployments).
    #[arg(long, env = "MATHGEN_SECURE_COOKIE")]
    secure_cookie: bool,

    /// Request body cap in MiB.
    #[arg(long, env = "MATHGEN_MAX_UPLOAD_MB", default_value_t = DEFAULT_MAX_UPLOAD_BYTES / (1024 * 1024))]
    max_upload_mb: usize,
}

#[derive(Args, Debug)]
struct SolveArgs {
    /// Problem sheet: PDF, PNG or JPEG.
    file: PathBuf,

    /// Extra instructions appended to the prompt.
    #[arg(long)]
    prompt: Option<String>,

    #[arg(long, value_enum, default_value = "usual")]
    detail: DetailArg,

    /// Language for the explanations (default: the sheet's language).
    #[arg(long, value_enum)]
    language: Option<LanguageArg>,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    author: Option<String>,

    #[arg(long)]
    course: Option<String>,

    /// Publish into this directory instead of the download directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RasterizerArg {
    Pdfium,
    Pdftoppm,
}

impl From<RasterizerArg> for RasterizerKind {
    fn from(v: RasterizerArg) -> Self {
        match v {
            RasterizerArg::Pdfium => RasterizerKind::Pdfium,
            RasterizerArg::Pdftoppm => RasterizerKind::Pdftoppm,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DetailArg {
    Simple,
    Usual,
    Detailed,
}

impl From<DetailArg> for DetailLevel {
    fn from(v: DetailArg) -> Self {
        match v {
            DetailArg::Simple => DetailLevel::Simple,
            DetailArg::Usual => DetailLevel::Usual,
            DetailArg::Detailed => DetailLevel::Detailed,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LanguageArg {
    En,
    Zh,
}

impl From<LanguageArg> for SolutionLanguage {
    fn from(v: LanguageArg) -> Self {
        match v {
            LanguageArg::En => SolutionLanguage::English,
            LanguageArg::Zh => SolutionLanguage::Chinese,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback a local solve needs.
    let spinner = matches!(&cli.command, Command::Solve(args) if !args.no_progress);
    let filter = if cli.verbose {
        "debug"
    } else if spinner {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let model = OpenRouterClient::new(build_model_config(&cli.model))
        .context("Failed to create model client")?;

    match &cli.command {
        Command::Serve(args) => run_serve(&cli, args, model).await,
        Command::Solve(args) => run_solve(&cli, args, model, spinner).await,
    }
}

async fn run_serve(cli: &Cli, args: &ServeArgs, model: OpenRouterClient) -> Result<()> {
    let config = build_solver_config(&cli.pipeline, None, None)?;
    info!(
        "Model {} via {}, downloads in {}",
        model.config().model,
        model.config().endpoint,
        config.download_dir.display()
    );
    if model.config().api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY is not set; /api/process will fail until it is");
    }

    let solver = Arc::new(Solver::new(config, Arc::new(model)));
    let auth = HttpAuthBackend::new(&args.auth_url).context("Failed to create auth client")?;
    let state = AppState::new(solver, Arc::new(auth), CookiePolicy::new(args.secure_cookie));
    let router = server::build_router(state, args.max_upload_mb.saturating_mul(1024 * 1024));

    server::serve(args.bind, router)
        .await
        .with_context(|| format!("Server on {} failed", args.bind))
}

async fn run_solve(
    cli: &Cli,
    args: &SolveArgs,
    model: OpenRouterClient,
    spinner: bool,
) -> Result<()> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let progress: Option<ProgressCallback> = if spinner {
        Some(SpinnerCallback::new() as Arc<dyn SolveProgressCallback>)
    } else {
        None
    };
    let config = build_solver_config(&cli.pipeline, args.out_dir.clone(), progress)?;
    let solver = Solver::new(config, Arc::new(model));

    let request = SolveRequest {
        file_name,
        bytes,
        prompt: args.prompt.clone(),
        detail: args.detail.into(),
        language: args.language.map(Into::into),
        info: DocumentInfo::from_form(args.title.clone(), args.author.clone(), args.course.clone()),
    };
    let output = solver.solve(request).await.context("Solving failed")?;
    let dir = solver.store().dir().display().to_string();

    if let Some(warning) = output.warning() {
        eprintln!("{} {}", yellow("⚠"), warning);
    }
    match &output.artifacts {
        Artifacts::Compiled { pdf_file, tex_file } => {
            println!("{}/{}", dir, pdf_file);
            println!("{}/{}", dir, tex_file);
        }
        Artifacts::SourceOnly { tex_file, error } => {
            eprintln!("{}", red(&error.details()));
            println!("{}/{}", dir, tex_file);
        }
    }
    eprintln!(
        "   {}  {} tokens in / {} tokens out  {}ms total",
        bold(&download_url(output.tex_file())),
        dim(&output.stats.prompt_tokens.unwrap_or(0).to_string()),
        dim(&output.stats.completion_tokens.unwrap_or(0).to_string()),
        output.stats.total_duration_ms,
    );
    Ok(())
}

fn build_model_config(args: &ModelArgs) -> ModelConfig {
    ModelConfig {
        api_key: args.api_key.clone().filter(|k| !k.trim().is_empty()),
        endpoint: args.api_url.clone(),
        model: args.model.clone(),
        timeout_ms: args.timeout_ms,
        max_tokens: args.max_tokens,
        http_referer: args.http_referer.clone(),
        app_title: args.x_title.clone(),
    }
}

/// Map CLI args to `SolverConfig`.
fn build_solver_config(
    args: &PipelineArgs,
    out_dir: Option<PathBuf>,
    progress: Option<ProgressCallback>,
) -> Result<SolverConfig> {
    let mut builder = SolverConfig::builder()
        .download_dir(out_dir.unwrap_or_else(|| args.download_dir.clone()))
        .latex_engine(args.latex_engine.clone())
        .rasterizer(args.rasterizer.into())
        .dpi(args.dpi);
    if let Some(dir) = &args.scratch_dir {
        builder = builder.scratch_root(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}
