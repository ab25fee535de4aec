//! LaTeX compilation through an external engine.
//!
//! The orchestrator only sees the [`Compiler`] trait, so tests can swap in a
//! fake instead of spawning a TeX installation.

use crate::error::CompileError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, error};

/// Lines of log context kept after each `!` error line.
const ERROR_CONTEXT_LINES: usize = 2;

/// Compiles a `.tex` file into a PDF next to it.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Returns the path of the produced PDF.
    async fn compile(&self, tex_path: &Path) -> Result<PathBuf, CompileError>;
}

/// Runs `xelatex` (or another engine with the same command line).
#[derive(Debug, Clone)]
pub struct XelatexCompiler {
    program: String,
}

impl XelatexCompiler {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for XelatexCompiler {
    fn default() -> Self {
        Self::new("xelatex")
    }
}

#[async_trait]
impl Compiler for XelatexCompiler {
    async fn compile(&self, tex_path: &Path) -> Result<PathBuf, CompileError> {
        let work_dir = tex_path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = tex_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| tex_path.as_os_str().to_os_string());

        debug!("Running {} on {}", self.program, tex_path.display());
        let output = Command::new(&self.program)
            .arg("-interaction=nonstopmode")
            .arg("-no-shell-escape")
            .arg("-halt-on-error")
            .arg(&file_name)
            .current_dir(work_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CompileError::Spawn {
                program: self.program.clone(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let log = error_summary(&stdout).unwrap_or_else(|| {
                let fallback = if stderr.trim().is_empty() { &stdout } else { &stderr };
                fallback.trim().to_string()
            });
            error!("{} failed: {}", self.program, output.status);
            return Err(CompileError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                log,
            });
        }

        let pdf_path = tex_path.with_extension("pdf");
        if !pdf_path.exists() {
            return Err(CompileError::MissingOutput { path: pdf_path });
        }
        Ok(pdf_path)
    }
}

/// The `! …` error lines of a TeX log plus a little context, or `None`
/// when the log has no error lines.
pub fn error_summary(log: &str) -> Option<String> {
    let lines: Vec<&str> = log.lines().collect();
    let mut picked = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with('!') {
            picked.extend(lines.iter().skip(i).take(ERROR_CONTEXT_LINES + 1).copied());
        }
    }
    if picked.is_empty() {
        None
    } else {
        Some(picked.join("\n"))
    }
}
