//! Post-processing: turn the raw model reply into compilable LaTeX.
//!
//! Models wrap their answer in Markdown fences despite being told not to,
//! pin Windows-only fonts, and sometimes send a body with no preamble at
//! all. Each fix here is a small deterministic rule, independently testable.
//!
//! ## Rule Order
//!
//! 1. Repair truncated output (only when truncation was signalled or the
//!    incompleteness scan fires)
//! 2. Strip Markdown code-fence lines
//! 3. Comment out `\setCJKmainfont{SimSun}`
//! 4. Wrap a bare body in a generated preamble, adding xeCJK only for CJK text
//! 5. Sanitize dangerous control sequences
//!
//! Sanitizing runs last so nothing added earlier escapes the filter.

use crate::config::DocumentInfo;
use crate::pipeline::repair::{needs_repair, repair_latex};
use crate::pipeline::sanitize::sanitize_latex;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// LaTeX ready to be written and compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedLatex {
    pub latex: String,
    /// The repair heuristic ran.
    pub repaired: bool,
}

/// Apply every post-processing rule to the model reply.
///
/// `truncated` is the model's own length-limit signal; it forces a repair
/// even if the incompleteness scan finds nothing.
pub fn prepare_latex(reply: &str, truncated: bool, info: &DocumentInfo) -> PreparedLatex {
    let repaired = truncated || needs_repair(reply);
    let s = if repaired {
        if truncated {
            warn!("Model reply hit the token limit, repairing LaTeX");
        } else {
            warn!("Model reply looks incomplete, repairing LaTeX");
        }
        repair_latex(reply)
    } else {
        reply.to_string()
    };

    let s = strip_code_fences(&s);
    let s = remove_font_directive(&s);
    let s = wrap_in_preamble(&s, info);
    PreparedLatex {
        latex: sanitize_latex(&s),
        repaired,
    }
}

// ── Rule 2: Strip code fences ────────────────────────────────────────────────

static RE_FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^```[A-Za-z]*[ \t]*\r?\n?").unwrap());

static RE_FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)```[ \t]*$").unwrap());

/// Remove ```` ```latex ```` / ```` ``` ```` wrapper lines and trim.
pub fn strip_code_fences(input: &str) -> String {
    let s = RE_FENCE_OPEN.replace_all(input, "");
    let s = RE_FENCE_CLOSE.replace_all(&s, "");
    s.trim().to_string()
}

// ── Rule 3: Font directive ───────────────────────────────────────────────────

static RE_SIMSUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\\setCJKmainfont\s*(?:\[[^\]]*\])?\s*\{SimSun\}").unwrap());

/// Comment out `\setCJKmainfont{SimSun}` and `\setCJKmainfont[…]{SimSun}`;
/// SimSun is rarely installed outside Windows.
pub fn remove_font_directive(input: &str) -> String {
    RE_SIMSUN
        .replace_all(
            input,
            "% \\setCJKmainfont{SimSun} % Removed for cross-platform compatibility",
        )
        .into_owned()
}

// ── Rule 4: Preamble ─────────────────────────────────────────────────────────

/// True if the text contains Chinese, Japanese kana or Korean Hangul.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c,
            '\u{4e00}'..='\u{9fff}'
            | '\u{3040}'..='\u{309f}'
            | '\u{30a0}'..='\u{30ff}'
            | '\u{ac00}'..='\u{d7af}')
    })
}

/// Wrap a bare body in a standalone article.
///
/// Only applies when the text has neither `\documentclass` nor
/// `\begin{document}`; anything else is returned as-is. xeCJK is added when
/// the body contains CJK characters, without naming a font.
pub fn wrap_in_preamble(latex: &str, info: &DocumentInfo) -> String {
    if latex.contains(r"\documentclass") || latex.contains(r"\begin{document}") {
        return latex.to_string();
    }

    let mut doc = String::with_capacity(latex.len() + 256);
    doc.push_str("\\documentclass[12pt]{article}\n");
    doc.push_str("\\usepackage{amsmath, amssymb, amsthm}\n");
    doc.push_str("\\usepackage{geometry}\n");
    doc.push_str("\\geometry{a4paper, margin=1in}\n");
    if contains_cjk(latex) || info_has_cjk(info) {
        doc.push_str("\\usepackage{xeCJK}\n");
    }

    let title = info.title.as_deref();
    if let Some(title) = title {
        let byline = info.author.as_deref().or(info.course.as_deref()).unwrap_or("");
        doc.push_str(&format!("\\title{{{}}}\n", escape_latex(title)));
        doc.push_str(&format!("\\author{{{}}}\n", escape_latex(byline)));
        doc.push_str("\\date{}\n");
    }

    doc.push_str("\n\\begin{document}\n");
    if title.is_some() {
        doc.push_str("\\maketitle\n");
    }
    doc.push('\n');
    doc.push_str(latex);
    doc.push_str("\n\n\\end{document}\n");
    doc
}

fn info_has_cjk(info: &DocumentInfo) -> bool {
    [&info.title, &info.author, &info.course]
        .into_iter()
        .flatten()
        .any(|v| contains_cjk(v))
}

/// Escape LaTeX special characters in user-supplied text.
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '{' | '}' | '$' | '&' | '#' | '_' | '%' => {
                out.push('\\');
                out.push(c);
            }
            '^' => out.push_str("\\textasciicircum{}"),
            '~' => out.push_str("\\textasciitilde{}"),
            _ => out.push(c),
        }
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────
