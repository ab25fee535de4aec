//! Best-effort healing of truncated LaTeX.
//!
//! When the model stops mid-answer (token limit, or just a sloppy reply) the
//! tail of the document is usually an unfinished `\frac{`, an open `align`
//! environment and a handful of unclosed braces. Handing that to the
//! typesetter guarantees a failed compile, so [`repair_latex`] closes what
//! was left open. It only ever appends, or completes the unfinished fragment
//! at the very end of the text; existing content is never removed.
//!
//! ## Repair Order
//!
//! 1. Trailing `\frac{…` without a second argument → `\frac{…}{}`
//! 2. Trailing `\sqrt{…` (optionally `\sqrt[n]{…`) → closed with `}`
//!    - Trailing `\begin{nam…` / `\end{nam…` → name closed with `}`, so the
//!      environment rules below see the completed name
//! 3. Surplus `\left(` / `\left[` over `\right)` / `\right]` → `\right)` each
//! 4. `\begin{name}` without a matching `\end{name}` → `\end{name}`, most
//!    recent first (pairing is by first available name, not nesting-aware)
//! 5. Surplus unescaped `{` over `}` → that many `}`
//! 6. `\begin{document}` without `\end{document}` → `\end{document}`
//!
//! Applying the repair twice yields the same text as applying it once.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_TRAILING_FRAC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\frac\{([^{}]*)$").unwrap());

static RE_TRAILING_SQRT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\sqrt(\[[^\]]*\])?\{([^{}]*)$").unwrap());

static RE_TRAILING_ENV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(begin|end)\{([^{}]*)$").unwrap());

static RE_LEFT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\left[(\[]").unwrap());
static RE_RIGHT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\right[)\]]").unwrap());

static RE_BEGIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\begin\{([^}]+)\}").unwrap());
static RE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\end\{([^}]+)\}").unwrap());

// Incompleteness scan only.
static RE_SCAN_FRAC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\frac\{[^}]*$").unwrap());
static RE_SCAN_SQRT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\sqrt\{[^}]*$").unwrap());
static RE_SCAN_LEFT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\left\S*$").unwrap());

const DOCUMENT_BEGIN: &str = r"\begin{document}";
const DOCUMENT_END: &str = r"\end{document}";

/// Close whatever a truncated LaTeX reply left open.
///
/// Well-formed input (balanced braces, every environment closed, no
/// unfinished trailing `\frac{`/`\sqrt{`, no surplus `\left`) is returned
/// unchanged.
pub fn repair_latex(input: &str) -> String {
    // Rules 1–2: complete the unfinished fragment at the very end.
    let mut result = RE_TRAILING_FRAC
        .replace(input, r"\frac{${1}}{}")
        .into_owned();
    result = RE_TRAILING_SQRT
        .replace(&result, r"\sqrt${1}{${2}}")
        .into_owned();
    result = RE_TRAILING_ENV
        .replace(&result, r"\${1}{${2}}")
        .into_owned();

    // Rule 3
    let lefts = RE_LEFT.find_iter(&result).count();
    let rights = RE_RIGHT.find_iter(&result).count();
    for _ in rights..lefts {
        append(&mut result, r"\right)");
    }

    // Rule 4: `document` is left to rule 6 so it always ends up last.
    let unclosed: Vec<String> = unclosed_environments(&result)
        .into_iter()
        .filter(|name| name != "document")
        .collect();
    for name in unclosed.iter().rev() {
        append(&mut result, &format!("\n\\end{{{name}}}"));
    }

    // Rule 5
    let deficit = brace_deficit(&result);
    if deficit > 0 {
        append(&mut result, &"}".repeat(deficit as usize));
    }

    // Rule 6
    if result.contains(DOCUMENT_BEGIN) && !result.contains(DOCUMENT_END) {
        append(&mut result, &format!("\n{DOCUMENT_END}"));
    }

    result
}

/// Decide whether a reply looks cut off.
///
/// True when braces are unbalanced, an environment (including `document`)
/// is left open, or the text ends in an unfinished `\frac{`, `\sqrt{`,
/// `\left…` or a stray backslash. The caller also repairs whenever the model
/// itself reports a length-limited stop.
pub fn needs_repair(input: &str) -> bool {
    let text = input.trim();
    brace_deficit(text) > 0
        || !unclosed_environments(text).is_empty()
        || (text.contains(DOCUMENT_BEGIN) && !text.contains(DOCUMENT_END))
        || RE_SCAN_FRAC.is_match(text)
        || RE_SCAN_SQRT.is_match(text)
        || RE_SCAN_LEFT.is_match(text)
        || text.ends_with('\\')
}

/// Unescaped `{` minus unescaped `}`, scanning left to right.
///
/// A brace immediately preceded by a backslash is an escaped literal and is
/// not counted. Negative when there are more closers than openers.
pub fn brace_deficit(text: &str) -> i64 {
    let mut depth = 0i64;
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if prev != Some('\\') {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        prev = Some(c);
    }
    depth
}

/// Names of `\begin{…}` environments with no matching `\end{…}`, in opening
/// order.
///
/// Each `\begin{name}` consumes the first still-unused `\end{name}` anywhere
/// in the text; nesting is not tracked.
pub fn unclosed_environments(text: &str) -> Vec<String> {
    let mut ends: Vec<&str> = RE_END
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();

    let mut open = Vec::new();
    for caps in RE_BEGIN.captures_iter(text) {
        let name = &caps[1];
        if let Some(pos) = ends.iter().position(|e| *e == name) {
            ends.remove(pos);
        } else {
            open.push(name.to_string());
        }
    }
    open
}

/// Append `suffix`, first separating it from a dangling backslash so the
/// backslash cannot swallow the first appended character as a control
/// sequence.
fn append(result: &mut String, suffix: &str) {
    let trailing_backslashes = result.chars().rev().take_while(|c| *c == '\\').count();
    if trailing_backslashes % 2 == 1 {
        result.push(' ');
    }
    result.push_str(suffix);
}

// ── Tests ────────────────────────────────────────────────────────────────────
