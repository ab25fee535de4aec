//! Neutralise LaTeX control sequences with shell or file-system side effects.
//!
//! This is a regex filter, not a TeX parser. Every hit is replaced with a
//! visible `% BLOCKED: …` comment so the compiled output shows what was
//! removed. Markers contain no backslash, so running the filter over its own
//! output changes nothing.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Prefix of every marker written by [`sanitize_latex`].
pub const BLOCKED_MARKER: &str = "% BLOCKED:";

// ── Rule 1: piped file arguments ─────────────────────────────────────────────

static RE_PIPED_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\\input\s*\{[^}]*\|[^}]*\}").unwrap());

static RE_PIPED_WRITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\\write\s*\{[^}]*\|[^}]*\}").unwrap());

// ── Rule 2: denylist ─────────────────────────────────────────────────────────

/// Longer names come first so `\immediate\write18` is not split into
/// `\immediate` + `\write18`, and `\write18` wins over `\write`.
static RE_DENYLIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\\(?:immediate\s*\\write\s*18|write\s*18|def\s*\\#|input\s*\{?\s*\||openin|openout|newread|newwrite|read|write)",
    )
    .unwrap()
});

/// Replace every dangerous control sequence with a blocked-marker comment.
///
/// Pipe arguments to `\input{…}` / `\write{…}` are caught first, whole
/// argument included; the denylist then covers shell escape (`\write18`,
/// `\immediate\write18`), piped `\input`, the file primitives
/// (`\openin`, `\openout`, `\read`, `\write`) and stream allocation
/// (`\newread`, `\newwrite`), and redefinition of `\#`. Matching is
/// case-insensitive.
pub fn sanitize_latex(input: &str) -> String {
    let s = RE_PIPED_INPUT.replace_all(input, "% BLOCKED: piped input");
    let s = RE_PIPED_WRITE.replace_all(&s, "% BLOCKED: piped write");
    RE_DENYLIST
        .replace_all(&s, |caps: &Captures| format!("{BLOCKED_MARKER} {}", label(&caps[0])))
        .into_owned()
}

/// Backslash-free name for a denylist hit, e.g. `\Immediate\write18` →
/// `immediate-write18`.
fn label(matched: &str) -> String {
    let lower = matched.to_ascii_lowercase();
    if lower.contains('|') {
        return "piped input".to_string();
    }
    lower
        .trim_start_matches('\\')
        .split('\\')
        .map(|part| part.split_whitespace().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}
