//! Instruction text sent to the vision model.
//!
//! Centralising every prompt here keeps prompt edits out of the request and
//! error-handling code, and lets unit tests inspect prompts directly.

use crate::config::{DetailLevel, SolutionLanguage};

/// Fixed framing placed at the top of every instruction.
///
/// The placeholder `{detail}` is replaced with the detail-level description.
pub const SYSTEM_FRAMING: &str = r#"You are an expert math teacher.
Read the attached problem sheet and provide solutions in pure LaTeX code.
Detail level: {detail}

Each question should be labeled clearly (e.g., Q1, Q2, ...).
Do not include explanations outside LaTeX syntax.
Output only valid LaTeX code that can be compiled directly.
IMPORTANT: Ensure all LaTeX commands are properly closed. If the response is long, prioritize completing all questions even if some solutions are shorter."#;

/// Description of what each detail level asks for.
pub fn detail_description(level: DetailLevel) -> &'static str {
    match level {
        DetailLevel::Simple => "Only numerical or short final answers.",
        DetailLevel::Usual => "Main solution steps and key equations, limited verbal explanation.",
        DetailLevel::Detailed => {
            "Every logical step and explanation, full derivations, and commentary."
        }
    }
}

/// Assemble the full instruction for one request.
///
/// The user's free text, when present and non-blank, is appended last so it
/// can refine (but not replace) the framing.
pub fn build_instruction(
    level: DetailLevel,
    language: Option<SolutionLanguage>,
    user_prompt: Option<&str>,
) -> String {
    let mut instruction = SYSTEM_FRAMING.replace("{detail}", detail_description(level));

    if let Some(lang) = language {
        instruction.push_str(&format!(
            "\nWrite all explanations in {}; keep mathematical notation in LaTeX.",
            lang.display_name()
        ));
    }

    if let Some(extra) = user_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        instruction.push_str("\n\nAdditional instructions: ");
        instruction.push_str(extra);
    }

    instruction
}
