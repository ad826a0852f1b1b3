//! Provider instruction templates.

use crate::provider::{CANDIDATE_DELIMITER, MAX_CANDIDATES};
use crate::style::Style;

const PRESERVE: &str = "Keep every <<PHn>> placeholder exactly as written. \
                        Keep contractions. Output only the rewritten text, nothing else.";

/// Rewrite `from`-style text into the neutral baseline.
pub fn normalize_instruction(from: Style, context: Option<&str>) -> String {
    let mut out = format!(
        "You rewrite text written in {} into {}. Preserve the meaning, tone and intent \
         exactly; explain slang by what it means, not by a literal reading. {}",
        from.description(),
        Style::Standard.description(),
        PRESERVE
    );
    push_context(&mut out, context);
    out
}

/// Rewrite neutral text into `to` as a single answer.
pub fn target_instruction(to: Style, context: Option<&str>) -> String {
    let mut out = format!(
        "You rewrite plain standard English into {}. Preserve the meaning exactly and \
         sound like a native speaker of that style. {}",
        to.description(),
        PRESERVE
    );
    push_context(&mut out, context);
    out
}

/// Rewrite neutral text into `to`, asking for several alternatives.
pub fn candidates_instruction(to: Style, context: Option<&str>) -> String {
    let mut out = format!(
        "You rewrite plain standard English into {}. Give {} different natural \
         alternatives separated by \"{}\" on a single line, best first. Prefer slang \
         that is in use right now. {}",
        to.description(),
        MAX_CANDIDATES.min(3),
        CANDIDATE_DELIMITER,
        PRESERVE
    );
    push_context(&mut out, context);
    out
}

fn push_context(out: &mut String, context: Option<&str>) {
    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        out.push_str(" Conversation context: ");
        out.push_str(context);
    }
}
