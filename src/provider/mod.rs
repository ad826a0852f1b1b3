//! Completion provider boundary.
//! The pipeline only needs "instruction + input -> text"; everything about
//! transport, auth and retries lives behind [`CompletionProvider`].

pub mod deepseek;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::freshness::TranslationCandidate;

pub use deepseek::DeepSeekProvider;

/// Separator the multi-candidate instruction asks the provider to use.
pub const CANDIDATE_DELIMITER: &str = "|||";
pub const MAX_CANDIDATES: usize = 5;

/// Black-box text generation service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run one completion. Implementations return `EmptyResponse` rather
    /// than an empty string.
    async fn complete(&self, instruction: &str, input: &str) -> Result<String, ProviderError>;
}

/// Split a multi-candidate completion into scored candidates.
/// Accepts `|||`-delimited output, or a list whose every line carries a
/// marker. Anything else is a single candidate, line breaks included.
/// Earlier candidates get higher scores.
pub fn parse_candidates(response: &str) -> Vec<TranslationCandidate> {
    let pieces: Vec<&str> = if response.contains(CANDIDATE_DELIMITER) {
        response.split(CANDIDATE_DELIMITER).collect()
    } else if is_marked_list(response) {
        response.lines().collect()
    } else {
        vec![response]
    };

    let mut seen: Vec<String> = Vec::new();
    for piece in pieces {
        let text = strip_list_marker(piece.trim()).trim_matches('"').trim();
        if text.is_empty() || seen.iter().any(|s| s.eq_ignore_ascii_case(text)) {
            continue;
        }
        seen.push(text.to_string());
        if seen.len() == MAX_CANDIDATES {
            break;
        }
    }

    seen.into_iter()
        .enumerate()
        .map(|(i, text)| TranslationCandidate::new(text, 1.0 - 0.05 * i as f64))
        .collect()
}

fn is_marked_list(response: &str) -> bool {
    let mut lines = response.lines().map(str::trim).filter(|l| !l.is_empty()).peekable();
    lines.peek().is_some() && lines.all(|l| strip_list_marker(l).len() < l.len())
}

/// Drop a leading "1.", "2)", "-" or "*" list marker.
fn strip_list_marker(line: &str) -> &str {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    let rest = &line[digits..];
    if digits > 0 {
        if let Some(stripped) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return stripped.trim_start();
        }
        return line;
    }
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .unwrap_or(line)
}
