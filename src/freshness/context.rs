//! Keyword-based context classification of the input text.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    Vibe,
    Humor,
    Emotion,
    Status,
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContextType::Vibe => "vibe",
            ContextType::Humor => "humor",
            ContextType::Emotion => "emotion",
            ContextType::Status => "status",
        };
        f.write_str(name)
    }
}

/// A keyword matched against the words of the input, never mid-word.
enum Keyword {
    /// Matches any word starting with it ("laugh" in "laughing").
    Stem(&'static str),
    /// Matches only the exact word.
    Word(&'static str),
}

use Keyword::{Stem, Word};

impl Keyword {
    fn matches(&self, word: &str) -> bool {
        match self {
            Stem(stem) => word.starts_with(stem),
            Word(exact) => word == *exact,
        }
    }
}

/// Checked in order; the first class with a keyword present wins.
const RULES: &[(ContextType, &[Keyword])] = &[
    (
        ContextType::Humor,
        &[
            Stem("funny"),
            Stem("laugh"),
            Word("lol"),
            Word("lmao"),
            Stem("joke"),
            Word("hilarious"),
        ],
    ),
    (
        ContextType::Vibe,
        &[
            Stem("outfit"),
            Stem("style"),
            Stem("energy"),
            Stem("vibe"),
            Stem("aesthetic"),
        ],
    ),
    (
        ContextType::Emotion,
        &[
            Stem("tired"),
            Stem("excited"),
            Stem("feeling"),
            Word("sad"),
            Word("happy"),
            Word("angry"),
            Word("stressed"),
        ],
    ),
];

pub fn detect_context(text: &str) -> ContextType {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect();
    RULES
        .iter()
        .find(|(_, keywords)| {
            keywords
                .iter()
                .any(|k| words.iter().any(|w| k.matches(w)))
        })
        .map(|(context, _)| *context)
        .unwrap_or(ContextType::Status)
}
