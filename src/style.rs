//! Style identifiers and their provider instruction templates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A text register / language variant the bridge can translate between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    Standard,
    TrendSlang,
    #[serde(rename = "casual-peer-style")]
    CasualPeer,
    Formal,
    BritishSlang,
    Spanish,
    French,
}

impl Style {
    pub const ALL: [Style; 7] = [
        Style::Standard,
        Style::TrendSlang,
        Style::CasualPeer,
        Style::Formal,
        Style::BritishSlang,
        Style::Spanish,
        Style::French,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Style::Standard => "standard",
            Style::TrendSlang => "trend-slang",
            Style::CasualPeer => "casual-peer-style",
            Style::Formal => "formal",
            Style::BritishSlang => "british-slang",
            Style::Spanish => "spanish",
            Style::French => "french",
        }
    }

    /// Whether translating into this style asks the provider for several
    /// candidates and reranks them.
    pub fn wants_candidates(self) -> bool {
        matches!(self, Style::TrendSlang)
    }

    /// Human-readable description used inside instruction templates.
    pub fn description(self) -> &'static str {
        match self {
            Style::Standard => "plain, neutral standard English",
            Style::TrendSlang => "current internet and Gen-Z slang",
            Style::CasualPeer => "relaxed, friendly speech between peers",
            Style::Formal => "a formal, professional register",
            Style::BritishSlang => "informal British slang",
            Style::Spanish => "natural conversational Spanish",
            Style::French => "natural conversational French",
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Style {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|style| style.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownStyle(s.to_string()))
    }
}
