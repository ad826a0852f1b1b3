//! Slang term catalog loading and matching.
//! Loads versioned term records from JSON and finds the terms (or aliases)
//! that appear as whole words in a text.

use std::path::Path;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RegistryError;

const BUNDLED_CATALOG: &str = include_str!("../../data/slang_terms.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermStatus {
    Current,
    Fading,
    Deprecated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlangTerm {
    pub term: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub status: TermStatus,
    pub last_seen: NaiveDate,
    pub source_count_30d: u32,
    pub trend_hits_30d: u32,
    pub age_months: u32,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub notes: String,
}

/// Read-only access to term currency data.
pub trait TermRegistry: Send + Sync {
    fn version(&self) -> u32;
    fn terms(&self) -> &[SlangTerm];
    /// Terms whose name or an alias occurs in `text`, in catalog order.
    fn find_in(&self, text: &str) -> Vec<&SlangTerm>;
}

/// On-disk catalog format.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    version: u32,
    terms: Vec<SlangTerm>,
}

pub struct CatalogRegistry {
    version: u32,
    terms: Vec<SlangTerm>,
    matchers: Vec<Regex>,
}

impl CatalogRegistry {
    /// The catalog shipped with the crate.
    pub fn bundled() -> Result<Self, RegistryError> {
        Self::from_json(BUNDLED_CATALOG)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&content)?;
        info!(
            path = %path.display(),
            version = registry.version,
            terms = registry.terms.len(),
            "term catalog loaded"
        );
        Ok(registry)
    }

    pub fn from_json(content: &str) -> Result<Self, RegistryError> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Self::new(file.version, file.terms)
    }

    /// No terms; every candidate scores on provider confidence alone.
    pub fn empty() -> Self {
        Self {
            version: 0,
            terms: Vec::new(),
            matchers: Vec::new(),
        }
    }

    pub fn new(version: u32, terms: Vec<SlangTerm>) -> Result<Self, RegistryError> {
        let matchers = terms
            .iter()
            .map(term_matcher)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            version,
            terms,
            matchers,
        })
    }
}

impl TermRegistry for CatalogRegistry {
    fn version(&self) -> u32 {
        self.version
    }

    fn terms(&self) -> &[SlangTerm] {
        &self.terms
    }

    fn find_in(&self, text: &str) -> Vec<&SlangTerm> {
        self.terms
            .iter()
            .zip(&self.matchers)
            .filter(|(_, matcher)| matcher.is_match(text))
            .map(|(term, _)| term)
            .collect()
    }
}

/// Case-insensitive whole-word alternation over the term and its aliases.
fn term_matcher(term: &SlangTerm) -> Result<Regex, regex::Error> {
    let alternatives: Vec<String> = std::iter::once(&term.term)
        .chain(&term.aliases)
        .map(|s| regex::escape(s.trim()))
        .collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "version": 3,
        "terms": [
            {"term": "rizz", "aliases": ["rizzler"], "status": "current",
             "last_seen": "2025-01-10", "source_count_30d": 40, "trend_hits_30d": 90, "age_months": 24},
            {"term": "on fleek", "status": "deprecated",
             "last_seen": "2019-05-01", "source_count_30d": 0, "trend_hits_30d": 1, "age_months": 120}
        ]
    }"#;

    #[test]
    fn loads_fixture() {
        let registry = CatalogRegistry::from_json(FIXTURE).unwrap();
        assert_eq!(registry.version(), 3);
        assert_eq!(registry.terms().len(), 2);
        assert_eq!(registry.terms()[1].status, TermStatus::Deprecated);
    }

    #[test]
    fn matches_whole_words_and_aliases() {
        let registry = CatalogRegistry::from_json(FIXTURE).unwrap();
        let found: Vec<_> = registry
            .find_in("Eyebrows ON FLEEK, total rizzler")
            .iter()
            .map(|t| t.term.as_str())
            .collect();
        assert_eq!(found, vec!["rizz", "on fleek"]);
        assert!(registry.find_in("grizzly bear").is_empty());
    }

    #[test]
    fn bundled_catalog_parses() {
        let registry = CatalogRegistry::bundled().unwrap();
        assert!(registry.version() >= 1);
        for status in [TermStatus::Current, TermStatus::Fading, TermStatus::Deprecated] {
            assert!(registry.terms().iter().any(|t| t.status == status));
        }
    }

    #[test]
    fn load_from_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            CatalogRegistry::load_from_file(&path),
            Err(RegistryError::Parse(_))
        ));
        assert!(matches!(
            CatalogRegistry::load_from_file(&dir.path().join("missing.json")),
            Err(RegistryError::Io(_))
        ));
    }
}
