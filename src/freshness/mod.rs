//! Freshness-aware candidate selection for slang output.
//! Candidates are scored against a catalog of slang terms annotated with
//! currency data (status, last seen, 30-day frequencies, age), plus a
//! context heuristic for one vibe idiom.

pub mod context;
pub mod registry;
pub mod reranker;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use context::{detect_context, ContextType};
pub use registry::{CatalogRegistry, SlangTerm, TermRegistry, TermStatus};
pub use reranker::{
    freshness_score, CandidateScore, FreshnessReranker, RerankOutcome, RerankerConfig,
    TranslationCandidate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessMode {
    Disabled,
    Latest,
}

/// Decision record of one rerank, kept with the cache entry for audit and
/// refresh replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessMetadata {
    pub mode: FreshnessMode,
    /// Union of blocked terms seen across every candidate.
    pub blocked_terms: BTreeSet<String>,
    pub chosen_term: Option<String>,
    /// Freshness boost of the winning candidate.
    pub freshness_score: f64,
    pub context_type: ContextType,
}
