//! Candidate scoring: provider confidence, plus a freshness boost for current
//! terms, minus penalties for deprecated terms and for the "it's giving"
//! idiom used where it does not belong.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use regex::Regex;
use tracing::debug;

use super::context::{detect_context, ContextType};
use super::registry::{SlangTerm, TermRegistry, TermStatus};
use super::{FreshnessMetadata, FreshnessMode};

const RECENCY_WINDOW_DAYS: f64 = 30.0;
const SOURCE_COUNT_NORM: f64 = 50.0;
const TREND_HITS_NORM: f64 = 100.0;
const AGE_CAP_MONTHS: f64 = 60.0;

const W_RECENCY: f64 = 0.3;
const W_SOURCES: f64 = 0.25;
const W_TRENDS: f64 = 0.25;
const W_AGE: f64 = 0.2;

const VIBE_IDIOM: &str = "it's giving";
const HUMOR_WORDS: &[&str] = &["funny", "hilarious", "lol", "lmao", "joke", "jokes", "laugh", "laughing", "comedy"];

/// One generated translation with the provider's confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationCandidate {
    pub text: String,
    pub model_score: f64,
}

impl TranslationCandidate {
    pub fn new(text: impl Into<String>, model_score: f64) -> Self {
        Self {
            text: text.into(),
            model_score,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RerankerConfig {
    /// Weight of a current term's freshness score.
    pub alpha: f64,
    pub deprecated_penalty: f64,
    pub wrong_context_penalty: f64,
    pub humor_combo_penalty: f64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            deprecated_penalty: 1.0,
            wrong_context_penalty: 2.0,
            humor_combo_penalty: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub index: usize,
    pub score: f64,
    pub freshness_boost: f64,
    pub blocked: Vec<String>,
    pub chosen_term: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub text: String,
    pub index: usize,
    pub metadata: FreshnessMetadata,
    /// Empty when the candidates were not scored.
    pub scores: Vec<CandidateScore>,
}

/// Weighted recency, frequency and age signal for one term, as of `today`.
/// Ranges over roughly [-0.2, 0.8].
pub fn freshness_score(term: &SlangTerm, today: NaiveDate) -> f64 {
    let days_since = (today - term.last_seen).num_days().max(0) as f64;
    let recency = (1.0 - days_since / RECENCY_WINDOW_DAYS).max(0.0);
    let sources = (term.source_count_30d as f64 / SOURCE_COUNT_NORM).min(1.0);
    let trends = (term.trend_hits_30d as f64 / TREND_HITS_NORM).min(1.0);
    let age = (term.age_months as f64 / AGE_CAP_MONTHS).min(1.0);
    W_RECENCY * recency + W_SOURCES * sources + W_TRENDS * trends - W_AGE * age
}

pub struct FreshnessReranker {
    config: RerankerConfig,
    idiom: Regex,
    humor: Regex,
}

impl Default for FreshnessReranker {
    fn default() -> Self {
        Self::new(RerankerConfig::default())
    }
}

impl FreshnessReranker {
    pub fn new(config: RerankerConfig) -> Self {
        Self {
            config,
            idiom: Regex::new(r"(?i)\bit['’]?s giving\b").expect("static idiom pattern"),
            humor: Regex::new(&format!(r"(?i)\b(?:{})\b", HUMOR_WORDS.join("|")))
                .expect("static humor pattern"),
        }
    }

    /// Pick the best candidate. Returns `None` only for an empty list.
    pub fn rerank(
        &self,
        candidates: &[TranslationCandidate],
        use_latest_slang: bool,
        input_text: &str,
        registry: &dyn TermRegistry,
        today: NaiveDate,
    ) -> Option<RerankOutcome> {
        let first = candidates.first()?;
        let context_type = detect_context(input_text);

        if !use_latest_slang || candidates.len() == 1 {
            return Some(RerankOutcome {
                text: first.text.clone(),
                index: 0,
                metadata: FreshnessMetadata {
                    mode: if use_latest_slang { FreshnessMode::Latest } else { FreshnessMode::Disabled },
                    blocked_terms: BTreeSet::new(),
                    chosen_term: None,
                    freshness_score: 0.0,
                    context_type,
                },
                scores: Vec::new(),
            });
        }

        let scores: Vec<CandidateScore> = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                self.score_candidate(index, candidate, context_type, registry, today)
            })
            .collect();

        let clean: Vec<&CandidateScore> = scores.iter().filter(|s| s.blocked.is_empty()).collect();
        let pool: Vec<&CandidateScore> = if clean.is_empty() {
            scores.iter().collect()
        } else {
            clean
        };

        // Strictly greater replaces, so earlier candidates win ties.
        let mut winner = pool[0];
        for candidate in &pool[1..] {
            if candidate.score > winner.score {
                winner = candidate;
            }
        }

        let blocked_terms: BTreeSet<String> = scores
            .iter()
            .flat_map(|s| s.blocked.iter().cloned())
            .collect();

        debug!(
            candidates = candidates.len(),
            winner = winner.index,
            score = winner.score,
            context = %context_type,
            blocked = blocked_terms.len(),
            "rerank complete"
        );

        Some(RerankOutcome {
            text: candidates[winner.index].text.clone(),
            index: winner.index,
            metadata: FreshnessMetadata {
                mode: FreshnessMode::Latest,
                blocked_terms,
                chosen_term: winner.chosen_term.clone(),
                freshness_score: winner.freshness_boost,
                context_type,
            },
            scores,
        })
    }

    pub fn score_candidate(
        &self,
        index: usize,
        candidate: &TranslationCandidate,
        context_type: ContextType,
        registry: &dyn TermRegistry,
        today: NaiveDate,
    ) -> CandidateScore {
        let mut score = candidate.model_score;
        let mut freshness_boost = 0.0;
        let mut blocked = Vec::new();
        let mut best_current: Option<(f64, &str)> = None;

        for term in registry.find_in(&candidate.text) {
            match term.status {
                TermStatus::Deprecated => {
                    score -= self.config.deprecated_penalty;
                    blocked.push(term.term.clone());
                }
                TermStatus::Current => {
                    let fresh = freshness_score(term, today);
                    freshness_boost += self.config.alpha * fresh;
                    if best_current.map_or(true, |(best, _)| fresh > best) {
                        best_current = Some((fresh, term.term.as_str()));
                    }
                }
                TermStatus::Fading => {}
            }
        }

        if self.idiom.is_match(&candidate.text) {
            if self.humor.is_match(&candidate.text) {
                score -= self.config.humor_combo_penalty;
                blocked.push(format!("{VIBE_IDIOM} (humor combination)"));
            } else if context_type != ContextType::Vibe {
                score -= self.config.wrong_context_penalty;
                blocked.push(format!("{VIBE_IDIOM} (wrong context)"));
            }
        }

        CandidateScore {
            index,
            score: score + freshness_boost,
            freshness_boost,
            blocked,
            chosen_term: best_current.map(|(_, term)| term.to_string()),
        }
    }
}
