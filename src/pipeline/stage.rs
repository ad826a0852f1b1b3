//! Pipeline stages: Validate → CheckDirectMapping → CheckCache → Normalize →
//! TargetDispatch → Repair → CacheWrite → Return, with early exits to Return.

use serde::Serialize;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Stage {
    Validate,
    CheckDirectMapping,
    CheckCache,
    Normalize,
    TargetDispatch,
    Repair,
    CacheWrite,
    Return,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Validate => write!(f, "Validate"),
            Stage::CheckDirectMapping => write!(f, "CheckDirectMapping"),
            Stage::CheckCache => write!(f, "CheckCache"),
            Stage::Normalize => write!(f, "Normalize"),
            Stage::TargetDispatch => write!(f, "TargetDispatch"),
            Stage::Repair => write!(f, "Repair"),
            Stage::CacheWrite => write!(f, "CacheWrite"),
            Stage::Return => write!(f, "Return"),
        }
    }
}

impl Stage {
    /// Returns whether moving from `self` to `next` is valid.
    pub fn can_transition_to(self, next: Stage) -> bool {
        matches!(
            (self, next),
            (Stage::Validate, Stage::CheckDirectMapping)
                | (Stage::CheckDirectMapping, Stage::CheckCache)
                | (Stage::CheckDirectMapping, Stage::Return) // direct mapping hit
                | (Stage::CheckCache, Stage::Normalize)
                | (Stage::CheckCache, Stage::Return) // cache hit
                | (Stage::Normalize, Stage::TargetDispatch)
                | (Stage::TargetDispatch, Stage::Repair)
                | (Stage::Repair, Stage::CacheWrite)
                | (Stage::Repair, Stage::Return) // bypass or degraded
                | (Stage::CacheWrite, Stage::Return)
        )
    }
}

/// Path one request walked through the stages.
#[derive(Debug, Clone)]
pub struct StageTrace {
    current: Stage,
    path: Vec<Stage>,
}

impl StageTrace {
    pub fn new() -> Self {
        Self::starting_at(Stage::Validate)
    }

    /// Background refreshes start from CheckCache, the stage that scheduled them.
    pub fn starting_at(stage: Stage) -> Self {
        Self {
            current: stage,
            path: vec![stage],
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Advance to `next`. Invalid transitions are logged and still recorded
    /// so the trace shows what actually ran.
    pub fn advance(&mut self, next: Stage) {
        if !self.current.can_transition_to(next) {
            warn!(from = %self.current, to = %next, "unexpected stage transition");
        }
        trace!(from = %self.current, to = %next, "stage_transition");
        self.current = next;
        self.path.push(next);
    }

    pub fn into_path(self) -> Vec<Stage> {
        self.path
    }
}

impl Default for StageTrace {
    fn default() -> Self {
        Self::new()
    }
}
