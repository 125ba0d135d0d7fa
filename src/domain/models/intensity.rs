//! Intensity (adaptive reasoning effort) domain model.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::phase::InvestigationPhase;

/// Declared reasoning-effort level for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityLevel {
    #[default]
    Light,
    Medium,
    Full,
}

impl IntensityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Medium => "medium",
            Self::Full => "full",
        }
    }

    /// What the turn executor is allowed to spend at this level.
    pub fn profile(&self) -> IntensityProfile {
        match self {
            Self::Light => IntensityProfile {
                retrieval_candidates: 5,
                tool_calls_permitted: false,
                max_model_calls: 1,
                context_turns: 10,
            },
            Self::Medium => IntensityProfile {
                retrieval_candidates: 10,
                tool_calls_permitted: true,
                max_model_calls: 2,
                context_turns: 20,
            },
            Self::Full => IntensityProfile {
                retrieval_candidates: 25,
                tool_calls_permitted: true,
                max_model_calls: 4,
                context_turns: 40,
            },
        }
    }
}

impl fmt::Display for IntensityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declarative spending limits for an intensity level. Enforcement belongs to
/// the turn executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensityProfile {
    /// Retrieval candidates to consider
    pub retrieval_candidates: usize,
    /// Whether external tool calls are permitted
    pub tool_calls_permitted: bool,
    /// Model calls allowed for the turn
    pub max_model_calls: u32,
    /// Prior turns worth of context to assemble
    pub context_turns: usize,
}

/// Case signals the intensity decision is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensitySignals {
    pub phase: InvestigationPhase,
    /// Hypotheses rejected since the last validation
    pub failed_hypotheses: u32,
    /// Turns spent in the current phase
    pub phase_dwell_turns: u32,
    /// Distinct evidence references seen in the case
    pub evidence_volume: u64,
    pub loop_detected: bool,
}

/// Why a level above `Light` was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IntensityReason {
    PhaseDwell { turns: u32 },
    FailedHypotheses { count: u32 },
    LargeEvidenceVolume { volume: u64, threshold: u64 },
    LoopDetected,
}

/// Outcome of the intensity controller for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensityDecision {
    pub level: IntensityLevel,
    pub signals: IntensitySignals,
    pub reasons: Vec<IntensityReason>,
    pub profile: IntensityProfile,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_grow_with_level() {
        let light = IntensityLevel::Light.profile();
        let full = IntensityLevel::Full.profile();
        assert!(!light.tool_calls_permitted);
        assert!(full.tool_calls_permitted);
        assert!(full.retrieval_candidates > light.retrieval_candidates);
        assert!(IntensityLevel::Full > IntensityLevel::Medium);
    }
}
