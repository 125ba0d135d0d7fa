//! Intensity controller: declares the reasoning budget for a turn.
//!
//! The level is recomputed from scratch every turn and never sticks.

use std::collections::HashSet;

use crate::domain::models::{
    EvidenceRef, Hypothesis, IntensityConfig, IntensityDecision, IntensityLevel, IntensityReason,
    IntensitySignals, Turn,
};

/// Escalation thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntensityThresholds {
    /// Turns in one phase above which effort rises to medium
    pub dwell_turns: u32,
    /// Evidence volume above which effort rises to full
    pub large_case_threshold: u64,
}

impl Default for IntensityThresholds {
    fn default() -> Self {
        Self {
            dwell_turns: 2,
            large_case_threshold: 50,
        }
    }
}

impl From<&IntensityConfig> for IntensityThresholds {
    fn from(config: &IntensityConfig) -> Self {
        Self {
            dwell_turns: config.dwell_turns,
            large_case_threshold: config.large_case_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntensityController {
    thresholds: IntensityThresholds,
}

impl IntensityController {
    pub fn new(thresholds: IntensityThresholds) -> Self {
        Self { thresholds }
    }

    /// Decide the level for a turn.
    ///
    /// `Full` on two or more failed hypotheses, a large case or a detected
    /// loop; otherwise `Medium` on a long phase dwell or any failed
    /// hypothesis; otherwise `Light`.
    pub fn decide(&self, signals: IntensitySignals) -> IntensityDecision {
        let mut full = Vec::new();
        let mut medium = Vec::new();

        if signals.failed_hypotheses >= 2 {
            full.push(IntensityReason::FailedHypotheses {
                count: signals.failed_hypotheses,
            });
        } else if signals.failed_hypotheses >= 1 {
            medium.push(IntensityReason::FailedHypotheses {
                count: signals.failed_hypotheses,
            });
        }
        if signals.evidence_volume > self.thresholds.large_case_threshold {
            full.push(IntensityReason::LargeEvidenceVolume {
                volume: signals.evidence_volume,
                threshold: self.thresholds.large_case_threshold,
            });
        }
        if signals.loop_detected {
            full.push(IntensityReason::LoopDetected);
        }
        if signals.phase_dwell_turns > self.thresholds.dwell_turns {
            medium.push(IntensityReason::PhaseDwell {
                turns: signals.phase_dwell_turns,
            });
        }

        let level = if !full.is_empty() {
            IntensityLevel::Full
        } else if !medium.is_empty() {
            IntensityLevel::Medium
        } else {
            IntensityLevel::Light
        };

        let mut reasons = full;
        reasons.extend(medium);

        IntensityDecision {
            level,
            signals,
            reasons,
            profile: level.profile(),
        }
    }
}

/// Distinct evidence references across the turn log and hypothesis evidence.
pub fn evidence_volume<'a>(
    turns: impl IntoIterator<Item = &'a Turn>,
    hypotheses: &[Hypothesis],
) -> u64 {
    let mut seen: HashSet<&EvidenceRef> = HashSet::new();
    for turn in turns {
        seen.extend(turn.evidence.iter());
    }
    for hypothesis in hypotheses {
        seen.extend(hypothesis.all_evidence().map(|e| &e.reference));
    }
    seen.len() as u64
}
