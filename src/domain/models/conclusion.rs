//! Working conclusion domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::hypothesis::HypothesisId;
use super::turn::{EvidenceRef, TurnId};

/// Confidence at or above which a conclusion is `High`.
pub const HIGH_CONFIDENCE: f64 = 0.75;

/// Confidence at or above which a conclusion is `Medium`.
pub const MEDIUM_CONFIDENCE: f64 = 0.4;

/// Coarse confidence of a working conclusion.
///
/// Tiers rather than a raw float, to avoid false precision in what is shown
/// to users and used for loop-back decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    #[default]
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= HIGH_CONFIDENCE {
            Self::High
        } else if confidence >= MEDIUM_CONFIDENCE {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    /// Number of tiers lost going from `previous` to `self` (0 if none).
    pub fn drop_from(&self, previous: Self) -> u8 {
        previous.rank().saturating_sub(self.rank())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current best-understanding synthesis for a case.
///
/// Exactly one conclusion is current per case; earlier ones stay in the
/// store's append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingConclusion {
    /// Synthesized conclusion text
    pub text: String,
    /// Coarse confidence
    pub confidence_tier: ConfidenceTier,
    /// The hypothesis the conclusion is built on, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leading_hypothesis: Option<HypothesisId>,
    /// Evidence backing the conclusion
    #[serde(default)]
    pub supporting_evidence: Vec<EvidenceRef>,
    /// Suggested next investigation steps
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// Understood problem statement, carried forward across turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_statement: Option<String>,
    /// Turn the conclusion was generated for
    pub turn: TurnId,
    /// When generated
    pub generated_at: DateTime<Utc>,
}

impl WorkingConclusion {
    /// Whether the conclusion shows the problem is understood: a problem
    /// statement exists or a live candidate cause is leading.
    pub fn problem_understood(&self) -> bool {
        self.problem_statement
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
            || self.leading_hypothesis.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(ConfidenceTier::from_confidence(0.0), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_confidence(0.39), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_confidence(0.4), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_confidence(0.749), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_confidence(0.75), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_confidence(1.0), ConfidenceTier::High);
    }

    #[test]
    fn test_tier_drop() {
        assert_eq!(ConfidenceTier::Low.drop_from(ConfidenceTier::High), 2);
        assert_eq!(ConfidenceTier::Medium.drop_from(ConfidenceTier::High), 1);
        assert_eq!(ConfidenceTier::High.drop_from(ConfidenceTier::Low), 0);
    }
}
