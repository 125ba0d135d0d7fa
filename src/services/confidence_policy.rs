//! Confidence policies for hypotheses.
//!
//! A policy maps a hypothesis' attached evidence to a confidence in
//! [0.0, 1.0]. Policies must be deterministic and monotone: adding
//! supporting evidence never lowers confidence, adding contradicting
//! evidence never raises it.

use serde::{Deserialize, Serialize};

use crate::domain::models::{Evidence, Hypothesis, HypothesisConfig};

/// Outcome of assessing a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    pub confidence: f64,
    /// Weighted sum of supporting evidence
    pub supporting_weight: f64,
    /// Weighted sum of contradicting evidence
    pub contradicting_weight: f64,
}

impl ConfidenceAssessment {
    /// How far contradicting evidence outweighs supporting evidence.
    pub fn contradiction_surplus(&self) -> f64 {
        self.contradicting_weight - self.supporting_weight
    }
}

/// Pluggable confidence weighting.
pub trait ConfidencePolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn assess(&self, hypothesis: &Hypothesis) -> ConfidenceAssessment;
}

/// Default policy: evidence weighted by recency, against a fixed prior.
///
/// Each item weighs `1 + recency_weight * ln(1 + turn)`, so evidence from
/// later turns counts slightly more. Confidence is
/// `S / (S + C + prior_weight)` where `S` and `C` are the summed supporting
/// and contradicting weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecencyWeightedPolicy {
    pub recency_weight: f64,
    pub prior_weight: f64,
}

impl Default for RecencyWeightedPolicy {
    fn default() -> Self {
        Self {
            recency_weight: 0.25,
            prior_weight: 1.0,
        }
    }
}

impl From<&HypothesisConfig> for RecencyWeightedPolicy {
    fn from(config: &HypothesisConfig) -> Self {
        Self {
            recency_weight: config.recency_weight.max(0.0),
            prior_weight: config.prior_weight.max(0.0),
        }
    }
}

impl RecencyWeightedPolicy {
    pub fn weight(&self, evidence: &Evidence) -> f64 {
        1.0 + self.recency_weight * (1.0 + evidence.turn.value() as f64).ln()
    }

    fn total(&self, evidence: &[Evidence]) -> f64 {
        evidence.iter().map(|e| self.weight(e)).sum()
    }
}

impl ConfidencePolicy for RecencyWeightedPolicy {
    fn name(&self) -> &'static str {
        "recency_weighted"
    }

    fn assess(&self, hypothesis: &Hypothesis) -> ConfidenceAssessment {
        let supporting_weight = self.total(&hypothesis.supporting);
        let contradicting_weight = self.total(&hypothesis.contradicting);
        let denominator = supporting_weight + contradicting_weight + self.prior_weight;
        let confidence = if denominator > 0.0 {
            (supporting_weight / denominator).clamp(0.0, 1.0)
        } else {
            0.0
        };

        ConfidenceAssessment {
            confidence,
            supporting_weight,
            contradicting_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EvidenceRef, EvidenceStance, TurnId};
    use chrono::Utc;

    fn evidence(stance: EvidenceStance, turn: u64) -> Evidence {
        Evidence::new(EvidenceRef::new(format!("ref-{turn}")), stance, TurnId(turn))
    }

    #[test]
    fn test_no_evidence_is_zero() {
        let h = Hypothesis::new("disk full", TurnId(1), Utc::now());
        let assessment = RecencyWeightedPolicy::default().assess(&h);
        assert!((assessment.confidence - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_support_raises_and_contradiction_lowers() {
        let policy = RecencyWeightedPolicy::default();
        let mut h = Hypothesis::new("disk full", TurnId(1), Utc::now());

        h.supporting.push(evidence(EvidenceStance::Supporting, 2));
        let one = policy.assess(&h).confidence;
        h.supporting.push(evidence(EvidenceStance::Supporting, 3));
        let two = policy.assess(&h).confidence;
        assert!(two > one);

        h.contradicting.push(evidence(EvidenceStance::Contradicting, 4));
        let contradicted = policy.assess(&h).confidence;
        assert!(contradicted < two);
    }

    #[test]
    fn test_newer_evidence_weighs_more() {
        let policy = RecencyWeightedPolicy::default();
        assert!(
            policy.weight(&evidence(EvidenceStance::Supporting, 10))
                > policy.weight(&evidence(EvidenceStance::Supporting, 1))
        );
    }

    #[test]
    fn test_three_supports_reach_validation_threshold() {
        let policy = RecencyWeightedPolicy::default();
        let mut h = Hypothesis::new("disk full", TurnId(1), Utc::now());
        for turn in 2..=4 {
            h.supporting.push(evidence(EvidenceStance::Supporting, turn));
        }
        assert!(policy.assess(&h).confidence >= 0.75);
    }
}
