//! Working conclusion generator.
//!
//! Pure synthesis from a hypothesis snapshot. The same input always yields
//! the same conclusion, so regenerating for an unchanged snapshot is a no-op.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::domain::models::{
    ConfidenceTier, EvidenceRef, Hypothesis, HypothesisStatus, TurnId, WorkingConclusion,
};

/// Everything a conclusion is generated from.
#[derive(Debug, Clone, Copy)]
pub struct ConclusionInput<'a> {
    pub hypotheses: &'a [Hypothesis],
    /// Evidence references seen in the case so far
    pub evidence: &'a [EvidenceRef],
    /// Understood problem statement, if any
    pub problem_statement: Option<&'a str>,
    pub turn: TurnId,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConclusionGenerator;

impl ConclusionGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Synthesize the current conclusion. Always produces one.
    ///
    /// The tier comes from the highest-confidence non-rejected hypothesis;
    /// without one it is `Low` and the text says no candidate cause has been
    /// identified yet.
    pub fn generate(&self, input: ConclusionInput<'_>) -> WorkingConclusion {
        let problem_statement = input
            .problem_statement
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let leading = leading_hypothesis(input.hypotheses);
        let active = input.hypotheses.iter().filter(|h| !h.is_rejected()).count();
        let ruled_out = input.hypotheses.len() - active;

        let mut text = String::new();
        if let Some(problem) = &problem_statement {
            text.push_str(&format!("Problem: {problem}. "));
        }

        let mut next_steps = Vec::new();
        let (confidence_tier, supporting_evidence) = match leading {
            None => {
                text.push_str("No candidate cause has been identified yet.");
                if ruled_out > 0 {
                    text.push_str(&format!(" {ruled_out} candidate(s) ruled out so far."));
                    next_steps.push(format!(
                        "Consider causes other than the {ruled_out} already ruled out"
                    ));
                } else if problem_statement.is_some() {
                    next_steps.push("Propose candidate causes for the problem".to_string());
                } else {
                    next_steps.push(
                        "Describe the symptoms, when they started and what changed recently"
                            .to_string(),
                    );
                }
                (ConfidenceTier::Low, Vec::new())
            }
            Some(h) => {
                let tier = ConfidenceTier::from_confidence(h.confidence);
                match h.status() {
                    HypothesisStatus::Validated => {
                        text.push_str(&format!(
                            "Validated cause: {} (confidence {:.2}).",
                            h.statement, h.confidence
                        ));
                        match &h.proposed_solution {
                            Some(solution) => {
                                text.push_str(&format!(" Proposed solution: {solution}."));
                                next_steps.push(format!(
                                    "Apply and verify the proposed solution: {solution}"
                                ));
                            }
                            None => next_steps.push(format!("Propose a fix for: {}", h.statement)),
                        }
                    }
                    status => {
                        text.push_str(&format!(
                            "Leading hypothesis: {} ({}, confidence {:.2}).",
                            h.statement, status, h.confidence
                        ));
                        next_steps.push(format!(
                            "Gather evidence to confirm or rule out: {}",
                            h.statement
                        ));
                    }
                }
                if active > 1 {
                    text.push_str(&format!(
                        " {} other candidate(s) under consideration.",
                        active - 1
                    ));
                }
                if ruled_out > 0 {
                    text.push_str(&format!(" {ruled_out} ruled out."));
                }
                (tier, dedup(h.supporting.iter().map(|e| e.reference.clone())))
            }
        };

        let linked: HashSet<&EvidenceRef> = input
            .hypotheses
            .iter()
            .flat_map(|h| h.all_evidence().map(|e| &e.reference))
            .collect();
        let unlinked: Vec<String> = dedup(input.evidence.iter().filter(|r| !linked.contains(r)).cloned())
            .into_iter()
            .map(|r| r.as_str().to_string())
            .collect();
        if !unlinked.is_empty() {
            next_steps.push(format!(
                "Review evidence not yet linked to a hypothesis: {}",
                unlinked.join(", ")
            ));
        }

        WorkingConclusion {
            text,
            confidence_tier,
            leading_hypothesis: leading.map(|h| h.id),
            supporting_evidence,
            next_steps,
            problem_statement,
            turn: input.turn,
            generated_at: input.generated_at,
        }
    }
}

/// Highest-confidence non-rejected hypothesis; validated beats unvalidated on
/// equal confidence, then the earlier proposal wins.
fn leading_hypothesis(hypotheses: &[Hypothesis]) -> Option<&Hypothesis> {
    hypotheses
        .iter()
        .filter(|h| !h.is_rejected())
        .fold(None, |best: Option<&Hypothesis>, h| match best {
            Some(b) if b.confidence > h.confidence => Some(b),
            Some(b) if b.confidence == h.confidence && (b.is_validated() || !h.is_validated()) => {
                Some(b)
            }
            _ => Some(h),
        })
}

fn dedup(references: impl Iterator<Item = EvidenceRef>) -> Vec<EvidenceRef> {
    let mut seen = HashSet::new();
    references.filter(|r| seen.insert(r.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Evidence, EvidenceStance, HypothesisState, RejectionReason};

    fn input<'a>(hypotheses: &'a [Hypothesis], evidence: &'a [EvidenceRef], now: DateTime<Utc>) -> ConclusionInput<'a> {
        ConclusionInput {
            hypotheses,
            evidence,
            problem_statement: None,
            turn: TurnId(3),
            generated_at: now,
        }
    }

    fn hypothesis(statement: &str, confidence: f64) -> Hypothesis {
        let mut h = Hypothesis::new(statement, TurnId(1), Utc::now());
        h.confidence = confidence;
        h.state = HypothesisState::Testing;
        h
    }

    #[test]
    fn test_no_hypotheses_is_low() {
        let conclusion = ConclusionGenerator::new().generate(input(&[], &[], Utc::now()));
        assert_eq!(conclusion.confidence_tier, ConfidenceTier::Low);
        assert!(conclusion.text.contains("No candidate cause has been identified yet"));
        assert!(conclusion.leading_hypothesis.is_none());
        assert!(!conclusion.problem_understood());
        assert_eq!(conclusion.next_steps.len(), 1);
    }

    #[test]
    fn test_tier_follows_best_live_hypothesis() {
        let mut rejected = hypothesis("power loss", 0.9);
        rejected.state = HypothesisState::Rejected {
            at_turn: TurnId(2),
            reason: RejectionReason::UserDisconfirmed,
        };
        let live = hypothesis("thermal throttling", 0.5);
        let hypotheses = vec![rejected, live.clone()];

        let conclusion = ConclusionGenerator::new().generate(input(&hypotheses, &[], Utc::now()));
        assert_eq!(conclusion.confidence_tier, ConfidenceTier::Medium);
        assert_eq!(conclusion.leading_hypothesis, Some(live.id));
        assert!(conclusion.text.contains("1 ruled out"));
    }

    #[test]
    fn test_validated_with_solution() {
        let mut h = hypothesis("expired certificate", 0.8);
        h.state = HypothesisState::Validated { at_turn: TurnId(3) };
        h.proposed_solution = Some("renew the certificate".to_string());
        h.supporting.push(Evidence::new(EvidenceRef::new("openssl-out"), EvidenceStance::Supporting, TurnId(2)));

        let hypotheses = [h];
        let conclusion = ConclusionGenerator::new().generate(input(&hypotheses, &[], Utc::now()));
        assert_eq!(conclusion.confidence_tier, ConfidenceTier::High);
        assert!(conclusion.text.contains("renew the certificate"));
        assert_eq!(conclusion.supporting_evidence, vec![EvidenceRef::new("openssl-out")]);
    }

    #[test]
    fn test_unlinked_evidence_becomes_next_step() {
        let evidence = [EvidenceRef::new("dmesg.txt"), EvidenceRef::new("dmesg.txt")];
        let conclusion = ConclusionGenerator::new().generate(input(&[], &evidence, Utc::now()));
        assert!(conclusion
            .next_steps
            .iter()
            .any(|s| s == "Review evidence not yet linked to a hypothesis: dmesg.txt"));
    }

    #[test]
    fn test_problem_statement_marks_understood() {
        let now = Utc::now();
        let mut i = input(&[], &[], now);
        i.problem_statement = Some("  nightly backup fails  ");
        let conclusion = ConclusionGenerator::new().generate(i);
        assert_eq!(conclusion.problem_statement.as_deref(), Some("nightly backup fails"));
        assert!(conclusion.problem_understood());
    }

    #[test]
    fn test_generate_is_idempotent() {
        let hypotheses = vec![hypothesis("a", 0.3), hypothesis("b", 0.6)];
        let evidence = [EvidenceRef::new("x")];
        let now = Utc::now();
        let generator = ConclusionGenerator::new();
        assert_eq!(
            generator.generate(input(&hypotheses, &evidence, now)),
            generator.generate(input(&hypotheses, &evidence, now))
        );
    }
}
