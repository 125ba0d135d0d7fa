//! Hypothesis tracker: extraction from model output and lifecycle updates.
//!
//! Mutations happen on a [`HypothesisLedger`], a staged copy of a case's
//! hypotheses owned by the turn coordinator for the duration of one turn.
//! Nothing here touches the store except [`HypothesisTracker::list`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    CaseId, Evidence, EvidenceRef, EvidenceStance, Hypothesis,
    HypothesisConfig, HypothesisId, HypothesisState, HypothesisStatus, ModelOutput,
    RejectionReason, StructuredPayload, TurnId,
};
use crate::domain::ports::CaseStore;
use crate::services::confidence_policy::ConfidencePolicy;

/// Lifecycle thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerThresholds {
    /// Confidence at which a testing hypothesis is validated
    pub validation_threshold: f64,
    /// Contradiction surplus at which a hypothesis is rejected
    pub dominance_margin: f64,
}

impl Default for TrackerThresholds {
    fn default() -> Self {
        Self {
            validation_threshold: 0.75,
            dominance_margin: 1.0,
        }
    }
}

impl From<&HypothesisConfig> for TrackerThresholds {
    fn from(config: &HypothesisConfig) -> Self {
        Self {
            validation_threshold: config.validation_threshold,
            dominance_margin: config.dominance_margin,
        }
    }
}

/// Evidence claimed by the model against a hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceClaim {
    /// Hypothesis id or statement
    pub hypothesis: String,
    pub stance: EvidenceStance,
    pub reference: EvidenceRef,
    pub note: Option<String>,
}

/// A remediation proposed by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionClaim {
    /// Hypothesis id or statement; the leading hypothesis when absent
    pub hypothesis: Option<String>,
    pub description: String,
}

/// Validated records pulled out of one model output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub problem_statement: Option<String>,
    /// Newly proposed hypotheses, all `Proposed`
    pub hypotheses: Vec<Hypothesis>,
    pub evidence: Vec<EvidenceClaim>,
    /// Hypothesis ids or statements the user ruled out
    pub disconfirmed: Vec<String>,
    pub solution: Option<SolutionClaim>,
    /// Why each dropped entry was dropped
    pub dropped: Vec<String>,
}

/// Result of a single evidence update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Evidence attached; status after the update
    Applied(HypothesisStatus),
    /// The hypothesis is rejected and frozen
    IgnoredRejected,
    /// The same reference with the same stance is already attached
    IgnoredDuplicate,
}

/// What applying an extraction changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    pub proposed: usize,
    /// Proposals matching an already rejected hypothesis
    pub reproposed_rejected: usize,
    pub evidence_applied: usize,
    pub validated: Vec<HypothesisId>,
    pub rejected: Vec<HypothesisId>,
    pub solution_attached: Option<HypothesisId>,
    /// Extraction and resolution failures
    pub dropped: Vec<String>,
}

/// Staged hypotheses of one case.
#[derive(Debug, Clone, Default)]
pub struct HypothesisLedger {
    hypotheses: Vec<Hypothesis>,
    changed: HashSet<HypothesisId>,
}

impl HypothesisLedger {
    pub fn new(hypotheses: Vec<Hypothesis>) -> Self {
        Self {
            hypotheses,
            changed: HashSet::new(),
        }
    }

    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    pub fn get(&self, id: HypothesisId) -> Option<&Hypothesis> {
        self.hypotheses.iter().find(|h| h.id == id)
    }

    fn get_mut(&mut self, id: HypothesisId) -> Option<&mut Hypothesis> {
        self.hypotheses.iter_mut().find(|h| h.id == id)
    }

    fn insert(&mut self, hypothesis: Hypothesis) {
        self.changed.insert(hypothesis.id);
        self.hypotheses.push(hypothesis);
    }

    /// Hypotheses created or mutated since the ledger was built, in ledger order.
    pub fn changed(&self) -> Vec<Hypothesis> {
        self.hypotheses
            .iter()
            .filter(|h| self.changed.contains(&h.id))
            .cloned()
            .collect()
    }

    pub fn into_hypotheses(self) -> Vec<Hypothesis> {
        self.hypotheses
    }

    pub fn active(&self) -> impl Iterator<Item = &Hypothesis> {
        self.hypotheses.iter().filter(|h| !h.is_rejected())
    }

    pub fn rejected(&self) -> impl Iterator<Item = &Hypothesis> {
        self.hypotheses.iter().filter(|h| h.is_rejected())
    }

    /// Resolve an id or statement, preferring live hypotheses.
    pub fn resolve(&self, reference: &str) -> Option<HypothesisId> {
        self.active()
            .find(|h| h.matches_reference(reference))
            .or_else(|| self.rejected().find(|h| h.matches_reference(reference)))
            .map(|h| h.id)
    }

    /// Highest-confidence non-rejected hypothesis; earlier proposals win ties.
    pub fn top_active(&self) -> Option<&Hypothesis> {
        top_by_confidence(self.active())
    }

    /// Highest-confidence validated hypothesis.
    pub fn top_validated(&self) -> Option<&Hypothesis> {
        top_by_confidence(self.hypotheses.iter().filter(|h| h.is_validated()))
    }

    /// Hypotheses rejected after the most recent still-standing validation.
    pub fn failed_count(&self) -> u32 {
        failed_count(&self.hypotheses)
    }
}

fn top_by_confidence<'a>(hypotheses: impl Iterator<Item = &'a Hypothesis>) -> Option<&'a Hypothesis> {
    hypotheses.fold(None, |best: Option<&Hypothesis>, h| match best {
        Some(b) if b.confidence >= h.confidence => Some(b),
        _ => Some(h),
    })
}

/// Hypotheses rejected after the most recent still-standing validation.
pub fn failed_count(hypotheses: &[Hypothesis]) -> u32 {
    let latest_validation = hypotheses.iter().filter_map(Hypothesis::validated_at).max();
    hypotheses
        .iter()
        .filter_map(Hypothesis::rejected_at)
        .filter(|at| latest_validation.map_or(true, |v| *at > v))
        .count() as u32
}

/// Hypothesis lifecycle service.
pub struct HypothesisTracker {
    store: Arc<dyn CaseStore>,
    policy: Arc<dyn ConfidencePolicy>,
    thresholds: TrackerThresholds,
}

impl HypothesisTracker {
    pub fn new(
        store: Arc<dyn CaseStore>,
        policy: Arc<dyn ConfidencePolicy>,
        thresholds: TrackerThresholds,
    ) -> Self {
        Self {
            store,
            policy,
            thresholds,
        }
    }

    pub fn policy(&self) -> &dyn ConfidencePolicy {
        self.policy.as_ref()
    }

    /// All hypotheses of a case, rejected ones included.
    pub async fn list(&self, case_id: CaseId) -> DomainResult<Vec<Hypothesis>> {
        self.store.list_hypotheses(case_id).await
    }

    /// Pull validated records out of a model output.
    ///
    /// Each entry is validated on its own; a malformed entry is dropped and
    /// counted without affecting the rest of the batch.
    pub fn extract(&self, output: &ModelOutput, turn: TurnId, now: DateTime<Utc>) -> Extraction {
        let mut extraction = Extraction::default();

        let payload = match output.structured_payload() {
            StructuredPayload::Absent => return extraction,
            StructuredPayload::Unparseable(e) => {
                extraction.dropped.push(format!("structured output is not valid JSON: {e}"));
                return extraction;
            }
            StructuredPayload::Present(payload) => payload,
        };

        let Value::Object(fields) = payload else {
            extraction.dropped.push("structured output is not a JSON object".to_string());
            return extraction;
        };

        if let Some(value) = fields.get("problem_statement") {
            match value {
                Value::String(s) if !s.trim().is_empty() => {
                    extraction.problem_statement = Some(s.trim().to_string());
                }
                Value::Null => {}
                _ => extraction.dropped.push("problem_statement must be a non-empty string".to_string()),
            }
        }

        for (index, entry) in entries(&fields, "hypotheses", &mut extraction.dropped) {
            match serde_json::from_value::<RawHypothesis>(entry) {
                Ok(raw) if !raw.statement.trim().is_empty() => {
                    let mut hypothesis = Hypothesis::new(raw.statement.trim(), turn, now);
                    if let Some(rationale) = raw.rationale.filter(|r| !r.trim().is_empty()) {
                        hypothesis = hypothesis.with_rationale(rationale.trim());
                    }
                    extraction.hypotheses.push(hypothesis);
                }
                Ok(_) => extraction.dropped.push(format!("hypotheses[{index}]: empty statement")),
                Err(e) => extraction.dropped.push(format!("hypotheses[{index}]: {e}")),
            }
        }

        for (index, entry) in entries(&fields, "evidence", &mut extraction.dropped) {
            match serde_json::from_value::<RawEvidence>(entry) {
                Ok(raw) if raw.hypothesis.trim().is_empty() => {
                    extraction.dropped.push(format!("evidence[{index}]: empty hypothesis reference"));
                }
                Ok(raw) if raw.reference.trim().is_empty() => {
                    extraction.dropped.push(format!("evidence[{index}]: empty evidence reference"));
                }
                Ok(raw) => extraction.evidence.push(EvidenceClaim {
                    hypothesis: raw.hypothesis.trim().to_string(),
                    stance: raw.outcome.into(),
                    reference: EvidenceRef::new(raw.reference.trim()),
                    note: raw.note.filter(|n| !n.trim().is_empty()),
                }),
                Err(e) => extraction.dropped.push(format!("evidence[{index}]: {e}")),
            }
        }

        for (index, entry) in entries(&fields, "disconfirmed", &mut extraction.dropped) {
            match entry {
                Value::String(s) if !s.trim().is_empty() => extraction.disconfirmed.push(s.trim().to_string()),
                _ => extraction
                    .dropped
                    .push(format!("disconfirmed[{index}]: expected a hypothesis id or statement")),
            }
        }

        if let Some(value) = fields.get("solution").filter(|v| !v.is_null()) {
            match serde_json::from_value::<RawSolution>(value.clone()) {
                Ok(raw) if !raw.description.trim().is_empty() => {
                    extraction.solution = Some(SolutionClaim {
                        hypothesis: raw.hypothesis.filter(|h| !h.trim().is_empty()),
                        description: raw.description.trim().to_string(),
                    });
                }
                Ok(_) => extraction.dropped.push("solution: empty description".to_string()),
                Err(e) => extraction.dropped.push(format!("solution: {e}")),
            }
        }

        extraction
    }

    /// Apply an extraction to the ledger: proposals, disconfirmations,
    /// evidence, then the solution.
    pub fn apply(
        &self,
        ledger: &mut HypothesisLedger,
        extraction: Extraction,
        turn: TurnId,
        now: DateTime<Utc>,
    ) -> ApplyReport {
        let mut report = ApplyReport {
            dropped: extraction.dropped,
            ..Default::default()
        };

        for hypothesis in extraction.hypotheses {
            let normalized = hypothesis.normalized_statement();
            if ledger.rejected().any(|h| h.normalized_statement() == normalized) {
                debug!(statement = %hypothesis.statement, "Ignoring re-proposal of rejected hypothesis");
                report.reproposed_rejected += 1;
            } else if ledger.active().any(|h| h.normalized_statement() == normalized) {
                debug!(statement = %hypothesis.statement, "Hypothesis already tracked");
            } else {
                info!(hypothesis_id = %hypothesis.id, statement = %hypothesis.statement, "Hypothesis proposed");
                ledger.insert(hypothesis);
                report.proposed += 1;
            }
        }

        for reference in extraction.disconfirmed {
            match ledger.resolve(&reference) {
                Some(id) => match self.disconfirm(ledger, id, turn, now) {
                    Ok(true) => report.rejected.push(id),
                    Ok(false) => {}
                    Err(e) => report.dropped.push(format!("disconfirmed: {e}")),
                },
                None => report.dropped.push(format!("disconfirmed: unknown hypothesis '{reference}'")),
            }
        }

        for claim in extraction.evidence {
            let Some(id) = ledger.resolve(&claim.hypothesis) else {
                report
                    .dropped
                    .push(format!("evidence: unknown hypothesis '{}'", claim.hypothesis));
                continue;
            };
            let before = ledger.get(id).map(Hypothesis::status);
            let reference = claim.reference.clone();
            let mut evidence = Evidence::new(claim.reference, claim.stance, turn);
            if let Some(note) = claim.note {
                evidence = evidence.with_note(note);
            }
            match self.update(ledger, id, evidence, now) {
                Ok(UpdateOutcome::Applied(status)) => {
                    report.evidence_applied += 1;
                    if Some(status) != before {
                        match status {
                            HypothesisStatus::Validated => report.validated.push(id),
                            HypothesisStatus::Rejected => report.rejected.push(id),
                            _ => {}
                        }
                    }
                }
                Ok(UpdateOutcome::IgnoredRejected) => report.dropped.push(format!(
                    "evidence: hypothesis '{}' is rejected",
                    claim.hypothesis
                )),
                Ok(UpdateOutcome::IgnoredDuplicate) => report.dropped.push(format!(
                    "evidence: '{reference}' already attached to '{}'",
                    claim.hypothesis
                )),
                Err(e) => report.dropped.push(format!("evidence: {e}")),
            }
        }

        if let Some(solution) = extraction.solution {
            match self.attach_solution(ledger, solution.hypothesis.as_deref(), &solution.description, now) {
                Ok(Some(id)) => report.solution_attached = Some(id),
                Ok(None) => report
                    .dropped
                    .push("solution: no live hypothesis to attach it to".to_string()),
                Err(e) => report.dropped.push(format!("solution: {e}")),
            }
        }

        report
    }

    /// Attach evidence to a hypothesis and advance its lifecycle.
    ///
    /// Any evidence moves a proposed hypothesis to testing. The hypothesis is
    /// rejected when contradicting weight exceeds supporting weight by the
    /// dominance margin, and validated when testing, at or above the
    /// validation threshold and free of unresolved contradictions.
    pub fn update(
        &self,
        ledger: &mut HypothesisLedger,
        id: HypothesisId,
        evidence: Evidence,
        now: DateTime<Utc>,
    ) -> DomainResult<UpdateOutcome> {
        let thresholds = self.thresholds;
        let hypothesis = ledger.get_mut(id).ok_or(DomainError::HypothesisNotFound(id))?;

        if hypothesis.is_rejected() {
            debug!(hypothesis_id = %id, "Ignoring evidence for rejected hypothesis");
            return Ok(UpdateOutcome::IgnoredRejected);
        }
        if hypothesis
            .all_evidence()
            .any(|e| e.reference == evidence.reference && e.stance == evidence.stance)
        {
            debug!(hypothesis_id = %id, reference = %evidence.reference, "Ignoring duplicate evidence");
            return Ok(UpdateOutcome::IgnoredDuplicate);
        }

        let turn = evidence.turn;
        match evidence.stance {
            EvidenceStance::Supporting => hypothesis.supporting.push(evidence),
            EvidenceStance::Contradicting => hypothesis.contradicting.push(evidence),
            EvidenceStance::Inconclusive => hypothesis.inconclusive.push(evidence),
        }

        if hypothesis.status() == HypothesisStatus::Proposed {
            hypothesis.transition_to(HypothesisState::Testing, now)?;
        }

        let assessment = self.policy.assess(hypothesis);
        hypothesis.confidence = assessment.confidence;

        if assessment.contradiction_surplus() >= thresholds.dominance_margin {
            hypothesis.transition_to(
                HypothesisState::Rejected {
                    at_turn: turn,
                    reason: RejectionReason::ContradictionDominates,
                },
                now,
            )?;
            info!(hypothesis_id = %id, confidence = hypothesis.confidence, "Hypothesis rejected by contradicting evidence");
        } else if hypothesis.status() == HypothesisStatus::Testing
            && assessment.confidence >= thresholds.validation_threshold
            && !hypothesis.has_unresolved_contradiction()
        {
            hypothesis.transition_to(HypothesisState::Validated { at_turn: turn }, now)?;
            info!(hypothesis_id = %id, confidence = hypothesis.confidence, "Hypothesis validated");
        } else {
            hypothesis.touch(now);
        }

        let status = hypothesis.status();
        ledger.changed.insert(id);
        Ok(UpdateOutcome::Applied(status))
    }

    /// Reject a hypothesis the user ruled out. Returns `false` if it was
    /// already rejected.
    pub fn disconfirm(
        &self,
        ledger: &mut HypothesisLedger,
        id: HypothesisId,
        turn: TurnId,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let hypothesis = ledger.get_mut(id).ok_or(DomainError::HypothesisNotFound(id))?;
        if hypothesis.is_rejected() {
            return Ok(false);
        }
        hypothesis.transition_to(
            HypothesisState::Rejected {
                at_turn: turn,
                reason: RejectionReason::UserDisconfirmed,
            },
            now,
        )?;
        info!(hypothesis_id = %id, "Hypothesis disconfirmed by user");
        ledger.changed.insert(id);
        Ok(true)
    }

    /// Attach a proposed solution to the named hypothesis, or to the leading
    /// one when no target is given: the top validated hypothesis, else the
    /// top live one. Returns `None` if there is nothing to attach to.
    pub fn attach_solution(
        &self,
        ledger: &mut HypothesisLedger,
        target: Option<&str>,
        description: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Option<HypothesisId>> {
        let id = match target {
            Some(reference) => {
                let id = ledger.resolve(reference).ok_or_else(|| {
                    DomainError::ValidationFailed(format!("unknown hypothesis '{reference}'"))
                })?;
                if ledger.get(id).is_some_and(Hypothesis::is_rejected) {
                    return Err(DomainError::ValidationFailed(format!(
                        "hypothesis '{reference}' is rejected"
                    )));
                }
                Some(id)
            }
            None => ledger
                .top_validated()
                .or_else(|| ledger.top_active())
                .map(|h| h.id),
        };

        let Some(id) = id else {
            return Ok(None);
        };
        if let Some(hypothesis) = ledger.get_mut(id) {
            hypothesis.proposed_solution = Some(description.to_string());
            hypothesis.touch(now);
        }
        ledger.changed.insert(id);
        Ok(Some(id))
    }
}

/// Items of an optional array field, reporting a non-array as one dropped entry.
fn entries(
    fields: &serde_json::Map<String, Value>,
    key: &str,
    dropped: &mut Vec<String>,
) -> Vec<(usize, Value)> {
    match fields.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().cloned().enumerate().collect(),
        Some(_) => {
            dropped.push(format!("{key} must be an array"));
            Vec::new()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawHypothesis {
    statement: String,
    #[serde(default)]
    rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawOutcome {
    #[serde(alias = "supporting", alias = "support")]
    Supports,
    #[serde(alias = "contradicting", alias = "contradict")]
    Contradicts,
    Inconclusive,
}

impl From<RawOutcome> for EvidenceStance {
    fn from(outcome: RawOutcome) -> Self {
        match outcome {
            RawOutcome::Supports => Self::Supporting,
            RawOutcome::Contradicts => Self::Contradicting,
            RawOutcome::Inconclusive => Self::Inconclusive,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawEvidence {
    hypothesis: String,
    outcome: RawOutcome,
    reference: String,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSolution {
    #[serde(default)]
    hypothesis: Option<String>,
    description: String,
}
