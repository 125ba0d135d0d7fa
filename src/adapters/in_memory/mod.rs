//! In-memory case store.
//!
//! Backs tests and scripted replays. Honours the same contract as
//! the SQLite store, including the version check on commit.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Case, CaseId, CaseSnapshot, Hypothesis, PhaseState, PhaseTransition, Turn, TurnId,
    WorkingConclusion,
};
use crate::domain::ports::{CaseStore, TurnCommit};

#[derive(Debug, Clone)]
struct CaseRecord {
    case: Case,
    turns: Vec<Turn>,
    hypotheses: Vec<Hypothesis>,
    conclusions: Vec<WorkingConclusion>,
    phase: PhaseState,
    transitions: Vec<PhaseTransition>,
}

impl CaseRecord {
    fn last_turn(&self) -> TurnId {
        self.turns.last().map_or(TurnId::ORIGIN, |t| t.ordinal)
    }

    fn upsert_hypothesis(&mut self, hypothesis: Hypothesis) {
        match self.hypotheses.iter_mut().find(|h| h.id == hypothesis.id) {
            Some(existing) => *existing = hypothesis,
            None => self.hypotheses.push(hypothesis),
        }
    }
}

/// Case store held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCaseStore {
    cases: RwLock<HashMap<CaseId, CaseRecord>>,
}

impl InMemoryCaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Check that `turns` continue the log directly after `last`.
fn check_ordinals(case_id: CaseId, last: TurnId, turns: &[Turn]) -> DomainResult<()> {
    let mut expected = last.next();
    for turn in turns {
        if turn.case_id != case_id {
            return Err(DomainError::ValidationFailed(format!(
                "turn {} belongs to case {}, not {case_id}",
                turn.ordinal, turn.case_id
            )));
        }
        if turn.ordinal != expected {
            return Err(DomainError::ValidationFailed(format!(
                "turn ordinal {} does not follow {}",
                turn.ordinal,
                TurnId(expected.0 - 1)
            )));
        }
        expected = expected.next();
    }
    Ok(())
}

#[async_trait]
impl CaseStore for InMemoryCaseStore {
    async fn create_case(&self, case: &Case, phase: &PhaseState) -> DomainResult<()> {
        let mut cases = self.cases.write().await;
        if cases.contains_key(&case.id) {
            return Err(DomainError::ValidationFailed(format!(
                "case {} already exists",
                case.id
            )));
        }
        cases.insert(
            case.id,
            CaseRecord {
                case: case.clone(),
                turns: Vec::new(),
                hypotheses: Vec::new(),
                conclusions: Vec::new(),
                phase: phase.clone(),
                transitions: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_case(&self, id: CaseId) -> DomainResult<Option<Case>> {
        Ok(self.cases.read().await.get(&id).map(|r| r.case.clone()))
    }

    async fn list_cases(&self) -> DomainResult<Vec<Case>> {
        let cases = self.cases.read().await;
        let mut result: Vec<Case> = cases.values().map(|r| r.case.clone()).collect();
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn load_snapshot(&self, id: CaseId) -> DomainResult<Option<CaseSnapshot>> {
        let cases = self.cases.read().await;
        Ok(cases.get(&id).map(|r| CaseSnapshot {
            case: r.case.clone(),
            turns: r.turns.clone(),
            hypotheses: r.hypotheses.clone(),
            conclusion: r.conclusions.last().cloned(),
            phase: r.phase.clone(),
        }))
    }

    async fn append_turn(&self, turn: &Turn) -> DomainResult<()> {
        let mut cases = self.cases.write().await;
        let record = cases
            .get_mut(&turn.case_id)
            .ok_or(DomainError::CaseNotFound(turn.case_id))?;
        check_ordinals(turn.case_id, record.last_turn(), std::slice::from_ref(turn))?;
        record.turns.push(turn.clone());
        record.case.version += 1;
        record.case.updated_at = turn.timestamp;
        Ok(())
    }

    async fn list_turns_since(&self, case_id: CaseId, after: TurnId) -> DomainResult<Vec<Turn>> {
        let cases = self.cases.read().await;
        let record = cases.get(&case_id).ok_or(DomainError::CaseNotFound(case_id))?;
        Ok(record
            .turns
            .iter()
            .filter(|t| t.ordinal > after)
            .cloned()
            .collect())
    }

    async fn list_hypotheses(&self, case_id: CaseId) -> DomainResult<Vec<Hypothesis>> {
        let cases = self.cases.read().await;
        let record = cases.get(&case_id).ok_or(DomainError::CaseNotFound(case_id))?;
        Ok(record.hypotheses.clone())
    }

    async fn conclusion_history(&self, case_id: CaseId) -> DomainResult<Vec<WorkingConclusion>> {
        let cases = self.cases.read().await;
        let record = cases.get(&case_id).ok_or(DomainError::CaseNotFound(case_id))?;
        Ok(record.conclusions.clone())
    }

    async fn list_transitions(&self, case_id: CaseId) -> DomainResult<Vec<PhaseTransition>> {
        let cases = self.cases.read().await;
        let record = cases.get(&case_id).ok_or(DomainError::CaseNotFound(case_id))?;
        Ok(record.transitions.clone())
    }

    async fn commit_turn(&self, commit: TurnCommit) -> DomainResult<u64> {
        let mut cases = self.cases.write().await;
        let record = cases
            .get_mut(&commit.case_id)
            .ok_or(DomainError::CaseNotFound(commit.case_id))?;

        if record.case.version != commit.expected_version {
            return Err(DomainError::ConcurrencyConflict {
                entity: "case".to_string(),
                id: commit.case_id.to_string(),
            });
        }
        check_ordinals(commit.case_id, record.last_turn(), &commit.turns)?;

        record.turns.extend(commit.turns);
        for hypothesis in commit.hypotheses {
            record.upsert_hypothesis(hypothesis);
        }
        record.conclusions.push(commit.conclusion);
        record.phase = commit.phase;
        record.transitions.extend(commit.transitions);
        record.case.version += 1;
        record.case.updated_at = commit.committed_at;

        Ok(record.case.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ConfidenceTier, NewTurn};
    use chrono::Utc;

    fn conclusion(turn: TurnId) -> WorkingConclusion {
        WorkingConclusion {
            text: "No candidate cause has been identified yet.".to_string(),
            confidence_tier: ConfidenceTier::Low,
            leading_hypothesis: None,
            supporting_evidence: Vec::new(),
            next_steps: Vec::new(),
            problem_statement: None,
            turn,
            generated_at: Utc::now(),
        }
    }

    async fn seeded() -> (InMemoryCaseStore, Case) {
        let store = InMemoryCaseStore::new();
        let case = Case::new("printer offline");
        store.create_case(&case, &PhaseState::default()).await.unwrap();
        (store, case)
    }

    #[tokio::test]
    async fn test_append_turn_enforces_ordinals() {
        let (store, case) = seeded().await;
        let first = NewTurn::user("it shows offline").into_turn(case.id, TurnId(1), Utc::now());
        store.append_turn(&first).await.unwrap();

        let gap = NewTurn::user("skipped").into_turn(case.id, TurnId(3), Utc::now());
        let err = store.append_turn(&gap).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));

        let since = store.list_turns_since(case.id, TurnId::ORIGIN).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(store.get_case(case.id).await.unwrap().unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_append_to_unknown_case() {
        let store = InMemoryCaseStore::new();
        let turn = NewTurn::user("hello").into_turn(uuid::Uuid::new_v4(), TurnId(1), Utc::now());
        assert!(matches!(
            store.append_turn(&turn).await,
            Err(DomainError::CaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_checks_version() {
        let (store, case) = seeded().await;
        let commit = TurnCommit {
            case_id: case.id,
            expected_version: case.version,
            turns: vec![NewTurn::user("hello").into_turn(case.id, TurnId(1), Utc::now())],
            hypotheses: vec![Hypothesis::new("driver crash", TurnId(1), Utc::now())],
            conclusion: conclusion(TurnId(1)),
            phase: PhaseState::default(),
            transitions: Vec::new(),
            committed_at: Utc::now(),
        };

        let version = store.commit_turn(commit.clone()).await.unwrap();
        assert_eq!(version, case.version + 1);

        let stale = store.commit_turn(commit).await.unwrap_err();
        assert!(matches!(stale, DomainError::ConcurrencyConflict { .. }));

        let snapshot = store.load_snapshot(case.id).await.unwrap().unwrap();
        assert_eq!(snapshot.turns.len(), 1);
        assert_eq!(snapshot.hypotheses.len(), 1);
        assert_eq!(store.conclusion_history(case.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_updates_hypothesis_in_place() {
        let (store, case) = seeded().await;
        let mut hypothesis = Hypothesis::new("toner empty", TurnId(1), Utc::now());
        let mut commit = TurnCommit {
            case_id: case.id,
            expected_version: case.version,
            turns: vec![NewTurn::user("hello").into_turn(case.id, TurnId(1), Utc::now())],
            hypotheses: vec![hypothesis.clone()],
            conclusion: conclusion(TurnId(1)),
            phase: PhaseState::default(),
            transitions: Vec::new(),
            committed_at: Utc::now(),
        };
        let version = store.commit_turn(commit.clone()).await.unwrap();

        hypothesis.confidence = 0.5;
        commit.expected_version = version;
        commit.turns = vec![NewTurn::user("again").into_turn(case.id, TurnId(2), Utc::now())];
        commit.hypotheses = vec![hypothesis.clone()];
        commit.conclusion = conclusion(TurnId(2));
        store.commit_turn(commit).await.unwrap();

        let hypotheses = store.list_hypotheses(case.id).await.unwrap();
        assert_eq!(hypotheses, vec![hypothesis]);
        assert_eq!(store.conclusion_history(case.id).await.unwrap().len(), 2);
    }
}
