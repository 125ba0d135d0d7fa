//! SQLite implementation of the CaseStore.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use super::{parse_datetime, parse_json_or_default, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Case, CaseId, CaseSnapshot, Hypothesis, HypothesisState, InvestigationPhase, PhaseState,
    PhaseTransition, TransitionKind, Turn, TurnId, TurnRole, WorkingConclusion,
};
use crate::domain::ports::{CaseStore, TurnCommit};

#[derive(Clone)]
pub struct SqliteCaseStore {
    pool: SqlitePool,
}

impl SqliteCaseStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn require_case(&self, id: CaseId) -> DomainResult<()> {
        let mut conn = self.pool.acquire().await?;
        case_version(&mut conn, id).await?.ok_or(DomainError::CaseNotFound(id))?;
        Ok(())
    }
}

/// Fixed-width timestamps so text ordering matches time ordering.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn transition_kind_str(kind: TransitionKind) -> &'static str {
    match kind {
        TransitionKind::Advance => "advance",
        TransitionKind::LoopBack => "loop_back",
    }
}

fn parse_phase(s: &str) -> DomainResult<InvestigationPhase> {
    InvestigationPhase::from_str(s)
        .ok_or_else(|| DomainError::SerializationError(format!("Invalid phase: {s}")))
}

async fn case_version(conn: &mut SqliteConnection, id: CaseId) -> DomainResult<Option<u64>> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM cases WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(|(v,)| v as u64))
}

async fn last_ordinal(conn: &mut SqliteConnection, id: CaseId) -> DomainResult<TurnId> {
    let (max,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(ordinal), 0) FROM turns WHERE case_id = ?")
        .bind(id.to_string())
        .fetch_one(&mut *conn)
        .await?;
    Ok(TurnId(max as u64))
}

fn check_ordinals(case_id: CaseId, last: TurnId, turns: &[Turn]) -> DomainResult<()> {
    let mut previous = last;
    for turn in turns {
        if turn.case_id != case_id {
            return Err(DomainError::ValidationFailed(format!(
                "turn {} belongs to case {}, not {case_id}",
                turn.ordinal, turn.case_id
            )));
        }
        if turn.ordinal != previous.next() {
            return Err(DomainError::ValidationFailed(format!(
                "turn ordinal {} does not follow {previous}",
                turn.ordinal
            )));
        }
        previous = turn.ordinal;
    }
    Ok(())
}

async fn insert_turn(conn: &mut SqliteConnection, turn: &Turn) -> DomainResult<()> {
    let evidence = serde_json::to_string(&turn.evidence)?;
    sqlx::query(
        "INSERT INTO turns (case_id, ordinal, role, content, evidence, timestamp) VALUES (?, ?, ?, ?, ?, ?)"
    )
    .bind(turn.case_id.to_string())
    .bind(turn.ordinal.value() as i64)
    .bind(turn.role.as_str())
    .bind(&turn.content)
    .bind(evidence)
    .bind(timestamp(&turn.timestamp))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn upsert_hypothesis(conn: &mut SqliteConnection, case_id: CaseId, h: &Hypothesis) -> DomainResult<()> {
    sqlx::query(
        r#"INSERT INTO hypotheses (id, case_id, statement, rationale, status, state, confidence,
               supporting, contradicting, inconclusive, proposed_solution, proposed_at_turn,
               version, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
           ON CONFLICT(id) DO UPDATE SET
               statement = excluded.statement,
               rationale = excluded.rationale,
               status = excluded.status,
               state = excluded.state,
               confidence = excluded.confidence,
               supporting = excluded.supporting,
               contradicting = excluded.contradicting,
               inconclusive = excluded.inconclusive,
               proposed_solution = excluded.proposed_solution,
               version = excluded.version,
               updated_at = excluded.updated_at"#
    )
    .bind(h.id.to_string())
    .bind(case_id.to_string())
    .bind(&h.statement)
    .bind(&h.rationale)
    .bind(h.status().as_str())
    .bind(serde_json::to_string(&h.state)?)
    .bind(h.confidence)
    .bind(serde_json::to_string(&h.supporting)?)
    .bind(serde_json::to_string(&h.contradicting)?)
    .bind(serde_json::to_string(&h.inconclusive)?)
    .bind(&h.proposed_solution)
    .bind(h.proposed_at_turn.value() as i64)
    .bind(h.version as i64)
    .bind(timestamp(&h.created_at))
    .bind(timestamp(&h.updated_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_turns(conn: &mut SqliteConnection, case_id: CaseId, after: TurnId) -> DomainResult<Vec<Turn>> {
    let rows: Vec<TurnRow> = sqlx::query_as(
        "SELECT * FROM turns WHERE case_id = ? AND ordinal > ? ORDER BY ordinal ASC"
    )
    .bind(case_id.to_string())
    .bind(after.value() as i64)
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Turn::try_from).collect()
}

async fn fetch_hypotheses(conn: &mut SqliteConnection, case_id: CaseId) -> DomainResult<Vec<Hypothesis>> {
    let rows: Vec<HypothesisRow> = sqlx::query_as(
        "SELECT * FROM hypotheses WHERE case_id = ? ORDER BY created_at ASC, rowid ASC"
    )
    .bind(case_id.to_string())
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(Hypothesis::try_from).collect()
}

#[async_trait]
impl CaseStore for SqliteCaseStore {
    async fn create_case(&self, case: &Case, phase: &PhaseState) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO cases (id, title, version, phase_state, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(case.id.to_string())
        .bind(&case.title)
        .bind(case.version as i64)
        .bind(serde_json::to_string(phase)?)
        .bind(timestamp(&case.created_at))
        .bind(timestamp(&case.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_case(&self, id: CaseId) -> DomainResult<Option<Case>> {
        let row: Option<CaseRow> = sqlx::query_as("SELECT * FROM cases WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.into_parts().map(|(case, _)| case)).transpose()
    }

    async fn list_cases(&self) -> DomainResult<Vec<Case>> {
        let rows: Vec<CaseRow> = sqlx::query_as("SELECT * FROM cases ORDER BY updated_at DESC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| r.into_parts().map(|(case, _)| case)).collect()
    }

    async fn load_snapshot(&self, id: CaseId) -> DomainResult<Option<CaseSnapshot>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<CaseRow> = sqlx::query_as("SELECT * FROM cases WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let (case, phase) = row.into_parts()?;

        let turns = fetch_turns(&mut tx, id, TurnId::ORIGIN).await?;
        let hypotheses = fetch_hypotheses(&mut tx, id).await?;
        let conclusion: Option<ConclusionRow> = sqlx::query_as(
            "SELECT body FROM conclusions WHERE case_id = ? ORDER BY seq DESC LIMIT 1"
        )
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(CaseSnapshot {
            case,
            turns,
            hypotheses,
            conclusion: conclusion.map(WorkingConclusion::try_from).transpose()?,
            phase,
        }))
    }

    async fn append_turn(&self, turn: &Turn) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        case_version(&mut tx, turn.case_id)
            .await?
            .ok_or(DomainError::CaseNotFound(turn.case_id))?;
        let last = last_ordinal(&mut tx, turn.case_id).await?;
        check_ordinals(turn.case_id, last, std::slice::from_ref(turn))?;

        insert_turn(&mut tx, turn).await?;
        sqlx::query("UPDATE cases SET version = version + 1, updated_at = ? WHERE id = ?")
            .bind(timestamp(&turn.timestamp))
            .bind(turn.case_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_turns_since(&self, case_id: CaseId, after: TurnId) -> DomainResult<Vec<Turn>> {
        self.require_case(case_id).await?;
        let mut conn = self.pool.acquire().await?;
        fetch_turns(&mut conn, case_id, after).await
    }

    async fn list_hypotheses(&self, case_id: CaseId) -> DomainResult<Vec<Hypothesis>> {
        self.require_case(case_id).await?;
        let mut conn = self.pool.acquire().await?;
        fetch_hypotheses(&mut conn, case_id).await
    }

    async fn conclusion_history(&self, case_id: CaseId) -> DomainResult<Vec<WorkingConclusion>> {
        self.require_case(case_id).await?;
        let rows: Vec<ConclusionRow> = sqlx::query_as(
            "SELECT body FROM conclusions WHERE case_id = ? ORDER BY seq ASC"
        )
        .bind(case_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WorkingConclusion::try_from).collect()
    }

    async fn list_transitions(&self, case_id: CaseId) -> DomainResult<Vec<PhaseTransition>> {
        self.require_case(case_id).await?;
        let rows: Vec<TransitionRow> = sqlx::query_as(
            "SELECT from_phase, to_phase, kind, turn, reason FROM phase_transitions WHERE case_id = ? ORDER BY seq ASC"
        )
        .bind(case_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PhaseTransition::try_from).collect()
    }

    async fn commit_turn(&self, commit: TurnCommit) -> DomainResult<u64> {
        let case_id = commit.case_id;
        let mut tx = self.pool.begin().await?;

        let version = case_version(&mut tx, case_id)
            .await?
            .ok_or(DomainError::CaseNotFound(case_id))?;
        if version != commit.expected_version {
            tx.rollback().await?;
            return Err(DomainError::ConcurrencyConflict {
                entity: "case".to_string(),
                id: case_id.to_string(),
            });
        }
        let last = last_ordinal(&mut tx, case_id).await?;
        check_ordinals(case_id, last, &commit.turns)?;

        for turn in &commit.turns {
            insert_turn(&mut tx, turn).await?;
        }
        for hypothesis in &commit.hypotheses {
            upsert_hypothesis(&mut tx, case_id, hypothesis).await?;
        }

        sqlx::query(
            "INSERT INTO conclusions (case_id, turn, confidence_tier, body, generated_at) VALUES (?, ?, ?, ?, ?)"
        )
        .bind(case_id.to_string())
        .bind(commit.conclusion.turn.value() as i64)
        .bind(commit.conclusion.confidence_tier.as_str())
        .bind(serde_json::to_string(&commit.conclusion)?)
        .bind(timestamp(&commit.conclusion.generated_at))
        .execute(&mut *tx)
        .await?;

        for transition in &commit.transitions {
            sqlx::query(
                "INSERT INTO phase_transitions (case_id, from_phase, to_phase, kind, turn, reason) VALUES (?, ?, ?, ?, ?, ?)"
            )
            .bind(case_id.to_string())
            .bind(transition.from.as_str())
            .bind(transition.to.as_str())
            .bind(transition_kind_str(transition.kind))
            .bind(transition.turn.value() as i64)
            .bind(&transition.reason)
            .execute(&mut *tx)
            .await?;
        }

        let result = sqlx::query(
            "UPDATE cases SET version = version + 1, phase_state = ?, updated_at = ? WHERE id = ? AND version = ?"
        )
        .bind(serde_json::to_string(&commit.phase)?)
        .bind(timestamp(&commit.committed_at))
        .bind(case_id.to_string())
        .bind(commit.expected_version as i64)
        .execute(&mut *tx)
        .await?;

        // Another writer got in between the version read and this update
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DomainError::ConcurrencyConflict {
                entity: "case".to_string(),
                id: case_id.to_string(),
            });
        }

        tx.commit().await?;
        Ok(commit.expected_version + 1)
    }
}

#[derive(sqlx::FromRow)]
struct CaseRow {
    id: String,
    title: String,
    version: i64,
    phase_state: String,
    created_at: String,
    updated_at: String,
}

impl CaseRow {
    fn into_parts(self) -> DomainResult<(Case, PhaseState)> {
        let phase: PhaseState = serde_json::from_str(&self.phase_state)?;
        let case = Case {
            id: parse_uuid(&self.id)?,
            title: self.title,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            version: self.version as u64,
        };
        Ok((case, phase))
    }
}

#[derive(sqlx::FromRow)]
struct TurnRow {
    case_id: String,
    ordinal: i64,
    role: String,
    content: String,
    evidence: Option<String>,
    timestamp: String,
}

impl TryFrom<TurnRow> for Turn {
    type Error = DomainError;

    fn try_from(row: TurnRow) -> Result<Self, Self::Error> {
        let role = TurnRole::from_str(&row.role)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid role: {}", row.role)))?;

        Ok(Turn {
            case_id: parse_uuid(&row.case_id)?,
            ordinal: TurnId(row.ordinal as u64),
            role,
            content: row.content,
            timestamp: parse_datetime(&row.timestamp)?,
            evidence: parse_json_or_default(row.evidence)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HypothesisRow {
    id: String,
    statement: String,
    rationale: Option<String>,
    state: String,
    confidence: f64,
    supporting: Option<String>,
    contradicting: Option<String>,
    inconclusive: Option<String>,
    proposed_solution: Option<String>,
    proposed_at_turn: i64,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<HypothesisRow> for Hypothesis {
    type Error = DomainError;

    fn try_from(row: HypothesisRow) -> Result<Self, Self::Error> {
        let state: HypothesisState = serde_json::from_str(&row.state)?;

        Ok(Hypothesis {
            id: parse_uuid(&row.id)?,
            statement: row.statement,
            rationale: row.rationale,
            state,
            confidence: row.confidence,
            supporting: parse_json_or_default(row.supporting)?,
            contradicting: parse_json_or_default(row.contradicting)?,
            inconclusive: parse_json_or_default(row.inconclusive)?,
            proposed_solution: row.proposed_solution,
            proposed_at_turn: TurnId(row.proposed_at_turn as u64),
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            version: row.version as u64,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ConclusionRow {
    body: String,
}

impl TryFrom<ConclusionRow> for WorkingConclusion {
    type Error = DomainError;

    fn try_from(row: ConclusionRow) -> Result<Self, Self::Error> {
        Ok(serde_json::from_str(&row.body)?)
    }
}

#[derive(sqlx::FromRow)]
struct TransitionRow {
    from_phase: String,
    to_phase: String,
    kind: String,
    turn: i64,
    reason: String,
}

impl TryFrom<TransitionRow> for PhaseTransition {
    type Error = DomainError;

    fn try_from(row: TransitionRow) -> Result<Self, Self::Error> {
        let kind = match row.kind.as_str() {
            "advance" => TransitionKind::Advance,
            "loop_back" => TransitionKind::LoopBack,
            other => {
                return Err(DomainError::SerializationError(format!(
                    "Invalid transition kind: {other}"
                )))
            }
        };

        Ok(PhaseTransition {
            from: parse_phase(&row.from_phase)?,
            to: parse_phase(&row.to_phase)?,
            kind,
            turn: TurnId(row.turn as u64),
            reason: row.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::{
        ConfidenceTier, Evidence, EvidenceRef, EvidenceStance, NewTurn,
    };

    async fn setup() -> SqliteCaseStore {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteCaseStore::new(pool)
    }

    fn conclusion(turn: TurnId, tier: ConfidenceTier) -> WorkingConclusion {
        WorkingConclusion {
            text: "Leading hypothesis: stale DNS cache".to_string(),
            confidence_tier: tier,
            leading_hypothesis: None,
            supporting_evidence: vec![EvidenceRef::new("dig-output.txt")],
            next_steps: vec!["Flush the resolver cache".to_string()],
            problem_statement: Some("intermittent 502s".to_string()),
            turn,
            generated_at: Utc::now(),
        }
    }

    fn commit(case: &Case, version: u64, ordinal: u64, hypotheses: Vec<Hypothesis>) -> TurnCommit {
        let mut phase = PhaseState::default();
        let transition = phase
            .enter(InvestigationPhase::Diagnosing, TurnId(ordinal), "problem understood")
            .unwrap();
        TurnCommit {
            case_id: case.id,
            expected_version: version,
            turns: vec![
                NewTurn::user("502s every few minutes")
                    .with_evidence("nginx-error.log")
                    .into_turn(case.id, TurnId(ordinal), Utc::now()),
                NewTurn::user("Which upstream?")
                    .with_role(TurnRole::Assistant)
                    .into_turn(case.id, TurnId(ordinal + 1), Utc::now()),
            ],
            hypotheses,
            conclusion: conclusion(TurnId(ordinal), ConfidenceTier::Medium),
            phase,
            transitions: vec![transition],
            committed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_case() {
        let store = setup().await;
        let case = Case::new("gateway 502s");
        store.create_case(&case, &PhaseState::default()).await.unwrap();

        let loaded = store.get_case(case.id).await.unwrap().unwrap();
        assert_eq!(loaded, case);
        assert!(store.get_case(uuid::Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_round_trips_snapshot() {
        let store = setup().await;
        let case = Case::new("gateway 502s");
        store.create_case(&case, &PhaseState::default()).await.unwrap();

        let mut hypothesis = Hypothesis::new("stale DNS cache", TurnId(1), Utc::now());
        hypothesis.state = HypothesisState::Testing;
        hypothesis.confidence = 0.42;
        hypothesis.supporting.push(Evidence::new(
            EvidenceRef::new("dig-output.txt"),
            EvidenceStance::Supporting,
            TurnId(1),
        ));

        let version = store
            .commit_turn(commit(&case, case.version, 1, vec![hypothesis.clone()]))
            .await
            .unwrap();
        assert_eq!(version, case.version + 1);

        let snapshot = store.load_snapshot(case.id).await.unwrap().unwrap();
        assert_eq!(snapshot.case.version, version);
        assert_eq!(snapshot.turns.len(), 2);
        assert_eq!(snapshot.turns[0].evidence, vec![EvidenceRef::new("nginx-error.log")]);
        assert_eq!(snapshot.turns[1].role, TurnRole::Assistant);
        assert_eq!(snapshot.hypotheses, vec![hypothesis]);
        assert_eq!(snapshot.phase.current, InvestigationPhase::Diagnosing);
        assert_eq!(snapshot.conclusion.unwrap().confidence_tier, ConfidenceTier::Medium);

        let transitions = store.list_transitions(case.id).await.unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].kind, TransitionKind::Advance);
    }

    #[tokio::test]
    async fn test_stale_commit_writes_nothing() {
        let store = setup().await;
        let case = Case::new("gateway 502s");
        store.create_case(&case, &PhaseState::default()).await.unwrap();
        store.commit_turn(commit(&case, case.version, 1, Vec::new())).await.unwrap();

        let err = store
            .commit_turn(commit(&case, case.version, 3, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));

        assert_eq!(store.list_turns_since(case.id, TurnId::ORIGIN).await.unwrap().len(), 2);
        assert_eq!(store.conclusion_history(case.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gap_in_ordinals_is_rejected_atomically() {
        let store = setup().await;
        let case = Case::new("gateway 502s");
        store.create_case(&case, &PhaseState::default()).await.unwrap();

        let err = store
            .commit_turn(commit(&case, case.version, 2, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
        assert!(store.list_turns_since(case.id, TurnId::ORIGIN).await.unwrap().is_empty());
        assert_eq!(store.get_case(case.id).await.unwrap().unwrap().version, case.version);
    }

    #[tokio::test]
    async fn test_conclusion_history_keeps_every_generation() {
        let store = setup().await;
        let case = Case::new("gateway 502s");
        store.create_case(&case, &PhaseState::default()).await.unwrap();

        let v2 = store.commit_turn(commit(&case, case.version, 1, Vec::new())).await.unwrap();
        let mut second = commit(&case, v2, 3, Vec::new());
        second.conclusion = conclusion(TurnId(3), ConfidenceTier::High);
        second.transitions.clear();
        store.commit_turn(second).await.unwrap();

        let history = store.conclusion_history(case.id).await.unwrap();
        assert_eq!(
            history.iter().map(|c| c.confidence_tier).collect::<Vec<_>>(),
            vec![ConfidenceTier::Medium, ConfidenceTier::High]
        );
        let snapshot = store.load_snapshot(case.id).await.unwrap().unwrap();
        assert_eq!(snapshot.conclusion.unwrap().confidence_tier, ConfidenceTier::High);
    }

    #[tokio::test]
    async fn test_unknown_case_errors() {
        let store = setup().await;
        let id = uuid::Uuid::new_v4();
        assert!(store.load_snapshot(id).await.unwrap().is_none());
        assert!(matches!(
            store.list_hypotheses(id).await,
            Err(DomainError::CaseNotFound(_))
        ));
        let turn = NewTurn::user("hello").into_turn(id, TurnId(1), Utc::now());
        assert!(matches!(
            store.append_turn(&turn).await,
            Err(DomainError::CaseNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_cases_most_recent_first() {
        let store = setup().await;
        let older = Case::new("older");
        let newer = Case::new("newer");
        store.create_case(&older, &PhaseState::default()).await.unwrap();
        store.create_case(&newer, &PhaseState::default()).await.unwrap();

        let turn = NewTurn::user("bump").into_turn(older.id, TurnId(1), Utc::now());
        store.append_turn(&turn).await.unwrap();

        let cases = store.list_cases().await.unwrap();
        assert_eq!(cases[0].id, older.id);
        assert_eq!(cases.len(), 2);
    }
}
