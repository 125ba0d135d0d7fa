use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Case, CaseId, CaseSnapshot, Hypothesis, PhaseState, PhaseTransition, Turn, TurnId,
    WorkingConclusion,
};

/// Everything a completed turn writes, applied atomically.
#[derive(Debug, Clone)]
pub struct TurnCommit {
    pub case_id: CaseId,
    /// Case version the turn was computed against
    pub expected_version: u64,
    /// New turns in ordinal order (the submitted turn, then any assistant turn)
    pub turns: Vec<Turn>,
    /// Hypotheses created or changed during the turn
    pub hypotheses: Vec<Hypothesis>,
    /// The new current conclusion; the previous one moves to history
    pub conclusion: WorkingConclusion,
    /// Phase state after the turn
    pub phase: PhaseState,
    /// Transitions taken during the turn
    pub transitions: Vec<PhaseTransition>,
    pub committed_at: DateTime<Utc>,
}

/// Repository port for case persistence
///
/// Every operation is scoped by case id. Turns are append-only and
/// hypotheses are never deleted.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Create a case with its initial phase state
    async fn create_case(&self, case: &Case, phase: &PhaseState) -> DomainResult<()>;

    /// Get a case by ID
    async fn get_case(&self, id: CaseId) -> DomainResult<Option<Case>>;

    /// List all cases, most recently updated first
    async fn list_cases(&self) -> DomainResult<Vec<Case>>;

    /// Load everything needed to process a turn, or `None` for an unknown case
    async fn load_snapshot(&self, id: CaseId) -> DomainResult<Option<CaseSnapshot>>;

    /// Append a single turn outside of a full turn commit.
    ///
    /// # Errors
    /// Returns `ValidationFailed` if the ordinal does not directly follow the
    /// last turn, `CaseNotFound` for an unknown case.
    async fn append_turn(&self, turn: &Turn) -> DomainResult<()>;

    /// Turns with an ordinal strictly greater than `after`, in ordinal order
    async fn list_turns_since(&self, case_id: CaseId, after: TurnId) -> DomainResult<Vec<Turn>>;

    /// All hypotheses of a case, including rejected ones, oldest first
    async fn list_hypotheses(&self, case_id: CaseId) -> DomainResult<Vec<Hypothesis>>;

    /// Every conclusion ever generated for a case, oldest first
    async fn conclusion_history(&self, case_id: CaseId) -> DomainResult<Vec<WorkingConclusion>>;

    /// Every phase transition of a case, oldest first
    async fn list_transitions(&self, case_id: CaseId) -> DomainResult<Vec<PhaseTransition>>;

    /// Apply a turn atomically and return the new case version.
    ///
    /// # Errors
    /// Returns `ConcurrencyConflict` if the case version no longer matches
    /// `expected_version`; nothing is written in that case.
    async fn commit_turn(&self, commit: TurnCommit) -> DomainResult<u64>;
}
