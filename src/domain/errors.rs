//! Domain errors for the Faultline investigation engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while orchestrating an investigation.
///
/// Degraded conditions (unavailable retrieval, malformed model output, loop
/// detection) are *not* errors; they travel as
/// [`TurnCondition`](crate::domain::models::TurnCondition) values on the plan.
/// Only failures the caller must act on live here.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Case not found: {0}")]
    CaseNotFound(Uuid),

    #[error("Hypothesis not found: {0}")]
    HypothesisNotFound(Uuid),

    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition { from: String, to: String },

    #[error("Invalid hypothesis transition from {from} to {to}")]
    InvalidHypothesisTransition { from: String, to: String },

    #[error("Turn for case {case_id} timed out after {timeout_ms}ms; no state was committed")]
    TurnTimedOut { case_id: Uuid, timeout_ms: u64 },

    #[error("Retrieval provider unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Reasoning model invocation failed: {0}")]
    ModelInvocationFailed(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },
}

impl DomainError {
    /// Whether the caller may simply retry the same turn.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TurnTimedOut { .. } | Self::ConcurrencyConflict { .. }
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
