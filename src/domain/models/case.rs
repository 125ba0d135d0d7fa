//! Case domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::conclusion::WorkingConclusion;
use super::hypothesis::Hypothesis;
use super::phase::PhaseState;
use super::turn::{CaseId, Turn, TurnId};

/// One troubleshooting investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    /// Unique identifier
    pub id: CaseId,
    /// Short human-readable title
    pub title: String,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When the last turn was committed
    pub updated_at: DateTime<Utc>,
    /// Version for optimistic locking, bumped on every committed turn
    pub version: u64,
}

impl Case {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

/// Everything the coordinator reads about a case at the start of a turn.
///
/// This is a read-only copy; mutations are staged on clones and committed
/// together through [`CaseStore::commit_turn`](crate::domain::ports::CaseStore::commit_turn).
#[derive(Debug, Clone)]
pub struct CaseSnapshot {
    pub case: Case,
    pub turns: Vec<Turn>,
    pub hypotheses: Vec<Hypothesis>,
    pub conclusion: Option<WorkingConclusion>,
    pub phase: PhaseState,
}

impl CaseSnapshot {
    /// Ordinal of the most recent turn, or [`TurnId::ORIGIN`] for an empty case.
    pub fn last_turn(&self) -> TurnId {
        self.turns
            .iter()
            .map(|t| t.ordinal)
            .max()
            .unwrap_or(TurnId::ORIGIN)
    }
}
