//! Hypothesis domain model.
//!
//! A hypothesis is a candidate root-cause explanation. Its lifecycle is:
//!
//! ```text
//! proposed ──► testing ──► validated
//!     │           │            │
//!     └───────────┴────────────┴──► rejected
//! ```
//!
//! Rejected hypotheses are terminal and frozen: they keep their evidence and
//! final confidence for audit, and are shown to the model so that falsified
//! explanations are not proposed again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

use super::turn::{EvidenceRef, TurnId};

/// Identifier of a hypothesis.
pub type HypothesisId = Uuid;

/// Flat lifecycle status, used for transition tables and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    Proposed,
    Testing,
    Validated,
    Rejected,
}

impl HypothesisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Testing => "testing",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "proposed" => Some(Self::Proposed),
            "testing" => Some(Self::Testing),
            "validated" => Some(Self::Validated),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> Vec<HypothesisStatus> {
        match self {
            Self::Proposed => vec![Self::Testing, Self::Rejected],
            Self::Testing => vec![Self::Validated, Self::Rejected],
            Self::Validated => vec![Self::Rejected],
            Self::Rejected => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a hypothesis was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Weighted contradicting evidence outweighed supporting evidence.
    ContradictionDominates,
    /// The user explicitly ruled the explanation out.
    UserDisconfirmed,
}

/// Lifecycle state with the data each state carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HypothesisState {
    Proposed,
    Testing,
    Validated { at_turn: TurnId },
    Rejected { at_turn: TurnId, reason: RejectionReason },
}

impl HypothesisState {
    pub fn status(&self) -> HypothesisStatus {
        match self {
            Self::Proposed => HypothesisStatus::Proposed,
            Self::Testing => HypothesisStatus::Testing,
            Self::Validated { .. } => HypothesisStatus::Validated,
            Self::Rejected { .. } => HypothesisStatus::Rejected,
        }
    }
}

/// How a piece of evidence bears on a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStance {
    Supporting,
    Contradicting,
    Inconclusive,
}

/// Evidence attached to a hypothesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// What was observed
    pub reference: EvidenceRef,
    /// Bearing on the hypothesis
    pub stance: EvidenceStance,
    /// Turn during which the evidence was attached
    pub turn: TurnId,
    /// Optional free-text note from the model or user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Evidence {
    pub fn new(reference: EvidenceRef, stance: EvidenceStance, turn: TurnId) -> Self {
        Self {
            reference,
            stance,
            turn,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A candidate root-cause explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Unique identifier
    pub id: HypothesisId,
    /// The explanation itself
    pub statement: String,
    /// Why the model proposed it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    /// Lifecycle state
    pub state: HypothesisState,
    /// Confidence in [0.0, 1.0]
    pub confidence: f64,
    /// Supporting evidence, in attachment order
    #[serde(default)]
    pub supporting: Vec<Evidence>,
    /// Contradicting evidence, in attachment order
    #[serde(default)]
    pub contradicting: Vec<Evidence>,
    /// Evidence attached without a verdict yet
    #[serde(default)]
    pub inconclusive: Vec<Evidence>,
    /// Remediation proposed for this cause, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_solution: Option<String>,
    /// Turn during which the hypothesis was first proposed
    pub proposed_at_turn: TurnId,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When updated
    pub updated_at: DateTime<Utc>,
    /// Version, bumped on every mutation
    pub version: u64,
}

impl Hypothesis {
    pub fn new(statement: impl Into<String>, turn: TurnId, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            statement: statement.into(),
            rationale: None,
            state: HypothesisState::Proposed,
            confidence: 0.0,
            supporting: Vec::new(),
            contradicting: Vec::new(),
            inconclusive: Vec::new(),
            proposed_solution: None,
            proposed_at_turn: turn,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn status(&self) -> HypothesisStatus {
        self.state.status()
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.state, HypothesisState::Rejected { .. })
    }

    pub fn is_validated(&self) -> bool {
        matches!(self.state, HypothesisState::Validated { .. })
    }

    pub fn has_supporting_evidence(&self) -> bool {
        !self.supporting.is_empty()
    }

    /// Turn at which the hypothesis was rejected, if it was.
    pub fn rejected_at(&self) -> Option<TurnId> {
        match self.state {
            HypothesisState::Rejected { at_turn, .. } => Some(at_turn),
            _ => None,
        }
    }

    /// Turn at which the hypothesis was validated, if it currently is.
    pub fn validated_at(&self) -> Option<TurnId> {
        match self.state {
            HypothesisState::Validated { at_turn } => Some(at_turn),
            _ => None,
        }
    }

    /// All attached evidence in stance order.
    pub fn all_evidence(&self) -> impl Iterator<Item = &Evidence> {
        self.supporting
            .iter()
            .chain(self.contradicting.iter())
            .chain(self.inconclusive.iter())
    }

    /// Whether some contradicting evidence has not been answered by newer
    /// supporting evidence.
    pub fn has_unresolved_contradiction(&self) -> bool {
        let latest_support = self.supporting.iter().map(|e| e.turn).max();
        self.contradicting.iter().any(|c| match latest_support {
            Some(support_turn) => c.turn >= support_turn,
            None => true,
        })
    }

    /// Statement normalized for duplicate detection.
    pub fn normalized_statement(&self) -> String {
        normalize_statement(&self.statement)
    }

    /// Whether a model-provided reference (an id or a statement) names this
    /// hypothesis.
    pub fn matches_reference(&self, reference: &str) -> bool {
        let reference = reference.trim();
        if let Ok(id) = Uuid::parse_str(reference) {
            return id == self.id;
        }
        normalize_statement(reference) == self.normalized_statement()
    }

    /// Move to a new lifecycle state, enforcing the transition table.
    pub fn transition_to(&mut self, state: HypothesisState, now: DateTime<Utc>) -> DomainResult<()> {
        let from = self.status();
        let to = state.status();
        if !from.can_transition_to(to) {
            return Err(DomainError::InvalidHypothesisTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        self.state = state;
        self.touch(now);
        Ok(())
    }

    /// Record a mutation.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

/// Lowercase, collapse whitespace and strip trailing punctuation.
pub fn normalize_statement(statement: &str) -> String {
    statement
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase()
}
