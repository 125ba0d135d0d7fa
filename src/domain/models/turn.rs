//! Turn domain model.
//!
//! A turn is one user, assistant or system exchange within a case. Turns are
//! immutable once created and are identified by their ordinal, which is
//! monotonic per case and starts at 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a case.
pub type CaseId = Uuid;

/// Ordinal index of a turn within its case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub u64);

impl TurnId {
    /// Ordinal that precedes every real turn.
    pub const ORIGIN: Self = Self(0);

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Number of turns between `earlier` and `self` (saturating).
    pub const fn since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    #[default]
    User,
    Assistant,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Opaque reference to a piece of evidence (an uploaded log, a screenshot, a
/// command output). The engine never dereferences it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceRef(String);

impl EvidenceRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvidenceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Owning case
    pub case_id: CaseId,
    /// Ordinal index, monotonic per case
    pub ordinal: TurnId,
    /// Producer of the turn
    pub role: TurnRole,
    /// Text content
    pub content: String,
    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,
    /// Structured evidence references attached to the turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
}

impl Turn {
    pub fn id(&self) -> TurnId {
        self.ordinal
    }
}

/// A turn submitted to the engine, before it has been assigned an ordinal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTurn {
    #[serde(default)]
    pub role: TurnRole,
    pub content: String,
    #[serde(default)]
    pub evidence: Vec<EvidenceRef>,
}

impl NewTurn {
    /// A user turn with the given content.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            evidence: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: TurnRole) -> Self {
        self.role = role;
        self
    }

    /// Attach an evidence reference.
    pub fn with_evidence(mut self, reference: impl Into<String>) -> Self {
        self.evidence.push(EvidenceRef::new(reference));
        self
    }

    /// Materialize into an immutable turn.
    pub fn into_turn(self, case_id: CaseId, ordinal: TurnId, timestamp: DateTime<Utc>) -> Turn {
        Turn {
            case_id,
            ordinal,
            role: self.role,
            content: self.content,
            timestamp,
            evidence: self.evidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_id_ordering() {
        assert!(TurnId(2) > TurnId(1));
        assert_eq!(TurnId::ORIGIN.next(), TurnId(1));
        assert_eq!(TurnId(7).since(TurnId(3)), 4);
        assert_eq!(TurnId(3).since(TurnId(7)), 0);
    }

    #[test]
    fn test_role_round_trip() {
        for role in [TurnRole::User, TurnRole::Assistant, TurnRole::System] {
            assert_eq!(TurnRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(TurnRole::from_str("ASSISTANT"), Some(TurnRole::Assistant));
        assert_eq!(TurnRole::from_str("operator"), None);
    }

    #[test]
    fn test_new_turn_into_turn() {
        let case_id = Uuid::new_v4();
        let now = Utc::now();
        let turn = NewTurn::user("db latency spiked at 14:00")
            .with_evidence("grafana/db-latency.png")
            .into_turn(case_id, TurnId(4), now);

        assert_eq!(turn.id(), TurnId(4));
        assert_eq!(turn.role, TurnRole::User);
        assert_eq!(turn.evidence, vec![EvidenceRef::new("grafana/db-latency.png")]);
        assert_eq!(turn.timestamp, now);
    }
}
