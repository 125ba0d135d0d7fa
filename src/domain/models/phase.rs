//! Investigation phase domain model.
//!
//! Phases advance one step at a time
//! (`Consulting → Diagnosing → Analyzing → Resolved`) and may loop back to
//! any earlier phase. A bounded ring of entered phases is kept for cycle
//! detection.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::domain::errors::{DomainError, DomainResult};

use super::turn::TurnId;

/// Default capacity of the phase history ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Macro-stage of an investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationPhase {
    /// Understanding the problem
    #[default]
    Consulting,
    /// Forming candidate causes
    Diagnosing,
    /// Testing candidate causes against evidence
    Analyzing,
    /// A validated cause with a proposed solution
    Resolved,
}

impl InvestigationPhase {
    pub const ALL: [Self; 4] = [
        Self::Consulting,
        Self::Diagnosing,
        Self::Analyzing,
        Self::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consulting => "consulting",
            Self::Diagnosing => "diagnosing",
            Self::Analyzing => "analyzing",
            Self::Resolved => "resolved",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "consulting" => Some(Self::Consulting),
            "diagnosing" => Some(Self::Diagnosing),
            "analyzing" => Some(Self::Analyzing),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved)
    }

    /// The forward successor, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Consulting => Some(Self::Diagnosing),
            Self::Diagnosing => Some(Self::Analyzing),
            Self::Analyzing => Some(Self::Resolved),
            Self::Resolved => None,
        }
    }

    /// Phases strictly earlier than this one, latest first.
    pub fn earlier(&self) -> impl Iterator<Item = Self> + '_ {
        Self::ALL.into_iter().rev().filter(move |p| p < self)
    }

    /// Kind of transition from `self` to `to`, or `None` if the edge is not
    /// part of the state machine.
    pub fn transition_kind(&self, to: Self) -> Option<TransitionKind> {
        if self.next() == Some(to) {
            Some(TransitionKind::Advance)
        } else if to < *self {
            Some(TransitionKind::LoopBack)
        } else {
            None
        }
    }

    pub fn can_transition_to(&self, to: Self) -> bool {
        self.transition_kind(to).is_some()
    }
}

impl fmt::Display for InvestigationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Advance,
    LoopBack,
}

/// A recorded phase transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: InvestigationPhase,
    pub to: InvestigationPhase,
    pub kind: TransitionKind,
    pub turn: TurnId,
    pub reason: String,
}

/// Fixed-capacity ring of entered phases, oldest dropped first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseHistory {
    capacity: usize,
    entries: VecDeque<InvestigationPhase>,
}

impl PhaseHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Build a ring from phases in chronological order, keeping the newest
    /// `capacity` entries.
    pub fn from_phases(capacity: usize, phases: impl IntoIterator<Item = InvestigationPhase>) -> Self {
        let mut history = Self::new(capacity);
        for phase in phases {
            history.push(phase);
        }
        history
    }

    pub fn push(&mut self, phase: InvestigationPhase) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(phase);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn occurrences(&self, phase: InvestigationPhase) -> usize {
        self.entries.iter().filter(|p| **p == phase).count()
    }

    /// Entries oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &InvestigationPhase> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<InvestigationPhase> {
        self.entries.iter().copied().collect()
    }
}

impl Default for PhaseHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

/// Raised when a phase recurs too often within the history ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopSignal {
    pub phase: InvestigationPhase,
    pub occurrences: usize,
    pub max_loops: usize,
}

/// Phase of a case plus the bookkeeping needed for loop and dwell tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseState {
    /// Current phase
    pub current: InvestigationPhase,
    /// Ring of entered phases, oldest first
    pub history: PhaseHistory,
    /// Turn at which the current phase was entered
    pub entered_at: TurnId,
    /// Turns processed since the current phase was entered
    pub turns_in_phase: u32,
    /// Total loop-backs over the life of the case
    pub loop_backs: u32,
}

impl PhaseState {
    /// Initial state of a new case: `Consulting`, recorded in the ring.
    pub fn new(history_capacity: usize) -> Self {
        let mut history = PhaseHistory::new(history_capacity);
        history.push(InvestigationPhase::Consulting);
        Self {
            current: InvestigationPhase::Consulting,
            history,
            entered_at: TurnId::ORIGIN,
            turns_in_phase: 0,
            loop_backs: 0,
        }
    }

    /// Move to `to`, recording it in the ring.
    ///
    /// Returns [`DomainError::InvalidPhaseTransition`] if the edge is not part
    /// of the state machine.
    pub fn enter(
        &mut self,
        to: InvestigationPhase,
        turn: TurnId,
        reason: impl Into<String>,
    ) -> DomainResult<PhaseTransition> {
        let from = self.current;
        let kind = from
            .transition_kind(to)
            .ok_or_else(|| DomainError::InvalidPhaseTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })?;

        self.current = to;
        self.history.push(to);
        self.entered_at = turn;
        self.turns_in_phase = 0;
        if kind == TransitionKind::LoopBack {
            self.loop_backs += 1;
        }

        Ok(PhaseTransition {
            from,
            to,
            kind,
            turn,
            reason: reason.into(),
        })
    }
}

impl Default for PhaseState {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
