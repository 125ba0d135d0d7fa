//! Turn plan: the per-turn bundle produced by the coordinator.

use serde::{Deserialize, Serialize};

use super::conclusion::WorkingConclusion;
use super::hypothesis::Hypothesis;
use super::intensity::IntensityDecision;
use super::memory::MemoryTierSet;
use super::phase::{InvestigationPhase, LoopSignal, PhaseTransition};
use super::turn::{CaseId, TurnId};

/// A non-fatal condition observed while processing a turn.
///
/// Conditions are absorbed: the turn still completes and commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum TurnCondition {
    /// Retrieval failed; the warm tier is empty
    DegradedRetrieval { message: String },
    /// Structured model output entries were dropped
    MalformedExtraction { dropped: usize, reasons: Vec<String> },
    /// A phase recurs too often in the history ring
    LoopDetected {
        phase: InvestigationPhase,
        occurrences: usize,
        max_loops: usize,
    },
    /// The hot tier alone exceeds the token budget
    HotTierOverBudget { hot_tokens: usize, budget: usize },
    /// The reasoning model failed; the turn ran on an empty output
    ReasoningUnavailable { message: String },
    /// The model proposed hypotheses that were already ruled out
    RejectedHypothesisReproposed { count: usize },
}

impl TurnCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DegradedRetrieval { .. } => "degraded_retrieval",
            Self::MalformedExtraction { .. } => "malformed_extraction",
            Self::LoopDetected { .. } => "loop_detected",
            Self::HotTierOverBudget { .. } => "hot_tier_over_budget",
            Self::ReasoningUnavailable { .. } => "reasoning_unavailable",
            Self::RejectedHypothesisReproposed { .. } => "rejected_hypothesis_reproposed",
        }
    }
}

impl From<LoopSignal> for TurnCondition {
    fn from(signal: LoopSignal) -> Self {
        Self::LoopDetected {
            phase: signal.phase,
            occurrences: signal.occurrences,
            max_loops: signal.max_loops,
        }
    }
}

/// Phase outcome of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    /// Phase after this turn
    pub current: InvestigationPhase,
    /// Transitions taken during this turn, in order
    #[serde(default)]
    pub transitions: Vec<PhaseTransition>,
    /// Whether this turn looped back to an earlier phase
    pub looped_back: bool,
    /// Set when a phase recurs too often in the ring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_signal: Option<LoopSignal>,
    /// Ring contents after this turn, oldest first
    pub history: Vec<InvestigationPhase>,
    /// Turns spent in the current phase
    pub turns_in_phase: u32,
}

impl PhaseReport {
    pub fn loop_detected(&self) -> bool {
        self.loop_signal.is_some()
    }
}

/// Everything decided for one turn. Logged for replay, not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnPlan {
    pub case_id: CaseId,
    /// Ordinal assigned to the submitted turn
    pub turn: TurnId,
    pub memory: MemoryTierSet,
    /// Hypotheses after this turn, including rejected ones
    pub hypotheses: Vec<Hypothesis>,
    pub conclusion: WorkingConclusion,
    pub phase: PhaseReport,
    pub intensity: IntensityDecision,
    #[serde(default)]
    pub conditions: Vec<TurnCondition>,
}

impl TurnPlan {
    pub fn has_condition(&self, name: &str) -> bool {
        self.conditions.iter().any(|c| c.as_str() == name)
    }

    pub fn loop_detected(&self) -> bool {
        self.phase.loop_detected()
    }

    /// Number of malformed extraction entries dropped this turn.
    pub fn dropped_extractions(&self) -> usize {
        self.conditions
            .iter()
            .map(|c| match c {
                TurnCondition::MalformedExtraction { dropped, .. } => *dropped,
                _ => 0,
            })
            .sum()
    }

    /// Hypotheses that are not rejected.
    pub fn active_hypotheses(&self) -> impl Iterator<Item = &Hypothesis> {
        self.hypotheses.iter().filter(|h| !h.is_rejected())
    }
}
