//! Phase orchestrator service.
//!
//! A deterministic state machine over investigation phases. Each turn it
//! either loops back (when the turn contradicted the previous conclusion) or
//! advances as far as the entry conditions allow, then checks the history
//! ring for cycles.
//!
//! Entry conditions:
//! - `Diagnosing`: the conclusion shows the problem is understood
//! - `Analyzing`: a live hypothesis is under test with supporting evidence
//! - `Resolved`: a hypothesis is validated and carries a proposed solution

use tracing::{info, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Hypothesis, HypothesisStatus, InvestigationPhase, LoopSignal, PhaseConfig, PhaseHistory,
    PhaseReport, PhaseState, TurnId, WorkingConclusion,
};

/// Configuration for the phase orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseOrchestratorConfig {
    /// Capacity of the phase history ring
    pub history_capacity: usize,
    /// Occurrences of one phase in the ring above which a loop is reported
    pub max_loops: usize,
}

impl Default for PhaseOrchestratorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 10,
            max_loops: 3,
        }
    }
}

impl From<&PhaseConfig> for PhaseOrchestratorConfig {
    fn from(config: &PhaseConfig) -> Self {
        Self {
            history_capacity: config.history_capacity,
            max_loops: config.max_loops,
        }
    }
}

/// What the orchestrator looks at for one turn.
#[derive(Debug, Clone, Copy)]
pub struct PhaseSignals<'a> {
    /// Conclusion before this turn, if any
    pub previous_conclusion: Option<&'a WorkingConclusion>,
    /// Conclusion generated for this turn
    pub conclusion: &'a WorkingConclusion,
    /// Hypotheses as they were before this turn
    pub hypotheses_before: &'a [Hypothesis],
    /// Hypotheses after this turn
    pub hypotheses: &'a [Hypothesis],
}

impl PhaseSignals<'_> {
    /// Why this turn contradicts the previous conclusion, if it does: a
    /// validated hypothesis became rejected, or confidence fell by more than
    /// one tier.
    pub fn contradiction(&self) -> Option<String> {
        if let Some(h) = self.hypotheses_before.iter().filter(|h| h.is_validated()).find(|before| {
            self.hypotheses
                .iter()
                .any(|after| after.id == before.id && after.is_rejected())
        }) {
            return Some(format!("validated hypothesis rejected: {}", h.statement));
        }

        let previous = self.previous_conclusion?;
        let drop = self.conclusion.confidence_tier.drop_from(previous.confidence_tier);
        (drop > 1).then(|| {
            format!(
                "confidence dropped from {} to {}",
                previous.confidence_tier, self.conclusion.confidence_tier
            )
        })
    }

    /// Whether the entry condition of `phase` holds.
    pub fn entry_condition_holds(&self, phase: InvestigationPhase) -> bool {
        match phase {
            InvestigationPhase::Consulting => true,
            InvestigationPhase::Diagnosing => self.conclusion.problem_understood(),
            InvestigationPhase::Analyzing => self.hypotheses.iter().any(|h| {
                matches!(h.status(), HypothesisStatus::Testing | HypothesisStatus::Validated)
                    && h.has_supporting_evidence()
            }),
            InvestigationPhase::Resolved => self
                .hypotheses
                .iter()
                .any(|h| h.is_validated() && h.proposed_solution.is_some()),
        }
    }

    fn entry_reason(phase: InvestigationPhase) -> &'static str {
        match phase {
            InvestigationPhase::Consulting => "restarting problem intake",
            InvestigationPhase::Diagnosing => "problem understood",
            InvestigationPhase::Analyzing => "hypothesis under test with supporting evidence",
            InvestigationPhase::Resolved => "validated hypothesis with proposed solution",
        }
    }
}

/// The phase orchestrator service.
#[derive(Debug, Clone, Default)]
pub struct PhaseOrchestrator {
    config: PhaseOrchestratorConfig,
}

impl PhaseOrchestrator {
    pub fn new(config: PhaseOrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PhaseOrchestratorConfig {
        self.config
    }

    /// State of a new case.
    pub fn initial_state(&self) -> PhaseState {
        PhaseState::new(self.config.history_capacity)
    }

    /// Evaluate one turn against `state`, applying any transitions.
    ///
    /// On a contradiction the phase loops back to the latest earlier phase
    /// whose entry condition still holds and does not advance again this
    /// turn. Otherwise it advances while the next phase's entry condition
    /// holds.
    pub fn advance(
        &self,
        state: &mut PhaseState,
        signals: &PhaseSignals<'_>,
        turn: TurnId,
    ) -> DomainResult<PhaseReport> {
        state.turns_in_phase += 1;
        let mut transitions = Vec::new();
        let mut looped_back = false;

        match signals.contradiction() {
            Some(reason) => {
                let target = state
                    .current
                    .earlier()
                    .find(|p| signals.entry_condition_holds(*p));
                if let Some(target) = target {
                    let transition = state.enter(target, turn, reason)?;
                    info!(
                        from = %transition.from,
                        to = %transition.to,
                        turn = turn.value(),
                        reason = %transition.reason,
                        "Phase looped back"
                    );
                    transitions.push(transition);
                    looped_back = true;
                }
            }
            None => {
                while let Some(next) = state.current.next() {
                    if !signals.entry_condition_holds(next) {
                        break;
                    }
                    let transition =
                        state.enter(next, turn, PhaseSignals::entry_reason(next))?;
                    info!(
                        from = %transition.from,
                        to = %transition.to,
                        turn = turn.value(),
                        "Phase advanced"
                    );
                    transitions.push(transition);
                }
            }
        }

        let loop_signal = self.detect_loop(&state.history);
        if let Some(signal) = &loop_signal {
            warn!(
                phase = %signal.phase,
                occurrences = signal.occurrences,
                max_loops = signal.max_loops,
                "Investigation is cycling between phases"
            );
        }

        Ok(PhaseReport {
            current: state.current,
            transitions,
            looped_back,
            loop_signal,
            history: state.history.to_vec(),
            turns_in_phase: state.turns_in_phase,
        })
    }

    /// The most frequent phase in the ring, if it occurs more than
    /// `max_loops` times.
    pub fn detect_loop(&self, history: &PhaseHistory) -> Option<LoopSignal> {
        InvestigationPhase::ALL
            .into_iter()
            .map(|phase| (phase, history.occurrences(phase)))
            .filter(|(_, occurrences)| *occurrences > self.config.max_loops)
            .fold(None, |best: Option<(InvestigationPhase, usize)>, (phase, n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((phase, n)),
            })
            .map(|(phase, occurrences)| LoopSignal {
                phase,
                occurrences,
                max_loops: self.config.max_loops,
            })
    }
}
