use chrono::Utc;
use faultline::domain::models::{
    ConfidenceTier, Evidence, EvidenceRef, EvidenceStance, Hypothesis, HypothesisState,
    InvestigationPhase, RejectionReason, TransitionKind, TurnId, WorkingConclusion,
};
use faultline::services::{PhaseOrchestrator, PhaseOrchestratorConfig, PhaseSignals};
use proptest::prelude::*;

/// One simulated turn outcome.
#[derive(Debug, Clone)]
struct Outcome {
    tier: ConfidenceTier,
    problem_understood: bool,
    /// 0 proposed, 1 testing with support, 2 validated with solution, 3 rejected
    hypothesis: u8,
}

fn outcome() -> impl Strategy<Value = Outcome> {
    (0u8..3, any::<bool>(), 0u8..4).prop_map(|(tier, problem_understood, hypothesis)| Outcome {
        tier: match tier {
            0 => ConfidenceTier::Low,
            1 => ConfidenceTier::Medium,
            _ => ConfidenceTier::High,
        },
        problem_understood,
        hypothesis,
    })
}

fn hypothesis(template: &Hypothesis, kind: u8, turn: TurnId) -> Hypothesis {
    let mut h = template.clone();
    h.supporting = vec![Evidence::new(EvidenceRef::new("probe"), EvidenceStance::Supporting, turn)];
    h.proposed_solution = None;
    h.state = match kind {
        0 => {
            h.supporting.clear();
            HypothesisState::Proposed
        }
        1 => HypothesisState::Testing,
        2 => {
            h.proposed_solution = Some("apply the fix".to_string());
            HypothesisState::Validated { at_turn: turn }
        }
        _ => HypothesisState::Rejected {
            at_turn: turn,
            reason: RejectionReason::ContradictionDominates,
        },
    };
    h
}

fn conclusion(outcome: &Outcome, turn: TurnId) -> WorkingConclusion {
    WorkingConclusion {
        text: String::new(),
        confidence_tier: outcome.tier,
        leading_hypothesis: None,
        supporting_evidence: Vec::new(),
        next_steps: Vec::new(),
        problem_statement: outcome.problem_understood.then(|| "service is down".to_string()),
        turn,
        generated_at: Utc::now(),
    }
}

proptest! {
    /// Property: every applied transition is an edge of the state machine,
    /// the history ring never exceeds its capacity, and a loop is reported
    /// exactly when a phase recurs more than `max_loops` times in the ring
    #[test]
    fn prop_transitions_are_legal(
        outcomes in prop::collection::vec(outcome(), 1..40),
        capacity in 1usize..12,
        max_loops in 1usize..5,
    ) {
        let orchestrator = PhaseOrchestrator::new(PhaseOrchestratorConfig {
            history_capacity: capacity,
            max_loops,
        });
        let mut state = orchestrator.initial_state();
        let template = Hypothesis::new("cache stampede", TurnId(1), Utc::now());
        let mut hypotheses_before: Vec<Hypothesis> = Vec::new();
        let mut previous: Option<WorkingConclusion> = None;

        for (i, outcome) in outcomes.iter().enumerate() {
            let turn = TurnId(i as u64 + 1);
            let hypotheses = vec![hypothesis(&template, outcome.hypothesis, turn)];
            let current = conclusion(outcome, turn);
            let before_phase = state.current;

            let report = orchestrator
                .advance(
                    &mut state,
                    &PhaseSignals {
                        previous_conclusion: previous.as_ref(),
                        conclusion: &current,
                        hypotheses_before: &hypotheses_before,
                        hypotheses: &hypotheses,
                    },
                    turn,
                )
                .unwrap();

            let mut phase = before_phase;
            for transition in &report.transitions {
                prop_assert_eq!(transition.from, phase);
                prop_assert!(phase.can_transition_to(transition.to));
                prop_assert_eq!(transition.turn, turn);
                phase = transition.to;
            }
            prop_assert_eq!(phase, state.current);
            prop_assert_eq!(report.current, state.current);

            // A loop-back is never followed by a forward move in the same turn
            if report.looped_back {
                prop_assert_eq!(report.transitions.len(), 1);
                prop_assert_eq!(report.transitions[0].kind, TransitionKind::LoopBack);
            }

            prop_assert!(state.history.len() <= capacity);
            let recurring = InvestigationPhase::ALL
                .iter()
                .any(|p| state.history.occurrences(*p) > max_loops);
            prop_assert_eq!(report.loop_signal.is_some(), recurring);

            hypotheses_before = hypotheses;
            previous = Some(current);
        }
    }
}

#[test]
fn test_validated_then_rejected_loops_back() {
    let orchestrator = PhaseOrchestrator::new(PhaseOrchestratorConfig::default());
    let mut state = orchestrator.initial_state();
    let template = Hypothesis::new("disk controller failing", TurnId(1), Utc::now());

    let solved = Outcome {
        tier: ConfidenceTier::High,
        problem_understood: true,
        hypothesis: 2,
    };
    let validated = vec![hypothesis(&template, 2, TurnId(1))];
    let first = conclusion(&solved, TurnId(1));
    orchestrator
        .advance(
            &mut state,
            &PhaseSignals {
                previous_conclusion: None,
                conclusion: &first,
                hypotheses_before: &[],
                hypotheses: &validated,
            },
            TurnId(1),
        )
        .unwrap();
    assert_eq!(state.current, InvestigationPhase::Resolved);

    let refuted = Outcome {
        tier: ConfidenceTier::Low,
        problem_understood: true,
        hypothesis: 3,
    };
    let rejected = vec![hypothesis(&template, 3, TurnId(2))];
    let second = conclusion(&refuted, TurnId(2));
    let report = orchestrator
        .advance(
            &mut state,
            &PhaseSignals {
                previous_conclusion: Some(&first),
                conclusion: &second,
                hypotheses_before: &validated,
                hypotheses: &rejected,
            },
            TurnId(2),
        )
        .unwrap();

    assert!(report.looped_back);
    // Analyzing no longer holds without a live hypothesis, Diagnosing does
    assert_eq!(state.current, InvestigationPhase::Diagnosing);
    assert_eq!(state.loop_backs, 1);
}
