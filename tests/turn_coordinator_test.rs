//! End-to-end turn processing against the in-memory store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{structured, Harness};
use faultline::adapters::reasoning::ScriptedResponse;
use faultline::adapters::retrieval::UnavailableRetrievalProvider;
use faultline::domain::models::{
    ConfidenceTier, Config, HypothesisStatus, IntensityLevel, IntensityReason, InvestigationPhase,
    NewTurn, TurnCondition,
};
use faultline::domain::ports::CaseStore;
use faultline::DomainError;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_first_turn_on_empty_case() {
    let harness = Harness::new(vec![ScriptedResponse::text("Can you share the error message?")]);
    let case = harness.coordinator.create_case("VPN drops every hour").await.unwrap();

    let plan = harness
        .coordinator
        .process_turn(case.id, NewTurn::user("The VPN disconnects roughly every hour"))
        .await
        .unwrap();

    assert_eq!(plan.turn.value(), 1);
    assert!(plan.memory.hot.is_empty());
    assert!(plan.memory.warm.is_empty());
    assert!(plan.memory.cold.is_empty());
    assert!(plan.hypotheses.is_empty());
    assert_eq!(plan.conclusion.confidence_tier, ConfidenceTier::Low);
    assert_eq!(plan.phase.current, InvestigationPhase::Consulting);
    assert!(plan.phase.transitions.is_empty());
    assert_eq!(plan.intensity.level, IntensityLevel::Light);
    assert!(plan.conditions.is_empty());

    // User turn plus the model's reply
    let snapshot = harness.coordinator.snapshot(case.id).await.unwrap();
    assert_eq!(snapshot.turns.len(), 2);
    assert_eq!(snapshot.case.version, case.version + 1);
    assert_eq!(harness.reasoning.requests().await.len(), 1);
}

#[tokio::test]
async fn test_investigation_reaches_resolved() {
    let harness = Harness::new(vec![
        structured(
            "This looks like certificate trouble.",
            json!({
                "problem_statement": "TLS handshakes to the billing API fail",
                "hypotheses": [{"statement": "intermediate certificate expired"}]
            }),
        ),
        structured(
            "The chain confirms it.",
            json!({
                "evidence": [
                    {"hypothesis": "intermediate certificate expired", "outcome": "supports", "reference": "openssl-s_client.txt"},
                    {"hypothesis": "intermediate certificate expired", "outcome": "supports", "reference": "cert-notafter.txt"},
                    {"hypothesis": "intermediate certificate expired", "outcome": "supports", "reference": "ca-bundle-diff.txt"}
                ],
                "solution": {"hypothesis": "intermediate certificate expired", "description": "Deploy the renewed intermediate bundle"}
            }),
        ),
    ]);
    let case = harness.coordinator.create_case("billing API TLS errors").await.unwrap();

    let first = harness
        .coordinator
        .process_turn(case.id, NewTurn::user("Calls to billing fail with handshake errors"))
        .await
        .unwrap();
    assert_eq!(first.phase.current, InvestigationPhase::Diagnosing);
    assert_eq!(first.hypotheses.len(), 1);
    assert_eq!(first.hypotheses[0].status(), HypothesisStatus::Proposed);

    let second = harness
        .coordinator
        .process_turn(
            case.id,
            NewTurn::user("Here is the certificate chain").with_evidence("openssl-s_client.txt"),
        )
        .await
        .unwrap();

    let hypothesis = &second.hypotheses[0];
    assert_eq!(hypothesis.status(), HypothesisStatus::Validated);
    assert!(hypothesis.confidence >= 0.75);
    assert_eq!(hypothesis.proposed_solution.as_deref(), Some("Deploy the renewed intermediate bundle"));
    assert_eq!(second.phase.current, InvestigationPhase::Resolved);
    // Forward moves cascade within one turn
    assert_eq!(second.phase.transitions.len(), 2);

    let transitions = harness.store.list_transitions(case.id).await.unwrap();
    assert_eq!(transitions.len(), 3);
    let history = harness.store.conclusion_history(case.id).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_degraded_retrieval_still_produces_plan() {
    let harness = Harness::with(
        vec![],
        Arc::new(UnavailableRetrievalProvider::new("index rebuilding")),
        &Config::default(),
    );
    let case = harness.coordinator.create_case("disk fills overnight").await.unwrap();

    let plan = harness
        .coordinator
        .process_turn(case.id, NewTurn::user("/var is at 100% every morning"))
        .await
        .unwrap();

    assert!(plan.has_condition("degraded_retrieval"));
    assert!(plan.memory.warm.is_empty());
    assert!(plan
        .memory
        .degraded_retrieval
        .as_deref()
        .is_some_and(|m| m.contains("index rebuilding")));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_turn_commits_nothing_and_can_be_retried() {
    let mut config = Config::default();
    config.turn.timeout_ms = 50;
    let harness = Harness::with(
        vec![
            ScriptedResponse::text("too late").with_delay(Duration::from_secs(5)),
            ScriptedResponse::text("on time"),
        ],
        Arc::new(faultline::domain::ports::NullRetrievalProvider::new()),
        &config,
    );
    let case = harness.coordinator.create_case("cron job silent").await.unwrap();

    let err = harness
        .coordinator
        .process_turn(case.id, NewTurn::user("The 02:00 job produced no output"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::TurnTimedOut { timeout_ms: 50, .. }));
    assert!(err.is_retryable());

    let snapshot = harness.coordinator.snapshot(case.id).await.unwrap();
    assert!(snapshot.turns.is_empty());
    assert_eq!(snapshot.case.version, case.version);
    assert!(snapshot.conclusion.is_none());

    let plan = harness
        .coordinator
        .process_turn(case.id, NewTurn::user("The 02:00 job produced no output"))
        .await
        .unwrap();
    assert_eq!(plan.turn.value(), 1);
}

#[tokio::test]
async fn test_unknown_case_is_rejected() {
    let harness = Harness::new(vec![]);
    let missing = Uuid::new_v4();

    let err = harness
        .coordinator
        .process_turn(missing, NewTurn::user("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::CaseNotFound(id) if id == missing));
    assert!(harness.reasoning.requests().await.is_empty());
}

#[tokio::test]
async fn test_model_failure_degrades_turn() {
    let harness = Harness::new(vec![ScriptedResponse::failure("rate limited")]);
    let case = harness.coordinator.create_case("memory leak in worker").await.unwrap();

    let plan = harness
        .coordinator
        .process_turn(case.id, NewTurn::user("RSS grows 100MB per hour"))
        .await
        .unwrap();

    assert!(plan.has_condition("reasoning_unavailable"));
    assert!(plan.hypotheses.is_empty());
    // Only the user turn is stored when the model produced nothing
    let snapshot = harness.coordinator.snapshot(case.id).await.unwrap();
    assert_eq!(snapshot.turns.len(), 1);
}

#[tokio::test]
async fn test_empty_turn_is_invalid() {
    let harness = Harness::new(vec![]);
    let case = harness.coordinator.create_case("anything").await.unwrap();

    let err = harness
        .coordinator
        .process_turn(case.id, NewTurn::user("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::ValidationFailed(_)));
}

#[tokio::test]
async fn test_malformed_entries_are_dropped_individually() {
    let harness = Harness::new(vec![structured(
        "",
        json!({
            "hypotheses": [
                {"statement": "DNS TTL too long"},
                {"statement": ""},
                {"rationale": "no statement at all"}
            ]
        }),
    )]);
    let case = harness.coordinator.create_case("stale DNS after failover").await.unwrap();

    let plan = harness
        .coordinator
        .process_turn(case.id, NewTurn::user("Clients keep hitting the old IP"))
        .await
        .unwrap();

    assert_eq!(plan.hypotheses.len(), 1);
    assert_eq!(plan.dropped_extractions(), 2);
}

#[tokio::test]
async fn test_evidence_for_rejected_hypothesis_is_flagged() {
    let harness = Harness::new(vec![structured(
        "",
        json!({
            "hypotheses": [{"statement": "stale DNS cache"}],
            "disconfirmed": ["stale DNS cache"],
            "evidence": [{"hypothesis": "stale DNS cache", "outcome": "supports", "reference": "dig-1"}]
        }),
    )]);
    let case = harness.coordinator.create_case("intermittent 404s").await.unwrap();

    let plan = harness
        .coordinator
        .process_turn(case.id, NewTurn::user("Some pods resolve the old service IP"))
        .await
        .unwrap();

    let hypothesis = &plan.hypotheses[0];
    assert_eq!(hypothesis.status(), HypothesisStatus::Rejected);
    assert!(hypothesis.supporting.is_empty());
    assert_eq!(plan.dropped_extractions(), 1);
    let reasons = plan
        .conditions
        .iter()
        .find_map(|c| match c {
            TurnCondition::MalformedExtraction { reasons, .. } => Some(reasons.clone()),
            _ => None,
        })
        .unwrap();
    assert!(reasons[0].contains("is rejected"));
}

#[tokio::test]
async fn test_repeated_loop_backs_are_detected_and_escalate() {
    // Each cycle validates a fresh hypothesis with a fix, then the user rules it out.
    let validate = |statement: &str| {
        structured(
            "",
            json!({
                "problem_statement": "Nightly batch job overruns its window",
                "hypotheses": [{"statement": statement}],
                "evidence": [
                    {"hypothesis": statement, "outcome": "supports", "reference": format!("{statement}-1")},
                    {"hypothesis": statement, "outcome": "supports", "reference": format!("{statement}-2")},
                    {"hypothesis": statement, "outcome": "supports", "reference": format!("{statement}-3")}
                ],
                "solution": {"hypothesis": statement, "description": "apply the fix"}
            }),
        )
    };
    let disconfirm = |statement: &str| structured("", json!({"disconfirmed": [statement]}));

    let harness = Harness::new(vec![
        validate("lock contention"),
        disconfirm("lock contention"),
        validate("slow storage tier"),
        disconfirm("slow storage tier"),
        validate("bad query plan"),
        disconfirm("bad query plan"),
    ]);
    let case = harness.coordinator.create_case("batch overrun").await.unwrap();

    let mut plans = Vec::new();
    for i in 0..6 {
        let plan = harness
            .coordinator
            .process_turn(case.id, NewTurn::user(format!("update {i}")))
            .await
            .unwrap();
        plans.push(plan);
    }

    assert_eq!(plans[0].phase.current, InvestigationPhase::Resolved);
    for plan in &plans[..5] {
        assert!(!plan.loop_detected());
    }
    for plan in [&plans[1], &plans[3], &plans[5]] {
        assert!(plan.phase.looped_back);
        assert_eq!(plan.phase.current, InvestigationPhase::Diagnosing);
    }

    let last = &plans[5];
    assert!(last.loop_detected());
    assert!(last.conditions.iter().any(|c| matches!(
        c,
        TurnCondition::LoopDetected { phase: InvestigationPhase::Diagnosing, occurrences: 4, max_loops: 3 }
    )));
    assert_eq!(last.intensity.level, IntensityLevel::Full);
    assert!(last.intensity.reasons.contains(&IntensityReason::LoopDetected));
}

#[tokio::test]
async fn test_turns_of_one_case_are_serialized() {
    let harness = Arc::new(Harness::new(vec![]));
    let case = harness.coordinator.create_case("flaky CI").await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move {
                harness
                    .coordinator
                    .process_turn(case.id, NewTurn::user(format!("observation {i}")))
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        result.unwrap().unwrap();
    }

    let snapshot = harness.coordinator.snapshot(case.id).await.unwrap();
    let ordinals: Vec<u64> = snapshot.turns.iter().map(|t| t.ordinal.value()).collect();
    assert_eq!(ordinals, (1..=8).collect::<Vec<_>>());
    assert_eq!(snapshot.case.version, case.version + 8);
}
