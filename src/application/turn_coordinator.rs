use std::collections::HashMap;
use std::iter;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Case, CaseId, CaseSnapshot, Config, EvidenceRef, IntensityDecision, IntensitySignals,
    ModelOutput, NewTurn, PhaseState, Turn, TurnCondition, TurnPlan, TurnRole,
};
use crate::domain::ports::{CaseStore, ReasoningModel, RetrievalProvider, TurnCommit};
use crate::services::hypothesis_tracker::failed_count;
use crate::services::intensity_controller::evidence_volume;
use crate::services::{
    ConclusionGenerator, ConclusionInput, ConfidencePolicy, HypothesisLedger, HypothesisTracker,
    IntensityController, MemoryManager, PhaseOrchestrator, PhaseSignals, PromptAssembler,
    PromptContext, RecencyWeightedPolicy,
};

/// Turn-level limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Token budget for hot plus warm context
    pub token_budget: usize,
    /// Timeout for one full turn, commit included
    pub turn_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            token_budget: 8_000,
            turn_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            token_budget: config.memory.token_budget,
            turn_timeout: Duration::from_millis(config.turn.timeout_ms),
        }
    }
}

/// Sequences the engine components for every turn and owns all writes to
/// case state.
///
/// Per turn: memory tiering, prompt assembly and model invocation, hypothesis
/// extraction and updates, conclusion generation, phase evaluation and the
/// intensity decision. All mutations are staged on copies and committed to
/// the store in one call at the end; a turn that times out or is cancelled
/// commits nothing.
///
/// # Concurrency
///
/// Turns of one case are serialized through a per-case lock. Turns of
/// different cases run in parallel.
///
/// # Examples
///
/// ```no_run
/// use faultline::adapters::in_memory::InMemoryCaseStore;
/// use faultline::adapters::reasoning::SilentReasoningModel;
/// use faultline::application::TurnCoordinator;
/// use faultline::domain::models::{Config, NewTurn};
/// use faultline::domain::ports::NullRetrievalProvider;
/// use std::sync::Arc;
///
/// async fn example() -> anyhow::Result<()> {
///     let coordinator = TurnCoordinator::new(
///         Arc::new(InMemoryCaseStore::new()),
///         Arc::new(NullRetrievalProvider::new()),
///         Arc::new(SilentReasoningModel),
///         &Config::default(),
///     );
///     let case = coordinator.create_case("API returns 502").await?;
///     let plan = coordinator
///         .process_turn(case.id, NewTurn::user("Started after the deploy"))
///         .await?;
///     println!("{}", plan.conclusion.text);
///     Ok(())
/// }
/// ```
pub struct TurnCoordinator {
    store: Arc<dyn CaseStore>,
    reasoning: Arc<dyn ReasoningModel>,
    memory: MemoryManager,
    tracker: HypothesisTracker,
    conclusions: ConclusionGenerator,
    phases: PhaseOrchestrator,
    intensity: IntensityController,
    prompts: PromptAssembler,
    settings: CoordinatorSettings,
    case_locks: Mutex<HashMap<CaseId, Arc<Mutex<()>>>>,
}

impl TurnCoordinator {
    /// Build a coordinator with the default confidence policy.
    pub fn new(
        store: Arc<dyn CaseStore>,
        retrieval: Arc<dyn RetrievalProvider>,
        reasoning: Arc<dyn ReasoningModel>,
        config: &Config,
    ) -> Self {
        let policy: Arc<dyn ConfidencePolicy> =
            Arc::new(RecencyWeightedPolicy::from(&config.hypothesis));
        Self {
            tracker: HypothesisTracker::new(
                Arc::clone(&store),
                policy,
                (&config.hypothesis).into(),
            ),
            store,
            reasoning,
            memory: MemoryManager::new(retrieval, (&config.memory).into()),
            conclusions: ConclusionGenerator::new(),
            phases: PhaseOrchestrator::new((&config.phase).into()),
            intensity: IntensityController::new((&config.intensity).into()),
            prompts: PromptAssembler::default(),
            settings: config.into(),
            case_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the hypothesis tracker, e.g. to plug in another confidence policy.
    pub fn with_tracker(mut self, tracker: HypothesisTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> CoordinatorSettings {
        self.settings
    }

    pub fn tracker(&self) -> &HypothesisTracker {
        &self.tracker
    }

    /// Open a new case in `Consulting`.
    pub async fn create_case(&self, title: &str) -> DomainResult<Case> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DomainError::ValidationFailed(
                "case title cannot be empty".to_string(),
            ));
        }
        let case = Case::new(title);
        self.store.create_case(&case, &self.phases.initial_state()).await?;
        info!(case_id = %case.id, title = %case.title, "Case opened");
        Ok(case)
    }

    /// Current persisted state of a case.
    pub async fn snapshot(&self, case_id: CaseId) -> DomainResult<CaseSnapshot> {
        self.store
            .load_snapshot(case_id)
            .await?
            .ok_or(DomainError::CaseNotFound(case_id))
    }

    /// Process one turn and commit its effects.
    ///
    /// # Errors
    /// - `CaseNotFound` for an unknown case
    /// - `ValidationFailed` for a turn with neither content nor evidence
    /// - `TurnTimedOut` when the turn exceeds the configured timeout; nothing
    ///   is committed and the turn can be retried
    /// - `ConcurrencyConflict` when another writer committed to the case first
    #[instrument(skip(self, new_turn), fields(role = new_turn.role.as_str()))]
    pub async fn process_turn(&self, case_id: CaseId, new_turn: NewTurn) -> DomainResult<TurnPlan> {
        if self.store.get_case(case_id).await?.is_none() {
            return Err(DomainError::CaseNotFound(case_id));
        }

        let lock = self.case_lock(case_id).await;
        let result = {
            let _guard = lock.lock().await;
            let timeout = self.settings.turn_timeout;
            match tokio::time::timeout(timeout, self.run_turn(case_id, new_turn)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(%case_id, timeout_ms = timeout.as_millis() as u64, "Turn timed out, nothing committed");
                    Err(DomainError::TurnTimedOut {
                        case_id,
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            }
        };
        self.release_case_lock(case_id, lock).await;
        result
    }

    async fn case_lock(&self, case_id: CaseId) -> Arc<Mutex<()>> {
        let mut locks = self.case_locks.lock().await;
        Arc::clone(locks.entry(case_id).or_default())
    }

    /// Drop the map entry once no other turn holds or waits on the lock.
    async fn release_case_lock(&self, case_id: CaseId, lock: Arc<Mutex<()>>) {
        let mut locks = self.case_locks.lock().await;
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&case_id);
        }
    }

    async fn run_turn(&self, case_id: CaseId, new_turn: NewTurn) -> DomainResult<TurnPlan> {
        if new_turn.content.trim().is_empty() && new_turn.evidence.is_empty() {
            return Err(DomainError::ValidationFailed(
                "turn must carry content or evidence".to_string(),
            ));
        }

        let snapshot = self.snapshot(case_id).await?;
        let now = Utc::now();
        let ordinal = snapshot.last_turn().next();
        let turn = new_turn.into_turn(case_id, ordinal, now);
        debug!(%case_id, turn = ordinal.value(), phase = %snapshot.phase.current, "Processing turn");

        let mut conditions = Vec::new();

        // Memory
        let memory = self
            .memory
            .organize(case_id, &snapshot.turns, &turn.content, self.settings.token_budget)
            .await;
        if let Some(message) = &memory.degraded_retrieval {
            conditions.push(TurnCondition::DegradedRetrieval {
                message: message.clone(),
            });
        }
        if memory.hot_over_budget() {
            warn!(%case_id, hot_tokens = memory.hot_tokens(), budget = memory.budget, "Hot tier exceeds token budget");
            conditions.push(TurnCondition::HotTierOverBudget {
                hot_tokens: memory.hot_tokens(),
                budget: memory.budget,
            });
        }

        // Reasoning
        let prior_intensity = self.decide_intensity(&snapshot.phase, &snapshot, iter::empty(), None);
        let request = self.prompts.assemble(PromptContext {
            case_id,
            turn: &turn,
            memory: &memory,
            hypotheses: &snapshot.hypotheses,
            conclusion: snapshot.conclusion.as_ref(),
            phase: snapshot.phase.current,
            intensity: prior_intensity.level,
        });
        let output = match self.reasoning.invoke(request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(%case_id, model = self.reasoning.name(), error = %e, "Reasoning model unavailable, continuing with empty output");
                conditions.push(TurnCondition::ReasoningUnavailable {
                    message: e.to_string(),
                });
                ModelOutput::empty()
            }
        };

        // Hypotheses
        let mut ledger = HypothesisLedger::new(snapshot.hypotheses.clone());
        let extraction = self.tracker.extract(&output, ordinal, now);
        let problem_statement = extraction.problem_statement.clone().or_else(|| {
            snapshot
                .conclusion
                .as_ref()
                .and_then(|c| c.problem_statement.clone())
        });
        let report = self.tracker.apply(&mut ledger, extraction, ordinal, now);
        if !report.dropped.is_empty() {
            warn!(%case_id, dropped = report.dropped.len(), "Dropped malformed extraction entries");
            conditions.push(TurnCondition::MalformedExtraction {
                dropped: report.dropped.len(),
                reasons: report.dropped.clone(),
            });
        }
        if report.reproposed_rejected > 0 {
            conditions.push(TurnCondition::RejectedHypothesisReproposed {
                count: report.reproposed_rejected,
            });
        }

        // Conclusion
        let evidence: Vec<EvidenceRef> = snapshot
            .turns
            .iter()
            .chain(iter::once(&turn))
            .flat_map(|t| t.evidence.iter().cloned())
            .collect();
        let conclusion = self.conclusions.generate(ConclusionInput {
            hypotheses: ledger.hypotheses(),
            evidence: &evidence,
            problem_statement: problem_statement.as_deref(),
            turn: ordinal,
            generated_at: now,
        });

        // Phase
        let mut phase = snapshot.phase.clone();
        let phase_report = self.phases.advance(
            &mut phase,
            &PhaseSignals {
                previous_conclusion: snapshot.conclusion.as_ref(),
                conclusion: &conclusion,
                hypotheses_before: &snapshot.hypotheses,
                hypotheses: ledger.hypotheses(),
            },
            ordinal,
        )?;
        if let Some(signal) = phase_report.loop_signal {
            conditions.push(signal.into());
        }

        // Intensity
        let intensity = self.decide_intensity(
            &phase,
            &snapshot,
            iter::once(&turn),
            Some((&ledger, phase_report.loop_detected())),
        );

        // Commit
        let mut turns = vec![turn];
        let prose = output.prose();
        if !prose.is_empty() {
            turns.push(Turn {
                case_id,
                ordinal: ordinal.next(),
                role: TurnRole::Assistant,
                content: prose,
                timestamp: now,
                evidence: Vec::new(),
            });
        }
        let version = self
            .store
            .commit_turn(TurnCommit {
                case_id,
                expected_version: snapshot.case.version,
                turns,
                hypotheses: ledger.changed(),
                conclusion: conclusion.clone(),
                phase,
                transitions: phase_report.transitions.clone(),
                committed_at: now,
            })
            .await?;

        let plan = TurnPlan {
            case_id,
            turn: ordinal,
            memory,
            hypotheses: ledger.into_hypotheses(),
            conclusion,
            phase: phase_report,
            intensity,
            conditions,
        };

        info!(
            %case_id,
            turn = ordinal.value(),
            version,
            phase = %plan.phase.current,
            intensity = %plan.intensity.level,
            confidence = %plan.conclusion.confidence_tier,
            conditions = plan.conditions.len(),
            "Turn committed"
        );
        match serde_json::to_string(&plan) {
            Ok(json) => debug!(%case_id, turn = ordinal.value(), plan = %json, "Turn plan"),
            Err(e) => warn!(%case_id, error = %e, "Failed to serialize turn plan for replay log"),
        }

        Ok(plan)
    }

    /// Intensity for a phase state. Without a ledger the snapshot's own
    /// hypotheses and loop state are used, which gives the previous turn's
    /// level.
    fn decide_intensity<'a>(
        &self,
        phase: &PhaseState,
        snapshot: &'a CaseSnapshot,
        new_turns: impl Iterator<Item = &'a Turn>,
        staged: Option<(&HypothesisLedger, bool)>,
    ) -> IntensityDecision {
        let (hypotheses, failed, loop_detected) = match staged {
            Some((ledger, loop_detected)) => (ledger.hypotheses(), ledger.failed_count(), loop_detected),
            None => (
                snapshot.hypotheses.as_slice(),
                failed_count(&snapshot.hypotheses),
                self.phases.detect_loop(&phase.history).is_some(),
            ),
        };
        self.intensity.decide(IntensitySignals {
            phase: phase.current,
            failed_hypotheses: failed,
            phase_dwell_turns: phase.turns_in_phase,
            evidence_volume: evidence_volume(snapshot.turns.iter().chain(new_turns), hypotheses),
            loop_detected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryCaseStore;
    use crate::adapters::reasoning::SilentReasoningModel;
    use crate::domain::ports::NullRetrievalProvider;

    fn coordinator() -> TurnCoordinator {
        TurnCoordinator::new(
            Arc::new(InMemoryCaseStore::new()),
            Arc::new(NullRetrievalProvider::new()),
            Arc::new(SilentReasoningModel),
            &Config::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_cases_leave_no_lock_entries() {
        let coordinator = coordinator();
        for _ in 0..100 {
            let err = coordinator
                .process_turn(uuid::Uuid::new_v4(), NewTurn::user("anyone there?"))
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::CaseNotFound(_)));
        }
        assert!(coordinator.case_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_turns() {
        let coordinator = coordinator();
        let first = coordinator.create_case("disk full on db-1").await.unwrap();
        let second = coordinator.create_case("queue backlog").await.unwrap();

        let (a, b, c) = tokio::join!(
            coordinator.process_turn(first.id, NewTurn::user("alerts at 03:00")),
            coordinator.process_turn(first.id, NewTurn::user("wal segments piling up")),
            coordinator.process_turn(second.id, NewTurn::user("consumers lagging")),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();
        coordinator
            .process_turn(first.id, NewTurn::user(""))
            .await
            .unwrap_err();

        assert!(coordinator.case_locks.lock().await.is_empty());
    }
}
