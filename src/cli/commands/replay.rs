//! Replay command: run a scripted investigation against an in-memory store.
//!
//! A replay script is a YAML document listing the turns of one case together
//! with the reasoning model's reply to each of them:
//!
//! ```yaml
//! title: API returns 502 after deploy
//! retrieval: lexical
//! steps:
//!   - content: Checkout started failing at 14:00
//!     evidence: [logs/api.log]
//!     model:
//!       text: The upstream pool may be exhausted.
//!       structured:
//!         hypotheses:
//!           - statement: upstream connection pool exhausted
//! ```

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::in_memory::InMemoryCaseStore;
use crate::adapters::reasoning::{ScriptedReasoningModel, ScriptedResponse};
use crate::adapters::retrieval::{LexicalRetrievalProvider, UnavailableRetrievalProvider};
use crate::application::TurnCoordinator;
use crate::cli::commands::case::PlanOutput;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, ModelOutput, NewTurn, TurnPlan, TurnRole};
use crate::domain::ports::{CaseStore, NullRetrievalProvider, RetrievalProvider};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Path to the replay script (YAML)
    pub script: PathBuf,

    /// Stop at the first turn that fails instead of reporting and continuing
    #[arg(long)]
    pub fail_fast: bool,
}

/// Which retrieval backend the replay runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    #[default]
    Lexical,
    Null,
    Unavailable,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedModel {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub structured: Option<serde_json::Value>,
    /// Fail the invocation with this message
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl ScriptedModel {
    fn into_response(self) -> ScriptedResponse {
        let response = match (self.fail, self.structured) {
            (Some(message), _) => ScriptedResponse::failure(message),
            (None, Some(value)) => ScriptedResponse::success(ModelOutput::structured(
                self.text.unwrap_or_default(),
                value,
            )),
            (None, None) => ScriptedResponse::success(ModelOutput::text(self.text.unwrap_or_default())),
        };
        match self.delay_ms {
            Some(ms) => response.with_delay(Duration::from_millis(ms)),
            None => response,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayStep {
    pub content: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub model: ScriptedModel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    pub title: String,
    #[serde(default)]
    pub retrieval: RetrievalMode,
    pub steps: Vec<ReplayStep>,
}

impl ReplayScript {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid replay script {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let script: Self = serde_yaml::from_str(content)?;
        if script.steps.is_empty() {
            anyhow::bail!("replay script has no steps");
        }
        for (index, step) in script.steps.iter().enumerate() {
            if let Some(role) = &step.role {
                if TurnRole::from_str(role).is_none() {
                    anyhow::bail!("step {}: invalid role '{role}'", index + 1);
                }
            }
        }
        Ok(script)
    }
}

/// Outcome of one scripted step.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Planned { plan: Box<TurnPlan> },
    Failed { step: usize, error: String },
}

#[derive(Debug, Serialize)]
pub struct ReplayOutput {
    pub title: String,
    pub case_id: String,
    pub steps: Vec<StepOutcome>,
}

impl CommandOutput for ReplayOutput {
    fn to_human(&self) -> String {
        let mut sections = vec![format!("Replay: {} ({})", self.title, self.case_id)];
        for outcome in &self.steps {
            match outcome {
                StepOutcome::Planned { plan } => {
                    let rendered = PlanOutput { plan: plan.as_ref().clone() }.to_human();
                    sections.push(format!("\n{rendered}"));
                }
                StepOutcome::Failed { step, error } => {
                    sections.push(format!("\nStep {step} failed: {error}"));
                }
            }
        }
        sections.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Run every step of `script` against a fresh in-memory case.
pub async fn run_script(script: ReplayScript, config: &Config, fail_fast: bool) -> Result<ReplayOutput> {
    let store: Arc<dyn CaseStore> = Arc::new(InMemoryCaseStore::new());
    let retrieval: Arc<dyn RetrievalProvider> = match script.retrieval {
        RetrievalMode::Lexical => Arc::new(LexicalRetrievalProvider::new(Arc::clone(&store))),
        RetrievalMode::Null => Arc::new(NullRetrievalProvider::new()),
        RetrievalMode::Unavailable => Arc::new(UnavailableRetrievalProvider::default()),
    };

    let mut turns = Vec::with_capacity(script.steps.len());
    let mut responses = Vec::with_capacity(script.steps.len());
    for step in script.steps {
        let role = step
            .role
            .as_deref()
            .and_then(TurnRole::from_str)
            .unwrap_or_default();
        let mut turn = NewTurn::user(step.content).with_role(role);
        for reference in step.evidence {
            turn = turn.with_evidence(reference);
        }
        turns.push(turn);
        responses.push(step.model.into_response());
    }

    let reasoning = Arc::new(ScriptedReasoningModel::new(responses));
    let coordinator = TurnCoordinator::new(store, retrieval, reasoning, config);
    let case = coordinator.create_case(&script.title).await?;
    tracing::info!(case_id = %case.id, steps = turns.len(), "starting replay");

    let mut steps = Vec::with_capacity(turns.len());
    for (index, turn) in turns.into_iter().enumerate() {
        match coordinator.process_turn(case.id, turn).await {
            Ok(plan) => steps.push(StepOutcome::Planned { plan: Box::new(plan) }),
            Err(err) if !fail_fast => {
                tracing::warn!(step = index + 1, error = %err, "replay step failed");
                steps.push(StepOutcome::Failed { step: index + 1, error: err.to_string() });
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Replay step {} failed", index + 1));
            }
        }
    }

    Ok(ReplayOutput {
        title: case.title,
        case_id: case.id.to_string(),
        steps,
    })
}

pub async fn execute(args: ReplayArgs, config: &Config, json_mode: bool) -> Result<()> {
    let script = ReplayScript::from_file(&args.script)?;
    let out = run_script(script, config, args.fail_fast).await?;
    output(&out, json_mode);
    Ok(())
}
