//! Case CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapters::reasoning::{ScriptedReasoningModel, ScriptedResponse, SilentReasoningModel};
use crate::adapters::retrieval::LexicalRetrievalProvider;
use crate::application::TurnCoordinator;
use crate::cli::output::{list_table, output, render_list, short_id, truncate, CommandOutput};
use crate::cli::resolve_case_id;
use crate::domain::models::{
    Case, CaseSnapshot, Config, Hypothesis, ModelOutput, NewTurn, PhaseTransition, TurnPlan,
    TurnRole, WorkingConclusion,
};
use crate::domain::ports::{CaseStore, ReasoningModel};

#[derive(Args, Debug)]
pub struct CaseArgs {
    #[command(subcommand)]
    pub command: CaseCommands,
}

#[derive(Subcommand, Debug)]
pub enum CaseCommands {
    /// Open a new case
    Open {
        /// Short description of the problem
        title: String,
    },
    /// List cases, most recently active first
    List,
    /// Submit a turn to a case
    Turn {
        /// Case ID or unique prefix
        id: String,
        /// Turn content
        content: String,
        /// Who produced the turn (user, assistant, system)
        #[arg(short, long, default_value = "user")]
        role: String,
        /// Evidence references to attach (repeatable)
        #[arg(short, long)]
        evidence: Vec<String>,
        /// File holding the reasoning model's reply for this turn
        #[arg(short, long)]
        model_output: Option<PathBuf>,
    },
    /// Show the current state of a case
    Show {
        /// Case ID or unique prefix
        id: String,
        /// Also list every past conclusion
        #[arg(long)]
        history: bool,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct CaseOutput {
    pub id: String,
    pub title: String,
    pub version: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Case> for CaseOutput {
    fn from(case: &Case) -> Self {
        Self {
            id: case.id.to_string(),
            title: case.title.clone(),
            version: case.version,
            created_at: case.created_at.to_rfc3339(),
            updated_at: case.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CaseActionOutput {
    pub success: bool,
    pub message: String,
    pub case: CaseOutput,
}

impl CommandOutput for CaseActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CaseListOutput {
    pub cases: Vec<CaseOutput>,
    pub total: usize,
}

impl CommandOutput for CaseListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "title", "version", "updated"]);
        for case in &self.cases {
            table.add_row(vec![
                case.id.chars().take(8).collect::<String>(),
                truncate(&case.title, 40),
                case.version.to_string(),
                case.updated_at.chars().take(19).collect::<String>(),
            ]);
        }
        render_list("case", &table, self.total)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// One processed turn, as printed by `case turn` and `replay`.
#[derive(Debug, serde::Serialize)]
pub struct PlanOutput {
    pub plan: TurnPlan,
}

impl CommandOutput for PlanOutput {
    fn to_human(&self) -> String {
        let plan = &self.plan;
        let mut lines = vec![
            format!("Turn {} of case {}", plan.turn.value(), short_id(&plan.case_id)),
            format!(
                "Phase: {}{}",
                plan.phase.current,
                if plan.phase.looped_back { " (looped back)" } else { "" }
            ),
            format!(
                "Intensity: {}{}",
                plan.intensity.level,
                if plan.intensity.reasons.is_empty() {
                    String::new()
                } else {
                    format!(" ({} reason(s))", plan.intensity.reasons.len())
                }
            ),
            format!(
                "Memory: {} hot, {} warm, {} cold, {}/{} tokens",
                plan.memory.hot.len(),
                plan.memory.warm.len(),
                plan.memory.cold.len(),
                plan.memory.context_tokens(),
                plan.memory.budget
            ),
        ];

        for transition in &plan.phase.transitions {
            lines.push(format!(
                "  {} -> {}: {}",
                transition.from, transition.to, transition.reason
            ));
        }

        lines.push(String::new());
        lines.push(format!("Conclusion ({} confidence):", plan.conclusion.confidence_tier));
        lines.push(format!("  {}", plan.conclusion.text));
        for step in &plan.conclusion.next_steps {
            lines.push(format!("  - {step}"));
        }

        if !plan.hypotheses.is_empty() {
            lines.push(String::new());
            lines.push(hypothesis_table(&plan.hypotheses));
        }

        if !plan.conditions.is_empty() {
            lines.push(String::new());
            lines.push("Conditions:".to_string());
            for condition in &plan.conditions {
                lines.push(format!("  ! {}", condition.as_str()));
            }
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.plan).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CaseDetailOutput {
    pub case: CaseOutput,
    pub phase: String,
    pub turns_in_phase: u32,
    pub loop_backs: u32,
    pub turns: usize,
    pub hypotheses: Vec<Hypothesis>,
    pub conclusion: Option<WorkingConclusion>,
    pub transitions: Vec<PhaseTransition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<WorkingConclusion>>,
}

impl CaseDetailOutput {
    fn new(
        snapshot: CaseSnapshot,
        transitions: Vec<PhaseTransition>,
        history: Option<Vec<WorkingConclusion>>,
    ) -> Self {
        Self {
            case: CaseOutput::from(&snapshot.case),
            phase: snapshot.phase.current.to_string(),
            turns_in_phase: snapshot.phase.turns_in_phase,
            loop_backs: snapshot.phase.loop_backs,
            turns: snapshot.turns.len(),
            hypotheses: snapshot.hypotheses,
            conclusion: snapshot.conclusion,
            transitions,
            history,
        }
    }
}

impl CommandOutput for CaseDetailOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Case: {}", self.case.title),
            format!("ID: {}", self.case.id),
            format!("Phase: {} ({} turn(s) in phase, {} loop-back(s))", self.phase, self.turns_in_phase, self.loop_backs),
            format!("Turns: {}", self.turns),
            format!("Version: {}", self.case.version),
        ];

        match &self.conclusion {
            Some(conclusion) => {
                lines.push(format!("\nConclusion ({} confidence):", conclusion.confidence_tier));
                lines.push(format!("  {}", conclusion.text));
                for step in &conclusion.next_steps {
                    lines.push(format!("  - {step}"));
                }
            }
            None => lines.push("\nNo turns processed yet.".to_string()),
        }

        if !self.hypotheses.is_empty() {
            lines.push(String::new());
            lines.push(hypothesis_table(&self.hypotheses));
        }

        if !self.transitions.is_empty() {
            lines.push("\nTransitions:".to_string());
            for t in &self.transitions {
                lines.push(format!("  turn {}: {} -> {} ({})", t.turn.value(), t.from, t.to, t.reason));
            }
        }

        if let Some(history) = &self.history {
            lines.push("\nConclusion history:".to_string());
            for c in history {
                lines.push(format!("  turn {} [{}] {}", c.turn.value(), c.confidence_tier, truncate(&c.text, 80)));
            }
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub(crate) fn hypothesis_table(hypotheses: &[Hypothesis]) -> String {
    let mut table = list_table(&["id", "status", "confidence", "+/-", "statement"]);
    for h in hypotheses {
        table.add_row(vec![
            short_id(&h.id),
            h.status().to_string(),
            format!("{:.2}", h.confidence),
            format!("{}/{}", h.supporting.len(), h.contradicting.len()),
            truncate(&h.statement, 60),
        ]);
    }
    let noun = if hypotheses.len() == 1 { "hypothesis" } else { "hypotheses" };
    format!("{} {noun}:\n{table}", hypotheses.len())
}

pub async fn execute(args: CaseArgs, config: &Config, json_mode: bool) -> Result<()> {
    let store = crate::cli::open_store(config).await?;
    let store_port: Arc<dyn CaseStore> = store.clone();

    match args.command {
        CaseCommands::Open { title } => {
            let coordinator = coordinator(store_port, Arc::new(SilentReasoningModel), config);
            let case = coordinator.create_case(&title).await?;
            let out = CaseActionOutput {
                success: true,
                message: format!("Case opened: {}", case.id),
                case: CaseOutput::from(&case),
            };
            output(&out, json_mode);
        }

        CaseCommands::List => {
            let cases = store.list_cases().await.context("Failed to list cases")?;
            let out = CaseListOutput {
                total: cases.len(),
                cases: cases.iter().map(CaseOutput::from).collect(),
            };
            output(&out, json_mode);
        }

        CaseCommands::Turn { id, content, role, evidence, model_output } => {
            let case_id = resolve_case_id(store.as_ref(), &id).await?;
            let role = TurnRole::from_str(&role)
                .ok_or_else(|| anyhow::anyhow!("Invalid role: {role}"))?;

            let reasoning: Arc<dyn ReasoningModel> = match model_output {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read model output from {}", path.display()))?;
                    Arc::new(ScriptedReasoningModel::new([ScriptedResponse::success(
                        ModelOutput::text(text),
                    )]))
                }
                None => Arc::new(SilentReasoningModel),
            };

            let mut new_turn = NewTurn::user(content).with_role(role);
            for reference in evidence {
                new_turn = new_turn.with_evidence(reference);
            }

            let plan = coordinator(store_port, reasoning, config)
                .process_turn(case_id, new_turn)
                .await
                .context("Failed to process turn")?;
            output(&PlanOutput { plan }, json_mode);
        }

        CaseCommands::Show { id, history } => {
            let case_id = resolve_case_id(store.as_ref(), &id).await?;
            let snapshot = store
                .load_snapshot(case_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Case not found: {id}"))?;
            let transitions = store.list_transitions(case_id).await?;
            let history = if history {
                Some(store.conclusion_history(case_id).await?)
            } else {
                None
            };
            output(&CaseDetailOutput::new(snapshot, transitions, history), json_mode);
        }
    }

    Ok(())
}

fn coordinator(store: Arc<dyn CaseStore>, reasoning: Arc<dyn ReasoningModel>, config: &Config) -> TurnCoordinator {
    let retrieval = Arc::new(LexicalRetrievalProvider::new(Arc::clone(&store)));
    TurnCoordinator::new(store, retrieval, reasoning, config)
}
