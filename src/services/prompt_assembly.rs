//! Prompt assembly for the reasoning model.
//!
//! Renders the tiered memory, the hypothesis snapshot and the current
//! conclusion into a [`ModelRequest`]. Rejected hypotheses get their own
//! "ruled out" section so the model does not propose them again.

use crate::domain::models::{
    CaseId, Hypothesis, IntensityLevel, InvestigationPhase, MemoryTierSet, ModelRequest,
    TierEntry, Turn, WorkingConclusion,
};
use crate::services::context_truncation::{estimate_tokens, truncate_to_token_budget};

/// Cap on how much of a single turn is rendered into the prompt.
const DEFAULT_MAX_TURN_TOKENS: usize = 2_000;

const OUTPUT_CONTRACT: &str = r#"After your reply, you may append one fenced ```json block with any of:
{
  "problem_statement": "one sentence describing the problem",
  "hypotheses": [{"statement": "candidate root cause", "rationale": "why"}],
  "evidence": [{"hypothesis": "<id or statement>", "outcome": "supports|contradicts|inconclusive", "reference": "<evidence reference>", "note": "optional"}],
  "disconfirmed": ["<id or statement the user ruled out>"],
  "solution": {"hypothesis": "<id or statement, optional>", "description": "proposed fix"}
}"#;

/// Everything rendered into one prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub case_id: CaseId,
    /// The submitted turn
    pub turn: &'a Turn,
    pub memory: &'a MemoryTierSet,
    pub hypotheses: &'a [Hypothesis],
    /// Conclusion from the previous turn
    pub conclusion: Option<&'a WorkingConclusion>,
    pub phase: InvestigationPhase,
    /// Intensity declared for the previous turn
    pub intensity: IntensityLevel,
}

#[derive(Debug, Clone, Copy)]
pub struct PromptAssembler {
    max_turn_tokens: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            max_turn_tokens: DEFAULT_MAX_TURN_TOKENS,
        }
    }
}

impl PromptAssembler {
    pub fn new(max_turn_tokens: usize) -> Self {
        Self { max_turn_tokens }
    }

    pub fn assemble(&self, ctx: PromptContext<'_>) -> ModelRequest {
        let system_prompt = system_prompt(ctx.phase, ctx.intensity);
        let mut prompt = String::new();

        if let Some(conclusion) = ctx.conclusion {
            prompt.push_str(&format!("## Working conclusion ({} confidence)\n", conclusion.confidence_tier));
            prompt.push_str(&format!("{}\n", conclusion.text));
            for step in &conclusion.next_steps {
                prompt.push_str(&format!("- next: {step}\n"));
            }
            prompt.push('\n');
        }

        let (live, ruled_out): (Vec<&Hypothesis>, Vec<&Hypothesis>) =
            ctx.hypotheses.iter().partition(|h| !h.is_rejected());
        if !live.is_empty() {
            prompt.push_str("## Candidate causes\n");
            for h in live {
                prompt.push_str(&format!(
                    "- [{}] {} ({}, confidence {:.2}, {} supporting, {} contradicting)\n",
                    h.id,
                    h.statement,
                    h.status(),
                    h.confidence,
                    h.supporting.len(),
                    h.contradicting.len()
                ));
            }
            prompt.push('\n');
        }
        if !ruled_out.is_empty() {
            prompt.push_str("## Ruled out (do not propose again)\n");
            for h in ruled_out {
                prompt.push_str(&format!("- {}\n", h.statement));
            }
            prompt.push('\n');
        }

        if !ctx.memory.warm.is_empty() {
            prompt.push_str("## Relevant earlier turns\n");
            for entry in &ctx.memory.warm {
                self.render_turn(&mut prompt, entry);
            }
            prompt.push('\n');
        }
        if !ctx.memory.hot.is_empty() {
            prompt.push_str("## Recent conversation\n");
            for entry in &ctx.memory.hot {
                self.render_turn(&mut prompt, entry);
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("## New {} turn {}\n", ctx.turn.role.as_str(), ctx.turn.ordinal));
        prompt.push_str(&truncate_to_token_budget(&ctx.turn.content, self.max_turn_tokens));
        prompt.push('\n');
        if !ctx.turn.evidence.is_empty() {
            let refs: Vec<&str> = ctx.turn.evidence.iter().map(|r| r.as_str()).collect();
            prompt.push_str(&format!("Evidence attached: {}\n", refs.join(", ")));
        }

        let estimated_tokens = estimate_tokens(&system_prompt) + estimate_tokens(&prompt);
        ModelRequest {
            case_id: ctx.case_id,
            turn: ctx.turn.ordinal,
            phase: ctx.phase,
            system_prompt,
            prompt,
            estimated_tokens,
        }
    }

    fn render_turn(&self, prompt: &mut String, entry: &TierEntry) {
        let turn = &entry.turn;
        prompt.push_str(&format!(
            "[turn {} {}] {}\n",
            turn.ordinal.value(),
            turn.role.as_str(),
            truncate_to_token_budget(&turn.content, self.max_turn_tokens)
        ));
    }
}

fn system_prompt(phase: InvestigationPhase, intensity: IntensityLevel) -> String {
    let focus = match phase {
        InvestigationPhase::Consulting => {
            "Understand the problem: ask about symptoms, scope, timing and recent changes."
        }
        InvestigationPhase::Diagnosing => {
            "Propose candidate root causes and say what evidence would confirm or rule out each."
        }
        InvestigationPhase::Analyzing => {
            "Weigh the evidence against each candidate cause and state which it supports or contradicts."
        }
        InvestigationPhase::Resolved => {
            "A cause is validated. Help apply and verify the fix; reopen the analysis if new evidence contradicts it."
        }
    };
    let depth = match intensity {
        IntensityLevel::Light => "Keep the reply short.",
        IntensityLevel::Medium => "Progress has slowed; reason step by step before answering.",
        IntensityLevel::Full => {
            "The investigation is stuck; reconsider earlier assumptions and look for causes not yet considered."
        }
    };
    format!(
        "You are a troubleshooting assistant running a structured investigation.\n\
         Current phase: {phase}. {focus}\n{depth}\n\n{OUTPUT_CONTRACT}"
    )
}
