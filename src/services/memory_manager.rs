//! Memory manager: token-budgeted tiering of prior turns.
//!
//! Prior turns are split into three disjoint tiers for every turn:
//! - Hot: the last `hot_turns` turns, always included even when they alone
//!   exceed the budget (the overflow is reported, not truncated)
//! - Warm: up to `warm_turns` older turns ranked by similarity to the current
//!   query, ties going to the more recent turn
//! - Cold: everything else
//!
//! When hot plus warm exceeds the budget, warm entries are dropped
//! lowest-similarity first. Dropped entries fall back to cold.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::models::{
    CaseId, MemoryConfig, MemoryTierSet, ScoredTurn, TierEntry, Turn, TurnId,
};
use crate::domain::ports::RetrievalProvider;
use crate::services::context_truncation::estimate_tokens;

/// Tier sizes for the memory manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// Number of most recent turns in the hot tier
    pub hot_turns: usize,
    /// Maximum number of warm entries
    pub warm_turns: usize,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            hot_turns: 10,
            warm_turns: 5,
        }
    }
}

impl From<&MemoryConfig> for TierLimits {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            hot_turns: config.hot_turns,
            warm_turns: config.warm_turns,
        }
    }
}

/// Organizes prior turns into memory tiers.
pub struct MemoryManager {
    retrieval: Arc<dyn RetrievalProvider>,
    limits: TierLimits,
}

impl MemoryManager {
    pub fn new(retrieval: Arc<dyn RetrievalProvider>, limits: TierLimits) -> Self {
        Self { retrieval, limits }
    }

    pub fn limits(&self) -> TierLimits {
        self.limits
    }

    /// Tier `turns` (the prior turns of `case_id`) for `query`.
    ///
    /// Never fails: if retrieval is unavailable the warm tier is empty and
    /// `degraded_retrieval` is set on the result.
    pub async fn organize(
        &self,
        case_id: CaseId,
        turns: &[Turn],
        query: &str,
        budget: usize,
    ) -> MemoryTierSet {
        let hot_ids: HashSet<TurnId> = hot_window(turns, self.limits.hot_turns)
            .iter()
            .map(|t| t.ordinal)
            .collect();
        let candidates = if self.limits.warm_turns > 0 {
            match self
                .retrieval
                .search(case_id, query, self.limits.warm_turns, &hot_ids)
                .await
            {
                Ok(candidates) => Ok(candidates),
                Err(e) => {
                    warn!(
                        %case_id,
                        provider = self.retrieval.name(),
                        error = %e,
                        "Retrieval unavailable, continuing without warm tier"
                    );
                    Err(e.to_string())
                }
            }
        } else {
            Ok(Vec::new())
        };

        let tiers = tier_turns(turns, candidates, self.limits, budget);
        debug!(
            %case_id,
            hot = tiers.hot.len(),
            warm = tiers.warm.len(),
            cold = tiers.cold.len(),
            dropped = tiers.dropped_for_budget.len(),
            context_tokens = tiers.context_tokens(),
            budget,
            "Organized memory tiers"
        );
        tiers
    }
}

/// The most recent `hot_turns` turns, oldest first.
fn hot_window(turns: &[Turn], hot_turns: usize) -> Vec<&Turn> {
    let mut sorted: Vec<&Turn> = turns.iter().collect();
    sorted.sort_by_key(|t| t.ordinal);
    let start = sorted.len().saturating_sub(hot_turns);
    sorted.split_off(start)
}

/// Pure tiering over already retrieved candidates.
///
/// `candidates` is the retrieval result, or the retrieval error message.
/// Candidates that are not older prior turns, duplicates, and non-finite
/// scores are ignored.
pub fn tier_turns(
    turns: &[Turn],
    candidates: Result<Vec<ScoredTurn>, String>,
    limits: TierLimits,
    budget: usize,
) -> MemoryTierSet {
    let mut sorted: Vec<&Turn> = turns.iter().collect();
    sorted.sort_by_key(|t| t.ordinal);
    sorted.dedup_by_key(|t| t.ordinal);

    let hot_start = sorted.len().saturating_sub(limits.hot_turns);
    let (older, hot) = sorted.split_at(hot_start);

    let mut tiers = MemoryTierSet::empty(budget);
    tiers.hot = hot
        .iter()
        .map(|t| TierEntry {
            turn: (*t).clone(),
            tokens: estimate_tokens(&t.content),
            score: None,
        })
        .collect();

    let older_by_id: HashMap<TurnId, &Turn> = older.iter().map(|t| (t.ordinal, *t)).collect();

    let candidates = match candidates {
        Ok(candidates) => candidates,
        Err(message) => {
            tiers.degraded_retrieval = Some(message);
            Vec::new()
        }
    };

    let mut best: HashMap<TurnId, f64> = HashMap::new();
    for candidate in candidates {
        let id = candidate.turn.ordinal;
        if !candidate.score.is_finite() || !older_by_id.contains_key(&id) {
            continue;
        }
        best.entry(id)
            .and_modify(|s| *s = s.max(candidate.score))
            .or_insert(candidate.score);
    }

    let mut ranked: Vec<(TurnId, f64)> = best.into_iter().collect();
    ranked.sort_by(|a, b| rank_order(*a, *b));
    ranked.truncate(limits.warm_turns);

    tiers.warm = ranked
        .into_iter()
        .filter_map(|(id, score)| {
            older_by_id.get(&id).map(|t| TierEntry {
                turn: (*t).clone(),
                tokens: estimate_tokens(&t.content),
                score: Some(score),
            })
        })
        .collect();

    if tiers.hot_over_budget() {
        tiers.dropped_for_budget = tiers.warm.drain(..).rev().map(|e| e.id()).collect();
    } else {
        while tiers.context_tokens() > budget {
            match tiers.warm.pop() {
                Some(entry) => tiers.dropped_for_budget.push(entry.id()),
                None => break,
            }
        }
    }

    let warm_ids: HashSet<TurnId> = tiers.warm.iter().map(TierEntry::id).collect();
    tiers.cold = older
        .iter()
        .map(|t| t.ordinal)
        .filter(|id| !warm_ids.contains(id))
        .collect();

    tiers
}

/// Higher score first, then more recent first.
fn rank_order(a: (TurnId, f64), b: (TurnId, f64)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0))
}
