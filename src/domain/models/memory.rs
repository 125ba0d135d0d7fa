//! Memory tier domain model.
//!
//! Three tiers partition the prior turns of a case for one turn:
//! - Hot: the most recent turns, always included verbatim
//! - Warm: older turns similar to the current query
//! - Cold: everything else, kept in the turn log but not shown to the model

use serde::{Deserialize, Serialize};

use super::turn::{Turn, TurnId};

/// Memory tier classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTier {
    Hot,
    Warm,
    Cold,
}

impl MemoryTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

/// A turn returned by a retrieval provider with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTurn {
    pub turn: Turn,
    pub score: f64,
}

/// A turn selected into the hot or warm tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierEntry {
    pub turn: Turn,
    /// Estimated token cost of the turn content
    pub tokens: usize,
    /// Similarity score (warm entries only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl TierEntry {
    pub fn id(&self) -> TurnId {
        self.turn.ordinal
    }
}

/// Per-turn partition of prior turns. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTierSet {
    /// Most recent turns, oldest first
    pub hot: Vec<TierEntry>,
    /// Relevant older turns, most similar first
    pub warm: Vec<TierEntry>,
    /// Everything else, by ordinal
    pub cold: Vec<TurnId>,
    /// Token budget the tiers were organized against
    pub budget: usize,
    /// Warm candidates dropped to fit the budget, lowest similarity first
    #[serde(default)]
    pub dropped_for_budget: Vec<TurnId>,
    /// Set when retrieval failed and the warm tier was left empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_retrieval: Option<String>,
}

impl MemoryTierSet {
    pub fn empty(budget: usize) -> Self {
        Self {
            hot: Vec::new(),
            warm: Vec::new(),
            cold: Vec::new(),
            budget,
            dropped_for_budget: Vec::new(),
            degraded_retrieval: None,
        }
    }

    pub fn hot_ids(&self) -> Vec<TurnId> {
        self.hot.iter().map(TierEntry::id).collect()
    }

    pub fn warm_ids(&self) -> Vec<TurnId> {
        self.warm.iter().map(TierEntry::id).collect()
    }

    pub fn hot_tokens(&self) -> usize {
        self.hot.iter().map(|e| e.tokens).sum()
    }

    pub fn warm_tokens(&self) -> usize {
        self.warm.iter().map(|e| e.tokens).sum()
    }

    /// Tokens of everything sent to the model.
    pub fn context_tokens(&self) -> usize {
        self.hot_tokens() + self.warm_tokens()
    }

    /// Whether the hot tier alone exceeds the budget.
    pub fn hot_over_budget(&self) -> bool {
        self.hot_tokens() > self.budget
    }

    /// Total number of prior turns covered by the three tiers.
    pub fn total_turns(&self) -> usize {
        self.hot.len() + self.warm.len() + self.cold.len()
    }

    /// Tier a turn landed in, if it is a prior turn of this set.
    pub fn tier_of(&self, id: TurnId) -> Option<MemoryTier> {
        if self.hot.iter().any(|e| e.id() == id) {
            Some(MemoryTier::Hot)
        } else if self.warm.iter().any(|e| e.id() == id) {
            Some(MemoryTier::Warm)
        } else if self.cold.contains(&id) {
            Some(MemoryTier::Cold)
        } else {
            None
        }
    }
}
