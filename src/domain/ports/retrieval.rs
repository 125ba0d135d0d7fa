//! Retrieval port - similarity search over prior turns.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CaseId, ScoredTurn, TurnId};

/// Similarity search backend used to fill the warm memory tier.
///
/// Implementations return turns of the given case ordered by descending
/// score, never returning ids in `excluding`. An error marks retrieval as
/// unavailable for the turn; the engine continues without a warm tier.
#[async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Search prior turns of `case_id` similar to `query`.
    async fn search(
        &self,
        case_id: CaseId,
        query: &str,
        top_k: usize,
        excluding: &HashSet<TurnId>,
    ) -> DomainResult<Vec<ScoredTurn>>;
}
