//! Retrieval provider that always fails.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CaseId, ScoredTurn, TurnId};
use crate::domain::ports::RetrievalProvider;

/// Stands in for a similarity backend that is down. Every search errors, so
/// turns run in degraded mode with an empty warm tier.
#[derive(Debug, Clone)]
pub struct UnavailableRetrievalProvider {
    reason: String,
}

impl UnavailableRetrievalProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl Default for UnavailableRetrievalProvider {
    fn default() -> Self {
        Self::new("similarity backend offline")
    }
}

#[async_trait]
impl RetrievalProvider for UnavailableRetrievalProvider {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn search(
        &self,
        _case_id: CaseId,
        _query: &str,
        _top_k: usize,
        _excluding: &HashSet<TurnId>,
    ) -> DomainResult<Vec<ScoredTurn>> {
        Err(DomainError::RetrievalUnavailable(self.reason.clone()))
    }
}
