//! Null retrieval provider implementation.
//!
//! Used when no similarity backend is configured but the type system
//! requires a RetrievalProvider implementation.

use async_trait::async_trait;
use std::collections::HashSet;

use super::RetrievalProvider;
use crate::domain::errors::DomainResult;
use crate::domain::models::{CaseId, ScoredTurn, TurnId};

/// A retrieval provider that never finds anything.
///
/// The warm tier stays empty but retrieval is not reported as degraded.
#[derive(Debug, Clone, Default)]
pub struct NullRetrievalProvider;

impl NullRetrievalProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RetrievalProvider for NullRetrievalProvider {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn search(
        &self,
        _case_id: CaseId,
        _query: &str,
        _top_k: usize,
        _excluding: &HashSet<TurnId>,
    ) -> DomainResult<Vec<ScoredTurn>> {
        Ok(Vec::new())
    }
}
