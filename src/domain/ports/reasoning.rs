//! Reasoning model port - interface for the external model invoker.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ModelOutput, ModelRequest};

/// Trait for reasoning model invokers.
///
/// An invocation may fail, stall or return malformed structured output. The
/// caller wraps it in the turn timeout; dropping the future cancels it.
#[async_trait]
pub trait ReasoningModel: Send + Sync {
    /// Model name for logs.
    fn name(&self) -> &'static str;

    /// Run the model on an assembled prompt.
    async fn invoke(&self, request: ModelRequest) -> DomainResult<ModelOutput>;
}
