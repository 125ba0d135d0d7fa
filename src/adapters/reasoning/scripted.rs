//! Scripted reasoning models for replays and tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ModelOutput, ModelRequest};
use crate::domain::ports::ReasoningModel;

/// One canned invocation result.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    /// Output returned on success
    pub output: ModelOutput,
    /// Error message if the invocation should fail
    pub error_message: Option<String>,
    /// Simulated latency before answering
    pub delay: Option<Duration>,
}

impl ScriptedResponse {
    pub fn success(output: ModelOutput) -> Self {
        Self {
            output,
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::success(ModelOutput::text(text))
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Answers invocations from a queue of canned responses, in order.
///
/// Once the queue is drained every invocation returns an empty output.
/// Requests are recorded so tests can inspect the assembled prompts.
#[derive(Debug, Default)]
pub struct ScriptedReasoningModel {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedReasoningModel {
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue another response.
    pub async fn push(&self, response: ScriptedResponse) {
        self.responses.lock().await.push_back(response);
    }

    /// Requests received so far, oldest first.
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.responses.lock().await.len()
    }
}

#[async_trait]
impl ReasoningModel for ScriptedReasoningModel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn invoke(&self, request: ModelRequest) -> DomainResult<ModelOutput> {
        self.requests.lock().await.push(request);
        let response = self.responses.lock().await.pop_front().unwrap_or_default();

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        match response.error_message {
            Some(message) => Err(DomainError::ModelInvocationFailed(message)),
            None => Ok(response.output),
        }
    }
}

/// A model that never says anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentReasoningModel;

#[async_trait]
impl ReasoningModel for SilentReasoningModel {
    fn name(&self) -> &'static str {
        "silent"
    }

    async fn invoke(&self, _request: ModelRequest) -> DomainResult<ModelOutput> {
        Ok(ModelOutput::empty())
    }
}
