//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across multiple integration
//! test files.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use faultline::adapters::in_memory::InMemoryCaseStore;
use faultline::adapters::reasoning::{ScriptedReasoningModel, ScriptedResponse};
use faultline::domain::models::{CaseId, Config, ModelOutput, Turn, TurnId, TurnRole};
use faultline::domain::ports::{CaseStore, NullRetrievalProvider, RetrievalProvider};
use faultline::TurnCoordinator;
use tempfile::TempDir;

/// Create a temporary test database
///
/// Returns the path to a SQLite database file in a temporary directory.
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("test.db");
    (dir, db_path)
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Turns `1..=contents.len()` of a case with the given contents.
pub fn turns(case_id: CaseId, contents: &[String]) -> Vec<Turn> {
    contents
        .iter()
        .enumerate()
        .map(|(i, content)| Turn {
            case_id,
            ordinal: TurnId(i as u64 + 1),
            role: TurnRole::User,
            content: content.clone(),
            timestamp: Utc::now(),
            evidence: Vec::new(),
        })
        .collect()
}

/// A scripted reply carrying a structured payload.
pub fn structured(text: &str, payload: serde_json::Value) -> ScriptedResponse {
    ScriptedResponse::success(ModelOutput::structured(text, payload))
}

/// Engine wired to an in-memory store.
pub struct Harness {
    pub store: Arc<InMemoryCaseStore>,
    pub reasoning: Arc<ScriptedReasoningModel>,
    pub coordinator: TurnCoordinator,
}

impl Harness {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self::with(responses, Arc::new(NullRetrievalProvider::new()), &Config::default())
    }

    pub fn with(
        responses: Vec<ScriptedResponse>,
        retrieval: Arc<dyn RetrievalProvider>,
        config: &Config,
    ) -> Self {
        let store = Arc::new(InMemoryCaseStore::new());
        let reasoning = Arc::new(ScriptedReasoningModel::new(responses));
        let store_port: Arc<dyn CaseStore> = store.clone();
        let coordinator = TurnCoordinator::new(store_port, retrieval, reasoning.clone(), config);
        Self {
            store,
            reasoning,
            coordinator,
        }
    }
}
