//! Faultline - Investigation Orchestration Engine
//!
//! Faultline sits between a user and a reasoning model during an
//! investigation. For every turn it decides which history the model sees,
//! tracks candidate causes through their lifecycle, keeps a working
//! conclusion with a calibrated confidence tier, moves the case through
//! investigation phases and picks how much effort the next step deserves.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, errors and the ports the engine needs
//! - **Service Layer** (`services`): Memory tiering, hypothesis tracking,
//!   conclusions, phase orchestration, intensity control and prompt assembly
//! - **Application Layer** (`application`): The turn coordinator
//! - **Adapters** (`adapters`): SQLite and in-memory case stores, retrieval
//!   providers and scripted reasoning models
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use faultline::adapters::sqlite::{initialize_default_database, SqliteCaseStore};
//! use faultline::adapters::retrieval::LexicalRetrievalProvider;
//! use faultline::adapters::reasoning::SilentReasoningModel;
//! use faultline::{Config, NewTurn, TurnCoordinator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(SqliteCaseStore::new(initialize_default_database().await?));
//!     let coordinator = TurnCoordinator::new(
//!         store.clone(),
//!         Arc::new(LexicalRetrievalProvider::new(store)),
//!         Arc::new(SilentReasoningModel),
//!         &Config::default(),
//!     );
//!     let case = coordinator.create_case("Nightly backup job hangs").await?;
//!     let plan = coordinator.process_turn(case.id, NewTurn::user("It stalls at 80%")).await?;
//!     println!("{} ({})", plan.conclusion.text, plan.phase.current);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{CoordinatorSettings, TurnCoordinator};
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Case, CaseId, CaseSnapshot, ConfidenceTier, Config, Hypothesis, HypothesisStatus,
    IntensityLevel, InvestigationPhase, MemoryTierSet, NewTurn, Turn, TurnCondition, TurnId,
    TurnPlan, TurnRole, WorkingConclusion,
};
pub use domain::ports::{CaseStore, ReasoningModel, RetrievalProvider};
pub use infrastructure::config::{ConfigError, ConfigLoader};
