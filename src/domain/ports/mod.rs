//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - CaseStore: persistence of turns, hypotheses, conclusions and phase history
//! - RetrievalProvider: similarity search over prior turns
//! - ReasoningModel: invocation of the external reasoning model
//!
//! The engine depends only on these traits; concrete implementations are
//! injected into the turn coordinator.

pub mod case_store;
pub mod null_retrieval;
pub mod reasoning;
pub mod retrieval;

pub use case_store::{CaseStore, TurnCommit};
pub use null_retrieval::NullRetrievalProvider;
pub use reasoning::ReasoningModel;
pub use retrieval::RetrievalProvider;
