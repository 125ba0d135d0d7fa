pub mod conclusion_generator;
pub mod confidence_policy;
pub mod context_truncation;
pub mod hypothesis_tracker;
pub mod intensity_controller;
pub mod memory_manager;
pub mod phase_orchestrator;
pub mod prompt_assembly;

pub use conclusion_generator::{ConclusionGenerator, ConclusionInput};
pub use confidence_policy::{ConfidenceAssessment, ConfidencePolicy, RecencyWeightedPolicy};
pub use hypothesis_tracker::{
    ApplyReport, Extraction, HypothesisLedger, HypothesisTracker, TrackerThresholds, UpdateOutcome,
};
pub use intensity_controller::{IntensityController, IntensityThresholds};
pub use memory_manager::{MemoryManager, TierLimits};
pub use phase_orchestrator::{PhaseOrchestrator, PhaseOrchestratorConfig, PhaseSignals};
pub use prompt_assembly::{PromptAssembler, PromptContext};
