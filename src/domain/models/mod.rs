pub mod case;
pub mod conclusion;
pub mod config;
pub mod hypothesis;
pub mod intensity;
pub mod memory;
pub mod model_output;
pub mod phase;
pub mod turn;
pub mod turn_plan;

pub use case::{Case, CaseSnapshot};
pub use conclusion::{ConfidenceTier, WorkingConclusion, HIGH_CONFIDENCE, MEDIUM_CONFIDENCE};
pub use config::{
    Config, DatabaseConfig, HypothesisConfig, IntensityConfig, LoggingConfig, MemoryConfig,
    PhaseConfig, TurnConfig,
};
pub use hypothesis::{
    normalize_statement, Evidence, EvidenceStance, Hypothesis, HypothesisId, HypothesisState,
    HypothesisStatus, RejectionReason,
};
pub use intensity::{
    IntensityDecision, IntensityLevel, IntensityProfile, IntensityReason, IntensitySignals,
};
pub use memory::{MemoryTier, MemoryTierSet, ScoredTurn, TierEntry};
pub use model_output::{ModelOutput, ModelRequest, StructuredPayload};
pub use phase::{
    InvestigationPhase, LoopSignal, PhaseHistory, PhaseState, PhaseTransition, TransitionKind,
    DEFAULT_HISTORY_CAPACITY,
};
pub use turn::{CaseId, EvidenceRef, NewTurn, Turn, TurnId, TurnRole};
pub use turn_plan::{PhaseReport, TurnCondition, TurnPlan};
