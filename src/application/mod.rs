pub mod turn_coordinator;

pub use turn_coordinator::{CoordinatorSettings, TurnCoordinator};
