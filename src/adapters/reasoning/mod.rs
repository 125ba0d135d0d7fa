//! Reasoning model adapters that run without a network backend.

pub mod scripted;

pub use scripted::{ScriptedReasoningModel, ScriptedResponse, SilentReasoningModel};
