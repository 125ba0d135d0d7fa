//! Domain layer for the Faultline investigation engine
//!
//! This module contains the core models, errors and the port traits the
//! engine requires from its external collaborators.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
