//! Adapters implementing the domain ports.

pub mod in_memory;
pub mod reasoning;
pub mod retrieval;
pub mod sqlite;
