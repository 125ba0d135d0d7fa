//! Retrieval providers for the warm memory tier.

pub mod lexical;
pub mod unavailable;

pub use lexical::{lexical_similarity, LexicalRetrievalProvider};
pub use unavailable::UnavailableRetrievalProvider;
