//! Embedding providers.
//!
//! The embedding service is an external collaborator: `embed(text)` returns
//! a fixed-length vector and is deterministic for identical input.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{MockProvider, OllamaProvider};
