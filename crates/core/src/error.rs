//! Error types for Verity.
//!
//! This module defines a unified error enum covering configuration, I/O,
//! storage and the collaborator failure modes of the verification pipeline.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for Verity.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic: errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge base, chunking and ingestion errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Vector index and snapshot storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An external collaborator exceeded its deadline
    #[error("{service} timed out after {timeout:?}")]
    CollaboratorTimeout {
        service: &'static str,
        timeout: Duration,
    },

    /// An external collaborator was reachable but returned an error
    #[error("{service} failed: {message}")]
    CollaboratorFailure {
        service: &'static str,
        message: String,
    },

    /// A single chunk could not be embedded
    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    /// Contract violation, e.g. a malformed collaborator response
    #[error("Unrecoverable state: {0}")]
    UnrecoverableState(String),

    /// The query was cancelled by its caller
    #[error("Cancelled")]
    Cancelled,
}

impl AppError {
    /// Build a `CollaboratorFailure` for the named service.
    pub fn collaborator(service: &'static str, message: impl Into<String>) -> Self {
        AppError::CollaboratorFailure {
            service,
            message: message.into(),
        }
    }

    /// Whether the retriever may absorb this error and continue in degraded mode.
    ///
    /// Timeouts, collaborator failures and per-chunk embedding failures are
    /// degradable. Storage faults, contract violations and cancellation are not.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            AppError::CollaboratorTimeout { .. }
                | AppError::CollaboratorFailure { .. }
                | AppError::EmbeddingFailure(_)
                | AppError::Llm(_)
        )
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
