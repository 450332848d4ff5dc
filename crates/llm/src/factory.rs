//! LLM provider factory.
//!
//! Resolves a provider name from configuration into a shared client.

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use std::sync::Arc;
use verity_core::{AppError, AppResult};

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier (currently only "ollama")
/// * `endpoint` - Optional custom endpoint URL
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown.
pub fn create_client(provider: &str, endpoint: Option<&str>) -> AppResult<Arc<dyn LlmClient>> {
    match provider.to_lowercase().as_str() {
        "ollama" => {
            let client = match endpoint {
                Some(url) => OllamaClient::with_base_url(url),
                None => OllamaClient::new(),
            };
            tracing::debug!(provider = "ollama", "Created reasoning client");
            Ok(Arc::new(client))
        }
        other => Err(AppError::Config(format!("Unknown LLM provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", None).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_provider_name_is_case_insensitive() {
        assert!(create_client("Ollama", Some("http://localhost:8080")).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("gguf-local", None) {
            Err(AppError::Config(msg)) => assert!(msg.contains("Unknown LLM provider")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
