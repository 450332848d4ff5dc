//! Configuration management for Verity.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (.verity/config.yaml)
//! - Environment variables
//! - Command-line flags
//!
//! The configuration is workspace-centric, with index state stored in `.verity/`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .verity/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Reasoning LLM provider (e.g., "ollama")
    pub provider: String,

    /// Reasoning model identifier
    pub model: String,

    /// API key for the LLM provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Embedding service settings
    pub embedding: EmbeddingSettings,

    /// Web search service settings
    pub web_search: WebSearchSettings,

    /// Hybrid retrieval and chunking settings
    pub retrieval: RetrievalSettings,

    /// Orchestrator retry policy
    pub pipeline: PipelineSettings,

    /// Per-collaborator deadlines
    pub timeouts: TimeoutSettings,

    /// Vector index persistence
    pub index: IndexSettings,
}

/// LLM configuration from config.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    Ollama {
        endpoint: String,
        model: String,
    },
}

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// Provider name: "mock" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Fixed vector dimension
    pub dimensions: usize,

    /// Optional endpoint override
    pub endpoint: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Web search service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebSearchSettings {
    /// Provider name: "tavily" or "disabled"
    pub provider: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Optional endpoint override
    pub endpoint: Option<String>,

    /// Results requested per web search call
    pub max_results: usize,
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            provider: "tavily".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
            endpoint: None,
            max_results: 3,
        }
    }
}

/// Hybrid retrieval and chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalSettings {
    /// Documents requested from the local index per query
    pub top_k: usize,

    /// Minimum similarity for a local document to count as relevant
    pub min_relevance: f32,

    /// Relevant local documents needed to skip the web
    pub min_local_docs: usize,

    /// Mean relevant score needed to skip the web
    pub web_search_threshold: f32,

    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_relevance: 0.2,
            min_local_docs: 2,
            web_search_threshold: 0.6,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Orchestrator retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Extra retrieval rounds allowed after an INSUFFICIENT verdict
    pub max_retrieve_attempts: u32,

    /// Extra synthesis rounds allowed after a safety rejection
    pub max_answer_attempts: u32,

    /// Restrict citations to web evidence when the search was hybrid
    pub prefer_web_citations_for_hybrid: bool,

    /// Append the standard disclaimer to released answers
    pub append_disclaimer: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_retrieve_attempts: 1,
            max_answer_attempts: 1,
            prefer_web_citations_for_hybrid: true,
            append_disclaimer: true,
        }
    }
}

/// Per-collaborator deadlines, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutSettings {
    pub embedding_secs: u64,
    pub web_search_secs: u64,
    pub reasoning_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            embedding_secs: 10,
            web_search_secs: 15,
            reasoning_secs: 60,
        }
    }
}

impl TimeoutSettings {
    pub fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_secs)
    }

    pub fn web_search(&self) -> Duration {
        Duration::from_secs(self.web_search_secs)
    }

    pub fn reasoning(&self) -> Duration {
        Duration::from_secs(self.reasoning_secs)
    }
}

/// Vector index persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexSettings {
    /// Snapshot file, relative to `.verity/` unless absolute
    pub snapshot: PathBuf,

    /// Seconds between background flushes (0 disables)
    pub flush_interval_secs: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from("index.sqlite"),
            flush_interval_secs: 300,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    embedding: Option<EmbeddingSettings>,
    web_search: Option<WebSearchSettings>,
    retrieval: Option<RetrievalSettings>,
    pipeline: Option<PipelineSettings>,
    timeouts: Option<TimeoutSettings>,
    index: Option<IndexSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: None,
            embedding: EmbeddingSettings::default(),
            web_search: WebSearchSettings::default(),
            retrieval: RetrievalSettings::default(),
            pipeline: PipelineSettings::default(),
            timeouts: TimeoutSettings::default(),
            index: IndexSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `VERITY_WORKSPACE`: Override workspace path
    /// - `VERITY_CONFIG`: Path to config file
    /// - `VERITY_PROVIDER`: LLM provider
    /// - `VERITY_MODEL`: Model identifier
    /// - `VERITY_API_KEY`: API key
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use verity_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("VERITY_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("VERITY_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = if let Some(ref cf) = config.config_file {
            cf.clone()
        } else {
            config.workspace.join(".verity/config.yaml")
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(provider) = std::env::var("VERITY_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("VERITY_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("VERITY_API_KEY").ok();
        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge YAML configuration file into this config.
    pub fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        tracing::debug!("Merging config file {:?}", path);
        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.provider = llm.active_provider.clone();

            if let Some(ProviderConfig::Ollama { model, .. }) =
                llm.providers.get(&llm.active_provider)
            {
                result.model = model.clone();
            }

            result.llm = Some(llm);
        }

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(web_search) = config_file.web_search {
            result.web_search = web_search;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }
        if let Some(pipeline) = config_file.pipeline {
            result.pipeline = pipeline;
        }
        if let Some(timeouts) = config_file.timeouts {
            result.timeouts = timeouts;
        }
        if let Some(index) = config_file.index {
            result.index = index;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .verity directory.
    pub fn verity_dir(&self) -> PathBuf {
        self.workspace.join(".verity")
    }

    /// Ensure the .verity directory exists.
    pub fn ensure_verity_dir(&self) -> AppResult<()> {
        let verity_dir = self.verity_dir();
        if !verity_dir.exists() {
            std::fs::create_dir_all(&verity_dir).map_err(|e| {
                AppError::Config(format!("Failed to create .verity directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolved path of the vector index snapshot.
    pub fn snapshot_path(&self) -> PathBuf {
        if self.index.snapshot.is_absolute() {
            self.index.snapshot.clone()
        } else {
            self.verity_dir().join(&self.index.snapshot)
        }
    }

    /// Get a provider configuration by name.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Endpoint of the active reasoning provider, if configured.
    pub fn provider_endpoint(&self) -> Option<String> {
        match self.get_provider_config(&self.provider)? {
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint),
        }
    }

    /// Resolve the web search API key from its environment variable.
    pub fn resolve_web_search_key(&self) -> Option<String> {
        std::env::var(&self.web_search.api_key_env).ok()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["ollama"];
        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        let known_embedders = ["mock", "ollama"];
        if !known_embedders.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                self.embedding.provider,
                known_embedders.join(", ")
            )));
        }
        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be positive".to_string(),
            ));
        }

        let known_search = ["tavily", "disabled"];
        if !known_search.contains(&self.web_search.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown web search provider: {}. Supported: {}",
                self.web_search.provider,
                known_search.join(", ")
            )));
        }

        let retrieval = &self.retrieval;
        if retrieval.top_k == 0 {
            return Err(AppError::Config("retrieval.topK must be positive".to_string()));
        }
        if retrieval.chunk_size == 0 || retrieval.chunk_overlap >= retrieval.chunk_size {
            return Err(AppError::Config(format!(
                "retrieval.chunkOverlap ({}) must be smaller than chunkSize ({})",
                retrieval.chunk_overlap, retrieval.chunk_size
            )));
        }
        for (name, value) in [
            ("minRelevance", retrieval.min_relevance),
            ("webSearchThreshold", retrieval.web_search_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AppError::Config(format!(
                    "retrieval.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        Ok(())
    }
}
