//! rewriteq configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::chunker::SizeMetric;
use crate::error::RewriteError;

/// Main rewriteq configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Submission defaults for chunking and memory
    pub chunking: ChunkingConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before any task runs
    ///
    /// The API key must be present in the configured environment variable and
    /// a model must be named.
    pub fn validate(&self) -> std::result::Result<(), RewriteError> {
        debug!(api_key_env = %self.llm.api_key_env, model = %self.llm.model, "validate: called");
        if self.llm.model.trim().is_empty() {
            return Err(RewriteError::Config("No model configured. Set llm.model in the config file.".to_string()));
        }

        match std::env::var(&self.llm.api_key_env) {
            Ok(key) if !key.trim().is_empty() => {}
            _ => {
                return Err(RewriteError::Config(format!(
                    "LLM API key not found. Set the {} environment variable.",
                    self.llm.api_key_env
                )));
            }
        }

        if self.chunking.chunk_size == 0 {
            return Err(RewriteError::Config("chunking.chunk-size must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::search_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = match config_path {
            Some(path) => path.clone(),
            None => Self::search_paths().into_iter().find(|p| p.exists())?,
        };
        let content = fs::read_to_string(path).ok()?;
        let config: Self = serde_yaml::from_str(&content).ok()?;
        config.log_level
    }

    /// Project-local config first, then the user config
    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".rewriteq.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("rewriteq").join("rewriteq.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (any OpenAI-compatible chat completions endpoint)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .map_err(|_| eyre::eyre!("API key not found in environment variable {}", self.api_key_env))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "deepseek-reasoner".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            max_tokens: 4096,
            timeout_ms: 300_000,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for the task registry and per-task storage
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // ~/.local/share/rewriteq on Linux
        let root = dirs::data_local_dir()
            .map(|d| d.join("rewriteq"))
            .unwrap_or_else(|| PathBuf::from(".rewriteq"));
        Self { root }
    }
}

/// Defaults applied at submission when the command line leaves them out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Size bound per chunk, in units of `metric`
    #[serde(rename = "chunk-size")]
    pub chunk_size: usize,

    /// Number of earlier Q&A pairs replayed as context
    #[serde(rename = "memory-size")]
    pub memory_size: usize,

    /// How chunk size is measured
    pub metric: SizeMetric,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            memory_size: crate::DEFAULT_MEMORY_SIZE,
            metric: SizeMetric::default(),
        }
    }
}
