//! Configuration loading, validation, and management for deepfin.
//!
//! Loads configuration from a TOML file with environment variable overrides.
//! Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deep-search loop settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Model selection per loop stage
    #[serde(default)]
    pub models: ModelsConfig,

    /// Admission control in front of the loop
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// External provider credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Deep-search loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum completed research rounds before the answer is forced.
    #[serde(default = "default_step_limit")]
    pub step_limit: u32,

    /// Organic results requested per query.
    #[serde(default = "default_results_per_query")]
    pub results_per_query: u32,
}

fn default_step_limit() -> u32 {
    5
}
fn default_results_per_query() -> u32 {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            step_limit: default_step_limit(),
            results_per_query: default_results_per_query(),
        }
    }
}

/// Which model handles each loop stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model")]
    pub plan: String,
    #[serde(default = "default_model")]
    pub decide: String,
    #[serde(default = "default_model")]
    pub summarize: String,
    #[serde(default = "default_model")]
    pub answer: String,
}

fn default_model() -> String {
    "moonshotai/kimi-k2".into()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            plan: default_model(),
            decide: default_model(),
            summarize: default_model(),
            answer: default_model(),
        }
    }
}

/// Admission control settings (see the ratelimit crate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_max_requests() -> u32 {
    10
}
fn default_window_ms() -> u64 {
    60_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_key_prefix() -> String {
    "global".into()
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            max_retries: default_max_retries(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// External provider credentials and endpoints.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// OpenRouter-compatible model endpoint key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openrouter_api_key: Option<String>,

    /// Override for the model endpoint base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openrouter_base_url: Option<String>,

    /// Serper search API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serper_api_key: Option<String>,

    /// Override for the search endpoint base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serper_base_url: Option<String>,
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProvidersConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidersConfig")
            .field("openrouter_api_key", &redact(&self.openrouter_api_key))
            .field("openrouter_base_url", &self.openrouter_base_url)
            .field("serper_api_key", &redact(&self.serper_api_key))
            .field("serper_base_url", &self.serper_base_url)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("search", &self.search)
            .field("models", &self.models)
            .field("rate_limit", &self.rate_limit)
            .field("providers", &self.providers)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, apply environment overrides,
    /// and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config: AppConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        debug!(path = %path.as_ref().display(), "Loaded configuration");
        Ok(config)
    }

    /// Build a config from defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(key) = env_var("DEEPFIN_OPENROUTER_API_KEY")
            .or_else(|| env_var("OPENROUTER_API_KEY"))
        {
            self.providers.openrouter_api_key = Some(key);
        }
        if let Some(key) = env_var("DEEPFIN_SERPER_API_KEY").or_else(|| env_var("SERPER_API_KEY"))
        {
            self.providers.serper_api_key = Some(key);
        }
        if let Some(count) = env_var("DEEPFIN_SEARCH_RESULTS_COUNT")
            .and_then(|v| v.parse::<u32>().ok())
        {
            self.search.results_per_query = count;
        }
        if let Some(limit) = env_var("DEEPFIN_STEP_LIMIT").and_then(|v| v.parse::<u32>().ok()) {
            self.search.step_limit = limit;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.search.step_limit == 0 {
            return Err(ConfigError::Invalid("step_limit must be at least 1".into()));
        }
        if !(1..=10).contains(&self.search.results_per_query) {
            return Err(ConfigError::Invalid(
                "results_per_query must be between 1 and 10".into(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.max_requests must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.window_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
