use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::core::{ScoringTuning, DEFAULT_MAX_RESULTS};
use crate::models::ScoringWeights;
use crate::services::ExplainerLimits;

const ENV_PREFIX: &str = "VENUE_MATCH";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub explainer: ExplainerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
        }
    }
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }

/// Without a URL the service runs on the in-memory catalog and store
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

fn default_max_connections() -> u32 { 10 }
fn default_min_connections() -> u32 { 1 }
fn default_acquire_timeout_secs() -> u64 { 5 }
fn default_idle_timeout_secs() -> u64 { 600 }

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// L2 tier; omitted means L1 only
    pub redis_url: Option<String>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_secs: default_ttl_secs(),
            l1_cache_size: default_l1_cache_size(),
        }
    }
}

fn default_ttl_secs() -> u64 { 300 }
fn default_l1_cache_size() -> u64 { 1000 }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> usize { DEFAULT_MAX_RESULTS }

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub tuning: ScoringTuning,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_capacity_weight")]
    pub capacity: f64,
    #[serde(default = "default_price_weight")]
    pub price: f64,
    #[serde(default = "default_location_weight")]
    pub location: f64,
    #[serde(default = "default_amenity_weight")]
    pub amenity: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity_weight(),
            price: default_price_weight(),
            location: default_location_weight(),
            amenity: default_amenity_weight(),
        }
    }
}

impl From<&WeightsConfig> for ScoringWeights {
    fn from(w: &WeightsConfig) -> Self {
        ScoringWeights {
            capacity: w.capacity,
            price: w.price,
            location: w.location,
            amenity: w.amenity,
        }
    }
}

fn default_capacity_weight() -> f64 { 0.30 }
fn default_price_weight() -> f64 { 0.25 }
fn default_location_weight() -> f64 { 0.25 }
fn default_amenity_weight() -> f64 { 0.20 }

/// Text-generation backend and explanation phase bounds
#[derive(Debug, Clone, Deserialize)]
pub struct ExplainerSettings {
    #[serde(default = "default_explainer_enabled")]
    pub enabled: bool,
    pub api_key: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_explanation_timeout_ms")]
    pub explanation_timeout_ms: u64,
    #[serde(default = "default_explanation_phase_timeout_ms")]
    pub explanation_phase_timeout_ms: u64,
    #[serde(default = "default_explanation_concurrency")]
    pub explanation_concurrency: usize,
    #[serde(default = "default_max_explanation_chars")]
    pub max_explanation_chars: usize,
}

impl Default for ExplainerSettings {
    fn default() -> Self {
        Self {
            enabled: default_explainer_enabled(),
            api_key: None,
            api_base: default_api_base(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            explanation_timeout_ms: default_explanation_timeout_ms(),
            explanation_phase_timeout_ms: default_explanation_phase_timeout_ms(),
            explanation_concurrency: default_explanation_concurrency(),
            max_explanation_chars: default_max_explanation_chars(),
        }
    }
}

impl ExplainerSettings {
    pub fn limits(&self) -> ExplainerLimits {
        ExplainerLimits {
            call_timeout: Duration::from_millis(self.explanation_timeout_ms),
            phase_timeout: Duration::from_millis(self.explanation_phase_timeout_ms),
            concurrency: self.explanation_concurrency,
            max_chars: self.max_explanation_chars,
        }
    }

    /// API key, if the backend is enabled and one is configured
    pub fn active_api_key(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

fn default_explainer_enabled() -> bool { true }
fn default_api_base() -> String { "https://api.anthropic.com".to_string() }
fn default_model() -> String { "claude-3-haiku-20240307".to_string() }
fn default_max_tokens() -> u32 { 500 }
fn default_temperature() -> f32 { 0.7 }
fn default_explanation_timeout_ms() -> u64 { 8_000 }
fn default_explanation_phase_timeout_ms() -> u64 { 20_000 }
fn default_explanation_concurrency() -> usize { 4 }
fn default_max_explanation_chars() -> usize { 1200 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml, then config/local.toml)
    /// 3. Environment variables (prefixed with VENUE_MATCH__)
    /// 4. DATABASE_URL, REDIS_URL and ANTHROPIC_API_KEY
    pub fn load() -> Result<Self, SettingsError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g., VENUE_MATCH__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = substitute_env_vars(settings)?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn weights(&self) -> ScoringWeights {
        ScoringWeights::from(&self.scoring.weights)
    }

    /// Reject settings the matching pipeline cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        let weights = self.weights();
        if !weights.is_valid() {
            return Err(SettingsError::Invalid(format!(
                "scoring weights must be finite, non-negative and sum above zero: {:?}",
                weights
            )));
        }

        self.scoring.tuning.validate().map_err(SettingsError::Invalid)?;

        if self.matching.max_results == 0 {
            return Err(SettingsError::Invalid("matching.max_results must be positive".to_string()));
        }

        let explainer = &self.explainer;
        if explainer.explanation_concurrency == 0 {
            return Err(SettingsError::Invalid(
                "explainer.explanation_concurrency must be positive".to_string(),
            ));
        }
        if explainer.explanation_timeout_ms == 0 || explainer.explanation_phase_timeout_ms == 0 {
            return Err(SettingsError::Invalid("explainer timeouts must be positive".to_string()));
        }
        if explainer.max_explanation_chars == 0 {
            return Err(SettingsError::Invalid(
                "explainer.max_explanation_chars must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Apply the conventional unprefixed variables on top of the layered config
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    let mut builder = Config::builder().add_source(settings);

    if let Ok(database_url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database.url", database_url)?;
    }
    if let Ok(redis_url) = env::var("REDIS_URL") {
        builder = builder.set_override("cache.redis_url", redis_url)?;
    }
    if let Ok(api_key) = env::var("ANTHROPIC_API_KEY") {
        builder = builder.set_override("explainer.api_key", api_key)?;
    }

    builder.build()
}
