//! TOML configuration with environment overrides.
//!
//! Every section is optional; missing keys fall back to the defaults
//! below. After parsing, [`apply_env_overrides`] layers the deployment
//! environment on top (`PORT`, `SUPABASE_URL`, `MODEL_*`) and
//! [`validate`] rejects out-of-range values.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5555".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Supabase project URL. Without it the store is unavailable.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_store_key_env")]
    pub key_env: String,
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_env: default_store_key_env(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

fn default_store_key_env() -> String {
    "SUPABASE_KEY".to_string()
}
fn default_store_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    /// Overrides the provider's default API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            base_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Configured base URL, or the provider's public endpoint.
    pub fn resolved_base_url(&self) -> String {
        let url = match (&self.base_url, self.provider.as_str()) {
            (Some(url), _) => url.as_str(),
            (None, "openai") => "https://api.openai.com/v1",
            (None, _) => "https://api.groq.com/openai/v1",
        };
        url.trim_end_matches('/').to_string()
    }
}

fn default_completion_provider() -> String {
    "groq".to_string()
}
fn default_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_completion_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_time_range_days")]
    pub default_time_range_days: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_time_range_days: default_time_range_days(),
        }
    }
}

fn default_time_range_days() -> u32 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// `compact` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: default_log_format(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

impl Config {
    /// All-defaults configuration, used when the default config path does
    /// not exist.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Load, override from the process environment, and validate.
///
/// A missing file is only tolerated at `default_path`; an explicitly
/// chosen path must exist.
pub fn load_config(path: &Path, default_path: &Path) -> Result<Config> {
    let mut config = if !path.exists() && path == default_path {
        Config::minimal()
    } else {
        parse_config_file(path)?
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| "Failed to parse config file")
}

/// Apply deployment environment variables, read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(port) = var("PORT") {
        let port: u16 = port
            .parse()
            .with_context(|| format!("PORT must be a port number, got '{}'", port))?;
        config.server.bind = format!("0.0.0.0:{}", port);
    }
    if let Some(url) = var("SUPABASE_URL") {
        config.store.url = Some(url);
    }
    if let Some(provider) = var("MODEL_PROVIDER") {
        config.completion.provider = provider.to_ascii_lowercase();
    }
    if let Some(model) = var("MODEL_NAME") {
        config.completion.model = model;
    }
    if let Some(temperature) = var("MODEL_TEMPERATURE") {
        config.completion.temperature = temperature
            .parse()
            .with_context(|| format!("MODEL_TEMPERATURE must be a number, got '{}'", temperature))?;
    }
    if let Some(tokens) = var("MODEL_TOKEN") {
        config.completion.max_tokens = tokens
            .parse()
            .with_context(|| format!("MODEL_TOKEN must be a positive integer, got '{}'", tokens))?;
    }
    Ok(())
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate completion
    match config.completion.provider.as_str() {
        "disabled" | "groq" | "openai" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled, groq, or openai.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.completion.temperature) {
        anyhow::bail!("completion.temperature must be in [0.0, 2.0]");
    }

    if config.completion.max_tokens == 0 {
        anyhow::bail!("completion.max_tokens must be > 0");
    }

    if config.completion.timeout_secs == 0 {
        anyhow::bail!("completion.timeout_secs must be > 0");
    }

    // Validate store
    if config.store.timeout_secs == 0 {
        anyhow::bail!("store.timeout_secs must be > 0");
    }

    // Validate analysis
    if config.analysis.default_time_range_days < 1 {
        anyhow::bail!("analysis.default_time_range_days must be >= 1");
    }

    match config.logging.format.as_str() {
        "compact" | "json" => {}
        other => anyhow::bail!(
            "Unknown logging format: '{}'. Must be compact or json.",
            other
        ),
    }

    Ok(())
}
