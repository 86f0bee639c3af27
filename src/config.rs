//! Application configuration loading from TOML with environment variable
//! resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API credentials, webhook URLs) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`. The *investment*
//! configuration (tracked currencies and their records) is a separate
//! persisted document (see `storage`).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    pub state: StateConfig,
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TradingConfig {
    /// When false every order submission is a no-op; the pass still runs,
    /// decides, and records estimated outcomes (internal-run mode).
    pub enabled: bool,
    pub settlement_currency: String,
    /// Candlestick timeframe used for the short-term trend check.
    #[serde(default = "default_trend_timeframe")]
    pub trend_timeframe: String,
}

fn default_trend_timeframe() -> String {
    "5m".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    pub config_path: String,
    pub trades_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    pub discord_enabled: bool,
    pub logs_webhook_env: Option<String>,
    pub alerts_webhook_env: Option<String>,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
