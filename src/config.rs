use serde::{Deserialize, Serialize};
use std::fs;

use anyhow::{Context, Result};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL (the single source of truth for balances,
    /// orders, ledger entries and idempotency records)
    pub postgres_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Load config from YAML file based on environment
    pub fn load(env: &str) -> Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config: Self =
            serde_yaml::from_str(&content).context("Failed to parse config yaml")?;

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Environment variables take precedence over YAML config.
    ///
    /// Supported overrides:
    /// - PAPERSPOT_GATEWAY_PORT: Gateway port (u16)
    /// - PAPERSPOT_GATEWAY_HOST: Gateway host (String)
    /// - PAPERSPOT_POSTGRES_URL: PostgreSQL connection URL
    /// - PAPERSPOT_LOG_LEVEL: Log level (trace/debug/info/warn/error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("PAPERSPOT_GATEWAY_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                tracing::info!(
                    "Config override: gateway.port = {} (from PAPERSPOT_GATEWAY_PORT)",
                    p
                );
                self.gateway.port = p;
            }
        }
        if let Ok(host) = std::env::var("PAPERSPOT_GATEWAY_HOST") {
            tracing::info!(
                "Config override: gateway.host = {} (from PAPERSPOT_GATEWAY_HOST)",
                host
            );
            self.gateway.host = host;
        }
        if let Ok(url) = std::env::var("PAPERSPOT_POSTGRES_URL") {
            tracing::info!("Config override: postgres_url = [REDACTED] (from PAPERSPOT_POSTGRES_URL)");
            self.postgres_url = url;
        }
        if let Ok(level) = std::env::var("PAPERSPOT_LOG_LEVEL") {
            tracing::info!(
                "Config override: log_level = {} (from PAPERSPOT_LOG_LEVEL)",
                level
            );
            self.log_level = level;
        }
    }

    /// Validate configuration at startup
    pub fn validate(&self) -> Result<()> {
        if self.gateway.port == 0 {
            anyhow::bail!("Invalid gateway.port: must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log_level '{}': must be one of {:?}",
                self.log_level,
                valid_levels
            );
        }

        if self.postgres_url.is_empty() {
            anyhow::bail!("postgres_url must be set");
        }

        Ok(())
    }
}
