//! Configuration file handling for status-watch

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use status_stream::{ClientConfig, ReconnectPolicy};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::output::OutputFormat;

pub const DEFAULT_SERVER: &str = "http://localhost:5000";

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default server URL
    pub server: Option<String>,
    /// Default output format
    pub format: Option<OutputFormat>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Connection and reconnection settings
    pub client: Option<ClientConfig>,
}

/// Command-line values that take precedence over the config file
#[derive(Debug, Clone, Default)]
pub struct ArgOverrides<'a> {
    pub server: Option<&'a str>,
    pub format: Option<OutputFormat>,
    pub no_color: bool,
    pub max_retries: Option<u32>,
    pub retry_ms: Option<u64>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("status-watch");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, args: &ArgOverrides<'_>) -> MergedConfig {
        let mut client = self.client.clone().unwrap_or_default();
        apply_retry_overrides(&mut client.reconnect, args.max_retries, args.retry_ms);

        MergedConfig {
            server: args
                .server
                .map(String::from)
                .or_else(|| self.server.clone())
                .unwrap_or_else(|| DEFAULT_SERVER.to_string()),
            format: args.format.or(self.format).unwrap_or_default(),
            no_color: args.no_color || self.no_color.unwrap_or(false),
            client,
        }
    }
}

fn apply_retry_overrides(
    policy: &mut ReconnectPolicy,
    max_retries: Option<u32>,
    retry_ms: Option<u64>,
) {
    if let Some(max) = max_retries {
        policy.max_attempts = Some(max);
    }
    if let Some(ms) = retry_ms {
        let delay = Duration::from_millis(ms);
        policy.initial_delay = delay;
        policy.max_delay = policy.max_delay.max(delay);
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub server: String,
    pub format: OutputFormat,
    pub no_color: bool,
    pub client: ClientConfig,
}
