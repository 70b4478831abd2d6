//! Configuration loading

use anyhow::Result;
use halscope_core::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Print each device's property table below the tree
    #[serde(default)]
    pub show_properties: bool,
    /// Hide devices on the `unknown` bus (virtual devices)
    #[serde(default = "default_hide_virtual")]
    pub hide_virtual: bool,
}

fn default_hide_virtual() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_properties: false,
            hide_virtual: default_hide_virtual(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; overrides `--log-level`
    #[serde(default)]
    pub filter: Option<String>,
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    Defaults,
}

/// Load configuration from file, falling back to defaults if it does not exist
pub fn load_config(path: &Path) -> Result<(Config, ConfigSource)> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok((config, ConfigSource::File))
    } else {
        Ok((Config::default(), ConfigSource::Defaults))
    }
}
