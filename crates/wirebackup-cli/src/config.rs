//! Configuration file support for the wirebackup CLI.
//!
//! Configuration is read from `~/.config/wirebackup/config.toml` (XDG) or the
//! platform's equivalent. `WIREBACKUP_CONFIG_DIR` points at a different
//! directory.
//!
//! # Example configuration
//!
//! ```toml
//! [defaults]
//! identity_check = "enforce"
//! strict_format = true
//! chunk_size = 1048576
//! verbosity = 1
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use wirebackup_core::IdentityCheck;

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "WIREBACKUP_CONFIG_DIR";

/// Main configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Default settings; command-line flags take precedence
    #[serde(default)]
    pub defaults: Defaults,
}

/// Default settings
#[derive(Debug, Default, Deserialize)]
pub struct Defaults {
    /// Identity check mode (skip, warn, enforce)
    #[serde(default, deserialize_with = "deserialize_identity_check")]
    pub identity_check: Option<IdentityCheck>,

    /// Reject unknown platform tags and versions
    pub strict_format: Option<bool>,

    /// Plaintext bytes per chunk
    pub chunk_size: Option<usize>,

    /// Default verbosity level (0-3)
    pub verbosity: Option<u8>,
}

fn deserialize_identity_check<'de, D>(deserializer: D) -> Result<Option<IdentityCheck>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|mode| mode.parse().map_err(serde::de::Error::custom))
        .transpose()
}

impl Config {
    /// Load configuration from the default path, or return empty config if not found.
    pub fn load() -> Result<Self> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }
}

/// Get the path to the configuration file.
pub fn config_path() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir).join("config.toml"));
    }

    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(base_dirs.config_dir().join("wirebackup").join("config.toml"))
}
