//! Console configuration and persisted store state.
//!
//! Both files are pretty-printed JSON. A missing configuration file is
//! created with defaults on first load.

use anyhow::{Context, Result};
use mower_safety::SafetyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ConsoleError;

/// Schema version written into new configuration files.
pub const SCHEMA_VERSION: &str = "mower.console/1";

const SCHEMA_PREFIX: &str = "mower.console/";

/// Complete console configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Configuration schema version
    pub schema_version: String,
    /// Watchdog, emergency and safety timeout settings
    #[serde(default)]
    pub safety: SafetyConfig,
    /// Simulated mower settings
    #[serde(default)]
    pub simulator: SimulatorConfig,
}

/// Simulated mower heartbeat source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Heartbeat publish period in milliseconds
    pub heartbeat_interval_ms: u64,
    /// Stop publishing this many seconds after start
    pub drop_after_secs: Option<u64>,
    /// Resume publishing this many seconds after start
    pub resume_after_secs: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 2500,
            drop_after_secs: None,
            resume_after_secs: None,
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            safety: SafetyConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl ConsoleConfig {
    /// Load from `path`, creating a default file if none exists.
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found at {:?}, creating default", path);
            let config = Self::default();
            config.save_to_path(path).await?;
            return Ok(config);
        }

        Self::read_from_path(path).await
    }

    /// Read an existing configuration file without creating one.
    pub async fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(ConsoleError::from)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        let config: ConsoleConfig = serde_json::from_str(&content)
            .map_err(ConsoleError::from)
            .with_context(|| format!("Failed to parse config file: {path:?}"))?;

        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save to `path`, creating parent directories as needed.
    pub async fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self).await?;
        debug!("Saved config to {:?}", path.as_ref());
        Ok(())
    }

    /// Default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("console.json"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConsoleError> {
        if !self.schema_version.starts_with(SCHEMA_PREFIX) {
            return Err(ConsoleError::InvalidConfiguration(format!(
                "Invalid schema version: {}",
                self.schema_version
            )));
        }

        self.safety.validate()?;
        self.simulator.validate()
    }
}

impl SimulatorConfig {
    /// Validate the simulator settings.
    pub fn validate(&self) -> Result<(), ConsoleError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(ConsoleError::InvalidConfiguration(
                "simulator.heartbeat_interval_ms must be greater than 0".to_string(),
            ));
        }
        match (self.drop_after_secs, self.resume_after_secs) {
            (Some(drop), Some(resume)) if resume <= drop => {
                Err(ConsoleError::InvalidConfiguration(format!(
                    "simulator.resume_after_secs ({resume}) must be after drop_after_secs ({drop})"
                )))
            }
            (None, Some(_)) => Err(ConsoleError::InvalidConfiguration(
                "simulator.resume_after_secs requires drop_after_secs".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Flags persisted by the in-memory store between console sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Last written value of the emergency flag
    pub emergency_active: bool,
}

impl StoreSnapshot {
    /// Load a snapshot. A missing file yields the default (no emergency).
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No store snapshot at {:?}", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(ConsoleError::from)
            .with_context(|| format!("Failed to read store snapshot: {path:?}"))?;
        let snapshot = serde_json::from_str(&content)
            .map_err(ConsoleError::from)
            .with_context(|| format!("Failed to parse store snapshot: {path:?}"))?;
        Ok(snapshot)
    }

    /// Save a snapshot.
    pub async fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self).await
    }

    /// Default snapshot path, next to the configuration file.
    pub fn default_path() -> Result<PathBuf> {
        Ok(config_dir()?.join("store.json"))
    }
}

fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("mower"))
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(ConsoleError::from)
            .context("Failed to create config directory")?;
    }

    let content = serde_json::to_string_pretty(value)
        .map_err(ConsoleError::from)
        .context("Failed to serialize")?;

    tokio::fs::write(path, content)
        .await
        .map_err(ConsoleError::from)
        .with_context(|| format!("Failed to write file: {path:?}"))?;
    Ok(())
}
