//! Safety configuration.
//!
//! Defaults match the mower firmware, which publishes a heartbeat every
//! two to three seconds.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{SafetyError, SafetyResult};

/// Store path of the persisted emergency flag.
pub const DEFAULT_EMERGENCY_FLAG_PATH: &str = "robot/emergency/active";

/// Store path of the mower heartbeat timestamp.
pub const DEFAULT_HEARTBEAT_PATH: &str = "robot/lastHeartbeat";

/// Configuration for the watchdog, emergency arbitration and manual timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Heartbeat age at which the connection is declared lost (milliseconds).
    pub heartbeat_timeout_ms: u64,
    /// Heartbeat age at which the connection is reported degraded (milliseconds).
    pub warning_threshold_ms: u64,
    /// Watchdog poll period (milliseconds).
    pub poll_interval_ms: u64,
    /// Remaining time below which the heartbeat countdown is shown as critical.
    pub critical_threshold_ms: u64,
    /// Delay between clearing the remote flag and unlocking controls.
    pub restart_grace_ms: u64,
    /// Autonomous-mode safety timeout (seconds).
    pub safety_timeout_secs: u32,
    /// Remaining seconds at which the safety timeout shows a warning.
    pub safety_warning_secs: u32,
    /// Store path of the emergency flag.
    pub emergency_flag_path: String,
    /// Store path of the heartbeat timestamp.
    pub heartbeat_path: String,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_ms: 5000,
            warning_threshold_ms: 4000,
            poll_interval_ms: 200,
            critical_threshold_ms: 1000,
            restart_grace_ms: 500,
            safety_timeout_secs: 30,
            safety_warning_secs: 10,
            emergency_flag_path: DEFAULT_EMERGENCY_FLAG_PATH.to_string(),
            heartbeat_path: DEFAULT_HEARTBEAT_PATH.to_string(),
        }
    }
}

impl SafetyConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any threshold is zero or the thresholds are not
    /// ordered below the heartbeat timeout.
    pub fn validate(&self) -> SafetyResult<()> {
        if self.heartbeat_timeout_ms == 0 {
            return Err(SafetyError::invalid_configuration(
                "heartbeat_timeout_ms must be greater than 0",
            ));
        }
        if self.warning_threshold_ms == 0 || self.warning_threshold_ms >= self.heartbeat_timeout_ms
        {
            return Err(SafetyError::invalid_configuration(
                "warning_threshold_ms must be in 1..heartbeat_timeout_ms",
            ));
        }
        if self.poll_interval_ms == 0 || self.poll_interval_ms >= self.heartbeat_timeout_ms {
            return Err(SafetyError::invalid_configuration(
                "poll_interval_ms must be in 1..heartbeat_timeout_ms",
            ));
        }
        if self.critical_threshold_ms >= self.heartbeat_timeout_ms {
            return Err(SafetyError::invalid_configuration(
                "critical_threshold_ms must be below heartbeat_timeout_ms",
            ));
        }
        if self.safety_timeout_secs == 0 {
            return Err(SafetyError::invalid_configuration(
                "safety_timeout_secs must be greater than 0",
            ));
        }
        if self.safety_warning_secs >= self.safety_timeout_secs {
            return Err(SafetyError::invalid_configuration(
                "safety_warning_secs must be below safety_timeout_secs",
            ));
        }
        if self.emergency_flag_path.trim().is_empty() || self.heartbeat_path.trim().is_empty() {
            return Err(SafetyError::invalid_configuration(
                "store paths must not be empty",
            ));
        }
        Ok(())
    }

    /// Heartbeat timeout as a [`Duration`].
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> SafetyConfigBuilder {
        SafetyConfigBuilder::default()
    }
}

/// Builder for [`SafetyConfig`].
#[derive(Debug, Default)]
pub struct SafetyConfigBuilder {
    config: SafetyConfig,
}

impl SafetyConfigBuilder {
    /// Set the heartbeat timeout in milliseconds.
    #[must_use]
    pub fn heartbeat_timeout_ms(mut self, ms: u64) -> Self {
        self.config.heartbeat_timeout_ms = ms;
        self
    }

    /// Set the degraded-connection warning threshold in milliseconds.
    #[must_use]
    pub fn warning_threshold_ms(mut self, ms: u64) -> Self {
        self.config.warning_threshold_ms = ms;
        self
    }

    /// Set the watchdog poll interval in milliseconds.
    #[must_use]
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set the critical countdown threshold in milliseconds.
    #[must_use]
    pub fn critical_threshold_ms(mut self, ms: u64) -> Self {
        self.config.critical_threshold_ms = ms;
        self
    }

    /// Set the restart grace delay in milliseconds.
    #[must_use]
    pub fn restart_grace_ms(mut self, ms: u64) -> Self {
        self.config.restart_grace_ms = ms;
        self
    }

    /// Set the autonomous safety timeout in seconds.
    #[must_use]
    pub fn safety_timeout_secs(mut self, secs: u32) -> Self {
        self.config.safety_timeout_secs = secs;
        self
    }

    /// Set the safety timeout warning threshold in seconds.
    #[must_use]
    pub fn safety_warning_secs(mut self, secs: u32) -> Self {
        self.config.safety_warning_secs = secs;
        self
    }

    /// Set the emergency flag store path.
    #[must_use]
    pub fn emergency_flag_path(mut self, path: impl Into<String>) -> Self {
        self.config.emergency_flag_path = path.into();
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> SafetyResult<SafetyConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
