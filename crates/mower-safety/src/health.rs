//! Connection health tiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::SafetyConfig;

/// Connection health derived from heartbeat age.
///
/// Always recomputed from elapsed time; never stored as independent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionHealth {
    /// Heartbeat younger than the warning threshold.
    Healthy,
    /// Heartbeat between the warning threshold and the timeout.
    Degraded,
    /// Heartbeat at or beyond the timeout.
    Lost,
}

impl ConnectionHealth {
    /// Classify a heartbeat age.
    #[must_use]
    pub fn classify(elapsed_ms: u64, config: &SafetyConfig) -> Self {
        if elapsed_ms >= config.heartbeat_timeout_ms {
            Self::Lost
        } else if elapsed_ms >= config.warning_threshold_ms {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }

    /// Whether the connection is considered alive (restart may proceed).
    #[must_use]
    pub fn is_alive(self) -> bool {
        !matches!(self, Self::Lost)
    }

    /// Operator-facing connection status label.
    #[must_use]
    pub fn status_label(self) -> &'static str {
        match self {
            Self::Healthy => "Connected",
            Self::Degraded => "Weak Signal",
            Self::Lost => "Connection Lost",
        }
    }
}

impl fmt::Display for ConnectionHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_label())
    }
}

/// Colour level of the heartbeat countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountdownLevel {
    /// Plenty of time left.
    Normal,
    /// Below the warning threshold.
    Warning,
    /// Below the critical threshold.
    Critical,
}

impl CountdownLevel {
    /// Level for the given remaining time.
    #[must_use]
    pub fn for_remaining(remaining_ms: u64, config: &SafetyConfig) -> Self {
        if remaining_ms > config.warning_threshold_ms {
            Self::Normal
        } else if remaining_ms > config.critical_threshold_ms {
            Self::Warning
        } else {
            Self::Critical
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let config = SafetyConfig::default();

        assert_eq!(ConnectionHealth::classify(0, &config), ConnectionHealth::Healthy);
        assert_eq!(ConnectionHealth::classify(3999, &config), ConnectionHealth::Healthy);
        assert_eq!(ConnectionHealth::classify(4000, &config), ConnectionHealth::Degraded);
        assert_eq!(ConnectionHealth::classify(4999, &config), ConnectionHealth::Degraded);
        assert_eq!(ConnectionHealth::classify(5000, &config), ConnectionHealth::Lost);
        assert_eq!(ConnectionHealth::classify(u64::MAX, &config), ConnectionHealth::Lost);
    }

    #[test]
    fn test_labels() {
        assert_eq!(ConnectionHealth::Healthy.to_string(), "Connected");
        assert_eq!(ConnectionHealth::Degraded.status_label(), "Weak Signal");
        assert_eq!(ConnectionHealth::Lost.status_label(), "Connection Lost");
        assert!(!ConnectionHealth::Lost.is_alive());
        assert!(ConnectionHealth::Degraded.is_alive());
    }

    #[test]
    fn test_countdown_levels() {
        let config = SafetyConfig::default();

        // A fresh heartbeat shows the full timeout, which is above the warning threshold.
        assert_eq!(CountdownLevel::for_remaining(5000, &config), CountdownLevel::Normal);
        assert_eq!(CountdownLevel::for_remaining(4000, &config), CountdownLevel::Warning);
        assert_eq!(CountdownLevel::for_remaining(1001, &config), CountdownLevel::Warning);
        assert_eq!(CountdownLevel::for_remaining(1000, &config), CountdownLevel::Critical);
        assert_eq!(CountdownLevel::for_remaining(0, &config), CountdownLevel::Critical);
    }
}
