//! Autonomous-mode safety timeout.
//!
//! A liveness prompt rather than a connectivity fail-safe: while the mower
//! runs autonomously the operator must reset the countdown periodically, or
//! controls lock when it reaches zero. Switching mode in either direction
//! clears that lock. It never touches the emergency state.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::config::SafetyConfig;
use crate::scheduler::RepeatingTask;

const TICK_MS: u64 = 1000;

/// Console operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperatingMode {
    /// Operator drives the mower directly.
    #[default]
    Manual,
    /// Mower follows its own plan.
    Autonomous,
}

impl OperatingMode {
    /// Whether direction controls are usable in this mode.
    #[must_use]
    pub fn direction_controls_enabled(self) -> bool {
        matches!(self, Self::Manual)
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Autonomous => write!(f, "autonomous"),
        }
    }
}

/// Display tier of the safety timeout, derived from the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutTier {
    /// Not armed (manual mode).
    Ready,
    /// Counting down with time to spare.
    Active,
    /// At or below the warning threshold.
    Warning,
    /// Reached zero; controls locked.
    Locked,
}

impl TimeoutTier {
    /// Operator-facing label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Active => "Active",
            Self::Warning => "Warning",
            Self::Locked => "LOCKED",
        }
    }
}

/// Countdown that locks the console if autonomous operation goes unattended.
#[derive(Debug)]
pub struct ManualSafetyTimeout {
    duration_secs: u32,
    warning_secs: u32,
    remaining_secs: u32,
    armed: bool,
    ticker: RepeatingTask,
}

impl ManualSafetyTimeout {
    /// Create a disarmed timeout.
    #[must_use]
    pub fn new(duration_secs: u32, warning_secs: u32) -> Self {
        Self {
            duration_secs,
            warning_secs,
            remaining_secs: duration_secs,
            armed: false,
            ticker: RepeatingTask::new(TICK_MS),
        }
    }

    /// Create a disarmed timeout from configuration.
    #[must_use]
    pub fn from_config(config: &SafetyConfig) -> Self {
        Self::new(config.safety_timeout_secs, config.safety_warning_secs)
    }

    /// Full countdown length.
    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    /// Seconds left.
    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    /// Whether the timeout applies (autonomous mode).
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Whether the one-second ticker is scheduled.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.ticker.is_running()
    }

    /// Manual mode: stop, reset and disarm.
    pub fn enter_manual(&mut self) {
        self.ticker.cancel();
        self.remaining_secs = self.duration_secs;
        self.armed = false;
        debug!("Safety timeout disarmed");
    }

    /// Autonomous mode: reset, arm and start ticking.
    ///
    /// The previous ticker is replaced, so repeated toggles never leave more
    /// than one schedule.
    pub fn enter_autonomous(&mut self, now_ms: u64) {
        self.remaining_secs = self.duration_secs;
        self.armed = true;
        self.ticker.start(now_ms);
        debug!(duration_secs = self.duration_secs, "Safety timeout armed");
    }

    /// Operator reset. Only meaningful while armed; returns whether the
    /// countdown was reset.
    pub fn reset(&mut self, now_ms: u64) -> bool {
        if !self.armed {
            return false;
        }
        self.remaining_secs = self.duration_secs;
        self.ticker.start(now_ms);
        debug!("Safety timeout reset");
        true
    }

    /// Apply due one-second ticks. Returns the seconds consumed.
    ///
    /// Ticking stops at zero; the timeout stays armed and locked until the
    /// next reset or mode switch.
    pub fn advance(&mut self, now_ms: u64) -> u32 {
        let due = self.ticker.poll_due(now_ms);
        if !self.armed || due == 0 {
            return 0;
        }

        let consumed = due.min(self.remaining_secs);
        self.remaining_secs = self.remaining_secs.saturating_sub(consumed);
        if self.remaining_secs == 0 {
            self.ticker.cancel();
            warn!("Safety timeout expired, controls locked");
        }
        consumed
    }

    /// Current display tier.
    #[must_use]
    pub fn tier(&self) -> TimeoutTier {
        if !self.armed {
            TimeoutTier::Ready
        } else if self.remaining_secs == 0 {
            TimeoutTier::Locked
        } else if self.remaining_secs <= self.warning_secs {
            TimeoutTier::Warning
        } else {
            TimeoutTier::Active
        }
    }

    /// Whether this timeout locks controls.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.armed && self.remaining_secs == 0
    }

    /// Countdown as `M:SS`.
    #[must_use]
    pub fn display_text(&self) -> String {
        format!(
            "{}:{:02}",
            self.remaining_secs / 60,
            self.remaining_secs % 60
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeout() -> ManualSafetyTimeout {
        ManualSafetyTimeout::from_config(&SafetyConfig::default())
    }

    #[test]
    fn test_starts_disarmed() {
        let timeout = timeout();
        assert!(!timeout.is_armed());
        assert_eq!(timeout.tier(), TimeoutTier::Ready);
        assert_eq!(timeout.display_text(), "0:30");
    }

    #[test]
    fn test_disarmed_timeout_never_ticks() {
        let mut timeout = timeout();
        assert_eq!(timeout.advance(60_000), 0);
        assert_eq!(timeout.remaining_secs(), 30);
        assert!(!timeout.reset(60_000));
    }

    #[test]
    fn test_counts_down_through_tiers() {
        let mut timeout = timeout();
        timeout.enter_autonomous(0);
        assert_eq!(timeout.tier(), TimeoutTier::Active);

        assert_eq!(timeout.advance(20_000), 20);
        assert_eq!(timeout.remaining_secs(), 10);
        assert_eq!(timeout.tier(), TimeoutTier::Warning);

        assert_eq!(timeout.advance(29_999), 9);
        assert_eq!(timeout.display_text(), "0:01");
        assert!(!timeout.is_locked());

        assert_eq!(timeout.advance(30_000), 1);
        assert_eq!(timeout.tier(), TimeoutTier::Locked);
        assert!(timeout.is_locked());
        assert!(!timeout.is_ticking());
    }

    #[test]
    fn test_stops_at_zero() {
        let mut timeout = timeout();
        timeout.enter_autonomous(0);

        assert_eq!(timeout.advance(120_000), 30);
        assert_eq!(timeout.advance(240_000), 0);
        assert_eq!(timeout.remaining_secs(), 0);
        assert!(timeout.is_armed());
    }

    #[test]
    fn test_mode_switch_clears_lock() {
        let mut timeout = timeout();
        timeout.enter_autonomous(0);
        timeout.advance(30_000);
        assert!(timeout.is_locked());

        timeout.enter_manual();
        assert!(!timeout.is_locked());
        assert_eq!(timeout.remaining_secs(), 30);
        assert!(!timeout.is_ticking());

        timeout.enter_autonomous(40_000);
        timeout.advance(40_000);
        assert!(!timeout.is_locked());
        assert_eq!(timeout.remaining_secs(), 30);
    }

    #[test]
    fn test_reset_restarts_countdown() {
        let mut timeout = timeout();
        timeout.enter_autonomous(0);
        timeout.advance(25_000);

        assert!(timeout.reset(25_500));
        assert_eq!(timeout.remaining_secs(), 30);
        assert_eq!(timeout.advance(26_000), 0);
        assert_eq!(timeout.advance(26_500), 1);
    }

    #[test]
    fn test_display_minutes() {
        let timeout = ManualSafetyTimeout::new(125, 10);
        assert_eq!(timeout.display_text(), "2:05");
    }

    #[test]
    fn test_direction_controls_follow_mode() {
        assert!(OperatingMode::Manual.direction_controls_enabled());
        assert!(!OperatingMode::Autonomous.direction_controls_enabled());
        assert_eq!(OperatingMode::default(), OperatingMode::Manual);
    }
}
