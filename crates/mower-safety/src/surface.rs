//! Operator control surface sink.
//!
//! The core never renders anything. It pushes lock changes, countdown values
//! and operator notices into a [`ControlSurface`] and the UI layer decides how
//! to present them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::emergency::EmergencyCause;
use crate::health::{ConnectionHealth, CountdownLevel};
use crate::safety_timeout::{OperatingMode, TimeoutTier};

/// Countdown value for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Countdown {
    /// Time until the heartbeat watchdog declares the connection lost.
    Heartbeat {
        /// Milliseconds remaining.
        remaining_ms: u64,
        /// Connection health at the tick.
        health: ConnectionHealth,
        /// Colour level.
        level: CountdownLevel,
    },
    /// Autonomous safety timeout.
    SafetyTimeout {
        /// Seconds remaining.
        remaining_secs: u32,
        /// Display tier.
        tier: TimeoutTier,
    },
}

/// Robot status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RobotStatus {
    /// No emergency in force.
    Idle,
    /// Emergency stop in force.
    EmergencyStop,
}

impl fmt::Display for RobotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::EmergencyStop => write!(f, "EMERGENCY STOP"),
        }
    }
}

/// Operator-visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyNotice {
    /// Confirm-to-stop prompt raised.
    ConfirmationRequested,
    /// Confirm-to-stop prompt dismissed without stopping.
    ConfirmationDismissed,
    /// Emergency stop asserted.
    EmergencyBanner {
        /// What caused it.
        cause: EmergencyCause,
    },
    /// Restart accepted; controls unlock after the grace delay.
    RestartPending {
        /// Milliseconds until release.
        grace_ms: u64,
    },
    /// Restart refused.
    RestartRefused {
        /// Reason shown to the operator.
        reason: String,
    },
    /// Emergency cleared; controls unlocked unless the safety timeout holds them.
    EmergencyCleared,
    /// Connection tier changed.
    ConnectionStatus {
        /// New health tier.
        health: ConnectionHealth,
    },
    /// Robot status line changed.
    RobotStatus {
        /// New status.
        status: RobotStatus,
    },
    /// Operating mode changed.
    ModeChanged {
        /// New mode.
        mode: OperatingMode,
        /// Whether direction controls are usable.
        direction_controls_enabled: bool,
    },
    /// Autonomous safety timeout expired.
    SafetyTimeoutExpired,
}

impl fmt::Display for SafetyNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfirmationRequested => write!(f, "Confirm emergency stop?"),
            Self::ConfirmationDismissed => write!(f, "Emergency stop cancelled"),
            Self::EmergencyBanner { cause } => write!(f, "{}", cause.banner()),
            Self::RestartPending { grace_ms } => {
                write!(f, "Restarting system, controls unlock in {grace_ms} ms")
            }
            Self::RestartRefused { reason } => write!(f, "Cannot restart: {reason}"),
            Self::EmergencyCleared => write!(f, "Emergency cleared, system restarted"),
            Self::ConnectionStatus { health } => write!(f, "{}", health.status_label()),
            Self::RobotStatus { status } => write!(f, "Robot status: {status}"),
            Self::ModeChanged { mode, .. } => write!(f, "Switched to {mode} mode"),
            Self::SafetyTimeoutExpired => {
                write!(f, "Safety timeout expired, reset or switch mode to continue")
            }
        }
    }
}

/// Sink for the operator UI.
pub trait ControlSurface: Send {
    /// Lock or unlock every operator control. Called only when the
    /// aggregate lockout changes.
    fn set_locked(&mut self, locked: bool);

    /// Update a countdown display. Called on every watchdog poll and every
    /// safety timeout tick.
    fn set_countdown_display(&mut self, countdown: Countdown);

    /// Show an operator message.
    fn notify(&mut self, notice: SafetyNotice);
}

/// Surface that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSurface;

impl ControlSurface for NullSurface {
    fn set_locked(&mut self, _locked: bool) {}

    fn set_countdown_display(&mut self, _countdown: Countdown) {}

    fn notify(&mut self, _notice: SafetyNotice) {}
}
