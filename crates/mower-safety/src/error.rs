//! Error types for the safety core.
//!
//! Nothing in this crate panics or propagates a failure past the
//! [`SafetySupervisor`](crate::supervisor::SafetySupervisor) boundary other
//! than these typed refusals. Store failures are folded into local lock
//! decisions before they ever reach a caller.

use thiserror::Error;

use crate::channel::ChannelError;

/// Errors surfaced by safety operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyError {
    /// Telemetry store read or write failed.
    #[error("Telemetry channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Restart was refused because the heartbeat is still stale.
    #[error("Restart refused: connection still lost ({elapsed_ms} ms since last heartbeat, limit {timeout_ms} ms)")]
    RestartRefused {
        /// Milliseconds since the last heartbeat at the moment of the request.
        elapsed_ms: u64,
        /// Configured heartbeat timeout.
        timeout_ms: u64,
    },

    /// An unlock would have broken clear-then-unlock ordering.
    #[error("Safety invariant violated: {0}")]
    InvariantViolation(String),

    /// Operation is not valid in the current emergency state.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// State the machine was in.
        from: &'static str,
        /// State that was requested.
        to: &'static str,
    },

    /// Operator controls are locked by an active emergency stop.
    #[error("Controls locked: {0}")]
    ControlsLocked(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SafetyError {
    /// Create a restart refused error.
    #[must_use]
    pub fn restart_refused(elapsed_ms: u64, timeout_ms: u64) -> Self {
        Self::RestartRefused {
            elapsed_ms,
            timeout_ms,
        }
    }

    /// Create an invariant violation error.
    #[must_use]
    pub fn invariant_violation(reason: impl Into<String>) -> Self {
        Self::InvariantViolation(reason.into())
    }

    /// Create an invalid transition error.
    #[must_use]
    pub fn invalid_transition(from: &'static str, to: &'static str) -> Self {
        Self::InvalidTransition { from, to }
    }

    /// Create a controls locked error.
    #[must_use]
    pub fn controls_locked(reason: impl Into<String>) -> Self {
        Self::ControlsLocked(reason.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration(reason.into())
    }

    /// Whether this error is a policy refusal rather than a fault.
    #[must_use]
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            Self::RestartRefused { .. } | Self::ControlsLocked(_) | Self::InvalidTransition { .. }
        )
    }
}

/// A specialized `Result` type for safety operations.
pub type SafetyResult<T> = std::result::Result<T, SafetyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_refused_mentions_lost_connection() {
        let err = SafetyError::restart_refused(7200, 5000);
        let text = err.to_string();
        assert!(text.contains("connection still lost"));
        assert!(text.contains("7200"));
        assert!(err.is_refusal());
    }

    #[test]
    fn test_channel_error_converts() {
        let err: SafetyError = ChannelError::write_failed("robot/emergency/active", "offline").into();
        assert!(matches!(err, SafetyError::Channel(_)));
        assert!(!err.is_refusal());
    }

    #[test]
    fn test_error_constructors() {
        let err = SafetyError::invalid_transition("Inactive", "Active");
        assert!(err.to_string().contains("Inactive"));

        let err = SafetyError::invariant_violation("flag still set");
        assert!(matches!(err, SafetyError::InvariantViolation(_)));
        assert!(!err.is_refusal());
    }
}
