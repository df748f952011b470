//! Emergency stop state machine.
//!
//! Single authority for the emergency lock. Two producers feed it: the
//! operator's confirm-to-stop flow and watchdog escalation. Leaving
//! [`EmergencyState::Active`] always goes through the restart gate, which
//! requires a live heartbeat regardless of what caused the lock.
//!
//! ```text
//! Inactive ──request──▶ PendingConfirmation ──confirm──▶ Active(Manual)
//!    ▲  ▲                     │ cancel
//!    │  └─────────────────────┘
//!    │
//!    │         any non-active ──escalate──▶ Active(Watchdog)
//!    │
//!    └──finish_release (live health, after grace)── Active { release_at }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::SafetyConfig;
use crate::error::{SafetyError, SafetyResult};
use crate::health::ConnectionHealth;

/// What put the system into an emergency stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmergencyCause {
    /// Operator confirmed a manual stop.
    Manual,
    /// Watchdog declared the connection lost.
    Watchdog,
    /// Lock re-asserted from the persisted flag after a reload.
    Restored,
}

impl EmergencyCause {
    /// Banner text shown to the operator.
    #[must_use]
    pub fn banner(self) -> &'static str {
        match self {
            Self::Manual => "EMERGENCY STOP ACTIVATED",
            Self::Watchdog => "CONNECTION LOST - EMERGENCY STOP ACTIVATED",
            Self::Restored => "EMERGENCY STOP ACTIVE (restored)",
        }
    }
}

impl fmt::Display for EmergencyCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Watchdog => write!(f, "watchdog"),
            Self::Restored => write!(f, "restored"),
        }
    }
}

/// Emergency stop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyState {
    /// Normal operation.
    Inactive,
    /// Operator asked to stop; awaiting confirm or cancel. Never locks.
    PendingConfirmation {
        /// When the prompt was raised.
        since_ms: u64,
    },
    /// Emergency stop in force. Controls are locked.
    Active {
        /// Why the stop was asserted.
        cause: EmergencyCause,
        /// When the stop was asserted.
        since_ms: u64,
        /// Deadline of an accepted restart, if one is in its grace period.
        release_at_ms: Option<u64>,
    },
}

impl EmergencyState {
    /// Short state name used in errors and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Inactive => "Inactive",
            Self::PendingConfirmation { .. } => "PendingConfirmation",
            Self::Active { .. } => "Active",
        }
    }
}

/// Result of checking a pending restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// No restart in progress.
    NotPending,
    /// Grace delay still running.
    Waiting {
        /// Milliseconds until the deadline.
        remaining_ms: u64,
    },
    /// Lock released.
    Released {
        /// Cause of the lock that was released.
        cause: EmergencyCause,
    },
    /// Connection was lost during the grace delay; lock kept.
    Cancelled,
}

/// Emergency state machine.
#[derive(Debug)]
pub struct EmergencyStateMachine {
    state: EmergencyState,
    activations: u64,
}

impl Default for EmergencyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl EmergencyStateMachine {
    /// Create an inactive state machine.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: EmergencyState::Inactive,
            activations: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EmergencyState {
        self.state
    }

    /// Cause of the active stop, if any.
    #[must_use]
    pub fn cause(&self) -> Option<EmergencyCause> {
        match self.state {
            EmergencyState::Active { cause, .. } => Some(cause),
            _ => None,
        }
    }

    /// Whether the emergency lock is in force.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self.state, EmergencyState::Active { .. })
    }

    /// Whether the operator confirmation prompt is showing.
    #[must_use]
    pub fn is_pending_confirmation(&self) -> bool {
        matches!(self.state, EmergencyState::PendingConfirmation { .. })
    }

    /// Deadline of an accepted restart, if one is pending.
    #[must_use]
    pub fn release_deadline(&self) -> Option<u64> {
        match self.state {
            EmergencyState::Active { release_at_ms, .. } => release_at_ms,
            EmergencyState::Inactive | EmergencyState::PendingConfirmation { .. } => None,
        }
    }

    /// Whether an accepted restart is waiting out its grace delay.
    #[must_use]
    pub fn is_release_pending(&self) -> bool {
        matches!(
            self.state,
            EmergencyState::Active {
                release_at_ms: Some(_),
                ..
            }
        )
    }

    /// Number of times the machine entered `Active`.
    #[must_use]
    pub fn activation_count(&self) -> u64 {
        self.activations
    }

    /// Raise the confirmation prompt.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the machine is inactive.
    pub fn request_stop(&mut self, now_ms: u64) -> SafetyResult<()> {
        match self.state {
            EmergencyState::Inactive => {
                self.state = EmergencyState::PendingConfirmation { since_ms: now_ms };
                debug!("Emergency stop confirmation requested");
                Ok(())
            }
            other => Err(SafetyError::invalid_transition(
                other.name(),
                "PendingConfirmation",
            )),
        }
    }

    /// Confirm the manual stop.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless a confirmation is pending.
    pub fn confirm_stop(&mut self, now_ms: u64) -> SafetyResult<()> {
        match self.state {
            EmergencyState::PendingConfirmation { .. } => {
                self.activate(EmergencyCause::Manual, now_ms);
                Ok(())
            }
            other => Err(SafetyError::invalid_transition(other.name(), "Active")),
        }
    }

    /// Dismiss the confirmation prompt.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless a confirmation is pending.
    pub fn cancel_stop(&mut self) -> SafetyResult<()> {
        match self.state {
            EmergencyState::PendingConfirmation { .. } => {
                self.state = EmergencyState::Inactive;
                debug!("Emergency stop request cancelled");
                Ok(())
            }
            other => Err(SafetyError::invalid_transition(other.name(), "Inactive")),
        }
    }

    /// Enter `Active(Watchdog)` from any state.
    ///
    /// Returns `true` if the lock was newly asserted. Already active: the
    /// cause is kept, but a restart in its grace period is cancelled.
    pub fn escalate_from_watchdog(&mut self, now_ms: u64) -> bool {
        match &mut self.state {
            EmergencyState::Active { release_at_ms, .. } => {
                if release_at_ms.take().is_some() {
                    warn!("Connection lost during restart grace period, restart cancelled");
                }
                false
            }
            _ => {
                self.activate(EmergencyCause::Watchdog, now_ms);
                true
            }
        }
    }

    /// Re-assert the lock from a persisted `true` flag.
    ///
    /// Returns `true` if the lock was newly asserted.
    pub fn restore_active(&mut self, now_ms: u64) -> bool {
        if self.is_locked() {
            return false;
        }
        self.activate(EmergencyCause::Restored, now_ms);
        true
    }

    /// Restart gate: accept a restart if the connection is alive right now.
    ///
    /// On success the machine stays `Active` with a release deadline of
    /// `now_ms + restart_grace_ms`; controls remain locked until
    /// [`finish_release`](Self::finish_release) confirms it.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` if there is no active stop.
    /// - `RestartRefused` if the heartbeat is at or past the timeout. An
    ///   elapsed time equal to the timeout already classifies as Lost, so a
    ///   restart at exactly the timeout is refused.
    pub fn begin_release(
        &mut self,
        elapsed_ms: u64,
        now_ms: u64,
        config: &SafetyConfig,
    ) -> SafetyResult<u64> {
        let from = self.state.name();
        let EmergencyState::Active { release_at_ms, .. } = &mut self.state else {
            return Err(SafetyError::invalid_transition(from, "Inactive"));
        };

        if !ConnectionHealth::classify(elapsed_ms, config).is_alive() {
            return Err(SafetyError::restart_refused(
                elapsed_ms,
                config.heartbeat_timeout_ms,
            ));
        }

        let deadline = now_ms.saturating_add(config.restart_grace_ms);
        *release_at_ms = Some(deadline);
        Ok(deadline)
    }

    /// Abandon an accepted restart, keeping the lock.
    pub fn abort_release(&mut self) {
        if let EmergencyState::Active { release_at_ms, .. } = &mut self.state {
            *release_at_ms = None;
        }
    }

    /// Complete a pending restart against live health.
    ///
    /// A lost connection cancels the release at any point before the
    /// deadline passes; a live connection at the deadline releases the lock.
    pub fn finish_release(&mut self, now_ms: u64, health: ConnectionHealth) -> ReleaseOutcome {
        let EmergencyState::Active {
            cause,
            release_at_ms: Some(deadline),
            ..
        } = self.state
        else {
            return ReleaseOutcome::NotPending;
        };

        if !health.is_alive() {
            self.abort_release();
            return ReleaseOutcome::Cancelled;
        }
        if now_ms < deadline {
            return ReleaseOutcome::Waiting {
                remaining_ms: deadline.saturating_sub(now_ms),
            };
        }

        self.state = EmergencyState::Inactive;
        info!(%cause, "Emergency stop released");
        ReleaseOutcome::Released { cause }
    }

    fn activate(&mut self, cause: EmergencyCause, now_ms: u64) {
        self.state = EmergencyState::Active {
            cause,
            since_ms: now_ms,
            release_at_ms: None,
        };
        self.activations = self.activations.saturating_add(1);
        info!(%cause, "Emergency stop active");
    }
}
