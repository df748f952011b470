//! Operator command surface of the safety core.
//!
//! [`SafetySupervisor`] owns every piece of safety state and is the only
//! entry point the UI layer calls. It has a single owner and takes `&mut
//! self`; the runtime feeds it heartbeats and drives [`advance`] from its
//! timers.
//!
//! [`advance`]: SafetySupervisor::advance

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::channel::HeartbeatChannel;
use crate::clock::Clock;
use crate::config::SafetyConfig;
use crate::emergency::{EmergencyCause, EmergencyState, EmergencyStateMachine, ReleaseOutcome};
use crate::error::{SafetyError, SafetyResult};
use crate::health::ConnectionHealth;
use crate::lockout::OperatorLockout;
use crate::safety_timeout::{ManualSafetyTimeout, OperatingMode, TimeoutTier};
use crate::surface::{ControlSurface, Countdown, RobotStatus, SafetyNotice};
use crate::watchdog::{SafetyWatchdog, WatchdogStats};

const REFUSED_CONNECTION_LOST: &str = "connection still lost";

/// Result of an accepted restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    /// Flag cleared; controls unlock at `release_at_ms` if the connection
    /// is still alive then.
    Pending {
        /// Release deadline.
        release_at_ms: u64,
    },
    /// Lock released immediately.
    Released,
}

/// Point-in-time view of the safety state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
    /// Operating mode.
    pub mode: OperatingMode,
    /// Emergency state.
    pub emergency: EmergencyState,
    /// Live connection health.
    pub health: ConnectionHealth,
    /// Milliseconds since the last heartbeat.
    pub elapsed_ms: u64,
    /// Whether the watchdog escalation is latched.
    pub escalated: bool,
    /// Aggregate operator lockout.
    pub locked: bool,
    /// Safety timeout tier.
    pub timeout_tier: TimeoutTier,
    /// Safety timeout countdown as `M:SS`.
    pub timeout_display: String,
    /// Robot status line.
    pub robot_status: RobotStatus,
}

impl fmt::Display for SupervisorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status={} mode={} emergency={} connection={} ({} ms) controls={} timeout={} {}",
            self.robot_status,
            self.mode,
            self.emergency.name(),
            self.health,
            self.elapsed_ms,
            if self.locked { "locked" } else { "unlocked" },
            self.timeout_tier.label(),
            self.timeout_display,
        )
    }
}

/// Safety supervisor.
pub struct SafetySupervisor {
    config: SafetyConfig,
    clock: Arc<dyn Clock>,
    channel: Arc<dyn HeartbeatChannel>,
    surface: Box<dyn ControlSurface>,
    watchdog: SafetyWatchdog,
    emergency: EmergencyStateMachine,
    timeout: ManualSafetyTimeout,
    lockout: OperatorLockout,
    mode: OperatingMode,
    robot_status: RobotStatus,
}

impl SafetySupervisor {
    /// Create a supervisor in manual mode with monitoring started.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the configuration does not validate.
    pub fn new(
        config: SafetyConfig,
        clock: Arc<dyn Clock>,
        channel: Arc<dyn HeartbeatChannel>,
        surface: Box<dyn ControlSurface>,
    ) -> SafetyResult<Self> {
        config.validate()?;

        let now = clock.now_ms();
        let mut supervisor = Self {
            watchdog: SafetyWatchdog::new(config.clone()),
            timeout: ManualSafetyTimeout::from_config(&config),
            config,
            clock,
            channel,
            surface,
            emergency: EmergencyStateMachine::new(),
            lockout: OperatorLockout::new(),
            mode: OperatingMode::Manual,
            robot_status: RobotStatus::Idle,
        };
        supervisor.watchdog.start(now);
        supervisor.sync_lockout();
        Ok(supervisor)
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Emergency state machine.
    #[must_use]
    pub fn emergency(&self) -> &EmergencyStateMachine {
        &self.emergency
    }

    /// Heartbeat watchdog.
    #[must_use]
    pub fn watchdog(&self) -> &SafetyWatchdog {
        &self.watchdog
    }

    /// Autonomous safety timeout.
    #[must_use]
    pub fn safety_timeout(&self) -> &ManualSafetyTimeout {
        &self.timeout
    }

    /// Watchdog counters.
    #[must_use]
    pub fn watchdog_stats(&self) -> &WatchdogStats {
        self.watchdog.stats()
    }

    /// Operating mode.
    #[must_use]
    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    /// Live connection health.
    #[must_use]
    pub fn health(&self) -> ConnectionHealth {
        self.watchdog.health(self.clock.now_ms())
    }

    /// Aggregate operator lockout, computed from the live state.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        OperatorLockout::compute(self.emergency.is_locked(), self.timeout.is_locked())
    }

    /// Snapshot for status displays.
    #[must_use]
    pub fn status(&self) -> SupervisorStatus {
        let now = self.clock.now_ms();
        SupervisorStatus {
            mode: self.mode,
            emergency: self.emergency.state(),
            health: self.watchdog.health(now),
            elapsed_ms: self.watchdog.elapsed_ms(now),
            escalated: self.watchdog.is_escalated(),
            locked: self.is_locked(),
            timeout_tier: self.timeout.tier(),
            timeout_display: self.timeout.display_text(),
            robot_status: self.robot_status,
        }
    }

    /// Raise the confirm-to-stop prompt. Controls stay unlocked.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the emergency state is inactive.
    pub fn request_manual_stop(&mut self) -> SafetyResult<()> {
        self.emergency.request_stop(self.clock.now_ms())?;
        self.surface.notify(SafetyNotice::ConfirmationRequested);
        Ok(())
    }

    /// Confirm the manual stop: lock, persist and flag the emergency.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless a confirmation is pending.
    pub fn confirm_manual_stop(&mut self) -> SafetyResult<()> {
        self.emergency.confirm_stop(self.clock.now_ms())?;
        self.sync_lockout();
        self.persist_flag(true);
        self.surface.notify(SafetyNotice::EmergencyBanner {
            cause: EmergencyCause::Manual,
        });
        Ok(())
    }

    /// Dismiss the confirm-to-stop prompt.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless a confirmation is pending.
    pub fn cancel_manual_stop(&mut self) -> SafetyResult<()> {
        self.emergency.cancel_stop()?;
        self.surface.notify(SafetyNotice::ConfirmationDismissed);
        Ok(())
    }

    /// Re-arm after an emergency stop.
    ///
    /// Health is checked live at the moment of the request. The persisted
    /// flag is cleared and read back before anything unlocks; controls
    /// unlock after `restart_grace_ms` if the connection is still alive
    /// then.
    ///
    /// # Errors
    ///
    /// - `RestartRefused` if the heartbeat is at or past the timeout.
    /// - `InvalidTransition` if no emergency stop is active.
    /// - `Channel` if the flag could not be cleared or verified.
    /// - `InvariantViolation` if the flag still reads `true` after clearing,
    ///   or again when the grace delay ends.
    ///
    /// The system stays locked on every error.
    pub fn request_restart(&mut self) -> SafetyResult<RestartOutcome> {
        let now = self.clock.now_ms();
        let elapsed_ms = self.watchdog.elapsed_ms(now);

        let deadline = match self.emergency.begin_release(elapsed_ms, now, &self.config) {
            Ok(deadline) => deadline,
            Err(e) => {
                if matches!(e, SafetyError::RestartRefused { .. }) {
                    warn!(elapsed_ms, "Restart refused, connection still lost");
                    self.refuse(REFUSED_CONNECTION_LOST);
                }
                return Err(e);
            }
        };

        if let Err(e) = self.clear_and_verify_flag() {
            self.emergency.abort_release();
            self.persist_flag(true);
            self.refuse(&e.to_string());
            return Err(e);
        }

        match self.process_release(now)? {
            ReleaseOutcome::Released { .. } => Ok(RestartOutcome::Released),
            ReleaseOutcome::Cancelled => Err(SafetyError::restart_refused(
                elapsed_ms,
                self.config.heartbeat_timeout_ms,
            )),
            ReleaseOutcome::Waiting { remaining_ms } => {
                info!(grace_ms = remaining_ms, "Restart accepted, waiting for grace delay");
                self.surface.notify(SafetyNotice::RestartPending {
                    grace_ms: remaining_ms,
                });
                Ok(RestartOutcome::Pending {
                    release_at_ms: deadline,
                })
            }
            ReleaseOutcome::NotPending => Err(SafetyError::invariant_violation(
                "restart accepted without a pending release",
            )),
        }
    }

    /// Switch operating mode.
    ///
    /// Manual mode disarms the safety timeout; autonomous mode re-arms it at
    /// full duration, also when already autonomous. Watchdog polling is
    /// never affected.
    ///
    /// # Errors
    ///
    /// Returns `ControlsLocked` while an emergency stop is active.
    pub fn set_mode(&mut self, mode: OperatingMode) -> SafetyResult<()> {
        if self.emergency.is_locked() {
            warn!(%mode, "Mode change refused, emergency stop active");
            return Err(SafetyError::controls_locked(
                "mode cannot change while the emergency stop is active",
            ));
        }

        match mode {
            OperatingMode::Manual => self.timeout.enter_manual(),
            OperatingMode::Autonomous => self.timeout.enter_autonomous(self.clock.now_ms()),
        }
        if self.mode != mode {
            info!(from = %self.mode, to = %mode, "Operating mode changed");
        }
        self.mode = mode;

        self.surface.notify(SafetyNotice::ModeChanged {
            mode,
            direction_controls_enabled: mode.direction_controls_enabled(),
        });
        self.publish_timeout_countdown();
        self.sync_lockout();
        Ok(())
    }

    /// Reset the autonomous safety timeout. Returns `false` in manual mode,
    /// where there is nothing to reset.
    ///
    /// # Errors
    ///
    /// Returns `ControlsLocked` while an emergency stop is active.
    pub fn acknowledge_safety_timeout(&mut self) -> SafetyResult<bool> {
        if self.emergency.is_locked() {
            return Err(SafetyError::controls_locked(
                "safety timeout cannot be reset while the emergency stop is active",
            ));
        }

        if !self.timeout.reset(self.clock.now_ms()) {
            return Ok(false);
        }
        self.publish_timeout_countdown();
        self.sync_lockout();
        Ok(true)
    }

    /// Deliver a heartbeat timestamp from the channel.
    pub fn on_heartbeat(&mut self, timestamp_ms: u64) {
        self.watchdog
            .on_heartbeat_received(timestamp_ms, self.clock.now_ms());
    }

    /// Run everything due at the current clock time: a pending restart,
    /// the watchdog poll, and safety timeout ticks.
    pub fn advance(&mut self) {
        let now = self.clock.now_ms();

        if self.emergency.is_release_pending() {
            if let Err(e) = self.process_release(now) {
                debug!(error = %e, "Pending restart abandoned");
            }
        }

        if self.watchdog.due_polls(now) > 0 {
            let report = self
                .watchdog
                .poll(now, &mut self.emergency, self.channel.as_ref());

            if report.health_changed {
                self.surface
                    .notify(SafetyNotice::ConnectionStatus { health: report.health });
            }
            if report.escalated_now {
                self.surface.notify(SafetyNotice::EmergencyBanner {
                    cause: EmergencyCause::Watchdog,
                });
            }
            self.surface.set_countdown_display(Countdown::Heartbeat {
                remaining_ms: report.remaining_ms,
                health: report.health,
                level: report.level,
            });
        }

        let was_locked = self.timeout.is_locked();
        if self.timeout.advance(now) > 0 {
            self.publish_timeout_countdown();
            if self.timeout.is_locked() && !was_locked {
                self.surface.notify(SafetyNotice::SafetyTimeoutExpired);
            }
        }

        self.sync_lockout();
    }

    /// Re-assert the lock if the persisted flag says an emergency was active.
    ///
    /// A failed read is treated as unsafe and locks. Returns whether the
    /// lock was newly asserted. Restart stays gated on a live heartbeat.
    pub fn restore_from_store(&mut self) -> bool {
        let path = self.config.emergency_flag_path.clone();
        let restore = match self.channel.read_flag(&path) {
            Ok(Some(true)) => true,
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "Emergency flag unreadable, assuming emergency active");
                true
            }
        };
        if !restore {
            return false;
        }

        let restored = self.emergency.restore_active(self.clock.now_ms());
        if restored {
            self.surface.notify(SafetyNotice::EmergencyBanner {
                cause: EmergencyCause::Restored,
            });
            self.sync_lockout();
        }
        restored
    }

    /// Tear down: stop polling and the timeout ticker, and unsubscribe.
    pub fn shutdown(&mut self) {
        self.watchdog.stop();
        self.timeout.enter_manual();
        self.channel.unsubscribe();
        info!("Safety supervisor shut down");
    }

    fn clear_and_verify_flag(&self) -> SafetyResult<()> {
        self.channel
            .write_flag(&self.config.emergency_flag_path, false)?;
        self.verify_flag_cleared()
    }

    fn verify_flag_cleared(&self) -> SafetyResult<()> {
        let path = &self.config.emergency_flag_path;
        if self.channel.read_flag(path)? == Some(true) {
            error!(path = %path, "Emergency flag still set after clear, keeping lock");
            return Err(SafetyError::invariant_violation(format!(
                "'{path}' still reads true after clearing"
            )));
        }
        Ok(())
    }

    /// The flag is read back once more at the deadline; anything other than
    /// a clear flag abandons the release.
    fn process_release(&mut self, now: u64) -> SafetyResult<ReleaseOutcome> {
        let health = self.watchdog.health(now);
        let due = self
            .emergency
            .release_deadline()
            .is_some_and(|deadline| now >= deadline);

        if due && health.is_alive() {
            if let Err(e) = self.verify_flag_cleared() {
                error!(error = %e, "Emergency flag not clear at release, keeping lock");
                self.emergency.abort_release();
                self.persist_flag(true);
                self.refuse(&e.to_string());
                return Err(e);
            }
        }

        let outcome = self.emergency.finish_release(now, health);

        match outcome {
            ReleaseOutcome::Released { .. } => {
                self.watchdog.clear_escalation();
                self.sync_lockout();
                self.surface.notify(SafetyNotice::EmergencyCleared);
            }
            ReleaseOutcome::Cancelled => {
                warn!("Connection lost before restart completed, keeping lock");
                self.persist_flag(true);
                self.refuse(REFUSED_CONNECTION_LOST);
            }
            ReleaseOutcome::Waiting { .. } | ReleaseOutcome::NotPending => {}
        }
        Ok(outcome)
    }

    fn refuse(&mut self, reason: &str) {
        self.surface.notify(SafetyNotice::RestartRefused {
            reason: reason.to_string(),
        });
    }

    fn persist_flag(&self, value: bool) {
        if let Err(e) = self
            .channel
            .write_flag(&self.config.emergency_flag_path, value)
        {
            warn!(error = %e, value, "Failed to persist emergency flag");
        }
    }

    fn publish_timeout_countdown(&mut self) {
        self.surface.set_countdown_display(Countdown::SafetyTimeout {
            remaining_secs: self.timeout.remaining_secs(),
            tier: self.timeout.tier(),
        });
    }

    fn sync_lockout(&mut self) {
        if let Some(locked) = self
            .lockout
            .update(self.emergency.is_locked(), self.timeout.is_locked())
        {
            info!(locked, "Operator controls lock changed");
            self.surface.set_locked(locked);
        }

        let status = if self.emergency.is_locked() {
            RobotStatus::EmergencyStop
        } else {
            RobotStatus::Idle
        };
        if status != self.robot_status {
            self.robot_status = status;
            self.surface.notify(SafetyNotice::RobotStatus { status });
        }
    }
}

impl fmt::Debug for SafetySupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetySupervisor")
            .field("config", &self.config)
            .field("watchdog", &self.watchdog)
            .field("emergency", &self.emergency)
            .field("timeout", &self.timeout)
            .field("lockout", &self.lockout)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
