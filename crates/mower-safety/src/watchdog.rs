//! Heartbeat watchdog.
//!
//! Tracks the age of the most recent mower heartbeat, derives
//! [`ConnectionHealth`] on every poll, and escalates to an emergency stop when
//! the connection is lost.
//!
//! # Escalation
//!
//! Escalation is monotonic: the watchdog can assert the lock but never
//! releases it. A healthy heartbeat after a loss leaves the escalation latched
//! until an operator restart succeeds and calls
//! [`clear_escalation`](SafetyWatchdog::clear_escalation).
//!
//! # Example
//!
//! ```rust
//! use mower_safety::prelude::*;
//!
//! let mut watchdog = SafetyWatchdog::new(SafetyConfig::default());
//! let mut emergency = EmergencyStateMachine::new();
//! let channel = InMemoryChannel::new();
//!
//! watchdog.on_heartbeat_received(1_000, 1_000);
//! let report = watchdog.poll(6_000, &mut emergency, &channel);
//!
//! assert_eq!(report.health, ConnectionHealth::Lost);
//! assert!(report.escalated_now);
//! assert!(emergency.is_locked());
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::channel::HeartbeatChannel;
use crate::config::SafetyConfig;
use crate::emergency::EmergencyStateMachine;
use crate::health::{ConnectionHealth, CountdownLevel};
use crate::scheduler::RepeatingTask;

/// Outcome of one watchdog poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogReport {
    /// Health at poll time.
    pub health: ConnectionHealth,
    /// Milliseconds since the last heartbeat.
    pub elapsed_ms: u64,
    /// Countdown shown to the operator.
    pub remaining_ms: u64,
    /// Colour level for the countdown.
    pub level: CountdownLevel,
    /// Whether this poll performed the escalation.
    pub escalated_now: bool,
    /// Whether health changed tier on this poll.
    pub health_changed: bool,
}

/// Watchdog counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogStats {
    /// Polls evaluated.
    pub polls: u64,
    /// Escalations performed.
    pub escalations: u64,
    /// Heartbeats received.
    pub heartbeats: u64,
    /// Emergency flag writes that failed.
    pub failed_flag_writes: u64,
}

/// Heartbeat staleness monitor.
#[derive(Debug)]
pub struct SafetyWatchdog {
    config: SafetyConfig,
    last_heartbeat_ms: u64,
    monitor: RepeatingTask,
    escalated: bool,
    last_health: Option<ConnectionHealth>,
    stats: WatchdogStats,
}

impl SafetyWatchdog {
    /// Create a stopped watchdog.
    ///
    /// No heartbeat has been seen yet, so the first poll reports the
    /// connection as lost unless a heartbeat arrives first.
    #[must_use]
    pub fn new(config: SafetyConfig) -> Self {
        let monitor = RepeatingTask::new(config.poll_interval_ms);
        Self {
            config,
            last_heartbeat_ms: 0,
            monitor,
            escalated: false,
            last_health: None,
            stats: WatchdogStats::default(),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Record a heartbeat. Restarts monitoring if it was stopped.
    ///
    /// The latest arrival wins; values are not compared. Never clears an
    /// escalation.
    pub fn on_heartbeat_received(&mut self, timestamp_ms: u64, now_ms: u64) {
        self.last_heartbeat_ms = timestamp_ms;
        self.stats.heartbeats = self.stats.heartbeats.saturating_add(1);
        trace!(timestamp_ms, "Heartbeat received");

        if self.monitor.ensure_started(now_ms) {
            info!("Heartbeat monitoring resumed");
        }
    }

    /// Begin polling. No-op if already monitoring.
    pub fn start(&mut self, now_ms: u64) {
        if self.monitor.ensure_started(now_ms) {
            info!(
                poll_interval_ms = self.config.poll_interval_ms,
                timeout_ms = self.config.heartbeat_timeout_ms,
                "Heartbeat monitoring started"
            );
        }
    }

    /// Stop polling. Teardown only.
    pub fn stop(&mut self) {
        if self.monitor.is_running() {
            self.monitor.cancel();
            info!("Heartbeat monitoring stopped");
        }
    }

    /// Whether polling is scheduled.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    /// Number of poll periods due at `now_ms`. Re-anchors the schedule.
    pub fn due_polls(&mut self, now_ms: u64) -> u32 {
        self.monitor.poll_due(now_ms)
    }

    /// Next scheduled poll time.
    #[must_use]
    pub fn next_poll_ms(&self) -> Option<u64> {
        self.monitor.next_due_ms()
    }

    /// Timestamp of the latest heartbeat.
    #[must_use]
    pub fn last_heartbeat_ms(&self) -> u64 {
        self.last_heartbeat_ms
    }

    /// Milliseconds since the latest heartbeat.
    #[must_use]
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_heartbeat_ms)
    }

    /// Live health at `now_ms`.
    #[must_use]
    pub fn health(&self, now_ms: u64) -> ConnectionHealth {
        ConnectionHealth::classify(self.elapsed_ms(now_ms), &self.config)
    }

    /// Whether this watchdog has escalated and not yet been re-armed.
    #[must_use]
    pub fn is_escalated(&self) -> bool {
        self.escalated
    }

    /// Clear the escalation latch after a successful operator restart.
    pub fn clear_escalation(&mut self) {
        if self.escalated {
            self.escalated = false;
            debug!("Watchdog escalation cleared");
        }
    }

    /// Counters.
    #[must_use]
    pub fn stats(&self) -> &WatchdogStats {
        &self.stats
    }

    /// Evaluate the live heartbeat age and escalate if it is lost.
    ///
    /// The flag write is best-effort: a failure is counted and logged, and the
    /// local lock stays in force.
    pub fn poll(
        &mut self,
        now_ms: u64,
        emergency: &mut EmergencyStateMachine,
        channel: &dyn HeartbeatChannel,
    ) -> WatchdogReport {
        self.stats.polls = self.stats.polls.saturating_add(1);

        let elapsed_ms = self.elapsed_ms(now_ms);
        let health = ConnectionHealth::classify(elapsed_ms, &self.config);
        let health_changed = self.last_health != Some(health);
        if health_changed {
            match health {
                ConnectionHealth::Healthy => info!(elapsed_ms, "Connection healthy"),
                ConnectionHealth::Degraded => warn!(elapsed_ms, "Connection degraded"),
                ConnectionHealth::Lost => warn!(elapsed_ms, "Connection lost"),
            }
            self.last_health = Some(health);
        }

        let mut escalated_now = false;
        let remaining_ms = match health {
            ConnectionHealth::Lost => {
                if !self.escalated {
                    self.escalate(now_ms, elapsed_ms, emergency, channel);
                    escalated_now = true;
                }
                0
            }
            ConnectionHealth::Degraded => self.config.heartbeat_timeout_ms.saturating_sub(elapsed_ms),
            ConnectionHealth::Healthy => self.config.heartbeat_timeout_ms,
        };

        WatchdogReport {
            health,
            elapsed_ms,
            remaining_ms,
            level: CountdownLevel::for_remaining(remaining_ms, &self.config),
            escalated_now,
            health_changed,
        }
    }

    fn escalate(
        &mut self,
        now_ms: u64,
        elapsed_ms: u64,
        emergency: &mut EmergencyStateMachine,
        channel: &dyn HeartbeatChannel,
    ) {
        self.escalated = true;
        self.stats.escalations = self.stats.escalations.saturating_add(1);
        error!(
            elapsed_ms,
            timeout_ms = self.config.heartbeat_timeout_ms,
            "Heartbeat timeout, escalating to emergency stop"
        );

        emergency.escalate_from_watchdog(now_ms);

        if let Err(e) = channel.write_flag(&self.config.emergency_flag_path, true) {
            self.stats.failed_flag_writes = self.stats.failed_flag_writes.saturating_add(1);
            warn!(error = %e, "Failed to persist emergency flag, local lock remains");
        }
    }
}
