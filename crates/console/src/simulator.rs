//! Simulated mower publishing heartbeats into the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use mower_safety::{Clock, InMemoryChannel};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::SimulatorConfig;

/// Heartbeat source with an optional scripted outage.
pub struct MowerSimulator {
    config: SimulatorConfig,
    heartbeat_path: String,
    channel: Arc<InMemoryChannel>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MowerSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MowerSimulator")
            .field("config", &self.config)
            .field("heartbeat_path", &self.heartbeat_path)
            .finish_non_exhaustive()
    }
}

impl MowerSimulator {
    pub fn new(
        config: SimulatorConfig,
        heartbeat_path: impl Into<String>,
        channel: Arc<InMemoryChannel>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            heartbeat_path: heartbeat_path.into(),
            channel,
            clock,
        }
    }

    /// Whether the mower transmits at `elapsed_ms` after start.
    pub fn is_transmitting(&self, elapsed_ms: u64) -> bool {
        let Some(drop_after) = self.config.drop_after_secs else {
            return true;
        };
        if elapsed_ms < drop_after.saturating_mul(1000) {
            return true;
        }
        self.config
            .resume_after_secs
            .is_some_and(|resume| elapsed_ms >= resume.saturating_mul(1000))
    }

    /// Publish one heartbeat stamped with the current time.
    pub fn announce(&self) {
        let timestamp = self.clock.now_ms();
        self.channel
            .publish_heartbeat_at(&self.heartbeat_path, timestamp);
        debug!(timestamp, "Mower heartbeat");
    }

    /// Publish heartbeats until the task is aborted.
    pub async fn run(self) {
        let started = Instant::now();
        let mut ticker = interval(Duration::from_millis(self.config.heartbeat_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut transmitting = true;

        info!(
            interval_ms = self.config.heartbeat_interval_ms,
            drop_after_secs = ?self.config.drop_after_secs,
            resume_after_secs = ?self.config.resume_after_secs,
            "Mower simulator started"
        );

        loop {
            ticker.tick().await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let now_transmitting = self.is_transmitting(elapsed_ms);
            if now_transmitting != transmitting {
                if now_transmitting {
                    info!(elapsed_ms, "Mower link restored");
                } else {
                    warn!(elapsed_ms, "Mower link dropped");
                }
                transmitting = now_transmitting;
            }

            if transmitting {
                self.announce();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mower_safety::ManualClock;
    use mower_safety::config::DEFAULT_HEARTBEAT_PATH;

    fn simulator(drop: Option<u64>, resume: Option<u64>) -> MowerSimulator {
        MowerSimulator::new(
            SimulatorConfig {
                heartbeat_interval_ms: 1000,
                drop_after_secs: drop,
                resume_after_secs: resume,
            },
            DEFAULT_HEARTBEAT_PATH,
            Arc::new(InMemoryChannel::new()),
            Arc::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn transmits_forever_without_outage() {
        let sim = simulator(None, None);
        assert!(sim.is_transmitting(0));
        assert!(sim.is_transmitting(u64::MAX));
    }

    #[test]
    fn outage_window_is_half_open() {
        let sim = simulator(Some(10), Some(15));
        assert!(sim.is_transmitting(9_999));
        assert!(!sim.is_transmitting(10_000));
        assert!(!sim.is_transmitting(14_999));
        assert!(sim.is_transmitting(15_000));
    }

    #[test]
    fn outage_without_resume_is_permanent() {
        let sim = simulator(Some(5), None);
        assert!(!sim.is_transmitting(5_000));
        assert!(!sim.is_transmitting(3_600_000));
    }

    #[test]
    fn announce_stamps_with_clock() {
        let clock = Arc::new(ManualClock::new(42_000));
        let channel = Arc::new(InMemoryChannel::new());
        let sim = MowerSimulator::new(
            SimulatorConfig::default(),
            "mowers/north/lastHeartbeat",
            channel.clone(),
            clock,
        );
        sim.announce();
        assert_eq!(
            channel.last_heartbeat_at("mowers/north/lastHeartbeat"),
            Some(42_000)
        );
        assert_eq!(channel.last_heartbeat(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn run_publishes_on_interval_and_stops_during_outage() -> Result<(), mower_safety::ChannelError> {
        use mower_safety::HeartbeatChannel;
        use std::sync::atomic::{AtomicU64, Ordering};

        let channel = Arc::new(InMemoryChannel::new());
        let received = Arc::new(AtomicU64::new(0));
        let counter = received.clone();
        channel.subscribe(
            DEFAULT_HEARTBEAT_PATH,
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            }),
        )?;

        let sim = MowerSimulator::new(
            SimulatorConfig {
                heartbeat_interval_ms: 1000,
                drop_after_secs: Some(3),
                resume_after_secs: None,
            },
            DEFAULT_HEARTBEAT_PATH,
            channel,
            Arc::new(ManualClock::new(0)),
        );

        let task = tokio::spawn(sim.run());
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        task.abort();

        // Ticks at 0, 1 and 2 s publish; 3 s onwards is inside the outage.
        assert_eq!(received.load(Ordering::Relaxed), 3);
        Ok(())
    }
}
