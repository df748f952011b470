//! Virtual-time scenario driver.
//!
//! Wires a [`SafetySupervisor`] to a [`ManualClock`], an [`InMemoryChannel`]
//! and a [`RecordingSurface`], then steps time forward one poll interval at a
//! time. Heartbeats travel through the channel subscription like they do in
//! the console runtime, and are delivered before the timers run at each step.

use mower_safety::channel::{ChannelResult, HeartbeatChannel, InMemoryChannel};
use mower_safety::clock::{Clock, ManualClock};
use mower_safety::config::SafetyConfig;
use mower_safety::error::SafetyResult;
use mower_safety::supervisor::SafetySupervisor;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::recording::RecordingSurface;

/// A supervisor on virtual time.
#[derive(Debug)]
pub struct Scenario {
    /// Shared virtual clock.
    pub clock: ManualClock,
    /// Telemetry store.
    pub channel: Arc<InMemoryChannel>,
    /// Surface recorder.
    pub surface: RecordingSurface,
    /// Supervisor under test.
    pub supervisor: SafetySupervisor,
    inbox: Arc<Mutex<Vec<u64>>>,
    heartbeat_path: String,
    step_ms: u64,
}

impl Scenario {
    /// Start at t=0 with a fresh store.
    pub fn new(config: SafetyConfig) -> SafetyResult<Self> {
        Self::with_channel(config, Arc::new(InMemoryChannel::new()), 0)
    }

    /// Start at `start_ms` on an existing store, as after a reload.
    pub fn with_channel(
        config: SafetyConfig,
        channel: Arc<InMemoryChannel>,
        start_ms: u64,
    ) -> SafetyResult<Self> {
        let clock = ManualClock::new(start_ms);
        let surface = RecordingSurface::new();
        let step_ms = config.poll_interval_ms;
        let heartbeat_path = config.heartbeat_path.clone();

        let inbox = Arc::new(Mutex::new(Vec::new()));
        subscribe_inbox(channel.as_ref(), &heartbeat_path, Arc::clone(&inbox))?;

        let supervisor = SafetySupervisor::new(
            config,
            Arc::new(clock.clone()),
            channel.clone(),
            Box::new(surface.clone()),
        )?;

        Ok(Self {
            clock,
            channel,
            surface,
            supervisor,
            inbox,
            heartbeat_path,
            step_ms,
        })
    }

    /// Current virtual time.
    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Publish a heartbeat stamped with the current time at the configured
    /// heartbeat path.
    pub fn heartbeat(&mut self) {
        self.channel
            .publish_heartbeat_at(&self.heartbeat_path, self.now());
    }

    /// Deliver queued heartbeats, then run whatever is due now.
    pub fn pump(&mut self) {
        let pending: Vec<u64> = std::mem::take(&mut *self.inbox.lock());
        for timestamp in pending {
            self.supervisor.on_heartbeat(timestamp);
        }
        self.supervisor.advance();
    }

    /// Step forward to `target_ms`, pumping at every poll interval and at
    /// the target itself.
    pub fn advance_to(&mut self, target_ms: u64) {
        if self.now() >= target_ms {
            self.pump();
            return;
        }
        while self.now() < target_ms {
            let next = self.now().saturating_add(self.step_ms).min(target_ms);
            self.clock.set(next);
            self.pump();
        }
    }

    /// Step forward by `delta_ms`.
    pub fn advance_by(&mut self, delta_ms: u64) {
        self.advance_to(self.now().saturating_add(delta_ms));
    }

    /// Step forward to `at_ms` and publish a heartbeat there. The heartbeat
    /// is delivered before anything due at `at_ms` runs.
    pub fn heartbeat_at(&mut self, at_ms: u64) {
        while self.now() < at_ms {
            let next = self.now().saturating_add(self.step_ms).min(at_ms);
            self.clock.set(next);
            if next < at_ms {
                self.pump();
            }
        }
        self.heartbeat();
        self.pump();
    }

    /// Step forward to `target_ms`, publishing a heartbeat every
    /// `interval_ms` along the way.
    pub fn run_with_heartbeats(&mut self, target_ms: u64, interval_ms: u64) {
        let interval_ms = interval_ms.max(1);
        loop {
            let next = self.now().saturating_add(interval_ms);
            if next > target_ms {
                break;
            }
            self.heartbeat_at(next);
        }
        self.advance_to(target_ms);
    }
}

fn subscribe_inbox(
    channel: &dyn HeartbeatChannel,
    path: &str,
    inbox: Arc<Mutex<Vec<u64>>>,
) -> ChannelResult<()> {
    channel.subscribe(path, Box::new(move |timestamp| inbox.lock().push(timestamp)))
}
