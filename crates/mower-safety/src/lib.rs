//! # mower-safety
//!
//! Heartbeat watchdog and emergency-stop arbitration for the robotic mower
//! operator console.
//!
//! This crate provides the supervisory safety logic that runs on the console:
//! - `SafetyWatchdog` tracks heartbeat age and escalates on connection loss
//! - `EmergencyStateMachine` merges manual and watchdog stops into one lock
//! - `ManualSafetyTimeout` locks unattended autonomous operation
//! - `SafetySupervisor` is the operator command surface tying them together
//! - `HeartbeatChannel` abstracts the telemetry store, with `InMemoryChannel`
//!   for tests and simulation
//!
//! ## Safety Guarantees
//!
//! - **Fail safe**: loss of heartbeat locks controls and never self-heals
//! - **Live re-arm gate**: restart is checked against the heartbeat at the
//!   moment of the request, whatever caused the lock
//! - **Clear-then-unlock**: the persisted flag is cleared and read back
//!   before controls unlock
//! - **Local authority**: a failed store write never weakens a local lock
//!
//! ## Connection Health
//!
//! ```text
//!  0 ms            warning (4000)        timeout (5000)
//!  ├──── Healthy ────┼──── Degraded ───────┼──── Lost ──▶ escalate
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use mower_safety::prelude::*;
//!
//! # fn main() -> Result<(), SafetyError> {
//! let clock = ManualClock::new(0);
//! let channel = Arc::new(InMemoryChannel::new());
//! let mut supervisor = SafetySupervisor::new(
//!     SafetyConfig::default(),
//!     Arc::new(clock.clone()),
//!     channel.clone(),
//!     Box::new(NullSurface),
//! )?;
//!
//! supervisor.on_heartbeat(0);
//! clock.set(5_000);
//! supervisor.advance();
//!
//! assert!(supervisor.is_locked());
//! assert!(supervisor.request_restart().is_err());
//! # Ok(())
//! # }
//! ```

#![deny(
    unsafe_op_in_unsafe_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::panic,
    missing_docs,
    missing_debug_implementations
)]
#![warn(clippy::pedantic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod channel;
pub mod clock;
pub mod config;
pub mod emergency;
pub mod error;
pub mod health;
pub mod lockout;
pub mod prelude;
pub mod safety_timeout;
pub mod scheduler;
pub mod supervisor;
pub mod surface;
pub mod watchdog;

pub use channel::{ChannelError, ChannelResult, HeartbeatCallback, HeartbeatChannel, InMemoryChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SafetyConfig, SafetyConfigBuilder};
pub use emergency::{EmergencyCause, EmergencyState, EmergencyStateMachine, ReleaseOutcome};
pub use error::{SafetyError, SafetyResult};
pub use health::{ConnectionHealth, CountdownLevel};
pub use lockout::OperatorLockout;
pub use safety_timeout::{ManualSafetyTimeout, OperatingMode, TimeoutTier};
pub use scheduler::RepeatingTask;
pub use supervisor::{RestartOutcome, SafetySupervisor, SupervisorStatus};
pub use surface::{ControlSurface, Countdown, NullSurface, RobotStatus, SafetyNotice};
pub use watchdog::{SafetyWatchdog, WatchdogReport, WatchdogStats};
