//! Prelude for mower-safety.
//!
//! Re-exports the types needed to build and drive a supervisor.
//!
//! # Example
//!
//! ```rust
//! use mower_safety::prelude::*;
//!
//! let mut timeout = ManualSafetyTimeout::from_config(&SafetyConfig::default());
//! timeout.enter_autonomous(0);
//! timeout.advance(30_000);
//!
//! assert_eq!(timeout.tier(), TimeoutTier::Locked);
//! ```

pub use crate::channel::{ChannelError, ChannelResult, HeartbeatChannel, InMemoryChannel};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::SafetyConfig;
pub use crate::emergency::{EmergencyCause, EmergencyState, EmergencyStateMachine};
pub use crate::error::{SafetyError, SafetyResult};
pub use crate::health::{ConnectionHealth, CountdownLevel};
pub use crate::safety_timeout::{ManualSafetyTimeout, OperatingMode, TimeoutTier};
pub use crate::supervisor::{RestartOutcome, SafetySupervisor};
pub use crate::surface::{ControlSurface, Countdown, NullSurface, RobotStatus, SafetyNotice};
pub use crate::watchdog::SafetyWatchdog;
