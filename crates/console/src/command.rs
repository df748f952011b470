//! Operator commands typed at the console prompt.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// One operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Raise the emergency stop confirmation prompt.
    Stop,
    /// Confirm the pending emergency stop.
    Confirm,
    /// Dismiss the pending emergency stop.
    Cancel,
    /// Re-arm after an emergency stop.
    Restart,
    /// Switch to manual mode.
    Manual,
    /// Switch to autonomous mode.
    Autonomous,
    /// Reset the autonomous safety timeout.
    Acknowledge,
    /// Print the current safety status.
    Status,
    /// Leave the console.
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command '{0}' (try: stop, confirm, cancel, restart, manual, auto, ack, status, quit)")]
pub struct UnknownCommand(pub String);

impl FromStr for OperatorCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" | "estop" | "e" => Ok(Self::Stop),
            "confirm" | "yes" | "y" => Ok(Self::Confirm),
            "cancel" | "no" | "n" => Ok(Self::Cancel),
            "restart" | "rearm" => Ok(Self::Restart),
            "manual" => Ok(Self::Manual),
            "auto" | "autonomous" => Ok(Self::Autonomous),
            "ack" | "reset" => Ok(Self::Acknowledge),
            "status" | "s" => Ok(Self::Status),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for OperatorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stop => "stop",
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
            Self::Restart => "restart",
            Self::Manual => "manual",
            Self::Autonomous => "auto",
            Self::Acknowledge => "ack",
            Self::Status => "status",
            Self::Quit => "quit",
        };
        f.write_str(name)
    }
}
