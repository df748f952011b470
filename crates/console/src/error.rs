//! Error types for mowerctl

use mower_safety::SafetyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Safety error: {0}")]
    Safety(SafetyError),
}

impl From<SafetyError> for ConsoleError {
    fn from(err: SafetyError) -> Self {
        match err {
            SafetyError::InvalidConfiguration(msg) => Self::InvalidConfiguration(msg),
            other => Self::Safety(other),
        }
    }
}

impl ConsoleError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidConfiguration(_) | Self::JsonError(_) => 2,
            Self::IoError(_) => 3,
            Self::Safety(_) => 1,
        }
    }
}

/// Map an error chain to a process exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(console) = err.downcast_ref::<ConsoleError>() {
        return console.exit_code();
    }
    if err.downcast_ref::<std::io::Error>().is_some() {
        return 3;
    }
    1
}
