//! Convenience re-exports for common test utilities.
//!
//! ```rust,ignore
//! use mower_test_helpers::prelude::*;
//! ```

pub use crate::must::{must, must_err, must_some, must_with};
pub use crate::recording::{RecordingSurface, SurfaceEvent};
pub use crate::scenario::Scenario;

/// Result type for tests that use `?`.
pub type TestResult = Result<(), Box<dyn std::error::Error>>;
