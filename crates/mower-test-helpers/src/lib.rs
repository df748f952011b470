//! Shared test utilities for the mower safety console.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with good error messages and `#[track_caller]`
//! - [`recording`] - A `ControlSurface` that records everything it is told
//! - [`scenario`] - Virtual-time driver wiring a supervisor to an in-memory store
//! - [`prelude`] - Convenience re-exports
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! mower-test-helpers = { path = "crates/mower-test-helpers" }
//! ```
//!
//! ```rust,ignore
//! use mower_test_helpers::prelude::*;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::unwrap_used, clippy::panic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod must;
pub mod prelude;
pub mod recording;
pub mod scenario;

pub use must::*;
