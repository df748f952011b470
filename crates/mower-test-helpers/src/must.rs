//! Unwrap helpers for tests.
//!
//! Use these instead of `unwrap()` and `expect()` so a failure points at the
//! calling line and prints the error value.

use std::fmt::Debug;

/// Unwrap a `Result`, panicking with the error value.
///
/// # Example
///
/// ```rust
/// use mower_test_helpers::must;
///
/// let result: Result<u64, &str> = Ok(5000);
/// assert_eq!(must(result), 5000);
/// ```
///
/// # Panics
///
/// Panics if the result is `Err`.
#[track_caller]
pub fn must<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("must: unexpected Err: {e:?}"),
    }
}

/// Unwrap an `Option`, panicking with `msg` if `None`.
///
/// # Panics
///
/// Panics if the option is `None`.
#[track_caller]
pub fn must_some<T>(option: Option<T>, msg: &str) -> T {
    match option {
        Some(v) => v,
        None => panic!("must_some: {msg}"),
    }
}

/// Unwrap an expected `Err`, panicking if the result is `Ok`.
///
/// # Example
///
/// ```rust
/// use mower_test_helpers::must_err;
///
/// let result: Result<(), &str> = Err("refused");
/// assert_eq!(must_err(result), "refused");
/// ```
///
/// # Panics
///
/// Panics if the result is `Ok`.
#[track_caller]
pub fn must_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("must_err: unexpected Ok: {v:?}"),
        Err(e) => e,
    }
}

/// Unwrap a `Result` with a context message.
///
/// # Panics
///
/// Panics if the result is `Err`, with the context and error value.
#[track_caller]
pub fn must_with<T, E: Debug>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("must_with: {context}: {e:?}"),
    }
}
