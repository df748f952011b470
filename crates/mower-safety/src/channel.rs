//! Heartbeat channel contract and the in-memory store.
//!
//! The telemetry store is an external collaborator. The core consumes it
//! only through [`HeartbeatChannel`]: a stream of heartbeat timestamps at a
//! store path and a boolean flag that mirrors the emergency state. The store
//! is treated as an eventually-consistent mirror; it is never the sole
//! source of a lock decision.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;

use crate::config::DEFAULT_HEARTBEAT_PATH;

/// Errors reported by a [`HeartbeatChannel`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// A flag write did not reach the store.
    #[error("Write to '{path}' failed: {reason}")]
    WriteFailed {
        /// Store path that was written.
        path: String,
        /// Reason for the failure.
        reason: String,
    },

    /// A flag read did not complete.
    #[error("Read of '{path}' failed: {reason}")]
    ReadFailed {
        /// Store path that was read.
        path: String,
        /// Reason for the failure.
        reason: String,
    },

    /// The store cannot be reached at all.
    #[error("Telemetry store unavailable: {0}")]
    Unavailable(String),
}

impl ChannelError {
    /// Create a write failed error.
    #[must_use]
    pub fn write_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a read failed error.
    #[must_use]
    pub fn read_failed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReadFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}

/// A specialized `Result` type for channel operations.
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// Callback invoked with every delivered heartbeat timestamp.
pub type HeartbeatCallback = Box<dyn Fn(u64) + Send + Sync>;

/// Contract of the external telemetry store.
///
/// Delivery is at-least-once with no ordering guarantee beyond "most recent
/// call wins". Implementations must report failures through
/// [`ChannelError`] and never panic.
pub trait HeartbeatChannel: Send + Sync {
    /// Register a callback for heartbeats published at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be subscribed to.
    fn subscribe(&self, path: &str, callback: HeartbeatCallback) -> ChannelResult<()>;

    /// Stop heartbeat delivery to all callbacks.
    fn unsubscribe(&self);

    /// Best-effort write of a boolean flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the write did not reach the store.
    fn write_flag(&self, path: &str, value: bool) -> ChannelResult<()>;

    /// Read a boolean flag. `Ok(None)` means the flag was never written.
    ///
    /// # Errors
    ///
    /// Returns an error if the read did not complete.
    fn read_flag(&self, path: &str) -> ChannelResult<Option<bool>>;
}

/// In-process telemetry store.
///
/// Used by the console simulator and by tests. Failure injection switches
/// let tests exercise the degraded paths: failed writes, an unreachable
/// store (reads and subscriptions fail), and writes that report success but
/// are overwritten before anyone reads them.
#[derive(Default)]
pub struct InMemoryChannel {
    flags: RwLock<HashMap<String, bool>>,
    heartbeats: RwLock<HashMap<String, u64>>,
    subscribers: RwLock<Vec<(String, Arc<dyn Fn(u64) + Send + Sync>)>>,
    write_log: RwLock<Vec<(String, bool)>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    drop_writes: AtomicBool,
    delivered: AtomicU64,
}

impl InMemoryChannel {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given flag already persisted, as after a
    /// page reload.
    #[must_use]
    pub fn with_flag(path: &str, value: bool) -> Self {
        let channel = Self::new();
        channel.flags.write().insert(path.to_string(), value);
        channel
    }

    /// Publish a heartbeat at the default heartbeat path.
    pub fn publish_heartbeat(&self, timestamp_ms: u64) {
        self.publish_heartbeat_at(DEFAULT_HEARTBEAT_PATH, timestamp_ms);
    }

    /// Publish a heartbeat at `path` as the mower would, delivering it to
    /// every subscriber of that path.
    pub fn publish_heartbeat_at(&self, path: &str, timestamp_ms: u64) {
        self.heartbeats.write().insert(path.to_string(), timestamp_ms);

        let subscribers: Vec<_> = self
            .subscribers
            .read()
            .iter()
            .filter(|(subscribed, _)| subscribed == path)
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in subscribers {
            callback(timestamp_ms);
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Last heartbeat value held at the default heartbeat path.
    #[must_use]
    pub fn last_heartbeat(&self) -> Option<u64> {
        self.last_heartbeat_at(DEFAULT_HEARTBEAT_PATH)
    }

    /// Last heartbeat value held at `path`.
    #[must_use]
    pub fn last_heartbeat_at(&self, path: &str) -> Option<u64> {
        self.heartbeats.read().get(path).copied()
    }

    /// Current value of a flag, bypassing failure injection.
    #[must_use]
    pub fn flag(&self, path: &str) -> Option<bool> {
        self.flags.read().get(path).copied()
    }

    /// Every write that reached the store, in order.
    #[must_use]
    pub fn write_log(&self) -> Vec<(String, bool)> {
        self.write_log.read().clone()
    }

    /// Number of writes that reached the store.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.write_log.read().len()
    }

    /// Number of heartbeat deliveries made to subscribers.
    #[must_use]
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Make every write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Release);
    }

    /// Make the store unreachable: reads and new subscriptions fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Release);
    }

    /// Acknowledge writes without applying them, as if another writer
    /// re-asserted the previous value.
    pub fn set_drop_writes(&self, drop: bool) {
        self.drop_writes.store(drop, Ordering::Release);
    }
}

impl HeartbeatChannel for InMemoryChannel {
    fn subscribe(&self, path: &str, callback: HeartbeatCallback) -> ChannelResult<()> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(ChannelError::unavailable(format!(
                "cannot subscribe to '{path}'"
            )));
        }
        let callback: Arc<dyn Fn(u64) + Send + Sync> = Arc::from(callback);

        // A fresh subscription sees the current value, like a realtime
        // database listener does.
        if let Some(timestamp) = self.last_heartbeat_at(path) {
            callback(timestamp);
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }

        self.subscribers.write().push((path.to_string(), callback));
        Ok(())
    }

    fn unsubscribe(&self) {
        self.subscribers.write().clear();
    }

    fn write_flag(&self, path: &str, value: bool) -> ChannelResult<()> {
        if self.fail_writes.load(Ordering::Acquire) {
            return Err(ChannelError::write_failed(path, "store rejected write"));
        }

        if !self.drop_writes.load(Ordering::Acquire) {
            self.flags.write().insert(path.to_string(), value);
        }
        self.write_log.write().push((path.to_string(), value));
        Ok(())
    }

    fn read_flag(&self, path: &str) -> ChannelResult<Option<bool>> {
        if self.fail_reads.load(Ordering::Acquire) {
            return Err(ChannelError::read_failed(path, "store unreachable"));
        }
        Ok(self.flags.read().get(path).copied())
    }
}

impl std::fmt::Debug for InMemoryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryChannel")
            .field("flags", &*self.flags.read())
            .field("heartbeats", &*self.heartbeats.read())
            .field("subscribers", &self.subscribers.read().len())
            .finish()
    }
}
