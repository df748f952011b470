//! Recording control surface.

use mower_safety::surface::{ControlSurface, Countdown, SafetyNotice};
use parking_lot::Mutex;
use std::sync::Arc;

/// One call made on the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// `set_locked`.
    Locked(bool),
    /// `set_countdown_display`.
    Countdown(Countdown),
    /// `notify`.
    Notice(SafetyNotice),
}

/// Surface that appends every call to a shared log.
///
/// Clones share the log: hand one to the supervisor, inspect the other.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    events: Arc<Mutex<Vec<SurfaceEvent>>>,
}

impl RecordingSurface {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event so far.
    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().clone()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Sequence of `set_locked` values.
    pub fn lock_changes(&self) -> Vec<bool> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Locked(locked) => Some(*locked),
                _ => None,
            })
            .collect()
    }

    /// Last `set_locked` value, if any.
    pub fn last_locked(&self) -> Option<bool> {
        self.lock_changes().last().copied()
    }

    /// Every notice in order.
    pub fn notices(&self) -> Vec<SafetyNotice> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Notice(notice) => Some(notice.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of notices matching `pred`.
    pub fn count_notices(&self, pred: impl Fn(&SafetyNotice) -> bool) -> usize {
        self.notices().iter().filter(|n| pred(n)).count()
    }

    /// Most recent heartbeat countdown.
    pub fn last_heartbeat_countdown(&self) -> Option<Countdown> {
        self.events.lock().iter().rev().find_map(|e| match e {
            SurfaceEvent::Countdown(c @ Countdown::Heartbeat { .. }) => Some(*c),
            _ => None,
        })
    }

    /// Most recent safety timeout countdown.
    pub fn last_timeout_countdown(&self) -> Option<Countdown> {
        self.events.lock().iter().rev().find_map(|e| match e {
            SurfaceEvent::Countdown(c @ Countdown::SafetyTimeout { .. }) => Some(*c),
            _ => None,
        })
    }
}

impl ControlSurface for RecordingSurface {
    fn set_locked(&mut self, locked: bool) {
        self.events.lock().push(SurfaceEvent::Locked(locked));
    }

    fn set_countdown_display(&mut self, countdown: Countdown) {
        self.events.lock().push(SurfaceEvent::Countdown(countdown));
    }

    fn notify(&mut self, notice: SafetyNotice) {
        self.events.lock().push(SurfaceEvent::Notice(notice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mower_safety::safety_timeout::TimeoutTier;

    #[test]
    fn test_clones_share_log() {
        let recorder = RecordingSurface::new();
        let mut sink = recorder.clone();

        sink.set_locked(true);
        sink.notify(SafetyNotice::EmergencyCleared);
        sink.set_countdown_display(Countdown::SafetyTimeout {
            remaining_secs: 12,
            tier: TimeoutTier::Active,
        });
        sink.set_locked(false);

        assert_eq!(recorder.lock_changes(), vec![true, false]);
        assert_eq!(recorder.last_locked(), Some(false));
        assert_eq!(recorder.notices(), vec![SafetyNotice::EmergencyCleared]);
        assert!(recorder.last_timeout_countdown().is_some());
        assert!(recorder.last_heartbeat_countdown().is_none());

        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}
