//! Cancellable repeating schedule.
//!
//! Every timer-driven state machine owns one [`RepeatingTask`] instead of a
//! free-running timer. The owner asks it how many periods have elapsed at a
//! given time and does its work once; missed periods coalesce, the same way
//! `tokio::time::MissedTickBehavior::Skip` behaves.

/// A repeating task schedule driven by explicit timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatingTask {
    period_ms: u64,
    next_due_ms: Option<u64>,
}

impl RepeatingTask {
    /// Create a stopped task with the given period. A zero period is
    /// treated as one millisecond.
    #[must_use]
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            next_due_ms: None,
        }
    }

    /// Task period in milliseconds.
    #[must_use]
    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Whether the task is scheduled.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.next_due_ms.is_some()
    }

    /// Next due time, if running.
    #[must_use]
    pub fn next_due_ms(&self) -> Option<u64> {
        self.next_due_ms
    }

    /// (Re)start the schedule with the first tick one period after `now_ms`.
    ///
    /// Any previous schedule is replaced, never duplicated.
    pub fn start(&mut self, now_ms: u64) {
        self.next_due_ms = Some(now_ms.saturating_add(self.period_ms));
    }

    /// Start only if not already running. Returns `true` if it started.
    pub fn ensure_started(&mut self, now_ms: u64) -> bool {
        if self.is_running() {
            return false;
        }
        self.start(now_ms);
        true
    }

    /// Cancel the schedule.
    pub fn cancel(&mut self) {
        self.next_due_ms = None;
    }

    /// Number of whole periods that fell due at or before `now_ms`.
    ///
    /// Re-anchors the schedule past `now_ms`. Returns 0 when stopped or
    /// when nothing is due yet.
    pub fn poll_due(&mut self, now_ms: u64) -> u32 {
        let Some(due) = self.next_due_ms else {
            return 0;
        };
        if now_ms < due {
            return 0;
        }

        let overdue = now_ms.saturating_sub(due);
        let periods = (overdue / self.period_ms).saturating_add(1);
        let next = due.saturating_add(periods.saturating_mul(self.period_ms));
        self.next_due_ms = Some(next);
        u32::try_from(periods).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopped_task_never_fires() {
        let mut task = RepeatingTask::new(200);
        assert!(!task.is_running());
        assert_eq!(task.poll_due(10_000), 0);
    }

    #[test]
    fn test_fires_once_per_period() {
        let mut task = RepeatingTask::new(200);
        task.start(0);

        assert_eq!(task.poll_due(199), 0);
        assert_eq!(task.poll_due(200), 1);
        assert_eq!(task.poll_due(200), 0);
        assert_eq!(task.poll_due(399), 0);
        assert_eq!(task.poll_due(400), 1);
    }

    #[test]
    fn test_missed_periods_coalesce() {
        let mut task = RepeatingTask::new(1000);
        task.start(0);

        assert_eq!(task.poll_due(3500), 3);
        assert_eq!(task.next_due_ms(), Some(4000));
        assert_eq!(task.poll_due(3999), 0);
    }

    #[test]
    fn test_restart_replaces_schedule() {
        let mut task = RepeatingTask::new(1000);
        task.start(0);
        task.start(500);
        task.start(900);

        assert_eq!(task.poll_due(1000), 0);
        assert_eq!(task.poll_due(1900), 1);
    }

    #[test]
    fn test_ensure_started_is_idempotent() {
        let mut task = RepeatingTask::new(200);
        assert!(task.ensure_started(0));
        assert!(!task.ensure_started(150));
        assert_eq!(task.next_due_ms(), Some(200));

        task.cancel();
        assert!(!task.is_running());
    }
}
