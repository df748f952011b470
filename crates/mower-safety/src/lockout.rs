//! Aggregate operator lockout.
//!
//! The emergency lock and the safety timeout lock are independent; neither
//! can clear the other. Controls are locked when either holds.

/// Edge detector for the aggregate lock.
#[derive(Debug, Default)]
pub struct OperatorLockout {
    applied: Option<bool>,
}

impl OperatorLockout {
    /// Create a lockout that has not yet reported to the surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate lock for the two inputs.
    #[must_use]
    pub fn compute(emergency_locked: bool, timeout_locked: bool) -> bool {
        emergency_locked || timeout_locked
    }

    /// Last value reported to the surface.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.applied.unwrap_or(false)
    }

    /// Record the latest inputs. Returns the new aggregate when it changed,
    /// or when it was never reported.
    pub fn update(&mut self, emergency_locked: bool, timeout_locked: bool) -> Option<bool> {
        let locked = Self::compute(emergency_locked, timeout_locked);
        if self.applied == Some(locked) {
            return None;
        }
        self.applied = Some(locked);
        Some(locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_changes_only() {
        let mut lockout = OperatorLockout::new();
        assert_eq!(lockout.update(false, false), Some(false));
        assert_eq!(lockout.update(false, false), None);

        assert_eq!(lockout.update(true, false), Some(true));
        assert_eq!(lockout.update(true, true), None);
        assert_eq!(lockout.update(false, true), None);
        assert_eq!(lockout.update(false, false), Some(false));
        assert!(!lockout.is_locked());
    }

    #[test]
    fn test_either_input_locks() {
        assert!(OperatorLockout::compute(true, false));
        assert!(OperatorLockout::compute(false, true));
        assert!(!OperatorLockout::compute(false, false));
    }
}
