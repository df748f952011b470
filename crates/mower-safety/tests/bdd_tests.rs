//! BDD tests for heartbeat loss and emergency stop scenarios.
//!
//! Feature: connection_loss_safety.feature

#![cfg(test)]

use mower_safety::prelude::*;
use mower_test_helpers::prelude::*;

const FLAG: &str = "robot/emergency/active";

fn is_watchdog_banner(notice: &SafetyNotice) -> bool {
    matches!(
        notice,
        SafetyNotice::EmergencyBanner {
            cause: EmergencyCause::Watchdog
        }
    )
}

mod connection_loss_scenarios {
    use super::*;

    /// Scenario: Heartbeat stops and the console locks
    ///
    /// Given a heartbeat at t=0 and no further heartbeats
    /// When time reaches 4000 ms
    /// Then the connection is degraded with about 1000 ms remaining
    /// When time reaches 5000 ms
    /// Then the watchdog escalates and controls lock
    /// When the next poll runs at 5200 ms
    /// Then nothing is escalated or written a second time
    #[test]
    fn scenario_heartbeat_stops_and_console_locks() -> TestResult {
        let mut scenario = Scenario::new(SafetyConfig::default())?;
        scenario.heartbeat();

        scenario.advance_to(4_000);
        assert_eq!(scenario.supervisor.health(), ConnectionHealth::Degraded);
        assert_eq!(
            scenario.surface.last_heartbeat_countdown(),
            Some(Countdown::Heartbeat {
                remaining_ms: 1_000,
                health: ConnectionHealth::Degraded,
                level: CountdownLevel::Critical,
            })
        );
        assert!(!scenario.supervisor.is_locked());
        assert_eq!(
            scenario.surface.count_notices(|n| matches!(
                n,
                SafetyNotice::ConnectionStatus {
                    health: ConnectionHealth::Degraded
                }
            )),
            1
        );

        scenario.advance_to(5_000);
        assert_eq!(scenario.supervisor.health(), ConnectionHealth::Lost);
        assert_eq!(
            scenario.supervisor.emergency().cause(),
            Some(EmergencyCause::Watchdog)
        );
        assert!(scenario.supervisor.is_locked());
        assert_eq!(scenario.surface.last_locked(), Some(true));
        assert_eq!(scenario.channel.flag(FLAG), Some(true));

        scenario.advance_to(5_200);
        assert!(scenario.supervisor.is_locked());
        assert_eq!(scenario.channel.write_count(), 1);
        assert_eq!(scenario.surface.count_notices(is_watchdog_banner), 1);
        assert_eq!(scenario.surface.lock_changes(), vec![false, true]);
        assert_eq!(scenario.supervisor.watchdog_stats().escalations, 1);
        Ok(())
    }

    /// Scenario: Recovered heartbeat does not unlock on its own
    #[test]
    fn scenario_recovered_heartbeat_does_not_self_heal() -> TestResult {
        let mut scenario = Scenario::new(SafetyConfig::default())?;
        scenario.heartbeat();
        scenario.advance_to(6_000);
        assert!(scenario.supervisor.is_locked());

        scenario.run_with_heartbeats(30_000, 1_000);
        assert_eq!(scenario.supervisor.health(), ConnectionHealth::Healthy);
        assert!(scenario.supervisor.is_locked());
        assert!(scenario.supervisor.watchdog().is_escalated());
        Ok(())
    }

    /// Scenario: Store write fails during escalation
    #[test]
    fn scenario_store_write_failure_keeps_local_lock() -> TestResult {
        let mut scenario = Scenario::new(SafetyConfig::default())?;
        scenario.channel.set_fail_writes(true);
        scenario.heartbeat();

        scenario.advance_to(5_000);
        assert!(scenario.supervisor.is_locked());
        assert_eq!(scenario.channel.flag(FLAG), None);
        assert_eq!(scenario.supervisor.watchdog_stats().failed_flag_writes, 1);
        Ok(())
    }

    /// Scenario: Connection lost while a manual stop is pending
    #[test]
    fn scenario_connection_loss_overrides_pending_prompt() -> TestResult {
        let mut scenario = Scenario::new(SafetyConfig::default())?;
        scenario.heartbeat();
        scenario.supervisor.request_manual_stop()?;

        scenario.advance_to(5_000);
        assert_eq!(
            scenario.supervisor.emergency().cause(),
            Some(EmergencyCause::Watchdog)
        );
        assert!(scenario.supervisor.cancel_manual_stop().is_err());
        Ok(())
    }

    /// Scenario: Mode switching never stops heartbeat monitoring
    #[test]
    fn scenario_mode_switch_keeps_monitoring() -> TestResult {
        let mut scenario = Scenario::new(SafetyConfig::default())?;
        scenario.heartbeat();

        for _ in 0..5 {
            scenario.supervisor.set_mode(OperatingMode::Autonomous)?;
            scenario.supervisor.set_mode(OperatingMode::Manual)?;
        }
        assert!(scenario.supervisor.watchdog().is_monitoring());

        scenario.advance_to(5_000);
        assert!(scenario.supervisor.is_locked());
        Ok(())
    }
}

mod manual_stop_scenarios {
    use super::*;

    /// Scenario: Operator requests then cancels a stop
    #[test]
    fn scenario_request_then_cancel_never_locks() -> TestResult {
        let mut scenario = Scenario::new(SafetyConfig::default())?;
        scenario.heartbeat();

        scenario.supervisor.request_manual_stop()?;
        scenario.advance_by(1_000);
        assert!(!scenario.supervisor.is_locked());

        scenario.supervisor.cancel_manual_stop()?;
        assert!(!scenario.supervisor.is_locked());
        assert_eq!(scenario.surface.lock_changes(), vec![false]);
        assert_eq!(
            scenario.surface.notices().first(),
            Some(&SafetyNotice::ConfirmationRequested)
        );
        assert_eq!(scenario.channel.write_count(), 0);
        Ok(())
    }

    /// Scenario: Operator confirms a stop
    #[test]
    fn scenario_confirm_locks_immediately() -> TestResult {
        let mut scenario = Scenario::new(SafetyConfig::default())?;
        scenario.heartbeat();

        scenario.supervisor.request_manual_stop()?;
        scenario.supervisor.confirm_manual_stop()?;

        assert!(scenario.supervisor.is_locked());
        assert_eq!(
            scenario.supervisor.emergency().cause(),
            Some(EmergencyCause::Manual)
        );
        assert_eq!(scenario.surface.last_locked(), Some(true));
        assert_eq!(scenario.channel.flag(FLAG), Some(true));
        assert_eq!(scenario.supervisor.status().robot_status, RobotStatus::EmergencyStop);
        Ok(())
    }

    /// Scenario: Mode buttons are locked during an emergency stop
    #[test]
    fn scenario_mode_change_refused_while_stopped() -> TestResult {
        let mut scenario = Scenario::new(SafetyConfig::default())?;
        scenario.heartbeat();
        scenario.supervisor.request_manual_stop()?;
        scenario.supervisor.confirm_manual_stop()?;

        let err = must_err(scenario.supervisor.set_mode(OperatingMode::Autonomous));
        assert!(matches!(err, SafetyError::ControlsLocked(_)));
        assert_eq!(scenario.supervisor.mode(), OperatingMode::Manual);
        Ok(())
    }
}
