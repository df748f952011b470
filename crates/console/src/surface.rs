//! Control surface that reports to the tracing log.

use mower_safety::{ConnectionHealth, ControlSurface, Countdown, SafetyNotice};
use tracing::{error, info, trace, warn};

/// Logs every lock change and notice; countdown ticks go to `trace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSurface;

impl ControlSurface for LogSurface {
    fn set_locked(&mut self, locked: bool) {
        if locked {
            warn!("Operator controls LOCKED");
        } else {
            info!("Operator controls unlocked");
        }
    }

    fn set_countdown_display(&mut self, countdown: Countdown) {
        match countdown {
            Countdown::Heartbeat {
                remaining_ms,
                health,
                level,
            } => trace!(remaining_ms, %health, ?level, "Heartbeat countdown"),
            Countdown::SafetyTimeout {
                remaining_secs,
                tier,
            } => trace!(remaining_secs, tier = tier.label(), "Safety timeout"),
        }
    }

    fn notify(&mut self, notice: SafetyNotice) {
        match &notice {
            SafetyNotice::EmergencyBanner { .. } => error!("{notice}"),
            SafetyNotice::RestartRefused { .. } | SafetyNotice::SafetyTimeoutExpired => {
                warn!("{notice}");
            }
            SafetyNotice::ConnectionStatus { health } if *health != ConnectionHealth::Healthy => {
                warn!("{notice}");
            }
            _ => info!("{notice}"),
        }
    }
}
