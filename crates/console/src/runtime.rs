//! Console event loop.
//!
//! Drives the safety supervisor on real timers: heartbeats arrive through a
//! channel subscription, the watchdog is advanced on the poll interval, and
//! operator commands are read line by line.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mower_safety::{
    Clock, HeartbeatChannel, InMemoryChannel, OperatingMode, RestartOutcome, SafetyError,
    SafetyResult, SafetySupervisor, SupervisorStatus,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, error, info, trace, warn};

use crate::command::OperatorCommand;
use crate::config::{ConsoleConfig, StoreSnapshot};
use crate::error::ConsoleError;
use crate::simulator::MowerSimulator;
use crate::surface::LogSurface;

/// Per-session options from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Re-assert the lock from the persisted emergency flag at startup.
    pub restore: bool,
    /// Stop after this long.
    pub duration: Option<Duration>,
    /// Where the store's emergency flag is persisted between sessions.
    pub state_path: Option<PathBuf>,
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Operator typed `quit`.
    Quit,
    /// `--duration-secs` elapsed.
    Elapsed,
    /// Shutdown signal.
    Interrupted,
}

/// What happened during a session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub reason: ExitReason,
    pub heartbeats: u64,
    pub escalations: u64,
    pub status: SupervisorStatus,
    pub emergency_flag: Option<bool>,
}

enum Flow {
    Continue,
    Quit,
}

/// Run one console session until `quit`, the duration, or `shutdown`.
pub async fn run_session<R, S>(
    config: ConsoleConfig,
    options: RunOptions,
    clock: Arc<dyn Clock>,
    input: R,
    shutdown: S,
) -> Result<SessionSummary>
where
    R: AsyncBufRead + Unpin,
    S: Future<Output = ()>,
{
    config.validate()?;
    let flag_path = config.safety.emergency_flag_path.clone();

    let snapshot = match &options.state_path {
        Some(path) if options.restore => StoreSnapshot::load_from_path(path).await?,
        _ => StoreSnapshot::default(),
    };
    let channel = Arc::new(if snapshot.emergency_active {
        InMemoryChannel::with_flag(&flag_path, true)
    } else {
        InMemoryChannel::new()
    });

    let mut supervisor = SafetySupervisor::new(
        config.safety.clone(),
        clock.clone(),
        channel.clone(),
        Box::new(LogSurface),
    )
    .map_err(ConsoleError::from)?;

    if options.restore && supervisor.restore_from_store() {
        warn!("Emergency stop restored from previous session");
    }

    // The mower is already running when the console attaches, so the store
    // holds a current heartbeat before the subscription starts.
    let heartbeat_path = config.safety.heartbeat_path.clone();
    let simulator = MowerSimulator::new(
        config.simulator.clone(),
        heartbeat_path.clone(),
        channel.clone(),
        clock,
    );
    simulator.announce();

    let (heartbeat_tx, mut heartbeats) = mpsc::unbounded_channel::<u64>();
    channel
        .subscribe(
            &heartbeat_path,
            Box::new(move |timestamp| {
                if heartbeat_tx.send(timestamp).is_err() {
                    trace!(timestamp, "Heartbeat after console loop exit");
                }
            }),
        )
        .with_context(|| format!("Failed to subscribe to heartbeats at '{heartbeat_path}'"))?;
    while let Ok(timestamp) = heartbeats.try_recv() {
        supervisor.on_heartbeat(timestamp);
    }

    let simulator = tokio::spawn(simulator.run());

    let period = config.safety.poll_interval();
    let start = Instant::now();
    let mut poll = interval_at(start.checked_add(period).unwrap_or(start), period);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let deadline = options.duration.and_then(|d| start.checked_add(d));
    let until_deadline = async move {
        match deadline {
            Some(at) => sleep_until(at).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(until_deadline);
    tokio::pin!(shutdown);

    let mut lines = input.lines();
    let mut input_open = true;

    info!(
        poll_interval_ms = config.safety.poll_interval_ms,
        heartbeat_timeout_ms = config.safety.heartbeat_timeout_ms,
        "Console session started"
    );

    let reason = loop {
        tokio::select! {
            biased;

            () = &mut shutdown => break ExitReason::Interrupted,
            () = &mut until_deadline => break ExitReason::Elapsed,
            Some(timestamp) = heartbeats.recv() => supervisor.on_heartbeat(timestamp),
            _ = poll.tick() => supervisor.advance(),
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    if let Flow::Quit = handle_line(&mut supervisor, &line) {
                        break ExitReason::Quit;
                    }
                }
                Ok(None) => {
                    debug!("Operator input closed");
                    input_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read operator input");
                    input_open = false;
                }
            },
        }
    };

    simulator.abort();
    supervisor.shutdown();

    let emergency_flag = channel.flag(&flag_path);
    if let Some(path) = &options.state_path {
        StoreSnapshot {
            emergency_active: emergency_flag.unwrap_or(false),
        }
        .save_to_path(path)
        .await?;
    }

    let stats = supervisor.watchdog_stats();
    let summary = SessionSummary {
        reason,
        heartbeats: stats.heartbeats,
        escalations: stats.escalations,
        status: supervisor.status(),
        emergency_flag,
    };
    info!(reason = ?summary.reason, status = %summary.status, "Console session ended");
    Ok(summary)
}

fn handle_line(supervisor: &mut SafetySupervisor, line: &str) -> Flow {
    if line.trim().is_empty() {
        return Flow::Continue;
    }

    match line.parse::<OperatorCommand>() {
        Ok(command) => match execute(supervisor, command) {
            Ok(flow) => flow,
            Err(e) => {
                report_failure(command, &e);
                Flow::Continue
            }
        },
        Err(e) => {
            warn!("{e}");
            Flow::Continue
        }
    }
}

fn report_failure(command: OperatorCommand, e: &SafetyError) {
    if e.is_refusal() {
        warn!(%command, error = %e, "Command refused");
    } else {
        error!(%command, error = %e, "Command failed");
    }
}

fn execute(supervisor: &mut SafetySupervisor, command: OperatorCommand) -> SafetyResult<Flow> {
    debug!(%command, "Operator command");
    match command {
        OperatorCommand::Stop => supervisor.request_manual_stop()?,
        OperatorCommand::Confirm => supervisor.confirm_manual_stop()?,
        OperatorCommand::Cancel => supervisor.cancel_manual_stop()?,
        OperatorCommand::Restart => match supervisor.request_restart()? {
            RestartOutcome::Pending { release_at_ms } => {
                info!(release_at_ms, "Restart accepted");
            }
            RestartOutcome::Released => info!("Restart accepted, controls released"),
        },
        OperatorCommand::Manual => supervisor.set_mode(OperatingMode::Manual)?,
        OperatorCommand::Autonomous => supervisor.set_mode(OperatingMode::Autonomous)?,
        OperatorCommand::Acknowledge => {
            if !supervisor.acknowledge_safety_timeout()? {
                info!("Safety timeout not armed");
            }
        }
        OperatorCommand::Status => println!("{}", supervisor.status()),
        OperatorCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mower_safety::{EmergencyCause, EmergencyState, ManualClock, NullSurface, SafetyConfig};
    use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const EPOCH_MS: u64 = 1_700_000_000_000;

    /// Wall clock that follows tokio's (pausable) time.
    struct TokioClock {
        start: Instant,
    }

    impl TokioClock {
        fn new() -> Arc<dyn Clock> {
            Arc::new(Self {
                start: Instant::now(),
            })
        }
    }

    impl Clock for TokioClock {
        fn now_ms(&self) -> u64 {
            let elapsed = u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX);
            EPOCH_MS.saturating_add(elapsed)
        }
    }

    fn options(duration_secs: u64) -> RunOptions {
        RunOptions {
            duration: Some(Duration::from_secs(duration_secs)),
            ..RunOptions::default()
        }
    }

    fn no_input() -> BufReader<&'static [u8]> {
        BufReader::new(&b""[..])
    }

    /// Operator input written at scripted offsets.
    fn scripted(steps: Vec<(u64, &'static str)>) -> BufReader<DuplexStream> {
        let (mut writer, reader) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            for (at_ms, line) in steps {
                tokio::time::sleep(Duration::from_millis(at_ms)).await;
                if writer.write_all(format!("{line}\n").as_bytes()).await.is_err() {
                    return;
                }
            }
            // Keep the pipe open so end-of-input does not race the session.
            std::future::pending::<()>().await;
        });
        BufReader::new(reader)
    }

    #[tokio::test(start_paused = true)]
    async fn steady_heartbeats_keep_controls_unlocked() -> TestResult {
        let summary = run_session(
            ConsoleConfig::default(),
            options(20),
            TokioClock::new(),
            no_input(),
            std::future::pending(),
        )
        .await?;

        assert_eq!(summary.reason, ExitReason::Elapsed);
        assert_eq!(summary.escalations, 0);
        assert!(!summary.status.locked);
        assert!(summary.heartbeats >= 8);
        assert_eq!(summary.emergency_flag, None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_outage_escalates_and_stays_locked() -> TestResult {
        let mut config = ConsoleConfig::default();
        config.simulator.drop_after_secs = Some(10);
        config.simulator.resume_after_secs = Some(15);

        let summary = run_session(
            config,
            options(25),
            TokioClock::new(),
            no_input(),
            std::future::pending(),
        )
        .await?;

        assert_eq!(summary.escalations, 1);
        assert!(summary.status.locked);
        assert!(matches!(
            summary.status.emergency,
            EmergencyState::Active {
                cause: EmergencyCause::Watchdog,
                ..
            }
        ));
        assert_eq!(summary.emergency_flag, Some(true));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn operator_stop_and_restart() -> TestResult {
        let input = scripted(vec![
            (1_000, "stop"),
            (500, "confirm"),
            (1_000, "restart"),
        ]);

        let summary = run_session(
            ConsoleConfig::default(),
            options(6),
            TokioClock::new(),
            input,
            std::future::pending(),
        )
        .await?;

        assert_eq!(summary.status.emergency, EmergencyState::Inactive);
        assert!(!summary.status.locked);
        assert_eq!(summary.emergency_flag, Some(false));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn quit_ends_session_early() -> TestResult {
        let summary = run_session(
            ConsoleConfig::default(),
            options(60),
            TokioClock::new(),
            scripted(vec![(2_000, "status"), (0, "quit")]),
            std::future::pending(),
        )
        .await?;

        assert_eq!(summary.reason, ExitReason::Quit);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_signal_interrupts() -> TestResult {
        let summary = run_session(
            ConsoleConfig::default(),
            RunOptions::default(),
            TokioClock::new(),
            no_input(),
            tokio::time::sleep(Duration::from_secs(3)),
        )
        .await?;

        assert_eq!(summary.reason, ExitReason::Interrupted);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn persisted_emergency_is_restored_next_session() -> TestResult {
        let dir = tempfile::tempdir()?;
        let state_path = dir.path().join("store.json");

        let first = run_session(
            ConsoleConfig::default(),
            RunOptions {
                state_path: Some(state_path.clone()),
                ..options(3)
            },
            TokioClock::new(),
            scripted(vec![(500, "stop"), (0, "confirm")]),
            std::future::pending(),
        )
        .await?;
        assert!(first.status.locked);
        assert!(StoreSnapshot::load_from_path(&state_path).await?.emergency_active);

        let second = run_session(
            ConsoleConfig::default(),
            RunOptions {
                restore: true,
                state_path: Some(state_path.clone()),
                ..options(3)
            },
            TokioClock::new(),
            no_input(),
            std::future::pending(),
        )
        .await?;
        assert!(second.status.locked);
        assert!(matches!(
            second.status.emergency,
            EmergencyState::Active {
                cause: EmergencyCause::Restored,
                ..
            }
        ));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_configuration_is_rejected_before_running() -> TestResult {
        let mut config = ConsoleConfig::default();
        config.safety.poll_interval_ms = 0;

        let err = run_session(
            config,
            options(1),
            TokioClock::new(),
            no_input(),
            std::future::pending(),
        )
        .await
        .err();
        assert_eq!(err.as_ref().map(crate::error::exit_code_for), Some(2));
        Ok(())
    }

    #[test]
    fn mode_commands_are_refused_while_stopped() -> TestResult {
        let clock = Arc::new(ManualClock::new(1_000));
        let channel = Arc::new(InMemoryChannel::new());
        let mut supervisor = SafetySupervisor::new(
            SafetyConfig::default(),
            clock,
            channel,
            Box::new(NullSurface),
        )?;
        supervisor.on_heartbeat(1_000);

        assert!(matches!(handle_line(&mut supervisor, "stop"), Flow::Continue));
        assert!(matches!(handle_line(&mut supervisor, "confirm"), Flow::Continue));
        assert!(supervisor.is_locked());

        assert!(execute(&mut supervisor, OperatorCommand::Autonomous).is_err());
        assert_eq!(supervisor.mode(), OperatingMode::Manual);

        assert!(matches!(handle_line(&mut supervisor, "bogus"), Flow::Continue));
        assert!(matches!(handle_line(&mut supervisor, "quit"), Flow::Quit));
        Ok(())
    }

    #[test]
    fn store_faults_are_not_reported_as_refusals() -> TestResult {
        let clock = Arc::new(ManualClock::new(1_000));
        let channel = Arc::new(InMemoryChannel::new());
        let mut supervisor = SafetySupervisor::new(
            SafetyConfig::default(),
            clock,
            channel.clone(),
            Box::new(NullSurface),
        )?;
        supervisor.on_heartbeat(1_000);
        execute(&mut supervisor, OperatorCommand::Stop)?;
        execute(&mut supervisor, OperatorCommand::Confirm)?;

        let refused = execute(&mut supervisor, OperatorCommand::Manual).err();
        assert_eq!(refused.as_ref().map(SafetyError::is_refusal), Some(true));

        channel.set_fail_writes(true);
        let failed = execute(&mut supervisor, OperatorCommand::Restart).err();
        assert_eq!(failed.as_ref().map(SafetyError::is_refusal), Some(false));
        assert!(matches!(handle_line(&mut supervisor, "restart"), Flow::Continue));
        assert!(supervisor.is_locked());
        Ok(())
    }
}
