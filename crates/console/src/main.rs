//! mowerctl - Robotic mower operator console
//!
//! Runs the heartbeat watchdog and emergency-stop supervisor against a
//! simulated mower, and manages the console configuration file.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod command;
mod config;
mod error;
mod runtime;
mod simulator;
mod surface;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use mower_safety::SystemClock;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConsoleConfig, StoreSnapshot};
use crate::error::{ConsoleError, exit_code_for};
use crate::runtime::{RunOptions, run_session};

#[derive(Parser)]
#[command(name = "mowerctl")]
#[command(about = "Robotic mower operator console - heartbeat watchdog and emergency stop")]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: ~/.config/mower/console.json)
    #[arg(long, global = true, env = "MOWERCTL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the operator console against the simulated mower
    Run(RunArgs),

    /// Configuration file commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Override the simulated heartbeat period
    #[arg(long)]
    heartbeat_interval_ms: Option<u64>,

    /// Simulated mower stops transmitting after this many seconds
    #[arg(long)]
    drop_after_secs: Option<u64>,

    /// Simulated mower resumes transmitting after this many seconds
    #[arg(long)]
    resume_after_secs: Option<u64>,

    /// Exit after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Re-assert the emergency lock persisted by a previous session
    #[arg(long)]
    restore: bool,

    /// Store snapshot file (default: ~/.config/mower/store.json)
    #[arg(long)]
    state: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration as JSON
    Show,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check an existing configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("mowerctl={log_level},mower_safety={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match execute_command(&cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(exit_code_for(&e));
        }
    }
}

async fn execute_command(cli: &Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => ConsoleConfig::default_config_path()?,
    };

    match &cli.command {
        Commands::Run(args) => run(&config_path, args).await,
        Commands::Config(cmd) => config_command(&config_path, cmd).await,
    }
}

async fn run(config_path: &Path, args: &RunArgs) -> Result<()> {
    let mut config = ConsoleConfig::load_from_path(config_path).await?;
    apply_overrides(&mut config, args);

    let state_path = match &args.state {
        Some(path) => path.clone(),
        None => StoreSnapshot::default_path()?,
    };
    let options = RunOptions {
        restore: args.restore,
        duration: args.duration_secs.map(Duration::from_secs),
        state_path: Some(state_path),
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    println!("mowerctl ready. Commands: stop, confirm, cancel, restart, manual, auto, ack, status, quit");
    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let summary = run_session(config, options, Arc::new(SystemClock), input, shutdown).await?;

    println!("{}", summary.status);
    println!(
        "session ended ({:?}): {} heartbeats, {} escalations, emergency flag {}",
        summary.reason,
        summary.heartbeats,
        summary.escalations,
        summary
            .emergency_flag
            .map_or_else(|| "unset".to_string(), |v| v.to_string()),
    );
    Ok(())
}

fn apply_overrides(config: &mut ConsoleConfig, args: &RunArgs) {
    if let Some(ms) = args.heartbeat_interval_ms {
        config.simulator.heartbeat_interval_ms = ms;
    }
    if args.drop_after_secs.is_some() {
        config.simulator.drop_after_secs = args.drop_after_secs;
    }
    if args.resume_after_secs.is_some() {
        config.simulator.resume_after_secs = args.resume_after_secs;
    }
}

async fn config_command(config_path: &Path, cmd: &ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let config = ConsoleConfig::load_from_path(config_path).await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommands::Init { force } => {
            if config_path.exists() && !force {
                return Err(ConsoleError::InvalidConfiguration(format!(
                    "{} already exists (use --force to overwrite)",
                    config_path.display()
                ))
                .into());
            }
            ConsoleConfig::default().save_to_path(config_path).await?;
            println!("Wrote default configuration to {}", config_path.display());
        }
        ConfigCommands::Validate => {
            let config = ConsoleConfig::read_from_path(config_path).await?;
            config.validate()?;
            println!("{} is valid", config_path.display());
        }
    }
    Ok(())
}
