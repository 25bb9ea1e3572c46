// src/lib.rs

pub mod cli;
pub mod command;
pub mod config;
pub mod console;
pub mod errors;
pub mod logging;
pub mod sink;
pub mod supervisor;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::command::CommandQueue;
use crate::config::{load_for_launch, ConfigFile};
use crate::console::spawn_console_reader;
use crate::errors::SupervisorError;
use crate::sink::ConsoleSink;
use crate::supervisor::ProcessSupervisor;
use crate::types::SupervisorState;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (with the CLI command override)
/// - the supervisor with a console sink and the operator command queue
/// - the optional startup timeout
/// - the operator console reader
///
/// Returns once the server has stopped. A crash is reported as an error.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_for_launch(&args.config, &args.command)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let queue = Arc::new(CommandQueue::new());
    let supervisor = ProcessSupervisor::new(
        cfg.markers.clone(),
        Arc::new(ConsoleSink::new()),
        queue.clone(),
        cfg.options.clone(),
    );

    let started = match cfg.startup_timeout {
        Some(limit) => match tokio::time::timeout(limit, supervisor.start(&cfg.command)).await {
            Ok(res) => res,
            Err(_) => {
                warn!(timeout = ?limit, "server did not finish loading in time; stopping it");
                supervisor.stop().await?;
                Err(SupervisorError::StartupFailed(format!(
                    "server not ready after {limit:?}"
                )))
            }
        },
        None => supervisor.start(&cfg.command).await,
    };
    started?;

    let _console = spawn_console_reader(queue, supervisor.clone());

    let final_state = supervisor.wait_finished().await;
    info!(state = ?final_state, "supervision finished");

    if final_state == SupervisorState::Crashed {
        return Err(SupervisorError::UnexpectedExit(
            "server crashed; see log for its exit status".to_string(),
        )
        .into());
    }
    Ok(())
}

/// Simple dry-run output: print what would be launched and how.
fn print_dry_run(cfg: &ConfigFile) {
    println!("serverwrap dry-run");
    println!("  command: {}", cfg.command);
    if let Some(dir) = &cfg.command.working_dir {
        println!("  working_dir: {}", dir.display());
    }
    for (key, value) in &cfg.command.env {
        println!("  env: {key}={value}");
    }
    println!();

    println!("readiness:");
    println!("  ready_pattern: {}", cfg.markers.ready.as_str());
    if let Some(failure) = &cfg.markers.failure {
        println!("  failure_pattern: {}", failure.as_str());
    }
    if let Some(limit) = cfg.startup_timeout {
        println!("  startup_timeout: {limit:?}");
    }
    println!();

    println!("shutdown:");
    println!("  stop_command: {}", cfg.options.stop_command);
    println!("  stop_timeout: {:?}", cfg.options.stop_timeout);
    println!("  handle_signals: {}", cfg.options.handle_signals);
    println!("  poll_interval: {:?}", cfg.options.poll_interval);

    debug!("dry-run complete (no execution)");
}
