//! netbackup - Main Entry Point
//! Composition root: wires SSH sessions and the file-system store into the core scheduler

mod cli;
mod logging;
mod prompt;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::{error, info, warn};

// Import workspace crates
use netbackup_core::application::{
    load_targets, shutdown_channel, BackupWorker, CycleScheduler, ResultSink,
};
use netbackup_core::port::time_provider::SystemTimeProvider;
use netbackup_core::port::TimeProvider;
use netbackup_infra_fs::FsArtifactStore;
use netbackup_infra_ssh::SshSessionClient;

use cli::{Cli, Commands};

/// How long blocking SSH calls abandoned at shutdown may delay the exit
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // 1. Initialize logging (guard flushes the log file on exit)
    let _log_guard = logging::init_logging()?;
    info!("netbackup v{} starting...", netbackup_core::VERSION);

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?;
    let outcome = runtime.block_on(run(cli));
    shutdown_runtime(runtime, RUNTIME_SHUTDOWN_TIMEOUT);
    outcome
}

/// Stop the runtime without waiting on abandoned blocking calls
///
/// An SSH read cut off by the grace period keeps its blocking thread until
/// libssh2 returns; dropping the runtime normally would wait for it.
fn shutdown_runtime(runtime: Runtime, timeout: Duration) {
    let started = std::time::Instant::now();
    runtime.shutdown_timeout(timeout);
    if started.elapsed() >= timeout {
        warn!(
            timeout_secs = timeout.as_secs(),
            "Blocking tasks still running at exit, abandoned"
        );
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // 2. Load targets (fatal if unreadable, malformed or empty)
    let targets_path = prompt::resolve_targets_path(cli.in_file.clone())?;
    let targets = load_targets(&targets_path)
        .await
        .with_context(|| format!("Failed to load targets from {}", targets_path))?;

    let command = cli.command.clone().unwrap_or(Commands::Run);
    if command == Commands::Check {
        report::print_targets(&targets, cli.tuning.command.as_deref());
        return Ok(ExitCode::SUCCESS);
    }

    // 3. Resolve configuration
    let credential = Arc::new(prompt::resolve_credential(
        cli.username.clone(),
        cli.password.clone(),
    )?);
    let retry_policy = Arc::new(cli.tuning.retry_policy().context("Invalid retry settings")?);
    let scheduler_config = cli.tuning.scheduler_config();

    let output_dir = shellexpand::tilde(&cli.output_dir).into_owned();
    let store = Arc::new(
        FsArtifactStore::open(&output_dir)
            .await
            .with_context(|| format!("Failed to prepare output directory {}", output_dir))?,
    );
    info!(output_dir = %output_dir, targets = targets.len(), "Configuration resolved");

    // 4. Setup dependencies (DI wiring)
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let session_client = Arc::new(SshSessionClient::new(cli.tuning.ssh_config()));

    let mut worker = BackupWorker::new(
        session_client,
        credential,
        retry_policy,
        time_provider.clone(),
    );
    if let Some(command) = &cli.tuning.command {
        worker = worker.with_command(command.clone());
    }

    let scheduler = CycleScheduler::new(
        targets,
        Arc::new(worker),
        Arc::new(ResultSink::new(store)),
        time_provider,
        scheduler_config,
    )
    .context("Invalid scheduler settings")?;

    // 5. Wire Ctrl+C to graceful shutdown
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, letting in-flight backups finish...");
                shutdown_tx.shutdown();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    // 6. Run
    match command {
        Commands::Run => {
            info!("Press Ctrl+C to shutdown");
            scheduler.run(shutdown_rx).await?;
            info!("Shutdown complete.");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Once { json } => {
            let cycle_report = scheduler.run_once(shutdown_rx).await;
            if json {
                report::print_cycle_json(&cycle_report)?;
            } else {
                report::print_cycle_table(&cycle_report);
            }
            Ok(if cycle_report.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Check => Ok(ExitCode::SUCCESS),
    }
}
