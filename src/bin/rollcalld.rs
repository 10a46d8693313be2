//! rollcall daemon - Attendance scan ingestion and durable logging
//!
//! Accepts badge scans from TCP readers and from the local mailbox file,
//! appends every event to the binary attendance log and keeps a daily JSON
//! export current. An administrative console runs on stdin/stdout.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (0.0.0.0:8080, platform data directory)
//! rollcalld
//!
//! # Start with a configuration file, no console
//! rollcalld --config /etc/rollcall.toml --no-console
//!
//! # Enable debug logging
//! RUST_LOG=rollcalld=debug rollcalld
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown, queued scans are flushed
//! - `quit` on the admin console: same as SIGTERM

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use rollcalld::admin::{AdminConsole, ConsoleExit};
use rollcalld::server::{ScanContext, ScanServer, ServerOptions};
use rollcalld::{
    spawn_mailbox_task, BackgroundLogger, Directory, MailboxDrainer, Pipeline, RollcallConfig,
    RosterDirectory,
};

/// A blocked stdin read cannot be cancelled; don't wait on it at exit.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// rollcall daemon - attendance scan logger
#[derive(Parser, Debug)]
#[command(name = "rollcalld", version, about)]
struct Args {
    /// Configuration file (TOML). Falls back to $ROLLCALL_CONFIG.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Don't read admin commands from stdin
    #[arg(long)]
    no_console: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    let result = runtime.block_on(run_daemon(args));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

/// Runs the daemon until a signal or `quit`.
async fn run_daemon(args: Args) -> Result<()> {
    // Logs go to stderr so the console owns stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rollcalld=info".parse()?)
                .add_directive("rollcall_core=info".parse()?)
                .add_directive("rollcall_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "rollcall daemon starting"
    );

    let config =
        RollcallConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let roster_path = config.roster_file();
    let directory: Arc<dyn Directory> = match RosterDirectory::load(&roster_path) {
        Ok(roster) => Arc::new(roster),
        Err(e) => {
            warn!(error = %e, "Roster unavailable, replies will carry no profile");
            Arc::new(RosterDirectory::empty())
        }
    };

    let pipeline = Arc::new(Pipeline::from_config(&config, Arc::clone(&directory)));
    let report = pipeline
        .restore()
        .context("Failed to restore attendance log")?;
    info!(
        path = %pipeline.log().path().display(),
        events = report.records.len(),
        skipped = report.skipped,
        truncated_tail_bytes = report.truncated_tail_bytes,
        "Attendance log restored"
    );

    // The logger outlives the producers so it can drain their last scans
    let logger = BackgroundLogger::spawn(Arc::clone(&pipeline));

    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // Listener
    let options = ServerOptions::from_config(&config)?;
    let context = Arc::new(ScanContext {
        directory: Arc::clone(&directory),
        logger: logger.handle(),
        reader: config.listener_reader.clone(),
    });
    let server = ScanServer::new(options, context, cancel_token.clone());
    let listener = server.bind().await?;
    let server_token = cancel_token.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.serve(listener).await {
            error!(error = %e, "Server error");
            server_token.cancel();
        }
    });

    // Mailbox
    let drainer = Arc::new(MailboxDrainer::new(config.mailbox_file(), logger.handle()));
    let mailbox_task = spawn_mailbox_task(
        Arc::clone(&drainer),
        config.mailbox_interval(),
        cancel_token.clone(),
    );
    info!(path = %drainer.path().display(), "Mailbox drain started");

    // Admin console
    if !args.no_console {
        let console = AdminConsole::new(
            Arc::clone(&pipeline),
            Arc::clone(&directory),
            Some(Arc::clone(&drainer)),
        );
        let console_token = cancel_token.clone();
        tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            match console
                .run(stdin, tokio::io::stdout(), console_token.clone())
                .await
            {
                Ok(ConsoleExit::Quit) => console_token.cancel(),
                Ok(ConsoleExit::Eof) => info!("Console input closed, daemon keeps running"),
                Ok(ConsoleExit::Cancelled) => {}
                Err(e) => warn!(error = %e, "Admin console failed"),
            }
        });
    }

    cancel_token.cancelled().await;
    info!("Shutting down");

    if let Err(e) = server_task.await {
        error!(error = %e, "Server task panicked");
    }
    if let Err(e) = mailbox_task.await {
        error!(error = %e, "Mailbox task panicked");
    }

    // Pick up lines posted since the last tick
    if let Err(e) = drainer.drain_once().await {
        warn!(error = %e, "Final mailbox drain failed");
    }

    let stats = logger.shutdown().await;
    info!(
        applied = stats.applied,
        rejected = stats.rejected,
        persist_failures = stats.persist_failures,
        "Background logger stopped"
    );

    let export = tokio::task::spawn_blocking(move || pipeline.export())
        .await
        .context("Export task panicked")?;
    match export {
        Ok(path) => info!(path = %path.display(), "Final export written"),
        Err(e) => error!(error = %e, "Final export failed"),
    }

    info!("rollcall daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
