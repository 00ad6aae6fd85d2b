//! ssh-bootstrap - Entry point
//!
//! Parses CLI arguments, resolves the connection profile, launches one
//! interactive session, and waits for it (and the staged-file cleanup) to
//! finish.

use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ssh_bootstrap::config::{Action, Args, Config};
use ssh_bootstrap::ssh::{
    ConnectionProfile, ConsoleObserver, InteractiveCommandSink, LaunchReport, PrintSink,
    SessionLauncher, ShellProbe, ShellSink,
};
use ssh_bootstrap::store::ProfileStore;

/// Exit code after SIGINT/SIGTERM
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout belongs to the session
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_args(args)?;

    debug!("ssh-bootstrap v{} starting", env!("CARGO_PKG_VERSION"));

    let profile = match config.action {
        Action::List(store) => {
            print_servers(&store);
            return Ok(());
        }
        Action::Connect(profile) => profile,
    };

    let dialect = config.settings.platform.dialect();
    let launcher = SessionLauncher::new(
        config.settings,
        Arc::new(ShellProbe),
        Arc::new(ConsoleObserver),
    );

    if config.dry_run {
        let mut sink = PrintSink::new(std::io::stdout());
        let mut report = connect_or_exit(&launcher, &profile, &mut sink).await;
        if report.is_automated() {
            info!(
                "Staged files are removed in {}s",
                launcher.settings().cleanup_delay.as_secs()
            );
        }
        let interrupted = tokio::select! {
            _ = report.wait_for_cleanup() => false,
            _ = shutdown_signal() => true,
        };
        if interrupted {
            info!("Interrupted, removing staged files");
            report.discard_artifacts().await;
        }
        return Ok(());
    }

    let mut sink = ShellSink::new(dialect);
    let mut report = connect_or_exit(&launcher, &profile, &mut sink).await;

    // Cleanup timers keep running while the session is open
    let outcome = tokio::select! {
        status = sink.run() => Some(status),
        _ = shutdown_signal() => None,
    };
    let Some(status) = outcome else {
        info!("Interrupted, removing staged files");
        report.discard_artifacts().await;
        std::process::exit(EXIT_INTERRUPTED);
    };

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            // Nothing will read the staged files now
            report.discard_artifacts().await;
            return Err(anyhow::Error::new(e).context("Session could not be started"));
        }
    };
    report.wait_for_cleanup().await;

    if !status.success() {
        debug!("Session exited with {}", status);
        std::process::exit(status.code().unwrap_or(1));
    }

    Ok(())
}

/// Run `connect`, exiting quietly on failure: the observer has already
/// told the user what went wrong.
async fn connect_or_exit(
    launcher: &SessionLauncher,
    profile: &ConnectionProfile,
    sink: &mut dyn InteractiveCommandSink,
) -> LaunchReport {
    match launcher.connect(profile, sink).await {
        Ok(report) => report,
        Err(e) => {
            debug!("Launch failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM");
        }
    }
}

fn print_servers(store: &ProfileStore) {
    for (group, servers) in store.grouped() {
        match group {
            Some(group) => println!("{}", group.name),
            None => println!("(ungrouped)"),
        }
        for server in servers {
            println!(
                "  {:<20} {}@{}:{}  [{}]",
                server.name, server.username, server.host, server.port, server.id
            );
        }
    }
}
