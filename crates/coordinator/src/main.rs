use std::path::PathBuf;

use cadence_coordinator::{daemon, CoordinatorConfig, CoordinatorError, SERVICE_NAME};
use cadence_logging::LogLevel;
use cadence_settings::Settings;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cadence-coordinator", version, about = "Recurring batch payout coordinator")]
struct Cli {
    /// Settings file (default: per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CoordinatorError> {
    cadence_logging::try_init(LogLevel::from_verbose(cli.verbose))?;

    let settings: Settings<CoordinatorConfig> =
        Settings::load_or_default(SERVICE_NAME, cli.config.as_deref())?;
    info!(
        "{} {} starting, settings: {}",
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        settings.path().display()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested, finishing in-flight schedule");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for ctrl-c, run until killed");
                // Keep the sender alive so receivers do not read a closed channel as shutdown.
                std::future::pending::<()>().await;
            }
        }
    });

    daemon::run(settings.config, shutdown_rx).await?;
    info!("{} stopped", SERVICE_NAME);
    Ok(())
}
