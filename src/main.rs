//! Tracksync - carrier status reconciliation service
//!
//! Keeps the local shipment store synchronized with third-party carrier
//! tracking systems: a periodic sweep selects poll-eligible shipments,
//! resolves their carrier identity, checks status through a normalized
//! provider interface, and idempotently records state transitions.
//!
//! Module structure:
//! - `domain/` - Core business types (Shipment, Event, StatusResult)
//! - `io/` - External interfaces (stores, carrier providers)
//! - `services/` - Business logic (Sweeper, EventLog, Resolver)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use tracksync::infra::{Config, Metrics};
use tracksync::io::provider::ProviderRegistry;
use tracksync::io::store::{FileEventStore, FileShipmentStore};
use tracksync::services::{EventLog, Sweeper};

/// Tracksync - background carrier status reconciliation
#[derive(Parser, Debug)]
#[command(name = "tracksync", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to TRACKSYNC_CONFIG,
    /// then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("tracksync starting");

    let args = Args::parse();
    let config_path = Config::resolve_config_path(args.config);
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        sweep_interval_secs = %config.sweep_interval_secs(),
        batch_size = %config.batch_size(),
        sweep_budget_secs = %config.sweep_budget_secs(),
        grace_period_mins = %config.grace_period_mins(),
        floor_mins = %config.floor_mins(),
        shipments_file = %config.shipments_file(),
        events_file = %config.events_file(),
        "config_loaded"
    );

    let shipments = Arc::new(FileShipmentStore::load(config.shipments_file())?);
    let events = Arc::new(FileEventStore::load(config.events_file())?);
    let metrics = Arc::new(Metrics::new());
    let providers = Arc::new(ProviderRegistry::from_config(&config));
    let event_log = Arc::new(EventLog::new(events, &config, metrics.clone()));
    let sweeper = Sweeper::new(shipments, event_log, providers, &config, metrics.clone());

    // Shutdown on Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown_signal_received");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(config.sweep_interval_secs()));
    info!("sweeper_started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match sweeper.sweep().await {
                    Ok(report) => {
                        info!(
                            processed = %report.processed,
                            updated = %report.updated,
                            errored = %report.errored,
                            skipped = %report.skipped,
                            "sweep_report"
                        );
                        metrics.report();
                    }
                    Err(e) => {
                        // Sweep-level failure: surface and wait for the next tick
                        error!(error = %e, "sweep_failed");
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("tracksync stopped");
    Ok(())
}
