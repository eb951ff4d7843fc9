//! EventDesk service
//!
//! Main application entry point

use std::time::Duration;
use anyhow::Context;
use tracing::{error, info, warn};

use eventdesk::{
    config::Settings,
    database::DatabaseService,
    services::ServiceFactory,
    utils::logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new().context("failed to load configuration")?;
    settings.validate()?;

    // Initialize logging
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", eventdesk::info());

    // Initialize storage (runs migrations for Postgres)
    info!(backend = ?settings.storage.backend, "Connecting to storage...");
    let database = DatabaseService::connect(&settings).await?;

    // Initialize services
    info!("Initializing services...");
    let notifier = ServiceFactory::notifier_from_settings(&settings);
    let services = ServiceFactory::new(&settings, database, notifier).await?;

    let health = services.health_check().await;
    if !health.is_healthy() {
        anyhow::bail!("startup health check failed: {:?}", health.get_issues());
    }

    let interval_secs = settings.archival.sweep_interval_seconds.max(1);
    let mut sweep = tokio::time::interval(Duration::from_secs(interval_secs));
    sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(interval_secs = interval_secs, archival_enabled = settings.archival.enabled, "EventDesk is ready");

    loop {
        tokio::select! {
            _ = sweep.tick() => run_sweep(&services, &settings).await,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    services.dispatcher.flush().await;
    info!("EventDesk has been shut down.");

    Ok(())
}

/// One maintenance pass: archive concluded events, then reconcile failed releases
async fn run_sweep(services: &ServiceFactory, settings: &Settings) {
    if settings.archival.enabled {
        match services.archival.archive_batch(services.archival.buffer()).await {
            Ok(report) if report.failed() > 0 => {
                warn!(failed = report.failed(), archived = report.archived(), "Archive sweep finished with failures");
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Archive sweep failed"),
        }
    }

    if let Err(e) = services.bookings.retry_pending_releases().await {
        error!(error = %e, "Pending release reconciliation failed");
    }

    for issue in services.health_check().await.get_issues() {
        warn!(issue = %issue, "Health check issue");
    }
}
