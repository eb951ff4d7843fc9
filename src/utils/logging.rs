//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the EventDesk service.

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;
use crate::config::LoggingConfig;
use crate::utils::errors::{EventDeskError, Result};

/// Initialize logging based on configuration.
///
/// The returned guard flushes the file appender on drop and must be held for
/// the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::daily(&config.directory, "eventdesk.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(&config.level)
        .map_err(|e| EventDeskError::Config(format!("Invalid log filter '{}': {}", config.level, e)))?;

    let (json_stdout, plain_stdout) = if config.json {
        (Some(fmt::layer().json().with_writer(std::io::stdout)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stdout)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_stdout)
        .with(plain_stdout)
        .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
        .try_init()
        .map_err(|e| EventDeskError::Config(format!("Logging already initialized: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log booking lifecycle actions with structured data
pub fn log_booking_action(booking_id: Uuid, event_id: Uuid, action: &str, quantity: i32, reference: &str) {
    info!(
        booking_id = %booking_id,
        event_id = %event_id,
        action = action,
        quantity = quantity,
        reference = reference,
        "Booking action performed"
    );
}

/// Log a ledger anomaly such as a clamped double release
pub fn log_ledger_anomaly(event_id: Uuid, anomaly: &str, requested: i32, applied: i32) {
    warn!(
        event_id = %event_id,
        anomaly = anomaly,
        requested = requested,
        applied = applied,
        "Inventory ledger anomaly detected"
    );
}

/// Log archival and restoration actions
pub fn log_archive_action(event_id: Uuid, action: &str, actor_id: Option<Uuid>, reason: &str) {
    info!(
        event_id = %event_id,
        action = action,
        actor_id = ?actor_id,
        reason = reason,
        "Archive action performed"
    );
}

/// Log a best-effort side channel failure; these never escalate
pub fn log_downstream_failure(channel: &str, error: &str, context: Option<&str>) {
    warn!(
        channel = channel,
        error = error,
        context = context,
        "Downstream failure ignored"
    );
}
