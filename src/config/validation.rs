//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{EventDeskError, Result};
use super::{ReferenceBackend, Settings, StorageBackend};

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.storage.backend == StorageBackend::Postgres {
        validate_database_config(&settings.database)?;
    }
    if settings.booking.reference_backend == ReferenceBackend::Redis {
        validate_redis_config(&settings.redis)?;
    }
    validate_ledger_config(&settings.ledger)?;
    validate_booking_config(&settings.booking)?;
    validate_archival_config(&settings.archival)?;
    validate_notification_config(&settings.notifications)?;
    validate_logging_config(&settings.logging)?;

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(EventDeskError::Config(
            "Database URL is required".to_string()
        ));
    }

    if config.max_connections == 0 {
        return Err(EventDeskError::Config(
            "Max connections must be greater than 0".to_string()
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(EventDeskError::Config(
            "Min connections cannot be greater than max connections".to_string()
        ));
    }

    Ok(())
}

/// Validate Redis configuration
fn validate_redis_config(config: &super::RedisConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(EventDeskError::Config(
            "Redis URL is required for the redis reference backend".to_string()
        ));
    }

    Ok(())
}

fn validate_ledger_config(config: &super::LedgerConfig) -> Result<()> {
    if config.max_retries == 0 {
        return Err(EventDeskError::Config(
            "Ledger max_retries must be greater than 0".to_string()
        ));
    }

    if config.initial_backoff_ms > config.max_backoff_ms {
        return Err(EventDeskError::Config(
            "Ledger initial backoff cannot exceed max backoff".to_string()
        ));
    }

    Ok(())
}

fn validate_booking_config(config: &super::BookingConfig) -> Result<()> {
    let prefix = config.reference_prefix.trim();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(EventDeskError::Config(
            "Booking reference prefix must be non-empty and alphanumeric".to_string()
        ));
    }

    if config.max_quantity_per_booking < 1 {
        return Err(EventDeskError::Config(
            "Max quantity per booking must be at least 1".to_string()
        ));
    }

    if config.reference_retry_limit == 0 {
        return Err(EventDeskError::Config(
            "Reference retry limit must be greater than 0".to_string()
        ));
    }

    Ok(())
}

fn validate_archival_config(config: &super::ArchivalConfig) -> Result<()> {
    if config.buffer_hours < 0 {
        return Err(EventDeskError::Config(
            "Archival buffer cannot be negative".to_string()
        ));
    }

    if config.enabled && config.sweep_interval_seconds == 0 {
        return Err(EventDeskError::Config(
            "Archival sweep interval must be greater than 0".to_string()
        ));
    }

    if config.batch_concurrency == 0 {
        return Err(EventDeskError::Config(
            "Archival batch concurrency must be greater than 0".to_string()
        ));
    }

    Ok(())
}

fn validate_notification_config(config: &super::NotificationConfig) -> Result<()> {
    if config.channel_capacity == 0 {
        return Err(EventDeskError::Config(
            "Notification channel capacity must be greater than 0".to_string()
        ));
    }

    match (&config.telegram_bot_token, config.telegram_chat_id) {
        (Some(token), _) if token.is_empty() => Err(EventDeskError::Config(
            "Telegram bot token cannot be empty".to_string()
        )),
        (Some(_), None) => Err(EventDeskError::Config(
            "Telegram chat id is required when a bot token is configured".to_string()
        )),
        _ => Ok(()),
    }
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(EventDeskError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(EventDeskError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_postgres_requires_url() {
        let mut settings = Settings::default();
        settings.storage.backend = StorageBackend::Postgres;
        settings.database.url.clear();
        assert_matches!(validate_settings(&settings), Err(EventDeskError::Config(_)));
    }

    #[test]
    fn test_pool_bounds() {
        let mut settings = Settings::default();
        settings.storage.backend = StorageBackend::Postgres;
        settings.database.min_connections = 20;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_reference_prefix_must_be_alphanumeric() {
        let mut settings = Settings::default();
        settings.booking.reference_prefix = "EV-T".to_string();
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_telegram_token_needs_chat() {
        let mut settings = Settings::default();
        settings.notifications.telegram_bot_token = Some("123:abc".to_string());
        assert!(validate_settings(&settings).is_err());

        settings.notifications.telegram_chat_id = Some(-100123);
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut settings = Settings::default();
        settings.logging.level = "verbose".to_string();
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let mut settings = Settings::default();
        settings.ledger.max_retries = 0;
        assert!(validate_settings(&settings).is_err());
    }
}
