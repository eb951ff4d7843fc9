//! Services module
//!
//! This module contains business logic services

pub mod archival;
pub mod booking;
pub mod clock;
pub mod events;
pub mod ledger;
pub mod notification;
pub mod reference;

// Re-export commonly used services
pub use archival::{is_eligible_for_archive, ArchivalManager, ArchiveOutcome, BatchItem, BatchItemStatus, BatchReport};
pub use booking::{BookingRegistry, Cancellation, ReconcileReport};
pub use clock::{Clock, FixedClock, SystemClock};
pub use events::EventService;
pub use ledger::{InventoryLedger, Release, Reservation};
pub use notification::{
    DispatcherStats, LogNotifier, Notification, NotificationDispatcher, Notifier, Recipient, TelegramNotifier,
    TemplateKind,
};
pub use reference::{RandomReferenceGenerator, RedisReferenceGenerator, ReferenceGenerator};

use std::sync::Arc;
use tracing::info;
use crate::config::settings::Settings;
use crate::database::DatabaseService;
use crate::utils::errors::Result;
use crate::utils::retry::RetryPolicy;

/// Service factory for creating and managing all services
#[derive(Clone)]
pub struct ServiceFactory {
    pub ledger: InventoryLedger,
    pub bookings: BookingRegistry,
    pub archival: ArchivalManager,
    pub events: EventService,
    pub dispatcher: NotificationDispatcher,
    database: DatabaseService,
}

impl ServiceFactory {
    /// Create a new ServiceFactory on the wall clock with the configured reference backend.
    ///
    /// Starts the notification worker, so it must run inside a Tokio runtime.
    pub async fn new(settings: &Settings, database: DatabaseService, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let references = reference::from_config(&settings.booking, &settings.redis).await?;
        Ok(Self::build(settings, database, notifier, Arc::new(SystemClock), references))
    }

    /// Create a ServiceFactory from explicit collaborators
    pub fn build(
        settings: &Settings,
        database: DatabaseService,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        references: Arc<dyn ReferenceGenerator>,
    ) -> Self {
        let dispatcher = if settings.notifications.enabled {
            NotificationDispatcher::spawn(notifier, settings.notifications.channel_capacity)
        } else {
            NotificationDispatcher::disabled()
        };

        let ledger = InventoryLedger::new(database.events.clone(), RetryPolicy::from(&settings.ledger));
        let bookings = BookingRegistry::new(
            ledger.clone(),
            database.bookings.clone(),
            references,
            dispatcher.clone(),
            settings.booking.clone(),
        );
        let archival = ArchivalManager::new(
            ledger.clone(),
            database.archives.clone(),
            database.bookings.clone(),
            dispatcher.clone(),
            clock,
            settings.archival.clone(),
        );
        let events = EventService::new(ledger.clone(), database.events.clone());

        Self { ledger, bookings, archival, events, dispatcher, database }
    }

    /// Notifier selected by configuration: the operations chat when a bot
    /// token and chat id are set, the log otherwise
    pub fn notifier_from_settings(settings: &Settings) -> Arc<dyn Notifier> {
        match (&settings.notifications.telegram_bot_token, settings.notifications.telegram_chat_id) {
            (Some(token), Some(chat_id)) => {
                info!(chat_id = chat_id, "Notifications will be posted to Telegram");
                Arc::new(TelegramNotifier::new(token, chat_id))
            }
            _ => Arc::new(LogNotifier),
        }
    }

    /// Health check for all services
    pub async fn health_check(&self) -> ServiceHealthStatus {
        let storage_healthy = self.database.health_check().await.is_ok();

        ServiceHealthStatus {
            storage_healthy,
            notifications_enabled: self.dispatcher.is_enabled(),
            dispatcher_running: self.dispatcher.is_running(),
            dispatcher_stats: self.dispatcher.stats(),
        }
    }
}

/// Health status for all services
#[derive(Debug, Clone)]
pub struct ServiceHealthStatus {
    pub storage_healthy: bool,
    pub notifications_enabled: bool,
    pub dispatcher_running: bool,
    pub dispatcher_stats: DispatcherStats,
}

impl ServiceHealthStatus {
    /// Storage is required; a stopped dispatcher only degrades notifications
    pub fn is_healthy(&self) -> bool {
        self.storage_healthy
    }

    /// Get list of unhealthy services
    pub fn get_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.storage_healthy {
            issues.push("Storage backend unreachable".to_string());
        }
        if self.notifications_enabled && !self.dispatcher_running {
            issues.push("Notification worker stopped".to_string());
        }
        if self.dispatcher_stats.dropped > 0 {
            issues.push(format!("{} notifications dropped", self.dispatcher_stats.dropped));
        }

        issues
    }
}
