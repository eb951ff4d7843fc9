//! Test context for integration tests
//!
//! Wires the full service stack over the in-memory store with a fixed clock
//! and a recording notifier, so tests can drive time, inject storage
//! conflicts and inspect notifications.

use std::sync::Arc;
use chrono::{DateTime, Duration, TimeZone, Utc};
use eventdesk::config::Settings;
use eventdesk::database::{DatabaseService, InMemoryStore};
use eventdesk::models::{CreateEventRequest, Event};
use eventdesk::services::{Clock, FixedClock, RandomReferenceGenerator, ServiceFactory};
use super::test_data::{event_request, event_request_at, RecordingNotifier};

pub struct TestContext {
    pub settings: Settings,
    pub store: Arc<InMemoryStore>,
    pub clock: FixedClock,
    pub notifier: Arc<RecordingNotifier>,
    pub services: ServiceFactory,
}

impl TestContext {
    /// Context with the clock at 2025-01-01T12:00Z
    pub fn new() -> Self {
        Self::with_settings(Self::create_test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());
        let notifier = Arc::new(RecordingNotifier::new());

        let services = ServiceFactory::build(
            &settings,
            DatabaseService::from_memory(store.clone()),
            notifier.clone(),
            Arc::new(clock.clone()),
            Arc::new(RandomReferenceGenerator::new(settings.booking.reference_prefix.as_str())),
        );

        Self { settings, store, clock, notifier, services }
    }

    /// Create test-specific settings
    pub fn create_test_settings() -> Settings {
        let mut settings = Settings::default();

        // Fast retries
        settings.ledger.max_retries = 5;
        settings.ledger.initial_backoff_ms = 1;
        settings.ledger.max_backoff_ms = 5;

        settings.booking.reference_prefix = "TST".to_string();
        settings.archival.buffer_hours = 24;
        settings.archival.batch_concurrency = 4;
        settings.notifications.channel_capacity = 256;
        settings.logging.level = "debug".to_string();

        settings
    }

    /// Published event with `total` tickets starting now
    pub async fn active_event(&self, total: i32) -> Event {
        let request = event_request_at(total, self.clock.now());
        self.publish(request).await
    }

    /// Published event with the given end time
    pub async fn active_event_ending_at(&self, total: i32, ends_at: DateTime<Utc>) -> Event {
        let request = event_request(total, ends_at - Duration::hours(3), ends_at);
        self.publish(request).await
    }

    /// Wait until the dispatcher has handled everything queued so far
    pub async fn flush_notifications(&self) {
        self.services.dispatcher.flush().await;
    }

    async fn publish(&self, request: CreateEventRequest) -> Event {
        let draft = self.services.events.create_event(request).await.expect("create event");
        self.services.events.publish(draft.id).await.expect("publish event")
    }
}
