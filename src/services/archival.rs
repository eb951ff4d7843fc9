//! Archival manager
//!
//! Moves concluded events out of the active pool and back again. The
//! `active -> archived` transition is the synchronization point with
//! concurrent bookings: the archive snapshot is the row that transition
//! returns, so a reservation either committed before it and is counted in the
//! snapshot, or arrives after it and is rejected as not active.

use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use crate::config::ArchivalConfig;
use crate::database::store::{ArchiveStore, BookingStore, RecordInsert};
use crate::models::{ArchiveReason, ArchiveRecord, Event, LifecycleState};
use crate::services::clock::Clock;
use crate::services::ledger::InventoryLedger;
use crate::services::notification::{Notification, NotificationDispatcher, Recipient, TemplateKind};
use crate::utils::errors::{EventDeskError, Result};
use crate::utils::logging::{log_archive_action, log_downstream_failure};

/// True once `now` has reached the event's end plus the grace buffer
pub fn is_eligible_for_archive(event: &Event, buffer: Duration, now: DateTime<Utc>) -> bool {
    now >= event.ends_at + buffer
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived(ArchiveRecord),
    /// The event was already archived; the existing record is returned
    AlreadyArchived(ArchiveRecord),
}

impl ArchiveOutcome {
    pub fn record(&self) -> &ArchiveRecord {
        match self {
            ArchiveOutcome::Archived(record) | ArchiveOutcome::AlreadyArchived(record) => record,
        }
    }

    pub fn into_record(self) -> ArchiveRecord {
        match self {
            ArchiveOutcome::Archived(record) | ArchiveOutcome::AlreadyArchived(record) => record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum BatchItemStatus {
    Archived,
    AlreadyArchived,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub event_id: Uuid,
    pub status: BatchItemStatus,
}

/// Per-event result of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub scanned: usize,
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn archived(&self) -> usize {
        self.count(|s| matches!(s, BatchItemStatus::Archived))
    }

    pub fn already_archived(&self) -> usize {
        self.count(|s| matches!(s, BatchItemStatus::AlreadyArchived))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, BatchItemStatus::Failed(_)))
    }

    pub fn status_of(&self, event_id: Uuid) -> Option<&BatchItemStatus> {
        self.items.iter().find(|item| item.event_id == event_id).map(|item| &item.status)
    }

    fn count(&self, predicate: impl Fn(&BatchItemStatus) -> bool) -> usize {
        self.items.iter().filter(|item| predicate(&item.status)).count()
    }
}

#[derive(Clone)]
pub struct ArchivalManager {
    ledger: InventoryLedger,
    archives: Arc<dyn ArchiveStore>,
    bookings: Arc<dyn BookingStore>,
    dispatcher: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    config: ArchivalConfig,
}

impl ArchivalManager {
    pub fn new(
        ledger: InventoryLedger,
        archives: Arc<dyn ArchiveStore>,
        bookings: Arc<dyn BookingStore>,
        dispatcher: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        config: ArchivalConfig,
    ) -> Self {
        Self { ledger, archives, bookings, dispatcher, clock, config }
    }

    /// Configured grace period after an event ends
    pub fn buffer(&self) -> Duration {
        Duration::hours(self.config.buffer_hours)
    }

    pub fn is_eligible(&self, event: &Event) -> bool {
        is_eligible_for_archive(event, self.buffer(), self.clock.now())
    }

    /// Archive an active event. Archiving an already archived event is a no-op
    /// that returns its open record.
    pub async fn archive(&self, event_id: Uuid, reason: ArchiveReason, actor_id: Option<Uuid>) -> Result<ArchiveOutcome> {
        if matches!(reason, ArchiveReason::Restored | ArchiveReason::Cancelled) {
            return Err(EventDeskError::InvalidInput(format!("'{}' is not an archive reason", reason)));
        }

        match self.ledger.transition_lifecycle(event_id, LifecycleState::Active, LifecycleState::Archived).await {
            Ok(snapshot) => {
                let record = ArchiveRecord::new(snapshot, reason, actor_id, self.clock.now());
                let outcome = match self.archives.insert_record(&record).await? {
                    RecordInsert::Inserted(record) => ArchiveOutcome::Archived(record),
                    RecordInsert::Existing(record) => {
                        warn!(event_id = %event_id, archive_id = %record.id, "Open archive record already present");
                        ArchiveOutcome::AlreadyArchived(record)
                    }
                };
                self.after_archive(&outcome);
                Ok(outcome)
            }
            Err(EventDeskError::InvalidTransition { .. }) => self.resume_archived(event_id, reason, actor_id).await,
            Err(e) => Err(e),
        }
    }

    /// Archive every active event past its end plus `buffer`. Each event is
    /// archived independently; failures are reported, not propagated.
    pub async fn archive_batch(&self, buffer: Duration) -> Result<BatchReport> {
        let now = self.clock.now();
        let active = self.ledger.events_in_state(LifecycleState::Active).await?;
        let scanned = active.len();

        let eligible: Vec<Uuid> = active
            .iter()
            .filter(|event| is_eligible_for_archive(event, buffer, now))
            .map(|event| event.id)
            .collect();

        let concurrency = self.config.batch_concurrency.max(1);
        let items: Vec<BatchItem> = stream::iter(eligible)
            .map(|event_id| async move {
                let status = match self.archive(event_id, ArchiveReason::Automatic, None).await {
                    Ok(ArchiveOutcome::Archived(_)) => BatchItemStatus::Archived,
                    Ok(ArchiveOutcome::AlreadyArchived(_)) => BatchItemStatus::AlreadyArchived,
                    Err(e) => {
                        warn!(event_id = %event_id, error = %e, "Event could not be archived");
                        BatchItemStatus::Failed(e.to_string())
                    }
                };
                BatchItem { event_id, status }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let report = BatchReport { scanned, items };
        info!(
            scanned = report.scanned,
            archived = report.archived(),
            already_archived = report.already_archived(),
            failed = report.failed(),
            "Archive batch finished"
        );
        Ok(report)
    }

    /// Bring an archived event back to `active`.
    ///
    /// Uses the live row when it still exists; otherwise the snapshot is
    /// written back first. Bookings made after archival are not replayed.
    pub async fn restore(&self, archive_id: Uuid, actor_id: Option<Uuid>) -> Result<Event> {
        let record = self
            .archives
            .get_record(archive_id)
            .await?
            .ok_or(EventDeskError::ArchiveNotFound { archive_id })?;

        match record.reason {
            ArchiveReason::Restored => {
                return Err(EventDeskError::InvalidInput("Restoration audit entries cannot be restored".to_string()));
            }
            ArchiveReason::Cancelled => {
                return Err(EventDeskError::InvalidTransition {
                    from: LifecycleState::Cancelled.to_string(),
                    to: LifecycleState::Active.to_string(),
                });
            }
            ArchiveReason::Automatic | ArchiveReason::Manual => {}
        }
        if record.restored_at.is_some() {
            return Err(EventDeskError::InvalidTransition {
                from: "restored".to_string(),
                to: LifecycleState::Active.to_string(),
            });
        }

        let event_id = record.event_id;
        match self.ledger.snapshot(event_id).await {
            Ok(_) => {}
            Err(EventDeskError::EventNotFound { .. }) => {
                let mut row = record.snapshot.clone();
                row.status = LifecycleState::Archived;
                self.ledger.register(&row).await?;
                log_archive_action(event_id, "reinstated_from_snapshot", actor_id, record.reason.as_str());
            }
            Err(e) => return Err(e),
        }

        let event = self
            .ledger
            .transition_lifecycle(event_id, LifecycleState::Archived, LifecycleState::Active)
            .await?;

        let now = self.clock.now();
        if self.archives.mark_restored(archive_id, actor_id, now).await?.is_none() {
            warn!(archive_id = %archive_id, event_id = %event_id, "Archive record was closed concurrently");
        }
        let audit = ArchiveRecord::new(event.clone(), ArchiveReason::Restored, actor_id, now);
        self.archives.insert_record(&audit).await?;

        log_archive_action(event_id, "restored", actor_id, record.reason.as_str());
        self.dispatcher.notify(
            Notification::new(Recipient::Account(event.organizer_id), TemplateKind::EventRestored).with_event(&event),
        );

        Ok(event)
    }

    /// Cancel an active event and tell everyone holding a confirmed booking
    pub async fn cancel_event(&self, event_id: Uuid, actor_id: Option<Uuid>) -> Result<ArchiveRecord> {
        let event = self
            .ledger
            .transition_lifecycle(event_id, LifecycleState::Active, LifecycleState::Cancelled)
            .await?;

        let record = ArchiveRecord::new(event.clone(), ArchiveReason::Cancelled, actor_id, self.clock.now());
        let record = self.archives.insert_record(&record).await?.into_record();
        log_archive_action(event_id, "cancelled", actor_id, ArchiveReason::Cancelled.as_str());

        match self.bookings.list_for_event(event_id).await {
            Ok(bookings) => {
                let mut notified = 0;
                for booking in bookings.iter().filter(|b| b.is_confirmed()) {
                    if let Some(recipient) = Recipient::for_booking(booking) {
                        self.dispatcher.notify(
                            Notification::new(recipient, TemplateKind::EventCancelled)
                                .with_event(&event)
                                .with_booking(booking),
                        );
                        notified += 1;
                    }
                }
                info!(event_id = %event_id, notified = notified, "Attendees notified of cancellation");
            }
            Err(e) => {
                let context = format!("event {}", event_id);
                log_downstream_failure("notification", &e.to_string(), Some(&context));
            }
        }

        Ok(record)
    }

    pub async fn get_record(&self, archive_id: Uuid) -> Result<ArchiveRecord> {
        self.archives
            .get_record(archive_id)
            .await?
            .ok_or(EventDeskError::ArchiveNotFound { archive_id })
    }

    /// Archive history of an event, oldest first
    pub async fn history(&self, event_id: Uuid) -> Result<Vec<ArchiveRecord>> {
        self.archives.list_records_for_event(event_id).await
    }

    /// The transition was refused: either the event is already archived
    /// (return or finish its record) or it is in a state that cannot archive.
    async fn resume_archived(&self, event_id: Uuid, reason: ArchiveReason, actor_id: Option<Uuid>) -> Result<ArchiveOutcome> {
        let current = self.ledger.snapshot(event_id).await?;
        if current.status != LifecycleState::Archived {
            return Err(EventDeskError::InvalidTransition {
                from: current.status.to_string(),
                to: LifecycleState::Archived.to_string(),
            });
        }

        if let Some(record) = self.archives.find_open_record(event_id).await? {
            return Ok(ArchiveOutcome::AlreadyArchived(record));
        }

        // Archived row without a record: an earlier run stopped between the
        // transition and the insert. The row has not accepted bookings since.
        let record = ArchiveRecord::new(current, reason, actor_id, self.clock.now());
        let outcome = match self.archives.insert_record(&record).await? {
            RecordInsert::Inserted(record) => {
                info!(event_id = %event_id, archive_id = %record.id, "Resumed interrupted archival");
                ArchiveOutcome::Archived(record)
            }
            RecordInsert::Existing(record) => ArchiveOutcome::AlreadyArchived(record),
        };
        self.after_archive(&outcome);
        Ok(outcome)
    }

    fn after_archive(&self, outcome: &ArchiveOutcome) {
        let ArchiveOutcome::Archived(record) = outcome else {
            return;
        };
        log_archive_action(record.event_id, "archived", record.actor_id, record.reason.as_str());
        self.dispatcher.notify(
            Notification::new(Recipient::Account(record.snapshot.organizer_id), TemplateKind::EventArchived)
                .with_event(&record.snapshot),
        );
    }
}
