//! Storage seam for the inventory, booking and archive data.
//!
//! Every counter or lifecycle mutation is exposed as one conditional atomic
//! storage operation. Callers never read a counter, decide in application code
//! and write it back; the backing store evaluates the guard and applies the
//! change in the same step. Whether that is a conditional `UPDATE`, a
//! serializable transaction or a compare-and-swap is the implementation's
//! business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::models::{
    ArchiveRecord, Booking, Event, LifecycleState, NewBooking, PendingRelease, UpdateEventRequest,
};
use crate::utils::errors::{EventDeskError, Result};

/// Result of an atomic check-and-reserve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// Counters after the committed reservation
    Reserved(Event),
    NotFound,
    NotActive(LifecycleState),
    Insufficient { remaining: i32 },
}

/// Result of an atomic clamped release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// `released` is lower than the requested quantity when the release was clamped
    Released { event: Event, released: i32 },
    NotFound,
}

/// Result of a guarded lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Row as committed by the transition; its counters are the snapshot at that instant
    Transitioned(Event),
    NotFound,
    Mismatch(LifecycleState),
}

/// Result of a capacity edit, only allowed before any sale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResizeOutcome {
    Resized(Event),
    NotFound,
    HasSales { sold: i32 },
}

/// Result of the guarded confirmed → cancelled booking transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(Booking),
    NotFound,
    AlreadyCancelled(Booking),
}

/// Result of writing an archive record; at most one open record exists per event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordInsert {
    Inserted(ArchiveRecord),
    Existing(ArchiveRecord),
}

impl RecordInsert {
    pub fn into_record(self) -> ArchiveRecord {
        match self {
            RecordInsert::Inserted(record) | RecordInsert::Existing(record) => record,
        }
    }
}

/// Row state re-read after a guarded update matched nothing.
///
/// The re-read is a separate statement, so a writer may have committed in
/// between. When the re-read satisfies the guard that rejected the update,
/// the rejection can't be explained from it and is reported as a
/// `StorageConflict` for the caller to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardedRow {
    pub status: LifecycleState,
    pub sold: i32,
    pub available: i32,
}

fn contradicted(operation: &str, event_id: Uuid) -> EventDeskError {
    EventDeskError::StorageConflict(format!("{} on event {} raced a concurrent write", operation, event_id))
}

impl ReserveOutcome {
    pub fn from_reread(event_id: Uuid, quantity: i32, current: Option<GuardedRow>) -> Result<Self> {
        match current {
            None => Ok(ReserveOutcome::NotFound),
            Some(row) if row.status != LifecycleState::Active => Ok(ReserveOutcome::NotActive(row.status)),
            Some(row) if row.available >= quantity => Err(contradicted("reserve", event_id)),
            Some(row) => Ok(ReserveOutcome::Insufficient { remaining: row.available }),
        }
    }
}

impl TransitionOutcome {
    pub fn from_reread(event_id: Uuid, from: LifecycleState, current: Option<GuardedRow>) -> Result<Self> {
        match current {
            None => Ok(TransitionOutcome::NotFound),
            Some(row) if row.status == from => Err(contradicted("transition", event_id)),
            Some(row) => Ok(TransitionOutcome::Mismatch(row.status)),
        }
    }
}

impl ResizeOutcome {
    pub fn from_reread(event_id: Uuid, current: Option<GuardedRow>) -> Result<Self> {
        match current {
            None => Ok(ResizeOutcome::NotFound),
            Some(row) if row.sold == 0 => Err(contradicted("resize", event_id)),
            Some(row) => Ok(ResizeOutcome::HasSales { sold: row.sold }),
        }
    }
}

/// Event rows and their ledger counters
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn insert_event(&self, event: &Event) -> Result<Event>;

    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>>;

    async fn list_events_by_status(&self, status: LifecycleState) -> Result<Vec<Event>>;

    /// Last-write-wins edit of descriptive fields; never touches counters or status
    async fn update_details(&self, event_id: Uuid, request: &UpdateEventRequest) -> Result<Option<Event>>;

    /// Permanent delete; returns false when the row did not exist
    async fn delete_event(&self, event_id: Uuid) -> Result<bool>;

    /// Atomically require `status = active` and `available >= quantity`, then
    /// move `quantity` from available to sold.
    async fn try_reserve(&self, event_id: Uuid, quantity: i32) -> Result<ReserveOutcome>;

    /// Atomically move up to `quantity` from sold back to available, clamped at zero sold.
    async fn try_release(&self, event_id: Uuid, quantity: i32) -> Result<ReleaseOutcome>;

    async fn transition_status(&self, event_id: Uuid, from: LifecycleState, to: LifecycleState) -> Result<TransitionOutcome>;

    async fn resize_capacity(&self, event_id: Uuid, new_total: i32) -> Result<ResizeOutcome>;

    async fn health_check(&self) -> Result<()>;
}

/// Booking rows and the pending-release reconciliation queue
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Fails with `DuplicateReference` or `DuplicateRegistration` when a
    /// uniqueness constraint rejects the row.
    async fn insert_booking(&self, booking: &NewBooking) -> Result<Booking>;

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>>;

    /// Confirmed anonymous booking for a normalized email
    async fn find_confirmed_rsvp(&self, event_id: Uuid, email: &str) -> Result<Option<Booking>>;

    async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<Booking>>;

    async fn mark_cancelled(&self, booking_id: Uuid, actor_id: Option<Uuid>, at: DateTime<Utc>) -> Result<CancelOutcome>;

    async fn record_pending_release(&self, release: &PendingRelease) -> Result<()>;

    async fn list_pending_releases(&self, limit: i64) -> Result<Vec<PendingRelease>>;

    /// Atomically take an entry off the queue. Only one caller gets it back;
    /// the others see `None`.
    async fn claim_pending_release(&self, id: Uuid) -> Result<Option<PendingRelease>>;
}

/// Archive snapshots owned by the archival manager
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Insert a record; an open record for the same event wins over a new one
    async fn insert_record(&self, record: &ArchiveRecord) -> Result<RecordInsert>;

    async fn get_record(&self, archive_id: Uuid) -> Result<Option<ArchiveRecord>>;

    async fn find_open_record(&self, event_id: Uuid) -> Result<Option<ArchiveRecord>>;

    async fn list_records_for_event(&self, event_id: Uuid) -> Result<Vec<ArchiveRecord>>;

    /// Close an open record; returns None if it was already restored
    async fn mark_restored(&self, archive_id: Uuid, actor_id: Option<Uuid>, at: DateTime<Utc>) -> Result<Option<ArchiveRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn row(status: LifecycleState, sold: i32, available: i32) -> Option<GuardedRow> {
        Some(GuardedRow { status, sold, available })
    }

    #[test]
    fn test_reserve_rejection_reasons() {
        let id = Uuid::new_v4();
        assert_matches!(ReserveOutcome::from_reread(id, 2, None), Ok(ReserveOutcome::NotFound));
        assert_matches!(
            ReserveOutcome::from_reread(id, 2, row(LifecycleState::Archived, 9, 1)),
            Ok(ReserveOutcome::NotActive(LifecycleState::Archived))
        );
        assert_matches!(
            ReserveOutcome::from_reread(id, 2, row(LifecycleState::Active, 9, 1)),
            Ok(ReserveOutcome::Insufficient { remaining: 1 })
        );
    }

    #[test]
    fn test_reserve_release_in_between_is_a_conflict() {
        // guard saw available = 1, a release committed before the re-read
        let outcome = ReserveOutcome::from_reread(Uuid::new_v4(), 2, row(LifecycleState::Active, 7, 3));
        assert_matches!(outcome, Err(EventDeskError::StorageConflict(_)));
    }

    #[test]
    fn test_transition_rejection_reasons() {
        let id = Uuid::new_v4();
        assert_matches!(
            TransitionOutcome::from_reread(id, LifecycleState::Active, row(LifecycleState::Archived, 0, 5)),
            Ok(TransitionOutcome::Mismatch(LifecycleState::Archived))
        );
        assert_matches!(
            TransitionOutcome::from_reread(id, LifecycleState::Active, row(LifecycleState::Active, 0, 5)),
            Err(EventDeskError::StorageConflict(_))
        );
        assert_matches!(TransitionOutcome::from_reread(id, LifecycleState::Active, None), Ok(TransitionOutcome::NotFound));
    }

    #[test]
    fn test_resize_rejection_reasons() {
        let id = Uuid::new_v4();
        assert_matches!(
            ResizeOutcome::from_reread(id, row(LifecycleState::Draft, 2, 8)),
            Ok(ResizeOutcome::HasSales { sold: 2 })
        );
        assert_matches!(
            ResizeOutcome::from_reread(id, row(LifecycleState::Draft, 0, 10)),
            Err(EventDeskError::StorageConflict(_))
        );
    }
}
