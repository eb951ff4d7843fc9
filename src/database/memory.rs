//! In-memory storage backend
//!
//! Implements the same storage contract as the Postgres repositories. Each
//! operation runs to completion against the shared state before another can
//! observe it, which is the atomicity the ledger relies on. Used for local
//! runs (`storage.backend = "memory"`) and throughout the test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::database::store::{
    ArchiveStore, BookingStore, CancelOutcome, InventoryStore, RecordInsert, ReleaseOutcome,
    ReserveOutcome, ResizeOutcome, TransitionOutcome,
};
use crate::models::{
    ArchiveRecord, Booking, BookingStatus, Event, LifecycleState, NewBooking, PendingRelease,
    UpdateEventRequest,
};
use crate::utils::errors::{EventDeskError, Result};

#[derive(Default)]
struct MemoryState {
    events: HashMap<Uuid, Event>,
    bookings: HashMap<Uuid, Booking>,
    archives: HashMap<Uuid, ArchiveRecord>,
    pending_releases: HashMap<Uuid, PendingRelease>,
}

/// Shared in-memory store for events, bookings and archive records
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
    injected_conflicts: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` inventory writes fail with a storage conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    fn take_conflict(&self) -> Result<()> {
        let taken = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if taken {
            Err(EventDeskError::StorageConflict("injected conflict".to_string()))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn bump(event: &mut Event) {
    event.version += 1;
    event.updated_at = Utc::now();
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn insert_event(&self, event: &Event) -> Result<Event> {
        let mut state = self.lock();
        if state.events.contains_key(&event.id) {
            return Err(EventDeskError::InvalidInput(format!("Event {} already exists", event.id)));
        }
        state.events.insert(event.id, event.clone());
        Ok(event.clone())
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>> {
        Ok(self.lock().events.get(&event_id).cloned())
    }

    async fn list_events_by_status(&self, status: LifecycleState) -> Result<Vec<Event>> {
        let state = self.lock();
        let mut events: Vec<Event> = state.events.values().filter(|e| e.status == status).cloned().collect();
        events.sort_by_key(|e| (e.ends_at, e.id));
        Ok(events)
    }

    async fn update_details(&self, event_id: Uuid, request: &UpdateEventRequest) -> Result<Option<Event>> {
        let mut state = self.lock();
        let Some(event) = state.events.get_mut(&event_id) else {
            return Ok(None);
        };
        if let Some(name) = &request.name {
            event.name = name.clone();
        }
        if let Some(description) = &request.description {
            event.description = Some(description.clone());
        }
        if let Some(location) = &request.location {
            event.location = Some(location.clone());
        }
        if let Some(starts_at) = request.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(ends_at) = request.ends_at {
            event.ends_at = ends_at;
        }
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<bool> {
        Ok(self.lock().events.remove(&event_id).is_some())
    }

    async fn try_reserve(&self, event_id: Uuid, quantity: i32) -> Result<ReserveOutcome> {
        self.take_conflict()?;
        let mut state = self.lock();
        let Some(event) = state.events.get_mut(&event_id) else {
            return Ok(ReserveOutcome::NotFound);
        };
        if event.status != LifecycleState::Active {
            return Ok(ReserveOutcome::NotActive(event.status));
        }
        if event.available_tickets < quantity {
            return Ok(ReserveOutcome::Insufficient { remaining: event.available_tickets });
        }
        event.available_tickets -= quantity;
        event.sold_tickets += quantity;
        bump(event);
        Ok(ReserveOutcome::Reserved(event.clone()))
    }

    async fn try_release(&self, event_id: Uuid, quantity: i32) -> Result<ReleaseOutcome> {
        self.take_conflict()?;
        let mut state = self.lock();
        let Some(event) = state.events.get_mut(&event_id) else {
            return Ok(ReleaseOutcome::NotFound);
        };
        let released = quantity.min(event.sold_tickets).max(0);
        event.sold_tickets -= released;
        event.available_tickets += released;
        bump(event);
        Ok(ReleaseOutcome::Released { event: event.clone(), released })
    }

    async fn transition_status(&self, event_id: Uuid, from: LifecycleState, to: LifecycleState) -> Result<TransitionOutcome> {
        self.take_conflict()?;
        let mut state = self.lock();
        let Some(event) = state.events.get_mut(&event_id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if event.status != from {
            return Ok(TransitionOutcome::Mismatch(event.status));
        }
        event.status = to;
        bump(event);
        Ok(TransitionOutcome::Transitioned(event.clone()))
    }

    async fn resize_capacity(&self, event_id: Uuid, new_total: i32) -> Result<ResizeOutcome> {
        self.take_conflict()?;
        let mut state = self.lock();
        let Some(event) = state.events.get_mut(&event_id) else {
            return Ok(ResizeOutcome::NotFound);
        };
        if event.sold_tickets != 0 {
            return Ok(ResizeOutcome::HasSales { sold: event.sold_tickets });
        }
        event.total_tickets = new_total;
        event.available_tickets = new_total;
        bump(event);
        Ok(ResizeOutcome::Resized(event.clone()))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn insert_booking(&self, booking: &NewBooking) -> Result<Booking> {
        let mut state = self.lock();
        if state.bookings.values().any(|b| b.reference == booking.reference) {
            return Err(EventDeskError::DuplicateReference(booking.reference.clone()));
        }
        if booking.user_id.is_none() {
            if let Some(email) = &booking.attendee_email {
                let taken = state.bookings.values().any(|b| {
                    b.event_id == booking.event_id
                        && b.is_anonymous()
                        && b.is_confirmed()
                        && b.attendee_email.as_deref() == Some(email.as_str())
                });
                if taken {
                    return Err(EventDeskError::DuplicateRegistration {
                        event_id: booking.event_id,
                        email: email.clone(),
                    });
                }
            }
        }
        let row = booking.clone().into_booking();
        state.bookings.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>> {
        Ok(self.lock().bookings.get(&booking_id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>> {
        Ok(self.lock().bookings.values().find(|b| b.reference == reference).cloned())
    }

    async fn find_confirmed_rsvp(&self, event_id: Uuid, email: &str) -> Result<Option<Booking>> {
        Ok(self
            .lock()
            .bookings
            .values()
            .find(|b| {
                b.event_id == event_id
                    && b.is_anonymous()
                    && b.is_confirmed()
                    && b.attendee_email.as_deref() == Some(email)
            })
            .cloned())
    }

    async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<Booking>> {
        let state = self.lock();
        let mut bookings: Vec<Booking> = state.bookings.values().filter(|b| b.event_id == event_id).cloned().collect();
        bookings.sort_by_key(|b| (b.created_at, b.id));
        Ok(bookings)
    }

    async fn mark_cancelled(&self, booking_id: Uuid, actor_id: Option<Uuid>, at: DateTime<Utc>) -> Result<CancelOutcome> {
        let mut state = self.lock();
        let Some(booking) = state.bookings.get_mut(&booking_id) else {
            return Ok(CancelOutcome::NotFound);
        };
        if booking.status == BookingStatus::Cancelled {
            return Ok(CancelOutcome::AlreadyCancelled(booking.clone()));
        }
        booking.status = BookingStatus::Cancelled;
        booking.cancelled_at = Some(at);
        booking.cancelled_by = actor_id;
        Ok(CancelOutcome::Cancelled(booking.clone()))
    }

    async fn record_pending_release(&self, release: &PendingRelease) -> Result<()> {
        let mut state = self.lock();
        if state.pending_releases.values().any(|p| p.booking_id == release.booking_id) {
            return Ok(());
        }
        state.pending_releases.insert(release.id, release.clone());
        Ok(())
    }

    async fn list_pending_releases(&self, limit: i64) -> Result<Vec<PendingRelease>> {
        let state = self.lock();
        let mut pending: Vec<PendingRelease> = state.pending_releases.values().cloned().collect();
        pending.sort_by_key(|p| (p.created_at, p.id));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn claim_pending_release(&self, id: Uuid) -> Result<Option<PendingRelease>> {
        Ok(self.lock().pending_releases.remove(&id))
    }
}

#[async_trait]
impl ArchiveStore for InMemoryStore {
    async fn insert_record(&self, record: &ArchiveRecord) -> Result<RecordInsert> {
        let mut state = self.lock();
        if record.is_open() {
            if let Some(existing) = state.archives.values().find(|r| r.event_id == record.event_id && r.is_open()) {
                return Ok(RecordInsert::Existing(existing.clone()));
            }
        }
        state.archives.insert(record.id, record.clone());
        Ok(RecordInsert::Inserted(record.clone()))
    }

    async fn get_record(&self, archive_id: Uuid) -> Result<Option<ArchiveRecord>> {
        Ok(self.lock().archives.get(&archive_id).cloned())
    }

    async fn find_open_record(&self, event_id: Uuid) -> Result<Option<ArchiveRecord>> {
        Ok(self
            .lock()
            .archives
            .values()
            .find(|r| r.event_id == event_id && r.is_open())
            .cloned())
    }

    async fn list_records_for_event(&self, event_id: Uuid) -> Result<Vec<ArchiveRecord>> {
        let state = self.lock();
        let mut records: Vec<ArchiveRecord> = state.archives.values().filter(|r| r.event_id == event_id).cloned().collect();
        records.sort_by_key(|r| (r.archived_at, r.id));
        Ok(records)
    }

    async fn mark_restored(&self, archive_id: Uuid, actor_id: Option<Uuid>, at: DateTime<Utc>) -> Result<Option<ArchiveRecord>> {
        let mut state = self.lock();
        match state.archives.get_mut(&archive_id) {
            Some(record) if record.restored_at.is_none() => {
                record.restored_at = Some(at);
                record.restored_by = actor_id;
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn active_event(total: i32) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            name: "Warehouse Social".to_string(),
            description: None,
            location: None,
            starts_at: now,
            ends_at: now,
            total_tickets: total,
            sold_tickets: 0,
            available_tickets: total,
            status: LifecycleState::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_reserve_is_guarded() {
        let store = InMemoryStore::new();
        let event = store.insert_event(&active_event(3)).await.unwrap();

        assert_matches!(store.try_reserve(event.id, 2).await.unwrap(), ReserveOutcome::Reserved(e) if e.counters() == (3, 2, 1));
        assert_matches!(store.try_reserve(event.id, 2).await.unwrap(), ReserveOutcome::Insufficient { remaining: 1 });
        assert_matches!(store.try_reserve(Uuid::new_v4(), 1).await.unwrap(), ReserveOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_release_is_clamped() {
        let store = InMemoryStore::new();
        let event = store.insert_event(&active_event(5)).await.unwrap();
        store.try_reserve(event.id, 2).await.unwrap();

        let outcome = store.try_release(event.id, 4).await.unwrap();
        assert_matches!(outcome, ReleaseOutcome::Released { released: 2, ref event } if event.counters() == (5, 0, 5));
    }

    #[tokio::test]
    async fn test_injected_conflicts_only_hit_inventory_writes() {
        let store = InMemoryStore::new();
        let event = store.insert_event(&active_event(5)).await.unwrap();
        store.inject_conflicts(1);

        assert!(store.get_event(event.id).await.unwrap().is_some());
        assert_matches!(store.try_reserve(event.id, 1).await, Err(EventDeskError::StorageConflict(_)));
        assert_matches!(store.try_reserve(event.id, 1).await, Ok(ReserveOutcome::Reserved(_)));
    }

    #[tokio::test]
    async fn test_single_open_archive_record_per_event() {
        let store = InMemoryStore::new();
        let event = active_event(1);
        let first = ArchiveRecord::new(event.clone(), crate::models::ArchiveReason::Manual, None, Utc::now());
        let second = ArchiveRecord::new(event, crate::models::ArchiveReason::Automatic, None, Utc::now());

        assert_matches!(store.insert_record(&first).await.unwrap(), RecordInsert::Inserted(_));
        assert_matches!(store.insert_record(&second).await.unwrap(), RecordInsert::Existing(r) if r.id == first.id);
    }
}
