//! Inventory ledger
//!
//! The only writer of an event's capacity counters and lifecycle state. Each
//! operation maps to a single conditional write on the [`InventoryStore`];
//! storage conflicts are retried with backoff, business outcomes are not.

use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use crate::database::store::{InventoryStore, ReleaseOutcome, ReserveOutcome, ResizeOutcome, TransitionOutcome};
use crate::models::{Event, LifecycleState};
use crate::utils::errors::{EventDeskError, Result};
use crate::utils::logging::log_ledger_anomaly;
use crate::utils::retry::{retry_transient, RetryPolicy};

/// Token for a committed reservation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: Uuid,
    pub event_id: Uuid,
    pub quantity: i32,
    pub sold_after: i32,
    pub available_after: i32,
    pub committed_at: DateTime<Utc>,
    /// Row as committed
    pub event: Event,
}

/// Result of a release; `released < requested` means the release was clamped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub event_id: Uuid,
    pub requested: i32,
    pub released: i32,
    pub sold_after: i32,
    pub available_after: i32,
    pub event: Event,
}

impl Release {
    pub fn was_clamped(&self) -> bool {
        self.released < self.requested
    }
}

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
    policy: RetryPolicy,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn InventoryStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Atomically move `quantity` from available to sold on an active event
    pub async fn reserve(&self, event_id: Uuid, quantity: i32) -> Result<Reservation> {
        if quantity < 1 {
            return Err(EventDeskError::InvalidInput(format!("Quantity must be at least 1, got {}", quantity)));
        }

        let store = self.store.as_ref();
        let outcome = retry_transient("reserve", &self.policy, move || store.try_reserve(event_id, quantity)).await?;

        match outcome {
            ReserveOutcome::Reserved(event) => {
                debug!(
                    event_id = %event_id,
                    quantity = quantity,
                    sold = event.sold_tickets,
                    available = event.available_tickets,
                    "Reservation committed"
                );
                Ok(Reservation {
                    reservation_id: Uuid::new_v4(),
                    event_id,
                    quantity,
                    sold_after: event.sold_tickets,
                    available_after: event.available_tickets,
                    committed_at: event.updated_at,
                    event,
                })
            }
            ReserveOutcome::NotFound => Err(EventDeskError::EventNotFound { event_id }),
            ReserveOutcome::NotActive(status) => Err(EventDeskError::NotActive {
                event_id,
                status: status.to_string(),
            }),
            ReserveOutcome::Insufficient { remaining } => Err(EventDeskError::InsufficientCapacity {
                event_id,
                requested: quantity,
                remaining,
            }),
        }
    }

    /// Return `quantity` to the available pool, clamped so sold never goes negative
    pub async fn release(&self, event_id: Uuid, quantity: i32) -> Result<Release> {
        if quantity < 1 {
            return Err(EventDeskError::InvalidInput(format!("Quantity must be at least 1, got {}", quantity)));
        }

        let store = self.store.as_ref();
        let outcome = retry_transient("release", &self.policy, move || store.try_release(event_id, quantity)).await?;

        match outcome {
            ReleaseOutcome::Released { event, released } => {
                if released < quantity {
                    log_ledger_anomaly(event_id, "release clamped at zero sold", quantity, released);
                }
                Ok(Release {
                    event_id,
                    requested: quantity,
                    released,
                    sold_after: event.sold_tickets,
                    available_after: event.available_tickets,
                    event,
                })
            }
            ReleaseOutcome::NotFound => Err(EventDeskError::EventNotFound { event_id }),
        }
    }

    /// Guarded lifecycle change; fails unless the event is currently in `from`
    pub async fn transition_lifecycle(&self, event_id: Uuid, from: LifecycleState, to: LifecycleState) -> Result<Event> {
        if !from.can_transition_to(to) {
            return Err(EventDeskError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let store = self.store.as_ref();
        let outcome = retry_transient("transition_lifecycle", &self.policy, move || {
            store.transition_status(event_id, from, to)
        })
        .await?;

        match outcome {
            TransitionOutcome::Transitioned(event) => {
                info!(event_id = %event_id, from = %from, to = %to, "Lifecycle transition committed");
                Ok(event)
            }
            TransitionOutcome::NotFound => Err(EventDeskError::EventNotFound { event_id }),
            TransitionOutcome::Mismatch(current) => Err(EventDeskError::InvalidTransition {
                from: current.to_string(),
                to: to.to_string(),
            }),
        }
    }

    /// Change total capacity; only possible while nothing has been sold
    pub async fn resize_capacity(&self, event_id: Uuid, new_total: i32) -> Result<Event> {
        if new_total < 0 {
            return Err(EventDeskError::InvalidInput("Total tickets cannot be negative".to_string()));
        }

        let store = self.store.as_ref();
        let outcome = retry_transient("resize_capacity", &self.policy, move || {
            store.resize_capacity(event_id, new_total)
        })
        .await?;

        match outcome {
            ResizeOutcome::Resized(event) => Ok(event),
            ResizeOutcome::NotFound => Err(EventDeskError::EventNotFound { event_id }),
            ResizeOutcome::HasSales { sold } => Err(EventDeskError::InvalidInput(format!(
                "Capacity cannot change after tickets are sold ({} sold)",
                sold
            ))),
        }
    }

    /// Write a new event row with its initial counters
    pub async fn register(&self, event: &Event) -> Result<Event> {
        if !event.is_balanced() {
            return Err(EventDeskError::InvalidInput(format!(
                "Counters do not balance: total {}, sold {}, available {}",
                event.total_tickets, event.sold_tickets, event.available_tickets
            )));
        }
        self.store.insert_event(event).await
    }

    pub async fn events_in_state(&self, status: LifecycleState) -> Result<Vec<Event>> {
        self.store.list_events_by_status(status).await
    }

    /// Current row, counters included
    pub async fn snapshot(&self, event_id: Uuid) -> Result<Event> {
        self.store
            .get_event(event_id)
            .await?
            .ok_or(EventDeskError::EventNotFound { event_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Duration;
    use crate::database::memory::InMemoryStore;

    fn event(status: LifecycleState, total: i32) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            organizer_id: Uuid::new_v4(),
            name: "Ledger test".to_string(),
            description: None,
            location: None,
            starts_at: now,
            ends_at: now + Duration::hours(2),
            total_tickets: total,
            sold_tickets: 0,
            available_tickets: total,
            status,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn ledger_with(event: &Event, max_retries: usize) -> (InventoryLedger, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let ledger = InventoryLedger::new(store.clone(), RetryPolicy::immediate(max_retries));
        ledger.register(event).await.unwrap();
        (ledger, store)
    }

    #[tokio::test]
    async fn test_reserve_reports_counters_after_commit() {
        let event = event(LifecycleState::Active, 10);
        let (ledger, _) = ledger_with(&event, 3).await;

        let reservation = ledger.reserve(event.id, 4).await.unwrap();
        assert_eq!(reservation.sold_after, 4);
        assert_eq!(reservation.available_after, 6);
    }

    #[tokio::test]
    async fn test_reserve_rejections_are_mapped() {
        let draft = event(LifecycleState::Draft, 10);
        let (ledger, _) = ledger_with(&draft, 3).await;

        assert_matches!(ledger.reserve(draft.id, 1).await, Err(EventDeskError::NotActive { .. }));
        assert_matches!(ledger.reserve(Uuid::new_v4(), 1).await, Err(EventDeskError::EventNotFound { .. }));
        assert_matches!(ledger.reserve(draft.id, 0).await, Err(EventDeskError::InvalidInput(_)));

        ledger.transition_lifecycle(draft.id, LifecycleState::Draft, LifecycleState::Active).await.unwrap();
        assert_matches!(
            ledger.reserve(draft.id, 11).await,
            Err(EventDeskError::InsufficientCapacity { requested: 11, remaining: 10, .. })
        );
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_within_bound() {
        let event = event(LifecycleState::Active, 5);
        let (ledger, store) = ledger_with(&event, 3).await;

        store.inject_conflicts(2);
        assert!(ledger.reserve(event.id, 1).await.is_ok());

        store.inject_conflicts(10);
        assert_matches!(
            ledger.reserve(event.id, 1).await,
            Err(EventDeskError::RetriesExhausted { attempts: 4, .. })
        );
        assert_eq!(ledger.snapshot(event.id).await.unwrap().sold_tickets, 1);
    }

    #[tokio::test]
    async fn test_double_release_is_clamped() {
        let event = event(LifecycleState::Active, 10);
        let (ledger, _) = ledger_with(&event, 3).await;

        ledger.reserve(event.id, 3).await.unwrap();
        assert!(!ledger.release(event.id, 3).await.unwrap().was_clamped());

        let second = ledger.release(event.id, 3).await.unwrap();
        assert!(second.was_clamped());
        assert_eq!(second.released, 0);
        assert_eq!(second.available_after, 10);
    }

    #[tokio::test]
    async fn test_stale_transition_is_rejected() {
        let event = event(LifecycleState::Active, 10);
        let (ledger, _) = ledger_with(&event, 3).await;

        ledger.transition_lifecycle(event.id, LifecycleState::Active, LifecycleState::Archived).await.unwrap();
        assert_matches!(
            ledger.transition_lifecycle(event.id, LifecycleState::Active, LifecycleState::Archived).await,
            Err(EventDeskError::InvalidTransition { .. })
        );
        assert_matches!(
            ledger.transition_lifecycle(event.id, LifecycleState::Archived, LifecycleState::Cancelled).await,
            Err(EventDeskError::InvalidTransition { .. })
        );
    }

    #[tokio::test]
    async fn test_resize_only_before_sales() {
        let event = event(LifecycleState::Active, 10);
        let (ledger, _) = ledger_with(&event, 3).await;

        assert_eq!(ledger.resize_capacity(event.id, 20).await.unwrap().available_tickets, 20);
        ledger.reserve(event.id, 1).await.unwrap();
        assert_matches!(ledger.resize_capacity(event.id, 30).await, Err(EventDeskError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_unbalanced_rows() {
        let mut event = event(LifecycleState::Draft, 10);
        event.sold_tickets = 3;
        let store = Arc::new(InMemoryStore::new());
        let ledger = InventoryLedger::new(store, RetryPolicy::immediate(0));
        assert_matches!(ledger.register(&event).await, Err(EventDeskError::InvalidInput(_)));
    }
}
