//! Organizer-side event management
//!
//! Creation, publishing and descriptive edits. Counter and lifecycle writes
//! go through the [`InventoryLedger`]; descriptive fields are last-write-wins.

use std::sync::Arc;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;
use crate::database::store::InventoryStore;
use crate::models::{CreateEventRequest, Event, LifecycleState, UpdateEventRequest};
use crate::services::ledger::InventoryLedger;
use crate::utils::errors::{EventDeskError, Result};
use crate::utils::helpers::default_end_time;

#[derive(Clone)]
pub struct EventService {
    ledger: InventoryLedger,
    events: Arc<dyn InventoryStore>,
}

impl EventService {
    pub fn new(ledger: InventoryLedger, events: Arc<dyn InventoryStore>) -> Self {
        Self { ledger, events }
    }

    /// Create a draft event with all tickets available
    pub async fn create_event(&self, request: CreateEventRequest) -> Result<Event> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(EventDeskError::InvalidInput("Event name is required".to_string()));
        }
        if request.total_tickets < 0 {
            return Err(EventDeskError::InvalidInput("Total tickets cannot be negative".to_string()));
        }

        let ends_at = request.ends_at.unwrap_or_else(|| default_end_time(request.starts_at));
        if ends_at < request.starts_at {
            return Err(EventDeskError::InvalidInput("Event cannot end before it starts".to_string()));
        }

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            organizer_id: request.organizer_id,
            name: name.to_string(),
            description: request.description,
            location: request.location,
            starts_at: request.starts_at,
            ends_at,
            total_tickets: request.total_tickets,
            sold_tickets: 0,
            available_tickets: request.total_tickets,
            status: LifecycleState::Draft,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let event = self.ledger.register(&event).await?;
        info!(event_id = %event.id, organizer_id = %event.organizer_id, total = event.total_tickets, "Event created");
        Ok(event)
    }

    /// Open a draft event for bookings
    pub async fn publish(&self, event_id: Uuid) -> Result<Event> {
        self.ledger
            .transition_lifecycle(event_id, LifecycleState::Draft, LifecycleState::Active)
            .await
    }

    pub async fn update_details(&self, event_id: Uuid, request: UpdateEventRequest) -> Result<Event> {
        if let Some(name) = &request.name {
            if name.trim().is_empty() {
                return Err(EventDeskError::InvalidInput("Event name cannot be empty".to_string()));
            }
        }

        if request.starts_at.is_some() || request.ends_at.is_some() {
            let current = self.ledger.snapshot(event_id).await?;
            let starts_at = request.starts_at.unwrap_or(current.starts_at);
            let ends_at = request.ends_at.unwrap_or(current.ends_at);
            if ends_at < starts_at {
                return Err(EventDeskError::InvalidInput("Event cannot end before it starts".to_string()));
            }
        }

        self.events
            .update_details(event_id, &request)
            .await?
            .ok_or(EventDeskError::EventNotFound { event_id })
    }

    pub async fn resize_capacity(&self, event_id: Uuid, total_tickets: i32) -> Result<Event> {
        self.ledger.resize_capacity(event_id, total_tickets).await
    }

    /// Remove an event row for good. Archive records are kept, so an archived
    /// event can still be restored from its snapshot.
    pub async fn delete_permanently(&self, event_id: Uuid) -> Result<()> {
        let event = self.ledger.snapshot(event_id).await?;
        if event.status == LifecycleState::Active {
            return Err(EventDeskError::InvalidInput(
                "Active events must be archived or cancelled before deletion".to_string(),
            ));
        }

        if !self.events.delete_event(event_id).await? {
            return Err(EventDeskError::EventNotFound { event_id });
        }
        info!(event_id = %event_id, status = %event.status, "Event permanently deleted");
        Ok(())
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Event> {
        self.ledger.snapshot(event_id).await
    }

    pub async fn list_by_status(&self, status: LifecycleState) -> Result<Vec<Event>> {
        self.ledger.events_in_state(status).await
    }
}
