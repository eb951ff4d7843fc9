//! Event model

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::utils::errors::EventDeskError;

/// Coarse-grained lifecycle state gating which operations an event accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Draft,
    Active,
    Archived,
    Cancelled,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Draft => "draft",
            LifecycleState::Active => "active",
            LifecycleState::Archived => "archived",
            LifecycleState::Cancelled => "cancelled",
        }
    }

    /// Valid transitions: draft→active, active→archived, active→cancelled, archived→active
    pub fn can_transition_to(&self, to: LifecycleState) -> bool {
        matches!(
            (self, to),
            (LifecycleState::Draft, LifecycleState::Active)
                | (LifecycleState::Active, LifecycleState::Archived)
                | (LifecycleState::Active, LifecycleState::Cancelled)
                | (LifecycleState::Archived, LifecycleState::Active)
        )
    }

    pub fn accepts_bookings(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = EventDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(LifecycleState::Draft),
            "active" => Ok(LifecycleState::Active),
            "archived" => Ok(LifecycleState::Archived),
            "cancelled" => Ok(LifecycleState::Cancelled),
            other => Err(EventDeskError::InvalidInput(format!("Unknown lifecycle state: {}", other))),
        }
    }
}

/// One occasion with ticket capacity to sell or register against.
///
/// `sold_tickets + available_tickets == total_tickets` holds after every
/// committed ledger operation and both counters stay non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub total_tickets: i32,
    pub sold_tickets: i32,
    pub available_tickets: i32,
    pub status: LifecycleState,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Check the capacity invariant
    pub fn is_balanced(&self) -> bool {
        self.sold_tickets >= 0
            && self.available_tickets >= 0
            && self.sold_tickets + self.available_tickets == self.total_tickets
    }

    /// Counter triple `(total, sold, available)`
    pub fn counters(&self) -> (i32, i32, i32) {
        (self.total_tickets, self.sold_tickets, self.available_tickets)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub organizer_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub total_tickets: i32,
}

/// Organizer edit of non-ledger fields; last write wins
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEventRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use LifecycleState::*;
        assert!(Draft.can_transition_to(Active));
        assert!(Active.can_transition_to(Archived));
        assert!(Active.can_transition_to(Cancelled));
        assert!(Archived.can_transition_to(Active));

        assert!(!Draft.can_transition_to(Archived));
        assert!(!Cancelled.can_transition_to(Active));
        assert!(!Archived.can_transition_to(Cancelled));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_lifecycle_round_trips_through_text() {
        for state in [LifecycleState::Draft, LifecycleState::Active, LifecycleState::Archived, LifecycleState::Cancelled] {
            assert_eq!(state.as_str().parse::<LifecycleState>().unwrap(), state);
        }
        assert!("paused".parse::<LifecycleState>().is_err());
    }
}
