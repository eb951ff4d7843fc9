//! Booking model
//!
//! A booking is one attendee's claim on N units of an event's capacity. Paid
//! purchases and free RSVPs share the same record; only the payment metadata
//! differs.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::utils::errors::EventDeskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = EventDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(EventDeskError::InvalidInput(format!("Unknown booking status: {}", other))),
        }
    }
}

/// Who is booking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttendeeInfo {
    /// Authenticated attendee
    Account { user_id: Uuid, email: Option<String> },
    /// Anonymous web RSVP identified by email
    Guest { email: String, name: Option<String> },
}

impl AttendeeInfo {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AttendeeInfo::Account { user_id, .. } => Some(*user_id),
            AttendeeInfo::Guest { .. } => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            AttendeeInfo::Account { email, .. } => email.as_deref(),
            AttendeeInfo::Guest { email, .. } => Some(email.as_str()),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, AttendeeInfo::Guest { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub reference: String,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub attendee_email: Option<String>,
    pub attendee_name: Option<String>,
    pub quantity: i32,
    pub status: BookingStatus,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
}

impl Booking {
    /// Anonymous RSVPs carry no user id
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }
}

/// Row written by the registry after a reservation committed
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Uuid,
    pub reference: String,
    pub event_id: Uuid,
    pub user_id: Option<Uuid>,
    pub attendee_email: Option<String>,
    pub attendee_name: Option<String>,
    pub quantity: i32,
    pub payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewBooking {
    pub fn into_booking(self) -> Booking {
        Booking {
            id: self.id,
            reference: self.reference,
            event_id: self.event_id,
            user_id: self.user_id,
            attendee_email: self.attendee_email,
            attendee_name: self.attendee_name,
            quantity: self.quantity,
            status: BookingStatus::Confirmed,
            payment_reference: self.payment_reference,
            created_at: self.created_at,
            cancelled_at: None,
            cancelled_by: None,
        }
    }
}

/// Inventory release that failed after a booking was cancelled and is
/// waiting for reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRelease {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub event_id: Uuid,
    pub quantity: i32,
    pub attempts: i32,
    pub last_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
