//! Error handling for EventDesk
//!
//! This module defines the main error type used throughout the application
//! and provides a unified error handling strategy. Business failures
//! (capacity, lifecycle, duplicate registration) are terminal and reported to
//! the caller as-is; storage conflicts are transient and retried by the ledger.

use thiserror::Error;
use uuid::Uuid;

/// Main error type for EventDesk
#[derive(Error, Debug)]
pub enum EventDeskError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Telegram API error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Event not found: {event_id}")]
    EventNotFound { event_id: Uuid },

    #[error("Booking not found: {booking_id}")]
    BookingNotFound { booking_id: String },

    #[error("Archive record not found: {archive_id}")]
    ArchiveNotFound { archive_id: Uuid },

    #[error("Event {event_id} is not accepting bookings (status: {status})")]
    NotActive { event_id: Uuid, status: String },

    #[error("Insufficient capacity for event {event_id}: requested {requested}, remaining {remaining}")]
    InsufficientCapacity { event_id: Uuid, requested: i32, remaining: i32 },

    #[error("Duplicate registration for event {event_id} by {email}")]
    DuplicateRegistration { event_id: Uuid, email: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Storage conflict: {0}")]
    StorageConflict(String),

    #[error("Operation {operation} failed after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: usize },

    #[error("Booking reference already in use: {0}")]
    DuplicateReference(String),

    #[error("Downstream failure: {0}")]
    DownstreamFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for EventDesk operations
pub type Result<T> = std::result::Result<T, EventDeskError>;

impl From<config::ConfigError> for EventDeskError {
    fn from(err: config::ConfigError) -> Self {
        EventDeskError::Config(err.to_string())
    }
}

impl EventDeskError {
    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EventDeskError::StorageConflict(_)
                | EventDeskError::Redis(_)
                | EventDeskError::Telegram(_)
                | EventDeskError::Io(_)
                | EventDeskError::DownstreamFailure(_)
        )
    }

    /// True for capacity, lifecycle and registration failures that describe
    /// real business state and must never be retried automatically
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            EventDeskError::NotActive { .. }
                | EventDeskError::InsufficientCapacity { .. }
                | EventDeskError::DuplicateRegistration { .. }
                | EventDeskError::InvalidTransition { .. }
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EventDeskError::Database(_) => ErrorSeverity::Critical,
            EventDeskError::Migration(_) => ErrorSeverity::Critical,
            EventDeskError::Config(_) => ErrorSeverity::Critical,
            EventDeskError::RetriesExhausted { .. } => ErrorSeverity::Error,
            EventDeskError::StorageConflict(_) => ErrorSeverity::Warning,
            EventDeskError::DownstreamFailure(_) => ErrorSeverity::Warning,
            EventDeskError::NotActive { .. }
            | EventDeskError::InsufficientCapacity { .. }
            | EventDeskError::DuplicateRegistration { .. }
            | EventDeskError::InvalidTransition { .. }
            | EventDeskError::InvalidInput(_)
            | EventDeskError::EventNotFound { .. }
            | EventDeskError::BookingNotFound { .. }
            | EventDeskError::ArchiveNotFound { .. } => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }

    /// Message suitable for showing to an attendee or organizer
    pub fn user_message(&self) -> String {
        match self {
            EventDeskError::InsufficientCapacity { remaining: 0, .. } => {
                "This event is sold out.".to_string()
            }
            EventDeskError::InsufficientCapacity { remaining, .. } => {
                format!("Only {} ticket(s) are left for this event. Please reduce the quantity.", remaining)
            }
            EventDeskError::NotActive { .. } => {
                "This event is no longer accepting registrations.".to_string()
            }
            EventDeskError::DuplicateRegistration { .. } => {
                "You have already registered for this event with this email address.".to_string()
            }
            EventDeskError::EventNotFound { .. } => "This event could not be found.".to_string(),
            EventDeskError::BookingNotFound { .. } => "This booking could not be found.".to_string(),
            EventDeskError::ArchiveNotFound { .. } => "This archive entry could not be found.".to_string(),
            EventDeskError::InvalidTransition { from, to } => {
                format!("The event cannot move from {} to {}.", from, to)
            }
            EventDeskError::InvalidInput(reason) => reason.clone(),
            _ => "Something went wrong. Please try again in a moment.".to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_distinguish_rejections() {
        let event_id = Uuid::new_v4();
        let full = EventDeskError::InsufficientCapacity { event_id, requested: 2, remaining: 0 };
        let closed = EventDeskError::NotActive { event_id, status: "archived".to_string() };
        let dup = EventDeskError::DuplicateRegistration { event_id, email: "a@b.io".to_string() };

        assert!(full.user_message().contains("sold out"));
        assert!(closed.user_message().contains("no longer accepting"));
        assert!(dup.user_message().contains("already registered"));
    }

    #[test]
    fn test_partial_capacity_message_reports_remaining() {
        let err = EventDeskError::InsufficientCapacity { event_id: Uuid::new_v4(), requested: 80, remaining: 70 };
        assert!(err.user_message().contains("70"));
    }

    #[test]
    fn test_classification() {
        assert!(EventDeskError::StorageConflict("busy".into()).is_recoverable());
        assert!(!EventDeskError::InvalidInput("x".into()).is_recoverable());
        assert!(EventDeskError::InvalidTransition { from: "draft".into(), to: "archived".into() }.is_business_rejection());
        assert!(!EventDeskError::StorageConflict("busy".into()).is_business_rejection());
        assert_eq!(EventDeskError::Config("x".into()).severity(), ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }
}
