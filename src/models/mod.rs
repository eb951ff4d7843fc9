//! Data models module
//!
//! This module contains all data structures used throughout the application

pub mod event;
pub mod booking;
pub mod archive;

// Re-export commonly used models
pub use event::{Event, LifecycleState, CreateEventRequest, UpdateEventRequest};
pub use booking::{Booking, BookingStatus, AttendeeInfo, NewBooking, PendingRelease};
pub use archive::{ArchiveRecord, ArchiveReason};
