//! Database repositories module
//!
//! This module contains the Postgres implementations of the storage traits

pub mod event;
pub mod booking;
pub mod archive;

// Re-export repositories
pub use event::EventRepository;
pub use booking::BookingRepository;
pub use archive::ArchiveRepository;

use crate::utils::errors::EventDeskError;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

/// Map transient Postgres failures to `StorageConflict`, everything else to `Database`
pub(crate) fn map_db_error(err: sqlx::Error) -> EventDeskError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(code) = db_err.code() {
            if code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED {
                return EventDeskError::StorageConflict(db_err.message().to_string());
            }
        }
    }
    EventDeskError::Database(err)
}

/// Name of the unique constraint a statement violated, if any
pub(crate) fn violated_unique_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            db_err.constraint().map(str::to_string)
        }
        _ => None,
    }
}
