//! Database module
//!
//! This module handles database connections and storage operations

pub mod connection;
pub mod memory;
pub mod repositories;
pub mod service;
pub mod store;

// Re-export commonly used database components
pub use connection::{DatabasePool, PoolConfig, create_pool, run_migrations, health_check};
pub use memory::InMemoryStore;
pub use repositories::{EventRepository, BookingRepository, ArchiveRepository};
pub use service::DatabaseService;
pub use store::{
    ArchiveStore, BookingStore, CancelOutcome, GuardedRow, InventoryStore, RecordInsert, ReleaseOutcome,
    ReserveOutcome, ResizeOutcome, TransitionOutcome,
};
