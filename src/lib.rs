//! EventDesk
//!
//! Event inventory, booking and archival core for ticketing and RSVP
//! platforms. This library provides the inventory ledger that owns every
//! event's capacity counters, the booking registry built on top of it, the
//! archival manager for concluded events and a fire-and-forget notification
//! dispatcher.

pub mod config;
pub mod services;
pub mod models;
pub mod database;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{EventDeskError, Result};

// Re-export main components for easy access
pub use database::DatabaseService;
pub use services::{ArchivalManager, BookingRegistry, EventService, InventoryLedger, ServiceFactory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
