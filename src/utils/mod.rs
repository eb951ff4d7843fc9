//! Utility modules
//!
//! This module contains common utilities used throughout the application,
//! including error handling, logging setup, retry policy and helper functions.

pub mod errors;
pub mod logging;
pub mod helpers;
pub mod retry;

pub use errors::{EventDeskError, Result};
pub use retry::{RetryPolicy, retry_transient};
