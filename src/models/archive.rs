//! Archive record model

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::models::event::Event;
use crate::utils::errors::EventDeskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveReason {
    Automatic,
    Manual,
    Cancelled,
    Restored,
}

impl ArchiveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveReason::Automatic => "automatic",
            ArchiveReason::Manual => "manual",
            ArchiveReason::Cancelled => "cancelled",
            ArchiveReason::Restored => "restored",
        }
    }
}

impl fmt::Display for ArchiveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveReason {
    type Err = EventDeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(ArchiveReason::Automatic),
            "manual" => Ok(ArchiveReason::Manual),
            "cancelled" => Ok(ArchiveReason::Cancelled),
            "restored" => Ok(ArchiveReason::Restored),
            other => Err(EventDeskError::InvalidInput(format!("Unknown archive reason: {}", other))),
        }
    }
}

/// Point-in-time copy of an event plus archival metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub id: Uuid,
    pub event_id: Uuid,
    pub snapshot: Event,
    pub reason: ArchiveReason,
    pub actor_id: Option<Uuid>,
    pub archived_at: DateTime<Utc>,
    pub restored_at: Option<DateTime<Utc>>,
    pub restored_by: Option<Uuid>,
}

impl ArchiveRecord {
    pub fn new(snapshot: Event, reason: ArchiveReason, actor_id: Option<Uuid>, archived_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: snapshot.id,
            snapshot,
            reason,
            actor_id,
            archived_at,
            restored_at: None,
            restored_by: None,
        }
    }

    /// An open record still describes the event's current retirement
    pub fn is_open(&self) -> bool {
        self.restored_at.is_none() && self.reason != ArchiveReason::Restored
    }
}
