//! Test data builders and a notifier that records what it was asked to send

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use uuid::Uuid;
use eventdesk::models::{AttendeeInfo, CreateEventRequest};
use eventdesk::services::{Notification, Notifier, TemplateKind};
use eventdesk::{EventDeskError, Result};

/// Notifier that keeps every notification, and can be switched to fail
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count(&self, kind: TemplateKind) -> usize {
        self.sent.lock().unwrap().iter().filter(|n| n.kind == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(EventDeskError::DownstreamFailure("mail relay unavailable".to_string()));
        }
        Ok(())
    }
}

/// Anonymous RSVP with a random address
pub fn guest() -> AttendeeInfo {
    AttendeeInfo::Guest {
        email: SafeEmail().fake(),
        name: Some(Name().fake()),
    }
}

pub fn guest_with_email(email: &str) -> AttendeeInfo {
    AttendeeInfo::Guest { email: email.to_string(), name: None }
}

/// Signed-in attendee
pub fn account() -> AttendeeInfo {
    AttendeeInfo::Account {
        user_id: Uuid::new_v4(),
        email: Some(SafeEmail().fake()),
    }
}

pub fn event_request(total_tickets: i32, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> CreateEventRequest {
    CreateEventRequest {
        organizer_id: Uuid::new_v4(),
        name: format!("Test event {}", &Uuid::new_v4().to_string()[..8]),
        description: Some("Created by the test suite".to_string()),
        location: Some("Main hall".to_string()),
        starts_at,
        ends_at: Some(ends_at),
        total_tickets,
    }
}

/// Request for an event that runs for three hours from `starts_at`
pub fn event_request_at(total_tickets: i32, starts_at: DateTime<Utc>) -> CreateEventRequest {
    event_request(total_tickets, starts_at, starts_at + Duration::hours(3))
}
