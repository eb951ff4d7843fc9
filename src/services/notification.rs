//! Notification dispatcher
//!
//! Bookings and archival hand notifications to a [`NotificationDispatcher`],
//! which queues them on a bounded channel and returns immediately. A worker
//! task renders each message and passes it to a [`Notifier`]. Delivery
//! failures stop at the worker: they are logged as downstream failures and
//! counted, and never reach the operation that produced the notification.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use teloxide::{prelude::Request, requests::Requester, types::ChatId, Bot};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;
use crate::models::{Booking, Event};
use crate::utils::errors::{EventDeskError, Result};
use crate::utils::helpers::{format_timestamp, truncate_text};
use crate::utils::logging::log_downstream_failure;

const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Message kinds produced by the booking and archival flows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    BookingConfirmed,
    BookingCancelled,
    EventArchived,
    EventRestored,
    EventCancelled,
}

impl TemplateKind {
    pub fn key(&self) -> &'static str {
        match self {
            TemplateKind::BookingConfirmed => "booking_confirmed",
            TemplateKind::BookingCancelled => "booking_cancelled",
            TemplateKind::EventArchived => "event_archived",
            TemplateKind::EventRestored => "event_restored",
            TemplateKind::EventCancelled => "event_cancelled",
        }
    }

    /// Message body with `{placeholder}` slots
    pub fn template(&self) -> &'static str {
        match self {
            TemplateKind::BookingConfirmed => {
                "Your booking {reference} for {event_name} is confirmed: {quantity} ticket(s), {starts_at}."
            }
            TemplateKind::BookingCancelled => {
                "Your booking {reference} for {event_name} has been cancelled."
            }
            TemplateKind::EventArchived => {
                "{event_name} has been archived ({sold} sold of {total})."
            }
            TemplateKind::EventRestored => {
                "{event_name} has been restored and is open again ({available} available)."
            }
            TemplateKind::EventCancelled => {
                "{event_name} on {starts_at} has been cancelled. Your booking {reference} will not take place."
            }
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Who a notification is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Account(Uuid),
    Guest(String),
}

impl Recipient {
    /// Attendee behind a booking; guests are addressed by their captured email
    pub fn for_booking(booking: &Booking) -> Option<Self> {
        match (booking.user_id, &booking.attendee_email) {
            (Some(user_id), _) => Some(Recipient::Account(user_id)),
            (None, Some(email)) => Some(Recipient::Guest(email.clone())),
            (None, None) => None,
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Account(user_id) => write!(f, "user:{}", user_id),
            Recipient::Guest(email) => write!(f, "guest:{}", email),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub kind: TemplateKind,
    pub payload: HashMap<String, String>,
}

impl Notification {
    pub fn new(recipient: Recipient, kind: TemplateKind) -> Self {
        Self { recipient, kind, payload: HashMap::new() }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    /// Payload describing an event
    pub fn with_event(self, event: &Event) -> Self {
        self.with("event_id", event.id.to_string())
            .with("event_name", event.name.clone())
            .with("starts_at", format_timestamp(event.starts_at))
            .with("total", event.total_tickets.to_string())
            .with("sold", event.sold_tickets.to_string())
            .with("available", event.available_tickets.to_string())
    }

    /// Payload describing a booking
    pub fn with_booking(self, booking: &Booking) -> Self {
        self.with("booking_id", booking.id.to_string())
            .with("reference", booking.reference.clone())
            .with("quantity", booking.quantity.to_string())
    }

    /// Substitute payload values into the template; unknown placeholders are left as-is
    pub fn render(&self) -> String {
        let mut formatted = self.kind.template().to_string();
        for (key, value) in &self.payload {
            let placeholder = format!("{{{}}}", key);
            formatted = formatted.replace(&placeholder, value);
        }
        formatted
    }
}

/// Delivery channel for rendered notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log; the default when no chat is configured
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            recipient = %notification.recipient,
            template = %notification.kind,
            message = %notification.render(),
            "Notification"
        );
        Ok(())
    }
}

/// Posts every notification to an operations chat
#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(token),
            chat_id: ChatId(chat_id),
        }
    }

    /// Point the bot at a different Bot API server
    pub fn with_api_url(mut self, api_url: url::Url) -> Self {
        self.bot = self.bot.set_api_url(api_url);
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let text = format!("[{}] {}\n{}", notification.kind, notification.recipient, notification.render());
        self.bot
            .send_message(self.chat_id, truncate_text(&text, TELEGRAM_MESSAGE_LIMIT))
            .send()
            .await?;
        debug!(chat_id = ?self.chat_id, template = %notification.kind, "Notification posted to operations chat");
        Ok(())
    }
}

/// Counters kept by the dispatcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub queued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

enum Command {
    Deliver(Notification),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget front of the notification worker
#[derive(Clone)]
pub struct NotificationDispatcher {
    sender: Option<mpsc::Sender<Command>>,
    counters: Arc<Counters>,
}

impl NotificationDispatcher {
    /// Start the worker task on the current runtime
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let counters = Arc::new(Counters::default());

        tokio::spawn(run_worker(notifier, receiver, counters.clone()));
        info!(capacity = capacity, "Notification dispatcher started");

        Self { sender: Some(sender), counters }
    }

    /// Dispatcher that discards everything, for `notifications.enabled = false`
    pub fn disabled() -> Self {
        Self { sender: None, counters: Arc::new(Counters::default()) }
    }

    /// Queue a notification without waiting; never fails the caller
    pub fn notify(&self, notification: Notification) {
        let Some(sender) = &self.sender else {
            debug!(template = %notification.kind, "Notifications disabled, skipping");
            return;
        };

        match sender.try_send(Command::Deliver(notification)) {
            Ok(()) => {
                self.counters.queued.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                let err = EventDeskError::DownstreamFailure("notification queue is full".to_string());
                log_downstream_failure("notification", &err.to_string(), None);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                let err = EventDeskError::DownstreamFailure("notification worker has stopped".to_string());
                log_downstream_failure("notification", &err.to_string(), None);
            }
        }
    }

    /// Wait until everything queued before this call has been handled
    pub async fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack, done) = oneshot::channel();
        if sender.send(Command::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender.as_ref().map(|s| !s.is_closed()).unwrap_or(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            queued: self.counters.queued.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(notifier: Arc<dyn Notifier>, mut receiver: mpsc::Receiver<Command>, counters: Arc<Counters>) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Deliver(notification) => match notifier.send(&notification).await {
                Ok(()) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    let err = EventDeskError::DownstreamFailure(e.to_string());
                    let context = format!("{} -> {}", notification.kind, notification.recipient);
                    log_downstream_failure("notification", &err.to_string(), Some(&context));
                }
            },
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!("Notification worker stopped");
}
