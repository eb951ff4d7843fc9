//! Booking registry
//!
//! Turns an attendee's booking or RSVP into a ledger reservation plus a
//! durable booking row, and a cancellation back into a release. The ledger
//! decides capacity; this module decides identity, uniqueness and the
//! compensations needed when the second write of a pair fails.

use std::sync::Arc;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;
use crate::config::BookingConfig;
use crate::database::store::{BookingStore, CancelOutcome};
use crate::models::{AttendeeInfo, Booking, BookingStatus, NewBooking, PendingRelease};
use crate::services::ledger::{InventoryLedger, Reservation};
use crate::services::notification::{Notification, NotificationDispatcher, Recipient, TemplateKind};
use crate::services::reference::ReferenceGenerator;
use crate::utils::errors::{EventDeskError, Result};
use crate::utils::helpers::{is_valid_email, normalize_email};
use crate::utils::logging::{log_booking_action, log_ledger_anomaly};

/// Result of a cancellation. `inventory_released` is false when the release
/// failed and was queued for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub booking: Booking,
    pub inventory_released: bool,
}

/// Outcome of one reconciliation pass over the pending-release queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub resolved: usize,
    pub still_pending: usize,
}

#[derive(Clone)]
pub struct BookingRegistry {
    ledger: InventoryLedger,
    bookings: Arc<dyn BookingStore>,
    references: Arc<dyn ReferenceGenerator>,
    dispatcher: NotificationDispatcher,
    config: BookingConfig,
}

impl BookingRegistry {
    pub fn new(
        ledger: InventoryLedger,
        bookings: Arc<dyn BookingStore>,
        references: Arc<dyn ReferenceGenerator>,
        dispatcher: NotificationDispatcher,
        config: BookingConfig,
    ) -> Self {
        Self { ledger, bookings, references, dispatcher, config }
    }

    /// Reserve `quantity` and record the booking.
    ///
    /// Payment, when there is one, has already been authorized by the
    /// checkout gateway; `payment_reference` is stored as-is.
    pub async fn create_booking(
        &self,
        event_id: Uuid,
        attendee: AttendeeInfo,
        quantity: i32,
        payment_reference: Option<String>,
    ) -> Result<Booking> {
        self.validate_quantity(quantity)?;
        let email = Self::attendee_email(&attendee)?;

        if attendee.is_anonymous() {
            if let Some(email) = &email {
                if self.bookings.find_confirmed_rsvp(event_id, email).await?.is_some() {
                    info!(event_id = %event_id, email = %email, "Duplicate RSVP rejected");
                    return Err(EventDeskError::DuplicateRegistration { event_id, email: email.clone() });
                }
            }
        }

        let reservation = self.ledger.reserve(event_id, quantity).await?;

        let (user_id, attendee_name) = match &attendee {
            AttendeeInfo::Account { user_id, .. } => (Some(*user_id), None),
            AttendeeInfo::Guest { name, .. } => (None, name.clone()),
        };
        let mut new_booking = NewBooking {
            id: Uuid::new_v4(),
            reference: String::new(),
            event_id,
            user_id,
            attendee_email: email,
            attendee_name,
            quantity,
            payment_reference,
            created_at: Utc::now(),
        };

        let booking = match self.persist(&mut new_booking).await {
            Ok(booking) => booking,
            Err(e) => {
                self.compensate(&reservation, new_booking.id, &e).await;
                return Err(e);
            }
        };

        log_booking_action(booking.id, event_id, "created", quantity, &booking.reference);

        if let Some(recipient) = Recipient::for_booking(&booking) {
            self.dispatcher.notify(
                Notification::new(recipient, TemplateKind::BookingConfirmed)
                    .with_event(&reservation.event)
                    .with_booking(&booking),
            );
        }

        Ok(booking)
    }

    /// Cancel a confirmed booking and give its units back to the event.
    ///
    /// A failed release does not fail the cancellation; it is queued and
    /// picked up by [`Self::retry_pending_releases`].
    pub async fn cancel_booking(&self, booking_id: Uuid, actor_id: Option<Uuid>) -> Result<Cancellation> {
        let booking = match self.bookings.mark_cancelled(booking_id, actor_id, Utc::now()).await? {
            CancelOutcome::Cancelled(booking) => booking,
            CancelOutcome::NotFound => {
                return Err(EventDeskError::BookingNotFound { booking_id: booking_id.to_string() });
            }
            CancelOutcome::AlreadyCancelled(_) => {
                return Err(EventDeskError::InvalidTransition {
                    from: BookingStatus::Cancelled.to_string(),
                    to: BookingStatus::Cancelled.to_string(),
                });
            }
        };

        log_booking_action(booking.id, booking.event_id, "cancelled", booking.quantity, &booking.reference);

        let (inventory_released, event) = match self.ledger.release(booking.event_id, booking.quantity).await {
            Ok(release) => (true, Some(release.event)),
            Err(e) => {
                self.queue_release(booking.id, booking.event_id, booking.quantity, &e).await;
                (false, None)
            }
        };

        if let Some(recipient) = Recipient::for_booking(&booking) {
            let notification = Notification::new(recipient, TemplateKind::BookingCancelled).with_booking(&booking);
            let notification = match &event {
                Some(event) => notification.with_event(event),
                None => notification.with("event_name", "your event"),
            };
            self.dispatcher.notify(notification);
        }

        Ok(Cancellation { booking, inventory_released })
    }

    /// Re-apply releases that failed during cancellation.
    ///
    /// Each entry is claimed off the queue before its release is applied, so
    /// concurrent passes never apply the same release twice. A release that
    /// fails again goes back on the queue with its attempt count bumped.
    pub async fn retry_pending_releases(&self) -> Result<ReconcileReport> {
        let pending = self.bookings.list_pending_releases(self.config.pending_release_batch).await?;
        let mut report = ReconcileReport::default();

        for listed in pending {
            let Some(entry) = self.bookings.claim_pending_release(listed.id).await? else {
                continue;
            };

            match self.ledger.release(entry.event_id, entry.quantity).await {
                Ok(_) => report.resolved += 1,
                Err(EventDeskError::EventNotFound { .. }) => {
                    log_ledger_anomaly(entry.event_id, "pending release for a deleted event dropped", entry.quantity, 0);
                    report.resolved += 1;
                }
                Err(e) => {
                    warn!(
                        booking_id = %entry.booking_id,
                        event_id = %entry.event_id,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Pending release still failing"
                    );
                    self.requeue_release(entry, &e).await?;
                    report.still_pending += 1;
                }
            }
        }

        if report.resolved > 0 || report.still_pending > 0 {
            info!(resolved = report.resolved, still_pending = report.still_pending, "Pending releases reconciled");
        }
        Ok(report)
    }

    /// Confirmed bookings for an event, oldest first
    pub async fn get_attendees_for_event(&self, event_id: Uuid) -> Result<Vec<Booking>> {
        let bookings = self.bookings.list_for_event(event_id).await?;
        Ok(bookings.into_iter().filter(|b| b.is_confirmed()).collect())
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| EventDeskError::BookingNotFound { booking_id: booking_id.to_string() })
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Booking> {
        let reference = reference.trim().to_uppercase();
        self.bookings
            .find_by_reference(&reference)
            .await?
            .ok_or(EventDeskError::BookingNotFound { booking_id: reference })
    }

    fn validate_quantity(&self, quantity: i32) -> Result<()> {
        if quantity < 1 || quantity > self.config.max_quantity_per_booking {
            return Err(EventDeskError::InvalidInput(format!(
                "Quantity must be between 1 and {}, got {}",
                self.config.max_quantity_per_booking, quantity
            )));
        }
        Ok(())
    }

    fn attendee_email(attendee: &AttendeeInfo) -> Result<Option<String>> {
        match attendee.email() {
            Some(email) if is_valid_email(email) => Ok(Some(normalize_email(email))),
            Some(email) => Err(EventDeskError::InvalidInput(format!("Invalid email address: {}", email))),
            None => Ok(None),
        }
    }

    /// Insert the booking row, drawing a fresh reference on every collision
    async fn persist(&self, booking: &mut NewBooking) -> Result<Booking> {
        let limit = self.config.reference_retry_limit;

        for attempt in 1..=limit {
            booking.reference = self.references.next_reference().await?;
            match self.bookings.insert_booking(booking).await {
                Ok(saved) => return Ok(saved),
                Err(EventDeskError::DuplicateReference(reference)) => {
                    warn!(reference = %reference, attempt = attempt, "Booking reference collision, drawing another");
                }
                Err(e) => return Err(e),
            }
        }

        Err(EventDeskError::RetriesExhausted {
            operation: "assign booking reference".to_string(),
            attempts: limit,
        })
    }

    /// Undo a reservation whose booking row could not be written
    async fn compensate(&self, reservation: &Reservation, booking_id: Uuid, cause: &EventDeskError) {
        warn!(
            event_id = %reservation.event_id,
            quantity = reservation.quantity,
            cause = %cause,
            "Booking not recorded, releasing reservation"
        );
        if let Err(e) = self.ledger.release(reservation.event_id, reservation.quantity).await {
            self.queue_release(booking_id, reservation.event_id, reservation.quantity, &e).await;
        }
    }

    /// Put a claimed entry back after another failed attempt
    async fn requeue_release(&self, entry: PendingRelease, cause: &EventDeskError) -> Result<()> {
        let retry = PendingRelease {
            attempts: entry.attempts + 1,
            last_error: cause.to_string(),
            updated_at: Utc::now(),
            ..entry
        };

        if let Err(e) = self.bookings.record_pending_release(&retry).await {
            error!(
                booking_id = %retry.booking_id,
                event_id = %retry.event_id,
                quantity = retry.quantity,
                error = %cause,
                queue_error = %e,
                "Claimed release could not be requeued; inventory needs manual reconciliation"
            );
            return Err(e);
        }
        Ok(())
    }

    async fn queue_release(&self, booking_id: Uuid, event_id: Uuid, quantity: i32, cause: &EventDeskError) {
        let now = Utc::now();
        let entry = PendingRelease {
            id: Uuid::new_v4(),
            booking_id,
            event_id,
            quantity,
            attempts: 0,
            last_error: cause.to_string(),
            created_at: now,
            updated_at: now,
        };

        match self.bookings.record_pending_release(&entry).await {
            Ok(()) => warn!(
                booking_id = %booking_id,
                event_id = %event_id,
                quantity = quantity,
                error = %cause,
                "Release failed, queued for reconciliation"
            ),
            Err(e) => error!(
                booking_id = %booking_id,
                event_id = %event_id,
                quantity = quantity,
                error = %cause,
                queue_error = %e,
                "Release failed and could not be queued; inventory needs manual reconciliation"
            ),
        }
    }
}
