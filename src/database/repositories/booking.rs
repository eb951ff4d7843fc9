//! Booking repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use crate::database::repositories::{map_db_error, violated_unique_constraint};
use crate::database::store::{BookingStore, CancelOutcome};
use crate::models::booking::{Booking, NewBooking, PendingRelease};
use crate::utils::errors::{EventDeskError, Result};

const BOOKING_COLUMNS: &str = "id, reference, event_id, user_id, attendee_email, attendee_name, quantity, status, payment_reference, created_at, cancelled_at, cancelled_by";

const REFERENCE_CONSTRAINT: &str = "bookings_reference_key";
const RSVP_CONSTRAINT: &str = "bookings_confirmed_rsvp_idx";

#[derive(Debug, FromRow)]
struct BookingRow {
    id: Uuid,
    reference: String,
    event_id: Uuid,
    user_id: Option<Uuid>,
    attendee_email: Option<String>,
    attendee_name: Option<String>,
    quantity: i32,
    status: String,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<Uuid>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = EventDeskError;

    fn try_from(row: BookingRow) -> Result<Self> {
        Ok(Booking {
            id: row.id,
            reference: row.reference,
            event_id: row.event_id,
            user_id: row.user_id,
            attendee_email: row.attendee_email,
            attendee_name: row.attendee_name,
            quantity: row.quantity,
            status: row.status.parse()?,
            payment_reference: row.payment_reference,
            created_at: row.created_at,
            cancelled_at: row.cancelled_at,
            cancelled_by: row.cancelled_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct PendingReleaseRow {
    id: Uuid,
    booking_id: Uuid,
    event_id: Uuid,
    quantity: i32,
    attempts: i32,
    last_error: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PendingReleaseRow> for PendingRelease {
    fn from(row: PendingReleaseRow) -> Self {
        PendingRelease {
            id: row.id,
            booking_id: row.booking_id,
            event_id: row.event_id,
            quantity: row.quantity,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct BookingRepository {
    pool: PgPool,
}

impl BookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for BookingRepository {
    async fn insert_booking(&self, booking: &NewBooking) -> Result<Booking> {
        let result = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            INSERT INTO bookings (id, reference, event_id, user_id, attendee_email, attendee_name,
                                  quantity, status, payment_reference, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'confirmed', $8, $9)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking.id)
        .bind(&booking.reference)
        .bind(booking.event_id)
        .bind(booking.user_id)
        .bind(&booking.attendee_email)
        .bind(&booking.attendee_name)
        .bind(booking.quantity)
        .bind(&booking.payment_reference)
        .bind(booking.created_at)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.try_into(),
            Err(err) => match violated_unique_constraint(&err).as_deref() {
                Some(REFERENCE_CONSTRAINT) => Err(EventDeskError::DuplicateReference(booking.reference.clone())),
                Some(RSVP_CONSTRAINT) => Err(EventDeskError::DuplicateRegistration {
                    event_id: booking.event_id,
                    email: booking.attendee_email.clone().unwrap_or_default(),
                }),
                _ => Err(map_db_error(err)),
            },
        }
    }

    async fn get_booking(&self, booking_id: Uuid) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"))
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE reference = $1"))
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_confirmed_rsvp(&self, event_id: Uuid, email: &str) -> Result<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS} FROM bookings
            WHERE event_id = $1 AND attendee_email = $2 AND user_id IS NULL AND status = 'confirmed'
            "#
        ))
        .bind(event_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_for_event(&self, event_id: Uuid) -> Result<Vec<Booking>> {
        // One statement, so the result is a consistent snapshot
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE event_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn mark_cancelled(&self, booking_id: Uuid, actor_id: Option<Uuid>, at: DateTime<Utc>) -> Result<CancelOutcome> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            r#"
            UPDATE bookings
            SET status = 'cancelled', cancelled_at = $3, cancelled_by = $2
            WHERE id = $1 AND status = 'confirmed'
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking_id)
        .bind(actor_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        if let Some(row) = row {
            return Ok(CancelOutcome::Cancelled(row.try_into()?));
        }

        match self.get_booking(booking_id).await? {
            Some(existing) => Ok(CancelOutcome::AlreadyCancelled(existing)),
            None => Ok(CancelOutcome::NotFound),
        }
    }

    async fn record_pending_release(&self, release: &PendingRelease) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pending_releases (id, booking_id, event_id, quantity, attempts, last_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (booking_id) DO NOTHING
            "#
        )
        .bind(release.id)
        .bind(release.booking_id)
        .bind(release.event_id)
        .bind(release.quantity)
        .bind(release.attempts)
        .bind(&release.last_error)
        .bind(release.created_at)
        .bind(release.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn list_pending_releases(&self, limit: i64) -> Result<Vec<PendingRelease>> {
        let rows = sqlx::query_as::<_, PendingReleaseRow>(
            r#"
            SELECT id, booking_id, event_id, quantity, attempts, last_error, created_at, updated_at
            FROM pending_releases
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(rows.into_iter().map(PendingRelease::from).collect())
    }

    async fn claim_pending_release(&self, id: Uuid) -> Result<Option<PendingRelease>> {
        let row = sqlx::query_as::<_, PendingReleaseRow>(
            r#"
            DELETE FROM pending_releases
            WHERE id = $1
            RETURNING id, booking_id, event_id, quantity, attempts, last_error, created_at, updated_at
            "#
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(PendingRelease::from))
    }
}
