//! Event repository implementation
//!
//! Counter and lifecycle changes are single conditional `UPDATE` statements;
//! the row lock Postgres takes for the update serializes concurrent writers
//! on the same event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use crate::database::repositories::map_db_error;
use crate::database::store::{GuardedRow, InventoryStore, ReleaseOutcome, ReserveOutcome, ResizeOutcome, TransitionOutcome};
use crate::models::event::{Event, LifecycleState, UpdateEventRequest};
use crate::utils::errors::{EventDeskError, Result};

const EVENT_COLUMNS: &str = "id, organizer_id, name, description, location, starts_at, ends_at, total_tickets, sold_tickets, available_tickets, status, version, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(crate) struct EventRow {
    id: Uuid,
    organizer_id: Uuid,
    name: String,
    description: Option<String>,
    location: Option<String>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    total_tickets: i32,
    sold_tickets: i32,
    available_tickets: i32,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = EventDeskError;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(Event {
            id: row.id,
            organizer_id: row.organizer_id,
            name: row.name,
            description: row.description,
            location: row.location,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            total_tickets: row.total_tickets,
            sold_tickets: row.sold_tickets,
            available_tickets: row.available_tickets,
            status: row.status.parse()?,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ReleasedRow {
    #[sqlx(flatten)]
    event: EventRow,
    applied: i32,
}

#[derive(Debug, FromRow)]
struct GuardColumns {
    status: String,
    available_tickets: i32,
    sold_tickets: i32,
}

#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Re-read the guarded columns after an update matched no row
    async fn reread(&self, event_id: Uuid) -> Result<Option<GuardedRow>> {
        let row = sqlx::query_as::<_, GuardColumns>(
            "SELECT status, available_tickets, sold_tickets FROM events WHERE id = $1"
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(|row| -> Result<GuardedRow> {
            Ok(GuardedRow {
                status: row.status.parse()?,
                sold: row.sold_tickets,
                available: row.available_tickets,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl InventoryStore for EventRepository {
    async fn insert_event(&self, event: &Event) -> Result<Event> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            INSERT INTO events (id, organizer_id, name, description, location, starts_at, ends_at,
                                total_tickets, sold_tickets, available_tickets, status, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event.id)
        .bind(event.organizer_id)
        .bind(&event.name)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.starts_at)
        .bind(event.ends_at)
        .bind(event.total_tickets)
        .bind(event.sold_tickets)
        .bind(event.available_tickets)
        .bind(event.status.as_str())
        .bind(event.version)
        .bind(event.created_at)
        .bind(event.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.try_into()
    }

    async fn get_event(&self, event_id: Uuid) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.map(Event::try_from).transpose()
    }

    async fn list_events_by_status(&self, status: LifecycleState) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE status = $1 ORDER BY ends_at ASC, id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn update_details(&self, event_id: Uuid, request: &UpdateEventRequest) -> Result<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            UPDATE events
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                location = COALESCE($4, location),
                starts_at = COALESCE($5, starts_at),
                ends_at = COALESCE($6, ends_at),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event_id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(&request.location)
        .bind(request.starts_at)
        .bind(request.ends_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(Event::try_from).transpose()
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn try_reserve(&self, event_id: Uuid, quantity: i32) -> Result<ReserveOutcome> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            UPDATE events
            SET sold_tickets = sold_tickets + $2,
                available_tickets = available_tickets - $2,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND status = 'active' AND available_tickets >= $2
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        if let Some(row) = row {
            return Ok(ReserveOutcome::Reserved(row.try_into()?));
        }

        // The guard rejected the update; report why
        ReserveOutcome::from_reread(event_id, quantity, self.reread(event_id).await?)
    }

    async fn try_release(&self, event_id: Uuid, quantity: i32) -> Result<ReleaseOutcome> {
        let row = sqlx::query_as::<_, ReleasedRow>(
            r#"
            WITH target AS (
                SELECT id, LEAST(sold_tickets, $2) AS applied
                FROM events
                WHERE id = $1
                FOR UPDATE
            )
            UPDATE events e
            SET sold_tickets = e.sold_tickets - target.applied,
                available_tickets = e.available_tickets + target.applied,
                version = e.version + 1,
                updated_at = NOW()
            FROM target
            WHERE e.id = target.id
            RETURNING e.id, e.organizer_id, e.name, e.description, e.location, e.starts_at, e.ends_at,
                      e.total_tickets, e.sold_tickets, e.available_tickets, e.status, e.version,
                      e.created_at, e.updated_at, target.applied
            "#
        )
        .bind(event_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        match row {
            Some(row) => Ok(ReleaseOutcome::Released { event: row.event.try_into()?, released: row.applied }),
            None => Ok(ReleaseOutcome::NotFound),
        }
    }

    async fn transition_status(&self, event_id: Uuid, from: LifecycleState, to: LifecycleState) -> Result<TransitionOutcome> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            UPDATE events
            SET status = $3,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        if let Some(row) = row {
            return Ok(TransitionOutcome::Transitioned(row.try_into()?));
        }

        TransitionOutcome::from_reread(event_id, from, self.reread(event_id).await?)
    }

    async fn resize_capacity(&self, event_id: Uuid, new_total: i32) -> Result<ResizeOutcome> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            UPDATE events
            SET total_tickets = $2,
                available_tickets = $2,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND sold_tickets = 0
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(event_id)
        .bind(new_total)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        if let Some(row) = row {
            return Ok(ResizeOutcome::Resized(row.try_into()?));
        }

        ResizeOutcome::from_reread(event_id, self.reread(event_id).await?)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }
}
