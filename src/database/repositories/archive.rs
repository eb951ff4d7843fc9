//! Archive record repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use crate::database::repositories::map_db_error;
use crate::database::store::{ArchiveStore, RecordInsert};
use crate::models::archive::ArchiveRecord;
use crate::models::event::Event;
use crate::utils::errors::{EventDeskError, Result};

const ARCHIVE_COLUMNS: &str = "id, event_id, snapshot, reason, actor_id, archived_at, restored_at, restored_by";

#[derive(Debug, FromRow)]
struct ArchiveRow {
    id: Uuid,
    event_id: Uuid,
    snapshot: Json<Event>,
    reason: String,
    actor_id: Option<Uuid>,
    archived_at: DateTime<Utc>,
    restored_at: Option<DateTime<Utc>>,
    restored_by: Option<Uuid>,
}

impl TryFrom<ArchiveRow> for ArchiveRecord {
    type Error = EventDeskError;

    fn try_from(row: ArchiveRow) -> Result<Self> {
        Ok(ArchiveRecord {
            id: row.id,
            event_id: row.event_id,
            snapshot: row.snapshot.0,
            reason: row.reason.parse()?,
            actor_id: row.actor_id,
            archived_at: row.archived_at,
            restored_at: row.restored_at,
            restored_by: row.restored_by,
        })
    }
}

#[derive(Clone)]
pub struct ArchiveRepository {
    pool: PgPool,
}

impl ArchiveRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArchiveStore for ArchiveRepository {
    async fn insert_record(&self, record: &ArchiveRecord) -> Result<RecordInsert> {
        // The partial unique index allows a single open record per event
        let inserted = sqlx::query_as::<_, ArchiveRow>(&format!(
            r#"
            INSERT INTO archive_records (id, event_id, snapshot, reason, actor_id, archived_at, restored_at, restored_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (event_id) WHERE restored_at IS NULL AND reason <> 'restored' DO NOTHING
            RETURNING {ARCHIVE_COLUMNS}
            "#
        ))
        .bind(record.id)
        .bind(record.event_id)
        .bind(Json(&record.snapshot))
        .bind(record.reason.as_str())
        .bind(record.actor_id)
        .bind(record.archived_at)
        .bind(record.restored_at)
        .bind(record.restored_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        if let Some(row) = inserted {
            return Ok(RecordInsert::Inserted(row.try_into()?));
        }

        match self.find_open_record(record.event_id).await? {
            Some(existing) => Ok(RecordInsert::Existing(existing)),
            None => Err(EventDeskError::StorageConflict(format!(
                "open archive record for event {} changed during insert",
                record.event_id
            ))),
        }
    }

    async fn get_record(&self, archive_id: Uuid) -> Result<Option<ArchiveRecord>> {
        let row = sqlx::query_as::<_, ArchiveRow>(&format!("SELECT {ARCHIVE_COLUMNS} FROM archive_records WHERE id = $1"))
            .bind(archive_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        row.map(ArchiveRecord::try_from).transpose()
    }

    async fn find_open_record(&self, event_id: Uuid) -> Result<Option<ArchiveRecord>> {
        let row = sqlx::query_as::<_, ArchiveRow>(&format!(
            r#"
            SELECT {ARCHIVE_COLUMNS} FROM archive_records
            WHERE event_id = $1 AND restored_at IS NULL AND reason <> 'restored'
            "#
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(ArchiveRecord::try_from).transpose()
    }

    async fn list_records_for_event(&self, event_id: Uuid) -> Result<Vec<ArchiveRecord>> {
        let rows = sqlx::query_as::<_, ArchiveRow>(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archive_records WHERE event_id = $1 ORDER BY archived_at ASC, id ASC"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.into_iter().map(ArchiveRecord::try_from).collect()
    }

    async fn mark_restored(&self, archive_id: Uuid, actor_id: Option<Uuid>, at: DateTime<Utc>) -> Result<Option<ArchiveRecord>> {
        let row = sqlx::query_as::<_, ArchiveRow>(&format!(
            r#"
            UPDATE archive_records
            SET restored_at = $3, restored_by = $2
            WHERE id = $1 AND restored_at IS NULL
            RETURNING {ARCHIVE_COLUMNS}
            "#
        ))
        .bind(archive_id)
        .bind(actor_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        row.map(ArchiveRecord::try_from).transpose()
    }
}
