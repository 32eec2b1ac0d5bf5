//! # Pending Media Queue Repository
//!
//! Captured media (photos, signatures, documents) waiting to be
//! uploaded, with optional geo tags.
//!
//! The id is generated client-side at capture time (no server
//! round-trip yet); the blob is stored inline, which keeps capture a
//! single idempotent write.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use fleetline_core::types::{GeoPoint, MediaKind, MediaStatus, PendingMedia};

use crate::error::{DbError, DbResult};

/// Repository for the pending media queue.
#[derive(Debug, Clone)]
pub struct MediaQueueRepository {
    pool: SqlitePool,
}

impl MediaQueueRepository {
    /// Creates a new MediaQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MediaQueueRepository { pool }
    }

    /// Queues a captured media item. Upsert by client-generated id.
    pub async fn enqueue(&self, media: &PendingMedia) -> DbResult<()> {
        debug!(
            id = %media.id,
            intervention_id = media.intervention_id,
            kind = media.kind.as_str(),
            bytes = media.blob.len(),
            "Queuing media for upload"
        );

        sqlx::query(
            r#"
            INSERT INTO pending_media (
                id, intervention_id, kind, blob, geo_lat, geo_lon, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                intervention_id = excluded.intervention_id,
                kind = excluded.kind,
                blob = excluded.blob,
                geo_lat = excluded.geo_lat,
                geo_lon = excluded.geo_lon,
                status = excluded.status
            "#,
        )
        .bind(&media.id)
        .bind(media.intervention_id)
        .bind(media.kind.as_str())
        .bind(&media.blob)
        .bind(media.geo_tag.map(|g| g.lat))
        .bind(media.geo_tag.map(|g| g.lon))
        .bind(media.status.as_str())
        .bind(media.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetches one queued media item.
    pub async fn get(&self, id: &str) -> DbResult<Option<PendingMedia>> {
        let row = sqlx::query(
            "SELECT id, intervention_id, kind, blob, geo_lat, geo_lon, status, created_at
             FROM pending_media WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_row).transpose()
    }

    /// Lists queued media in one status, oldest first.
    pub async fn list_by_status(&self, status: MediaStatus) -> DbResult<Vec<PendingMedia>> {
        let rows = sqlx::query(
            "SELECT id, intervention_id, kind, blob, geo_lat, geo_lon, status, created_at
             FROM pending_media
             WHERE status = ?1
             ORDER BY created_at ASC, id ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_row).collect()
    }

    /// Lists rows eligible for the next upload pass
    /// (`pending` and `error`), oldest first.
    ///
    /// FIFO order here is what gives the flush its
    /// FIFO-per-flush upload sequence.
    pub async fn list_uploadable(&self) -> DbResult<Vec<PendingMedia>> {
        let rows = sqlx::query(
            "SELECT id, intervention_id, kind, blob, geo_lat, geo_lon, status, created_at
             FROM pending_media
             WHERE status IN ('pending', 'error')
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_row).collect()
    }

    /// Transitions one row to a new status.
    ///
    /// A missing row is `NotFound`, never a silent success.
    pub async fn update_status(&self, id: &str, status: MediaStatus) -> DbResult<()> {
        let result = sqlx::query("UPDATE pending_media SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PendingMedia", id));
        }

        Ok(())
    }

    /// Deletes a queued media item. Idempotent.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM pending_media WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Counts rows not yet confirmed uploaded.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pending_media
             WHERE status IN ('pending', 'uploading', 'error')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

/// Maps a row, surfacing unparsable status/kind columns as Corrupt.
fn map_row(row: SqliteRow) -> DbResult<PendingMedia> {
    let id: String = row.try_get("id")?;

    let corrupt = |reason: String| DbError::Corrupt {
        entity: "PendingMedia".to_string(),
        id: id.clone(),
        reason,
    };

    let kind = row
        .try_get::<String, _>("kind")?
        .parse::<MediaKind>()
        .map_err(|e| corrupt(e.to_string()))?;

    let status = row
        .try_get::<String, _>("status")?
        .parse::<MediaStatus>()
        .map_err(|e| corrupt(e.to_string()))?;

    let geo_tag = match (
        row.try_get::<Option<f64>, _>("geo_lat")?,
        row.try_get::<Option<f64>, _>("geo_lon")?,
    ) {
        (Some(lat), Some(lon)) => Some(GeoPoint { lat, lon }),
        _ => None,
    };

    Ok(PendingMedia {
        id: id.clone(),
        intervention_id: row.try_get("intervention_id")?,
        kind,
        blob: row.try_get("blob")?,
        geo_tag,
        status,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

// =============================================================================
// Tests
// =============================================================================
