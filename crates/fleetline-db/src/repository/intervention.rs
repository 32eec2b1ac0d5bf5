//! # Pending Intervention Queue Repository
//!
//! Queued intervention writes waiting for the next flush.
//!
//! ## The Offline Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                Pending Intervention Lifecycle                           │
//! │                                                                         │
//! │  UI WRITE (offline or speculative)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  upsert(id, snapshot)   ← at most one row per id; a re-edit            │
//! │       │                   replaces the snapshot and resets the         │
//! │       │                   row to 'offline'                             │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              FLUSH (fleetline-sync scheduler)                   │   │
//! │  │                                                                 │   │
//! │  │  1. list_by_status('offline')                                  │   │
//! │  │  2. transition_all('offline' → 'syncing')                      │   │
//! │  │  3. One batched POST /sync/interventions                       │   │
//! │  │  4. Success: mark 'synced', then delete                        │   │
//! │  │     Failure: mark 'error' (manual retry re-enters 'offline')   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use fleetline_core::types::{InterventionStatus, PendingIntervention};

use crate::error::{DbError, DbResult};

/// Repository for the pending intervention queue.
#[derive(Debug, Clone)]
pub struct InterventionQueueRepository {
    pool: SqlitePool,
}

impl InterventionQueueRepository {
    /// Creates a new InterventionQueueRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InterventionQueueRepository { pool }
    }

    /// Queues (or re-queues) an intervention snapshot.
    ///
    /// Upsert by id: writing the same id twice leaves exactly one row
    /// holding the latest snapshot. A re-edit of a row in any status
    /// resets it to `offline` so the next flush picks it up.
    pub async fn upsert(&self, id: i64, snapshot: &serde_json::Value) -> DbResult<PendingIntervention> {
        let now = Utc::now();
        let text = snapshot.to_string();

        debug!(id, "Queuing intervention for sync");

        sqlx::query(
            r#"
            INSERT INTO pending_interventions (id, snapshot, status, created_at, last_modified)
            VALUES (?1, ?2, 'offline', ?3, ?3)
            ON CONFLICT(id) DO UPDATE SET
                snapshot = excluded.snapshot,
                status = 'offline',
                last_modified = excluded.last_modified
            "#,
        )
        .bind(id)
        .bind(&text)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("PendingIntervention", id))
    }

    /// Fetches one queued intervention.
    pub async fn get(&self, id: i64) -> DbResult<Option<PendingIntervention>> {
        let row = sqlx::query(
            "SELECT id, snapshot, status, created_at, last_modified
             FROM pending_interventions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(map_row).transpose()
    }

    /// Lists queued interventions in one status, oldest first.
    pub async fn list_by_status(
        &self,
        status: InterventionStatus,
    ) -> DbResult<Vec<PendingIntervention>> {
        let rows = sqlx::query(
            "SELECT id, snapshot, status, created_at, last_modified
             FROM pending_interventions
             WHERE status = ?1
             ORDER BY created_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(map_row).collect()
    }

    /// Transitions one row to a new status.
    ///
    /// A missing row is `NotFound`, never a silent success.
    pub async fn update_status(&self, id: i64, status: InterventionStatus) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE pending_interventions SET status = ?2, last_modified = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PendingIntervention", id));
        }

        Ok(())
    }

    /// Transitions every row in `from` to `to`.
    ///
    /// ## Returns
    /// Number of rows moved (zero is fine — an empty queue).
    pub async fn transition_all(
        &self,
        from: InterventionStatus,
        to: InterventionStatus,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE pending_interventions SET status = ?2, last_modified = ?3 WHERE status = ?1",
        )
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Deletes a queued intervention. Idempotent.
    pub async fn delete(&self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM pending_interventions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Counts rows not yet confirmed by the server.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pending_interventions
             WHERE status IN ('offline', 'syncing', 'error')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

/// Maps a row, surfacing unparsable status columns as Corrupt.
fn map_row(row: SqliteRow) -> DbResult<PendingIntervention> {
    let id: i64 = row.try_get("id")?;
    let status_text: String = row.try_get("status")?;

    let status = status_text
        .parse::<InterventionStatus>()
        .map_err(|e| DbError::Corrupt {
            entity: "PendingIntervention".to_string(),
            id: id.to_string(),
            reason: e.to_string(),
        })?;

    Ok(PendingIntervention {
        id,
        snapshot: row.try_get("snapshot")?,
        status,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        last_modified: row.try_get::<DateTime<Utc>, _>("last_modified")?,
    })
}

// =============================================================================
// Tests
// =============================================================================
