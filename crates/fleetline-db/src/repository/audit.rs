//! # Sync Audit Log Repository
//!
//! Bounded mirror of SyncResults for diagnostics. The in-memory result
//! list returned by the scheduler stays the source of truth for
//! callers; this log only answers "what happened recently" and is
//! pruned to [`fleetline_core::AUDIT_LOG_CAP`] rows on every append.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use fleetline_core::types::{SyncAuditEntry, SyncResult};
use fleetline_core::AUDIT_LOG_CAP;

use crate::error::DbResult;

/// Repository for the bounded sync audit log.
#[derive(Debug, Clone)]
pub struct AuditLogRepository {
    pool: SqlitePool,
}

impl AuditLogRepository {
    /// Creates a new AuditLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        AuditLogRepository { pool }
    }

    /// Appends one result and prunes the log to its cap.
    pub async fn append(&self, result: &SyncResult) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO sync_audit (entity, success, count, error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&result.entity)
        .bind(result.success)
        .bind(result.count)
        .bind(&result.error)
        .bind(result.timestamp)
        .execute(&self.pool)
        .await?;

        self.prune().await
    }

    /// Appends a batch of results (one preload/flush outcome set).
    pub async fn record(&self, results: &[SyncResult]) -> DbResult<()> {
        for result in results {
            sqlx::query(
                "INSERT INTO sync_audit (entity, success, count, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&result.entity)
            .bind(result.success)
            .bind(result.count)
            .bind(&result.error)
            .bind(result.timestamp)
            .execute(&self.pool)
            .await?;
        }

        self.prune().await
    }

    /// Returns the most recent entries, newest first.
    pub async fn recent(&self, limit: i64) -> DbResult<Vec<SyncAuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, entity, success, count, error, created_at
             FROM sync_audit ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(SyncAuditEntry {
                    id: row.try_get("id")?,
                    entity: row.try_get("entity")?,
                    success: row.try_get("success")?,
                    count: row.try_get("count")?,
                    error: row.try_get("error")?,
                    created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                })
            })
            .collect()
    }

    /// Drops everything beyond the newest AUDIT_LOG_CAP rows.
    async fn prune(&self) -> DbResult<()> {
        sqlx::query(
            "DELETE FROM sync_audit WHERE id NOT IN
             (SELECT id FROM sync_audit ORDER BY id DESC LIMIT ?1)",
        )
        .bind(AUDIT_LOG_CAP)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
