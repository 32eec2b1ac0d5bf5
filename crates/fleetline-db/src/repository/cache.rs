//! # Cached Resource Repository
//!
//! The read cache of the Durable Store: one row per key, TTL-based
//! expiry, last-write-wins.
//!
//! ## Expiry Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Read Path                                            │
//! │                                                                         │
//! │  get(key)                                                               │
//! │    │                                                                    │
//! │    ├── no row                → None   ("never cached")                  │
//! │    ├── now >= expires_at     → None   ("expired" — indistinguishable)   │
//! │    ├── payload won't parse   → None   (logged, treated as a miss)       │
//! │    └── otherwise             → Some(payload)                            │
//! │                                                                         │
//! │  Callers cannot tell "never cached" from "expired": both require        │
//! │  a network refresh.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The config singletons (preload policy, travel mode) live here too,
//! under reserved keys with a multi-year TTL, so configuration shares
//! the cache's expiry/versioning machinery.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use fleetline_core::types::{expires_at, CachedResource};

use crate::error::{DbError, DbResult};

/// Repository for cached resources.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    /// Creates a new CacheRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CacheRepository { pool }
    }

    /// Writes a resource with the given TTL (milliseconds).
    ///
    /// Upsert by key: a refresh overwrites the previous row
    /// (last-write-wins).
    pub async fn set(&self, key: &str, payload: &serde_json::Value, ttl_ms: i64) -> DbResult<()> {
        let now = Utc::now();
        let text = payload.to_string();

        debug!(key = %key, ttl_ms, "Caching resource");

        sqlx::query(
            r#"
            INSERT INTO cached_resources (key, payload, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                created_at = excluded.created_at,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(&text)
        .bind(now)
        .bind(expires_at(now, ttl_ms))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads a resource's payload.
    ///
    /// Returns `None` for missing rows, expired rows and rows whose
    /// stored payload no longer parses (logged, never a crash).
    pub async fn get(&self, key: &str) -> DbResult<Option<serde_json::Value>> {
        let Some(resource) = self.get_entry(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&resource.payload) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Malformed cached payload, treating as miss");
                Ok(None)
            }
        }
    }

    /// Reads a resource row, applying expiry but not parsing the payload.
    pub async fn get_entry(&self, key: &str) -> DbResult<Option<CachedResource>> {
        let row = sqlx::query(
            "SELECT key, payload, created_at, expires_at FROM cached_resources WHERE key = ?1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let resource = CachedResource {
            key: row.try_get("key")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
        };

        if resource.is_expired(Utc::now()) {
            return Ok(None);
        }

        Ok(Some(resource))
    }

    /// Deletes a resource. Deleting a missing key is a no-op.
    pub async fn delete(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM cached_resources WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Removes every resource whose TTL has passed.
    ///
    /// ## Returns
    /// Number of deleted rows.
    pub async fn sweep_expired(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cached_resources WHERE expires_at <= ?1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        let swept = result.rows_affected();
        if swept > 0 {
            debug!(swept, "Swept expired cached resources");
        }

        Ok(swept)
    }

    /// Destructive clear of the whole cache collection.
    ///
    /// The escape hatch for persistent quota exhaustion. Pending
    /// interventions/media are user-authored writes and are NOT
    /// touched by this.
    pub async fn clear(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cached_resources")
            .execute(&self.pool)
            .await?;

        warn!(cleared = result.rows_affected(), "Cache collection cleared");
        Ok(result.rows_affected())
    }

    /// Number of live (unexpired) rows.
    pub async fn count_live(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cached_resources WHERE expires_at > ?1")
                .bind(Utc::now())
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    // =========================================================================
    // Config Singletons
    // =========================================================================

    /// Reads a typed config singleton stored under a reserved key.
    ///
    /// A malformed stored config is a miss, like any cached payload;
    /// callers fall back to the type's default.
    pub async fn get_config<T: DeserializeOwned>(&self, key: &str) -> DbResult<Option<T>> {
        let Some(resource) = self.get_entry(key).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&resource.payload) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                warn!(key = %key, error = %e, "Malformed config singleton, falling back to default");
                Ok(None)
            }
        }
    }

    /// Writes a typed config singleton under a reserved key.
    pub async fn set_config<T: Serialize>(&self, key: &str, config: &T, ttl_ms: i64) -> DbResult<()> {
        let value = serde_json::to_value(config)
            .map_err(|e| DbError::Internal(format!("config serialization failed: {e}")))?;
        self.set(key, &value, ttl_ms).await
    }
}

// =============================================================================
// Tests
// =============================================================================
