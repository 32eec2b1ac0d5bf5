//! # Database Pool Management
//!
//! Connection pool creation and configuration for the Durable Store.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Durable Store Handles                              │
//! │                                                                         │
//! │  App Startup                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(path) ← Configure pool + storage quota                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SharedDatabase::initialize(config).await                              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool (WAL)             │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │ Concurrent access from router + scheduler                      │
//! │       ▼                                                                 │
//! │  db.cache() / db.interventions() / db.media() / db.audit()             │
//! │                                                                         │
//! │  Any access BEFORE initialize() → DbError::NotInitialized              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled for:
//! - Better concurrent read performance
//! - Readers don't block writers
//! - Better crash recovery

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::audit::AuditLogRepository;
use crate::repository::cache::CacheRepository;
use crate::repository::intervention::InterventionQueueRepository;
use crate::repository::media::MediaQueueRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Default storage quota reported by `estimate_usage` (256 MiB).
///
/// The platform adapter can raise this to the real quota where one is
/// available; SQLite itself enforces nothing.
const DEFAULT_STORAGE_QUOTA_BYTES: u64 = 256 * 1024 * 1024;

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/fleetline.db")
///     .max_connections(5)
///     .storage_quota_bytes(512 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5 (sufficient for one device)
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,

    /// Quota reported by `estimate_usage`.
    pub storage_quota_bytes: u64,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
            storage_quota_bytes: DEFAULT_STORAGE_QUOTA_BYTES,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the reported storage quota.
    pub fn storage_quota_bytes(mut self, quota: u64) -> Self {
        self.storage_quota_bytes = quota;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1, // In-memory requires single connection
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
            storage_quota_bytes: DEFAULT_STORAGE_QUOTA_BYTES,
        }
    }
}

// =============================================================================
// Storage Usage
// =============================================================================

/// Result of the platform's storage accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageUsage {
    /// Bytes currently used by the local database.
    pub used: u64,

    /// Configured quota in bytes.
    pub quota: u64,
}

// =============================================================================
// Database
// =============================================================================

/// Main Durable Store handle providing repository access.
///
/// One repository per collection; every write inside a repository is
/// scoped to its own collection and idempotent by primary key, which
/// is what makes retried operations safe without a global lock.
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Quota reported by `estimate_usage`.
    storage_quota_bytes: u64,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite (WAL mode, NORMAL synchronous, foreign keys)
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing durable store"
        );

        // sqlite://path creates file if not exists
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            // WAL mode: readers don't block writers
            .journal_mode(SqliteJournalMode::Wal)
            // NORMAL synchronous: safe from corruption, may lose the
            // last transaction on crash
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Durable store pool created"
        );

        let db = Database {
            pool,
            storage_quota_bytes: config.storage_quota_bytes,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running durable store migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    ///
    /// For advanced queries not covered by repositories. Prefer the
    /// repository methods when available.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the cached-resource repository.
    pub fn cache(&self) -> CacheRepository {
        CacheRepository::new(self.pool.clone())
    }

    /// Returns the pending-intervention queue repository.
    pub fn interventions(&self) -> InterventionQueueRepository {
        InterventionQueueRepository::new(self.pool.clone())
    }

    /// Returns the pending-media queue repository.
    pub fn media(&self) -> MediaQueueRepository {
        MediaQueueRepository::new(self.pool.clone())
    }

    /// Returns the sync audit log repository.
    pub fn audit(&self) -> AuditLogRepository {
        AuditLogRepository::new(self.pool.clone())
    }

    /// Returns `{used, quota}` from the platform's storage accounting.
    ///
    /// `used` is computed from SQLite page accounting
    /// (page_count × page_size); `quota` is the configured budget.
    pub async fn estimate_usage(&self) -> DbResult<StorageUsage> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;

        Ok(StorageUsage {
            used: (page_count * page_size).max(0) as u64,
            quota: self.storage_quota_bytes,
        })
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        info!("Closing durable store pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Shared Database (initialize-before-use)
// =============================================================================

/// Initialize-before-use holder for the Durable Store.
///
/// The scheduler, the router and the status aggregator all receive a
/// clone of this handle at construction; until `initialize()` has run
/// once, every access surfaces the distinct [`DbError::NotInitialized`]
/// instead of silently no-op-ing.
#[derive(Clone, Default)]
pub struct SharedDatabase {
    inner: Arc<RwLock<Option<Database>>>,
}

impl SharedDatabase {
    /// Creates an empty, uninitialized holder.
    pub fn new() -> Self {
        SharedDatabase {
            inner: Arc::new(RwLock::new(None)),
        }
    }

    /// Opens the database and installs it into the holder.
    ///
    /// Idempotent: re-initializing replaces the previous handle.
    pub async fn initialize(&self, config: DbConfig) -> DbResult<()> {
        let db = Database::new(config).await?;

        let mut guard = self
            .inner
            .write()
            .map_err(|_| DbError::Internal("shared database lock poisoned".to_string()))?;
        *guard = Some(db);

        Ok(())
    }

    /// Wraps an already-open database (used in tests).
    pub fn with_database(db: Database) -> Self {
        SharedDatabase {
            inner: Arc::new(RwLock::new(Some(db))),
        }
    }

    /// Returns the database handle, or NotInitialized.
    pub fn get(&self) -> DbResult<Database> {
        self.inner
            .read()
            .map_err(|_| DbError::Internal("shared database lock poisoned".to_string()))?
            .clone()
            .ok_or(DbError::NotInitialized)
    }

    /// True once `initialize()` has completed.
    pub fn is_initialized(&self) -> bool {
        self.inner.read().map(|g| g.is_some()).unwrap_or(false)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let config = DbConfig::in_memory();
        let db = Database::new(config).await.unwrap();

        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/test.db")
            .max_connections(10)
            .min_connections(2)
            .storage_quota_bytes(1024);

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.storage_quota_bytes, 1024);
    }

    #[tokio::test]
    async fn test_estimate_usage_reports_pages_and_quota() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let usage = db.estimate_usage().await.unwrap();

        assert!(usage.used > 0, "a migrated database occupies pages");
        assert_eq!(usage.quota, DEFAULT_STORAGE_QUOTA_BYTES);
    }

    #[tokio::test]
    async fn test_shared_database_not_initialized() {
        let shared = SharedDatabase::new();
        assert!(!shared.is_initialized());

        match shared.get() {
            Err(DbError::NotInitialized) => {}
            other => panic!("expected NotInitialized, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shared_database_initialize() {
        let shared = SharedDatabase::new();
        shared.initialize(DbConfig::in_memory()).await.unwrap();

        assert!(shared.is_initialized());
        assert!(shared.get().is_ok());
    }
}
