//! # fleetline-db: The Durable Store
//!
//! This crate provides the local persistence layer of the Fleetline
//! sync stack: a transactional, per-device store over four logical
//! collections, backed by SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Fleetline Data Flow                               │
//! │                                                                         │
//! │  CacheRouter (API reads)        SyncScheduler (preload/flush)          │
//! │       │                               │                                 │
//! │       ▼                               ▼                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   fleetline-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │ SharedDatabase│    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ cache          │    │              │  │   │
//! │  │   │ init-before-  │◄───│ interventions  │    │ 001_init.sql │  │   │
//! │  │   │ use + WAL pool│    │ media, audit   │    │              │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (one versioned local file, four collections)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, `Database`, `SharedDatabase`, storage accounting
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types (including `NotInitialized`)
//! - [`repository`] - One repository per collection
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fleetline_db::{DbConfig, SharedDatabase};
//!
//! // One-time initialization at startup
//! let store = SharedDatabase::new();
//! store.initialize(DbConfig::new("path/to/fleetline.db")).await?;
//!
//! // Read-through cache access
//! let db = store.get()?;
//! let vehicles = db.cache().get("vehicles").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, SharedDatabase, StorageUsage};

// Repository re-exports for convenience
pub use repository::audit::AuditLogRepository;
pub use repository::cache::CacheRepository;
pub use repository::intervention::InterventionQueueRepository;
pub use repository::media::MediaQueueRepository;
