//! # Repository Module
//!
//! Repository implementations over the four Durable Store collections.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Scheduler / Cache Router                                              │
//! │       │                                                                 │
//! │       │  db.cache().set("vehicles", payload, ttl)                       │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  CacheRepository                                                       │
//! │  ├── get(&self, key)                                                    │
//! │  ├── set(&self, key, payload, ttl_ms)                                  │
//! │  ├── sweep_expired(&self)                                              │
//! │  └── clear(&self)                                                       │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Every write is scoped to a single collection and idempotent by        │
//! │  primary key, so no cross-collection transactions are needed.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`cache::CacheRepository`] - Read cache + config singletons
//! - [`intervention::InterventionQueueRepository`] - Queued intervention writes
//! - [`media::MediaQueueRepository`] - Queued media uploads
//! - [`audit::AuditLogRepository`] - Bounded sync audit log

pub mod audit;
pub mod cache;
pub mod intervention;
pub mod media;
