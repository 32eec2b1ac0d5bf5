//! # fleetline-core: Pure Domain Types for Fleetline
//!
//! This crate is the shared vocabulary of the Fleetline offline sync
//! layer. It contains the data model, the configuration singletons and
//! their validation rules as pure code with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Fleetline Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 UI Shell (external, out of scope)               │   │
//! │  │    Vehicle views ──► Intervention forms ──► Media capture       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    fleetline-sync                               │   │
//! │  │    CacheRouter • SyncScheduler • ApiClient • Status             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ fleetline-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────────────────────┐ │   │
//! │  │   │   types   │  │  policy   │  │          error             │ │   │
//! │  │   │ resources │  │ preload + │  │  CoreError                 │ │   │
//! │  │   │ queues    │  │ travel    │  │  ValidationError           │ │   │
//! │  │   └───────────┘  └───────────┘  └────────────────────────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    fleetline-db (Durable Store)                 │   │
//! │  │          SQLite repositories over the four collections          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Data model (CachedResource, pending queues, SyncResult)
//! - [`policy`] - Config singletons (PreloadPolicy, TravelModeConfig)
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod policy;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use fleetline_core::PendingMedia` instead of
// `use fleetline_core::types::PendingMedia`

pub use error::{CoreError, CoreResult, ValidationError};
pub use policy::{EntityPreload, PreloadPolicy, TravelModeConfig};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum rows kept in the sync audit log.
///
/// ## Why a cap?
/// SyncResults are ephemeral by design; the audit log exists only for
/// diagnostics and must never grow without bound on a field device.
pub const AUDIT_LOG_CAP: i64 = 200;

/// Maximum per-entity preload limit a policy may configure.
///
/// ## Business Reason
/// Caps the size of any single preload response so a misconfigured
/// policy cannot pull an unbounded dataset onto a device over a
/// metered connection.
pub const MAX_ENTITY_LIMIT: u32 = 1000;
