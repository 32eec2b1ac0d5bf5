//! # Domain Types
//!
//! Data model for the Fleetline offline sync layer.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌───────────────────┐  ┌─────────────────────┐  ┌──────────────────┐  │
//! │  │  CachedResource   │  │ PendingIntervention │  │  PendingMedia    │  │
//! │  │  ───────────────  │  │  ─────────────────  │  │  ──────────────  │  │
//! │  │  key (string)     │  │  id (server int)    │  │  id (client str) │  │
//! │  │  payload (JSON)   │  │  snapshot (JSON)    │  │  blob (binary)   │  │
//! │  │  expires_at (TTL) │  │  status machine     │  │  status machine  │  │
//! │  └───────────────────┘  └─────────────────────┘  └──────────────────┘  │
//! │                                                                         │
//! │  ┌───────────────────┐  ┌─────────────────────┐  ┌──────────────────┐  │
//! │  │    EntityKind     │  │     SyncResult      │  │  SyncAuditEntry  │  │
//! │  │  ───────────────  │  │  ─────────────────  │  │  ──────────────  │  │
//! │  │  Vehicles         │  │  entity, success,   │  │  bounded mirror  │  │
//! │  │  Contacts, ...    │  │  count, error       │  │  of SyncResults  │  │
//! │  └───────────────────┘  └─────────────────────┘  └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status State Machines
//! ```text
//! PendingIntervention:  offline ──► syncing ──► synced (row deleted)
//! (manual retry only)      ▲            └─────► error
//! (`error` is terminal     └──────────────────────┘
//!  for the automatic path)
//!
//! PendingMedia:         pending ──► uploading ──► uploaded (row deleted)
//! (auto-retried on next     ▲            └──────► error
//!  flush or cycle)          └───────────────────────┘
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreError;

// =============================================================================
// Time-To-Live Table
// =============================================================================

/// Entity-specific TTLs, in milliseconds.
///
/// Volatile list caches expire after hours; travel-mode detail caches
/// are sized for a multi-day offline trip; config singletons use a
/// multi-year TTL acting as "effectively permanent".
pub mod ttl {
    /// Preloaded/refreshed entity lists (vehicles, contacts, ...).
    pub const ENTITY_LIST_MS: i64 = 2 * 60 * 60 * 1000;

    /// Travel-mode vehicle detail and intervention history.
    pub const TRAVEL_DETAIL_MS: i64 = 48 * 60 * 60 * 1000;

    /// Travel-mode contact detail.
    pub const TRAVEL_CONTACT_MS: i64 = 24 * 60 * 60 * 1000;

    /// Travel-mode geography-bounded result sets.
    pub const TRAVEL_GEO_MS: i64 = 24 * 60 * 60 * 1000;

    /// Config singletons (a toggle, not perishable data).
    pub const CONFIG_MS: i64 = 365 * 24 * 60 * 60 * 1000;
}

// =============================================================================
// Entity Kind
// =============================================================================

/// The preloadable entity catalogue.
///
/// Each kind maps to one `GET /cache/{entity}` endpoint, one cache key
/// and one per-entity toggle/limit pair in [`crate::PreloadPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Fleet vehicles (the primary working set).
    Vehicles,
    /// Customer/site contacts.
    Contacts,
    /// Open anomaly reports.
    Anomalies,
    /// Machines attached to vehicles or sites.
    Machines,
    /// Most recent interventions, for context while offline.
    RecentInterventions,
}

impl EntityKind {
    /// Every preloadable kind, in preload fan-out order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Vehicles,
        EntityKind::Contacts,
        EntityKind::Anomalies,
        EntityKind::Machines,
        EntityKind::RecentInterventions,
    ];

    /// Wire name: URL path segment and cache key.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Vehicles => "vehicles",
            EntityKind::Contacts => "contacts",
            EntityKind::Anomalies => "anomalies",
            EntityKind::Machines => "machines",
            EntityKind::RecentInterventions => "recent_interventions",
        }
    }

    /// Cache key for the preloaded list of this kind.
    pub fn cache_key(&self) -> &'static str {
        self.as_str()
    }

    /// TTL for the preloaded list of this kind, in milliseconds.
    pub fn list_ttl_ms(&self) -> i64 {
        ttl::ENTITY_LIST_MS
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vehicles" => Ok(EntityKind::Vehicles),
            "contacts" => Ok(EntityKind::Contacts),
            "anomalies" => Ok(EntityKind::Anomalies),
            "machines" => Ok(EntityKind::Machines),
            "recent_interventions" => Ok(EntityKind::RecentInterventions),
            other => Err(CoreError::UnknownEntity(other.to_string())),
        }
    }
}

// =============================================================================
// Cached Resource
// =============================================================================

/// One row of the read cache.
///
/// Last-write-wins by `key`; a read past `expires_at` is "absent", not
/// "stale" — callers cannot distinguish "never cached" from "expired",
/// since both require a network refresh.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CachedResource {
    /// Cache key (entity name, `vehicle_{id}`, reserved config keys).
    pub key: String,

    /// Opaque JSON payload, stored as text.
    pub payload: String,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// Absolute expiry instant, derived from the write-time TTL.
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
}

impl CachedResource {
    /// True once the resource has outlived its TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// =============================================================================
// Pending Intervention
// =============================================================================

/// Lifecycle of a queued intervention write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InterventionStatus {
    /// Captured while offline, waiting for the next flush.
    Offline,
    /// Part of an in-flight sync batch.
    Syncing,
    /// Confirmed by the server; the row is deleted right after.
    Synced,
    /// Flush failed. Terminal for the automatic path; re-enters
    /// `Offline` only via explicit user retry.
    Error,
}

impl InterventionStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InterventionStatus::Offline => "offline",
            InterventionStatus::Syncing => "syncing",
            InterventionStatus::Synced => "synced",
            InterventionStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for InterventionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(InterventionStatus::Offline),
            "syncing" => Ok(InterventionStatus::Syncing),
            "synced" => Ok(InterventionStatus::Synced),
            "error" => Ok(InterventionStatus::Error),
            other => Err(CoreError::UnknownStatus {
                queue: "intervention".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// A locally captured intervention edit waiting to reach the server.
///
/// Upsert semantics by `id`: at most one row per intervention, holding
/// the latest snapshot (at-most-one active offline writer per record).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingIntervention {
    /// Server-side intervention id.
    pub id: i64,

    /// Full intervention snapshot as JSON text.
    pub snapshot: String,

    pub status: InterventionStatus,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub last_modified: DateTime<Utc>,
}

// =============================================================================
// Pending Media
// =============================================================================

/// What kind of media was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Signature,
    Document,
}

impl MediaKind {
    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Signature => "signature",
            MediaKind::Document => "document",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "photo" => Ok(MediaKind::Photo),
            "signature" => Ok(MediaKind::Signature),
            "document" => Ok(MediaKind::Document),
            other => Err(CoreError::UnknownStatus {
                queue: "media kind".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle of a queued media upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MediaStatus {
    /// Captured, waiting for the next flush.
    Pending,
    /// Upload in flight.
    Uploading,
    /// Confirmed by the server; the row is deleted right after.
    Uploaded,
    /// Upload failed. Retried automatically on the next flush or
    /// background cycle, or manually when online.
    Error,
}

impl MediaStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Pending => "pending",
            MediaStatus::Uploading => "uploading",
            MediaStatus::Uploaded => "uploaded",
            MediaStatus::Error => "error",
        }
    }
}

impl std::str::FromStr for MediaStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MediaStatus::Pending),
            "uploading" => Ok(MediaStatus::Uploading),
            "uploaded" => Ok(MediaStatus::Uploaded),
            "error" => Ok(MediaStatus::Error),
            other => Err(CoreError::UnknownStatus {
                queue: "media".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// WGS84 coordinate pair for geo-tagging and geographic prefetch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// True when both coordinates lie inside the WGS84 envelope.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A locally captured media item waiting to be uploaded.
///
/// The id is generated client-side (see [`media_id`]) because there is
/// no server round-trip yet at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingMedia {
    /// Client-generated id, monotonic-ish and collision-resistant.
    pub id: String,

    /// The intervention this media belongs to.
    pub intervention_id: i64,

    pub kind: MediaKind,

    /// Raw captured bytes.
    pub blob: Vec<u8>,

    /// GPS tag captured alongside, when available.
    pub geo_tag: Option<GeoPoint>,

    pub status: MediaStatus,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Generates a client-side media id from the capture instant.
///
/// Timestamp prefix keeps ids roughly ordered by capture time; the
/// UUID suffix makes collisions across rapid captures and devices
/// practically impossible.
pub fn media_id(now: DateTime<Utc>) -> String {
    format!("m{}_{}", now.timestamp_millis(), Uuid::new_v4().simple())
}

// =============================================================================
// Sync Result & Audit
// =============================================================================

/// Outcome of one preload/refresh/flush/travel-mode task.
///
/// Ephemeral: returned to callers in-memory and mirrored into the
/// bounded audit log, never used for control flow beyond reporting.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncResult {
    /// Entity name or per-target label (`vehicle_42`, `media_...`).
    pub entity: String,

    pub success: bool,

    /// Rows fetched, cached or uploaded by the task.
    pub count: i64,

    pub error: Option<String>,

    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

impl SyncResult {
    /// A successful task outcome.
    pub fn ok(entity: impl Into<String>, count: i64, now: DateTime<Utc>) -> Self {
        SyncResult {
            entity: entity.into(),
            success: true,
            count,
            error: None,
            timestamp: now,
        }
    }

    /// A failed task outcome. Never aborts sibling tasks.
    pub fn failed(entity: impl Into<String>, error: impl Into<String>, now: DateTime<Utc>) -> Self {
        SyncResult {
            entity: entity.into(),
            success: false,
            count: 0,
            error: Some(error.into()),
            timestamp: now,
        }
    }
}

/// One persisted row of the bounded sync audit log.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncAuditEntry {
    /// Autoincrement row id.
    pub id: i64,
    pub entity: String,
    pub success: bool,
    pub count: i64,
    pub error: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Computes an absolute expiry from a write instant and a TTL.
pub fn expires_at(now: DateTime<Utc>, ttl_ms: i64) -> DateTime<Utc> {
    now + Duration::milliseconds(ttl_ms)
}

// =============================================================================
// Unit Tests
// =============================================================================
