//! # Status Aggregator
//!
//! Thin consumer contract for the (external) UI layer: derives the
//! badge counters and flags by querying the Durable Store and the live
//! scheduler handles. Holds no state of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use fleetline_db::SharedDatabase;

use crate::error::SyncOpResult;
use crate::platform::ConnectivityProbe;
use crate::scheduler::SyncScheduler;

/// UI-facing snapshot of the sync layer.
///
/// Failures surface here as counts/badges; the UI offers explicit
/// manual retry actions rather than the layer retrying unboundedly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusReport {
    /// Current connectivity answer.
    pub online: bool,

    /// True while a preload or travel prefetch is running.
    pub preloading: bool,

    /// Whether travel mode is currently enabled.
    pub travel_mode: bool,

    /// Completion time of the last successful sync pass (ISO8601).
    pub last_sync: Option<DateTime<Utc>>,

    /// Interventions waiting for (or stuck in) sync.
    pub pending_interventions: i64,

    /// Media items waiting for (or stuck in) upload.
    pub pending_media: i64,

    /// Local database bytes in use.
    pub storage_used: u64,

    /// Configured storage quota in bytes.
    pub storage_quota: u64,
}

/// Derives [`SyncStatusReport`]s on demand.
pub struct StatusAggregator {
    store: SharedDatabase,
    scheduler: SyncScheduler,
    connectivity: Arc<dyn ConnectivityProbe>,
}

impl StatusAggregator {
    /// Creates an aggregator over the live handles.
    pub fn new(
        store: SharedDatabase,
        scheduler: SyncScheduler,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        StatusAggregator {
            store,
            scheduler,
            connectivity,
        }
    }

    /// One consistent-enough snapshot; each counter is read
    /// independently, which is fine for badges.
    pub async fn report(&self) -> SyncOpResult<SyncStatusReport> {
        let db = self.store.get()?;

        let usage = db.estimate_usage().await?;
        let pending_interventions = db.interventions().count_pending().await?;
        let pending_media = db.media().count_pending().await?;
        let travel_mode = self.scheduler.travel_mode().await?.enabled;

        Ok(SyncStatusReport {
            online: self.connectivity.is_online().await,
            preloading: self.scheduler.is_preloading(),
            travel_mode,
            last_sync: self.scheduler.last_sync(),
            pending_interventions,
            pending_media,
            storage_used: usage.used,
            storage_quota: usage.quota,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
