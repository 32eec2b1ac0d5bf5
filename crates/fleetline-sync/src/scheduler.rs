//! # Sync Scheduler
//!
//! Main orchestrator of the sync layer. Owns preload-on-login, the
//! recurring background cycle, pending-flush and travel-mode prefetch.
//!
//! ## Scheduler Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SyncScheduler Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                       SyncScheduler                              │  │
//! │  │                                                                  │  │
//! │  │  Explicit context object, constructed once at startup with       │  │
//! │  │  injected dependencies: store handle, api client, connectivity   │  │
//! │  │  probe, geolocator, clock.                                       │  │
//! │  │                                                                  │  │
//! │  │  Guarded state: `preloading: AtomicBool` (compare-and-swap).     │  │
//! │  │  Overlapping triggers (manual button, login hook, timer tick)    │  │
//! │  │  collapse to one real execution + immediate empty no-ops.        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼──────────────────────┐                 │
//! │         ▼                     ▼                      ▼                  │
//! │  ┌────────────────┐  ┌─────────────────┐  ┌────────────────────────┐   │
//! │  │ Preload        │  │ Background      │  │ Pending Flush          │   │
//! │  │                │  │ Cycle           │  │                        │   │
//! │  │ One concurrent │  │ Cancellable     │  │ One batched POST for   │   │
//! │  │ task per       │  │ timer; offline  │  │ interventions, then    │   │
//! │  │ enabled entity │  │ tick = no-op;   │  │ strictly SEQUENTIAL    │   │
//! │  │ kind; failures │  │ sweep, refresh, │  │ media uploads          │   │
//! │  │ isolated       │  │ then flush      │  │                        │   │
//! │  └────────────────┘  └─────────────────┘  └────────────────────────┘   │
//! │                                                                         │
//! │  Travel mode: per-target prefetch (vehicle detail + history,            │
//! │  contact detail, geography) with 24-48h TTLs. Disabling flips the       │
//! │  config flag only; cached data expires via TTL.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fleetline_core::policy::{PreloadPolicy, TravelModeConfig, PRELOAD_POLICY_KEY, TRAVEL_MODE_KEY};
use fleetline_core::types::{
    media_id, ttl, EntityKind, InterventionStatus, MediaKind, MediaStatus, PendingIntervention,
    PendingMedia, SyncResult,
};
use fleetline_db::{Database, SharedDatabase};

use crate::api::ApiClient;
use crate::error::{SyncError, SyncOpResult};
use crate::platform::{
    acquire_position, AlwaysOnline, Clock, ConnectivityProbe, Geolocator, NoGeolocator, SystemClock,
};

// =============================================================================
// Scheduler
// =============================================================================

/// The sync layer's orchestrator. Cheap to clone; all clones share one
/// context.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    /// The Durable Store — the only mutable state shared with the
    /// Cache Router (never in-memory references).
    store: SharedDatabase,

    /// REST contract with the server.
    api: Arc<dyn ApiClient>,

    /// Connectivity awareness; an offline tick is a logged no-op.
    connectivity: Arc<dyn ConnectivityProbe>,

    /// GPS capability; bounded wait, degrades to "no GPS".
    geolocator: Arc<dyn Geolocator>,

    /// Injectable time source.
    clock: Arc<dyn Clock>,

    /// Re-entrancy guard for preload and travel-mode prefetch.
    /// Check-and-set is a compare-exchange because the runtime is
    /// genuinely multi-threaded.
    preloading: AtomicBool,

    /// Completion time of the last successful sync pass.
    last_sync: RwLock<Option<DateTime<Utc>>>,

    /// The background timer task. Re-arming aborts and replaces the
    /// handle as one swap under this lock (cancel-and-restart), so an
    /// interval change racing the first arm deterministically wins.
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Resets the preloading flag when a guarded routine exits, including
/// on early returns and panics.
struct PreloadGuard<'a>(&'a AtomicBool);

impl Drop for PreloadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncScheduler {
    /// Starts a builder over the given store handle.
    pub fn builder(store: SharedDatabase) -> SyncSchedulerBuilder {
        SyncSchedulerBuilder::new(store)
    }

    // =========================================================================
    // Preload
    // =========================================================================

    /// Preload-on-login: fans out one fetch per enabled entity kind.
    ///
    /// - Policy disabled → empty result, no network traffic.
    /// - Re-entrant call while a preload (or travel prefetch) is
    ///   running → immediate empty result, never queued.
    /// - A failed entity yields one `SyncResult{success:false}` and
    ///   never aborts its siblings.
    pub async fn preload(&self) -> SyncOpResult<Vec<SyncResult>> {
        let inner = &self.inner;

        if inner
            .preloading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Preload already running, returning empty result");
            return Ok(Vec::new());
        }
        let _guard = PreloadGuard(&inner.preloading);

        let db = inner.store.get()?;
        let policy = inner.load_policy(&db).await?;

        if !policy.enabled {
            info!("Preload disabled by policy");
            return Ok(Vec::new());
        }

        info!(
            entities = policy.enabled_entities().len(),
            "Starting preload"
        );

        let results = inner.refresh_entities(&db, &policy).await;
        inner.record_audit(&db, &results).await;
        inner.mark_synced_now();

        let failures = results.iter().filter(|r| !r.success).count();
        info!(total = results.len(), failures, "Preload complete");

        Ok(results)
    }

    /// Manual trigger (UI button); same guarded entry point as the
    /// login hook.
    pub async fn trigger_preload(&self) -> SyncOpResult<Vec<SyncResult>> {
        self.preload().await
    }

    // =========================================================================
    // Background Cycle
    // =========================================================================

    /// Arms the background timer from the persisted policy interval.
    pub async fn start(&self) -> SyncOpResult<()> {
        let db = self.inner.store.get()?;
        let policy = self.inner.load_policy(&db).await?;

        self.arm_timer(Duration::from_secs(
            policy.sync_interval_minutes as u64 * 60,
        ));

        info!(
            interval_minutes = policy.sync_interval_minutes,
            "Background cycle armed"
        );
        Ok(())
    }

    /// Stops the background timer.
    pub fn stop(&self) {
        if let Ok(mut guard) = self.inner.timer.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
                info!("Background cycle stopped");
            }
        }
    }

    /// Persists a new recurrence interval and re-arms the timer.
    ///
    /// Cancel-and-restart: exactly one timer is active afterwards, no
    /// matter how the call interleaves with `start()`.
    pub async fn set_sync_interval(&self, minutes: u32) -> SyncOpResult<()> {
        let db = self.inner.store.get()?;
        let mut policy = self.inner.load_policy(&db).await?;
        policy.sync_interval_minutes = minutes;
        policy.validate()?;

        db.cache()
            .set_config(PRELOAD_POLICY_KEY, &policy, ttl::CONFIG_MS)
            .await?;

        self.arm_timer(Duration::from_secs(minutes as u64 * 60));
        info!(interval_minutes = minutes, "Background timer re-armed");
        Ok(())
    }

    /// True while a background timer task is armed.
    pub fn is_timer_active(&self) -> bool {
        self.inner
            .timer
            .lock()
            .map(|g| g.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    fn arm_timer(&self, period: Duration) {
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval's first tick completes immediately; the first
            // cycle belongs one full period out.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                inner.run_cycle().await;
            }
        });

        // One atomic swap of the timer handle.
        if let Ok(mut guard) = self.inner.timer.lock() {
            if let Some(old) = guard.replace(handle) {
                old.abort();
            }
        }
    }

    // =========================================================================
    // Pending Flush
    // =========================================================================

    /// Drains the pending queues: one batched intervention sync, then
    /// strictly sequential media uploads.
    pub async fn flush_pending(&self) -> SyncOpResult<Vec<SyncResult>> {
        let db = self.inner.store.get()?;
        Ok(self.inner.flush_pending_in(&db).await)
    }

    // =========================================================================
    // Offline Writes (UI entry points)
    // =========================================================================

    /// Queues an intervention edit captured while offline (or
    /// speculatively). Upsert by id.
    pub async fn queue_intervention(
        &self,
        id: i64,
        snapshot: &serde_json::Value,
    ) -> SyncOpResult<PendingIntervention> {
        let db = self.inner.store.get()?;
        Ok(db.interventions().upsert(id, snapshot).await?)
    }

    /// Queues a captured media item, geo-tagged when a GPS fix arrives
    /// within the bounded wait. Permission denial or a slow fix never
    /// blocks the capture.
    pub async fn queue_media(
        &self,
        intervention_id: i64,
        kind: MediaKind,
        blob: Vec<u8>,
    ) -> SyncOpResult<PendingMedia> {
        let db = self.inner.store.get()?;
        let now = self.inner.clock.now();

        let geo_tag = acquire_position(self.inner.geolocator.as_ref()).await;

        let media = PendingMedia {
            id: media_id(now),
            intervention_id,
            kind,
            blob,
            geo_tag,
            status: MediaStatus::Pending,
            created_at: now,
        };

        db.media().enqueue(&media).await?;
        Ok(media)
    }

    /// Explicit user retry of a failed intervention: `error` re-enters
    /// `offline` so the next flush picks it up. The automatic path
    /// never does this.
    pub async fn retry_intervention(&self, id: i64) -> SyncOpResult<()> {
        let db = self.inner.store.get()?;
        let repo = db.interventions();

        let row = repo
            .get(id)
            .await?
            .ok_or_else(|| SyncError::Database(format!("PendingIntervention not found: {id}")))?;

        if row.status == InterventionStatus::Error {
            repo.update_status(id, InterventionStatus::Offline).await?;
            info!(id, "Intervention re-queued by user retry");
        } else {
            debug!(id, status = row.status.as_str(), "Retry ignored, row not in error");
        }

        Ok(())
    }

    /// Explicit user retry of a failed media upload.
    pub async fn retry_media(&self, id: &str) -> SyncOpResult<()> {
        let db = self.inner.store.get()?;
        db.media().update_status(id, MediaStatus::Pending).await?;
        info!(id, "Media re-queued by user retry");
        Ok(())
    }

    // =========================================================================
    // Travel Mode
    // =========================================================================

    /// Enables travel mode and prefetches the bounded working set.
    ///
    /// The validated config is persisted first (long TTL), so the
    /// toggle survives even when the prefetch is skipped because a
    /// preload is already running.
    pub async fn enable_travel_mode(
        &self,
        config: TravelModeConfig,
    ) -> SyncOpResult<Vec<SyncResult>> {
        let mut config = config;
        config.enabled = true;
        config.validate()?;

        let db = self.inner.store.get()?;
        db.cache()
            .set_config(TRAVEL_MODE_KEY, &config, ttl::CONFIG_MS)
            .await?;

        if self
            .inner
            .preloading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Prefetch skipped, another preload is running");
            return Ok(Vec::new());
        }
        let _guard = PreloadGuard(&self.inner.preloading);

        info!(
            vehicles = config.vehicle_ids.len(),
            contacts = config.contact_ids.len(),
            geo = config.wants_geo(),
            "Travel mode enabled, prefetching working set"
        );

        let results = self.inner.prefetch_travel(&db, &config).await;
        self.inner.record_audit(&db, &results).await;

        Ok(results)
    }

    /// Disables travel mode. Deliberately does NOT evict the cached
    /// working set — it expires naturally via TTL.
    pub async fn disable_travel_mode(&self) -> SyncOpResult<()> {
        let db = self.inner.store.get()?;
        let cache = db.cache();

        let mut config = cache
            .get_config::<TravelModeConfig>(TRAVEL_MODE_KEY)
            .await?
            .unwrap_or_default();
        config.enabled = false;

        cache
            .set_config(TRAVEL_MODE_KEY, &config, ttl::CONFIG_MS)
            .await?;

        info!("Travel mode disabled, cached data left to expire");
        Ok(())
    }

    /// Current travel-mode config (default when never set).
    pub async fn travel_mode(&self) -> SyncOpResult<TravelModeConfig> {
        let db = self.inner.store.get()?;
        Ok(db
            .cache()
            .get_config(TRAVEL_MODE_KEY)
            .await?
            .unwrap_or_default())
    }

    // =========================================================================
    // State Accessors
    // =========================================================================

    /// True while a preload or travel prefetch is running.
    pub fn is_preloading(&self) -> bool {
        self.inner.preloading.load(Ordering::SeqCst)
    }

    /// Completion time of the last successful sync pass.
    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.inner.last_sync.read().ok().and_then(|g| *g)
    }

    /// The store handle this scheduler was built over.
    pub fn store(&self) -> &SharedDatabase {
        &self.inner.store
    }
}

// =============================================================================
// Inner Routines
// =============================================================================

impl SchedulerInner {
    /// Reads the persisted policy, falling back to defaults when the
    /// singleton was never written (or expired).
    async fn load_policy(&self, db: &Database) -> SyncOpResult<PreloadPolicy> {
        Ok(db
            .cache()
            .get_config(PRELOAD_POLICY_KEY)
            .await?
            .unwrap_or_default())
    }

    fn mark_synced_now(&self) {
        if let Ok(mut guard) = self.last_sync.write() {
            *guard = Some(self.clock.now());
        }
    }

    fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync.read().ok().and_then(|g| *g)
    }

    /// Best-effort audit append; a full audit log must never fail a
    /// sync pass.
    async fn record_audit(&self, db: &Database, results: &[SyncResult]) {
        if results.is_empty() {
            return;
        }
        if let Err(e) = db.audit().record(results).await {
            warn!(error = %e, "Failed to record sync audit entries");
        }
    }

    /// Concurrent per-entity fetch + cache write. Failures isolated.
    async fn refresh_entities(&self, db: &Database, policy: &PreloadPolicy) -> Vec<SyncResult> {
        let tasks = policy.enabled_entities().into_iter().map(|(kind, limit)| {
            let cache = db.cache();
            async move {
                match self.api.fetch_entity_list(kind, limit).await {
                    Ok(page) => {
                        // The server may suggest its own expiry.
                        let ttl_ms = page.cache_expiry_ms.unwrap_or_else(|| kind.list_ttl_ms());
                        let count = page.count;
                        let payload = serde_json::Value::Array(page.data);

                        match cache.set(kind.cache_key(), &payload, ttl_ms).await {
                            Ok(()) => SyncResult::ok(kind.as_str(), count, self.clock.now()),
                            Err(e) => {
                                warn!(entity = %kind, error = %e, "Failed to cache entity list");
                                SyncResult::failed(kind.as_str(), e.to_string(), self.clock.now())
                            }
                        }
                    }
                    Err(e) => {
                        warn!(entity = %kind, error = %e, "Entity fetch failed");
                        SyncResult::failed(kind.as_str(), e.to_string(), self.clock.now())
                    }
                }
            }
        });

        join_all(tasks).await
    }

    /// One background tick: sweep, refresh, flush. Offline → no-op.
    async fn run_cycle(&self) {
        if !self.connectivity.is_online().await {
            debug!("Offline, background cycle is a no-op");
            return;
        }

        let db = match self.store.get() {
            Ok(db) => db,
            Err(e) => {
                warn!(error = %e, "Background cycle skipped");
                return;
            }
        };

        if let Err(e) = db.cache().sweep_expired().await {
            warn!(error = %e, "Expired-cache sweep failed");
        }

        // Refresh unless a manual preload holds the guard.
        if self
            .preloading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _guard = PreloadGuard(&self.preloading);

            let policy = match self.load_policy(&db).await {
                Ok(policy) => policy,
                Err(e) => {
                    warn!(error = %e, "Failed to load policy, using defaults");
                    PreloadPolicy::default()
                }
            };

            if policy.enabled {
                let results = self.refresh_entities(&db, &policy).await;
                self.record_audit(&db, &results).await;
                self.mark_synced_now();
            }
        } else {
            debug!("Preload in progress, skipping cycle refresh");
        }

        self.flush_pending_in(&db).await;
    }

    /// Interventions first (one batch), then media (sequential).
    async fn flush_pending_in(&self, db: &Database) -> Vec<SyncResult> {
        let mut results = Vec::new();

        if let Some(result) = self.flush_interventions(db).await {
            results.push(result);
        }
        results.extend(self.flush_media(db).await);

        self.record_audit(db, &results).await;
        results
    }

    /// Batches every `offline` intervention into one sync call.
    async fn flush_interventions(&self, db: &Database) -> Option<SyncResult> {
        let repo = db.interventions();

        let queued = match repo.list_by_status(InterventionStatus::Offline).await {
            Ok(queued) => queued,
            Err(e) => {
                warn!(error = %e, "Failed to read intervention queue");
                return Some(SyncResult::failed(
                    "interventions",
                    e.to_string(),
                    self.clock.now(),
                ));
            }
        };

        if queued.is_empty() {
            return None;
        }

        if let Err(e) = repo
            .transition_all(InterventionStatus::Offline, InterventionStatus::Syncing)
            .await
        {
            warn!(error = %e, "Failed to mark interventions syncing");
            return Some(SyncResult::failed(
                "interventions",
                e.to_string(),
                self.clock.now(),
            ));
        }

        info!(count = queued.len(), "Flushing intervention batch");

        match self.api.push_interventions(&queued, self.last_sync()).await {
            Ok(()) => {
                // Confirmed: mark synced, then destroy the rows.
                for row in &queued {
                    if let Err(e) = repo.update_status(row.id, InterventionStatus::Synced).await {
                        warn!(id = row.id, error = %e, "Failed to mark intervention synced");
                        continue;
                    }
                    if let Err(e) = repo.delete(row.id).await {
                        warn!(id = row.id, error = %e, "Failed to delete synced intervention");
                    }
                }
                Some(SyncResult::ok(
                    "interventions",
                    queued.len() as i64,
                    self.clock.now(),
                ))
            }
            Err(e) => {
                warn!(error = %e, count = queued.len(), "Intervention batch failed");
                // Kept with status=error for manual retry.
                for row in &queued {
                    if let Err(e2) = repo.update_status(row.id, InterventionStatus::Error).await {
                        warn!(id = row.id, error = %e2, "Failed to mark intervention errored");
                    }
                }
                Some(SyncResult::failed(
                    "interventions",
                    e.to_string(),
                    self.clock.now(),
                ))
            }
        }
    }

    /// Uploads queued media one at a time. Sequential by design, to
    /// bound bandwidth and avoid partial multi-part upload contention.
    /// One failure never blocks the remaining queue.
    async fn flush_media(&self, db: &Database) -> Vec<SyncResult> {
        let repo = db.media();

        let queue = match repo.list_uploadable().await {
            Ok(queue) => queue,
            Err(e) => {
                warn!(error = %e, "Failed to read media queue");
                return vec![SyncResult::failed("media", e.to_string(), self.clock.now())];
            }
        };

        let mut results = Vec::with_capacity(queue.len());

        for media in queue {
            let label = format!("media_{}", media.id);

            if let Err(e) = repo.update_status(&media.id, MediaStatus::Uploading).await {
                warn!(id = %media.id, error = %e, "Failed to mark media uploading");
                results.push(SyncResult::failed(label, e.to_string(), self.clock.now()));
                continue;
            }

            match self.api.upload_media(&media).await {
                Ok(()) => {
                    if let Err(e) = repo.update_status(&media.id, MediaStatus::Uploaded).await {
                        warn!(id = %media.id, error = %e, "Failed to mark media uploaded");
                    }
                    if let Err(e) = repo.delete(&media.id).await {
                        warn!(id = %media.id, error = %e, "Failed to delete uploaded media");
                    }
                    results.push(SyncResult::ok(label, 1, self.clock.now()));
                }
                Err(e) => {
                    warn!(id = %media.id, error = %e, "Media upload failed");
                    if let Err(e2) = repo.update_status(&media.id, MediaStatus::Error).await {
                        warn!(id = %media.id, error = %e2, "Failed to mark media errored");
                    }
                    results.push(SyncResult::failed(label, e.to_string(), self.clock.now()));
                }
            }
        }

        results
    }

    /// Per-target travel prefetch, one SyncResult per target.
    async fn prefetch_travel(&self, db: &Database, config: &TravelModeConfig) -> Vec<SyncResult> {
        let cache = db.cache();
        let detail_ttl = config.detail_ttl_ms();
        let mut results = Vec::new();

        for &vehicle_id in &config.vehicle_ids {
            let label = format!("vehicle_{vehicle_id}");
            let result = match self
                .api
                .fetch_entity_detail(EntityKind::Vehicles, vehicle_id)
                .await
            {
                Ok(detail) => self.cache_target(&cache, &label, &detail, detail_ttl, 1).await,
                Err(e) => SyncResult::failed(label.clone(), e.to_string(), self.clock.now()),
            };
            results.push(result);

            let history_label = format!("vehicle_{vehicle_id}_interventions");
            let result = match self
                .api
                .fetch_entity_children(EntityKind::Vehicles, vehicle_id)
                .await
            {
                Ok(page) => {
                    let count = page.count;
                    let payload = serde_json::Value::Array(page.data);
                    self.cache_target(&cache, &history_label, &payload, detail_ttl, count)
                        .await
                }
                Err(e) => SyncResult::failed(history_label.clone(), e.to_string(), self.clock.now()),
            };
            results.push(result);
        }

        for &contact_id in &config.contact_ids {
            let label = format!("contact_{contact_id}");
            let result = match self
                .api
                .fetch_entity_detail(EntityKind::Contacts, contact_id)
                .await
            {
                Ok(detail) => {
                    self.cache_target(&cache, &label, &detail, ttl::TRAVEL_CONTACT_MS, 1)
                        .await
                }
                Err(e) => SyncResult::failed(label.clone(), e.to_string(), self.clock.now()),
            };
            results.push(result);
        }

        if config.wants_geo() {
            let center = match config.geo_center {
                Some(center) => Some(center),
                None => acquire_position(self.geolocator.as_ref()).await,
            };

            match center {
                Some(center) => {
                    let result = match self
                        .api
                        .fetch_geography(center, config.geo_radius_km)
                        .await
                    {
                        Ok(page) => {
                            let count = page.count;
                            let payload = serde_json::Value::Array(page.data);
                            self.cache_target(
                                &cache,
                                "travel_geography",
                                &payload,
                                ttl::TRAVEL_GEO_MS,
                                count,
                            )
                            .await
                        }
                        Err(e) => SyncResult::failed("geography", e.to_string(), self.clock.now()),
                    };
                    results.push(result);
                }
                None => {
                    warn!("No GPS position available, skipping geographic prefetch");
                    results.push(SyncResult::failed(
                        "geography",
                        "no GPS position available",
                        self.clock.now(),
                    ));
                }
            }
        }

        results
    }

    async fn cache_target(
        &self,
        cache: &fleetline_db::CacheRepository,
        label: &str,
        payload: &serde_json::Value,
        ttl_ms: i64,
        count: i64,
    ) -> SyncResult {
        match cache.set(label, payload, ttl_ms).await {
            Ok(()) => SyncResult::ok(label, count, self.clock.now()),
            Err(e) => {
                warn!(target = %label, error = %e, "Failed to cache travel target");
                SyncResult::failed(label, e.to_string(), self.clock.now())
            }
        }
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncScheduler with injected dependencies.
pub struct SyncSchedulerBuilder {
    store: SharedDatabase,
    api: Option<Arc<dyn ApiClient>>,
    connectivity: Option<Arc<dyn ConnectivityProbe>>,
    geolocator: Option<Arc<dyn Geolocator>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SyncSchedulerBuilder {
    /// Creates a new builder over the given store handle.
    pub fn new(store: SharedDatabase) -> Self {
        SyncSchedulerBuilder {
            store,
            api: None,
            connectivity: None,
            geolocator: None,
            clock: None,
        }
    }

    /// Sets the api client (required).
    pub fn with_api(mut self, api: Arc<dyn ApiClient>) -> Self {
        self.api = Some(api);
        self
    }

    /// Sets the connectivity probe. Default: assume online.
    pub fn with_connectivity(mut self, connectivity: Arc<dyn ConnectivityProbe>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Sets the geolocator. Default: no GPS.
    pub fn with_geolocator(mut self, geolocator: Arc<dyn Geolocator>) -> Self {
        self.geolocator = Some(geolocator);
        self
    }

    /// Sets the clock. Default: system wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the SyncScheduler.
    pub fn build(self) -> SyncOpResult<SyncScheduler> {
        let api = self
            .api
            .ok_or_else(|| SyncError::InvalidConfig("Api client required".into()))?;

        Ok(SyncScheduler {
            inner: Arc::new(SchedulerInner {
                store: self.store,
                api,
                connectivity: self.connectivity.unwrap_or_else(|| Arc::new(AlwaysOnline)),
                geolocator: self.geolocator.unwrap_or_else(|| Arc::new(NoGeolocator)),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                preloading: AtomicBool::new(false),
                last_sync: RwLock::new(None),
                timer: Mutex::new(None),
            }),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fleetline_core::types::GeoPoint;
    use fleetline_db::DbConfig;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    use crate::api::EntityPage;

    // -------------------------------------------------------------------------
    // Mocks
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct MockApi {
        /// Entity names whose list fetch fails.
        failing_entities: HashSet<String>,
        /// Media ids whose upload fails.
        failing_media: HashSet<String>,
        /// Delay injected into every list fetch.
        fetch_delay: Option<Duration>,
        /// Upload order, for the sequential-upload assertion.
        uploads: Mutex<Vec<String>>,
        /// Intervention batches received.
        batches: Mutex<Vec<Vec<i64>>>,
        /// Whether the intervention batch endpoint fails.
        fail_batch: bool,
    }

    impl MockApi {
        fn upload_order(&self) -> Vec<String> {
            self.uploads.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ApiClient for MockApi {
        async fn fetch_entity_list(
            &self,
            kind: EntityKind,
            limit: u32,
        ) -> SyncOpResult<EntityPage> {
            if let Some(delay) = self.fetch_delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing_entities.contains(kind.as_str()) {
                return Err(SyncError::Network(format!("{kind} unreachable")));
            }
            Ok(EntityPage {
                data: vec![json!({"kind": kind.as_str(), "limit": limit})],
                count: 1,
                cache_expiry_ms: None,
            })
        }

        async fn fetch_entity_detail(
            &self,
            kind: EntityKind,
            id: i64,
        ) -> SyncOpResult<serde_json::Value> {
            Ok(json!({"kind": kind.as_str(), "id": id}))
        }

        async fn fetch_entity_children(
            &self,
            kind: EntityKind,
            id: i64,
        ) -> SyncOpResult<EntityPage> {
            Ok(EntityPage {
                data: vec![json!({"parent": id, "kind": kind.as_str()})],
                count: 1,
                cache_expiry_ms: None,
            })
        }

        async fn fetch_geography(
            &self,
            _center: GeoPoint,
            _radius_km: f64,
        ) -> SyncOpResult<EntityPage> {
            Ok(EntityPage {
                data: vec![json!({"geo": true})],
                count: 1,
                cache_expiry_ms: None,
            })
        }

        async fn push_interventions(
            &self,
            batch: &[PendingIntervention],
            _last_sync: Option<DateTime<Utc>>,
        ) -> SyncOpResult<()> {
            self.batches
                .lock()
                .unwrap()
                .push(batch.iter().map(|i| i.id).collect());
            if self.fail_batch {
                return Err(SyncError::Network("sync endpoint unreachable".into()));
            }
            Ok(())
        }

        async fn upload_media(&self, media: &PendingMedia) -> SyncOpResult<()> {
            self.uploads.lock().unwrap().push(media.id.clone());
            if self.failing_media.contains(&media.id) {
                return Err(SyncError::Network("upload interrupted".into()));
            }
            Ok(())
        }
    }

    /// Connectivity probe that counts how often a tick asked.
    struct CountingProbe {
        online: bool,
        calls: AtomicUsize,
    }

    impl CountingProbe {
        fn offline() -> Arc<Self> {
            Arc::new(CountingProbe {
                online: false,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ConnectivityProbe for CountingProbe {
        async fn is_online(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.online
        }
    }

    async fn shared_db() -> SharedDatabase {
        let shared = SharedDatabase::new();
        shared.initialize(DbConfig::in_memory()).await.unwrap();
        shared
    }

    async fn scheduler_with(api: MockApi) -> SyncScheduler {
        SyncScheduler::builder(shared_db().await)
            .with_api(Arc::new(api))
            .build()
            .unwrap()
    }

    // -------------------------------------------------------------------------
    // Preload
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_preload_populates_every_enabled_entity() {
        let scheduler = scheduler_with(MockApi::default()).await;

        let results = scheduler.preload().await.unwrap();
        assert_eq!(results.len(), EntityKind::ALL.len());
        assert!(results.iter().all(|r| r.success));

        let db = scheduler.store().get().unwrap();
        for kind in EntityKind::ALL {
            assert!(
                db.cache().get(kind.cache_key()).await.unwrap().is_some(),
                "{kind} should be cached after preload"
            );
        }
        assert!(scheduler.last_sync().is_some());
    }

    #[tokio::test]
    async fn test_preload_disabled_policy_is_a_no_op() {
        let scheduler = scheduler_with(MockApi::default()).await;
        let db = scheduler.store().get().unwrap();

        let mut policy = PreloadPolicy::default();
        policy.enabled = false;
        db.cache()
            .set_config(PRELOAD_POLICY_KEY, &policy, ttl::CONFIG_MS)
            .await
            .unwrap();

        let results = scheduler.preload().await.unwrap();
        assert!(results.is_empty());
        assert!(db.cache().get("vehicles").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let api = MockApi {
            failing_entities: HashSet::from(["contacts".to_string()]),
            ..Default::default()
        };
        let scheduler = scheduler_with(api).await;

        let results = scheduler.preload().await.unwrap();

        let vehicles = results.iter().find(|r| r.entity == "vehicles").unwrap();
        let contacts = results.iter().find(|r| r.entity == "contacts").unwrap();
        assert!(vehicles.success);
        assert!(!contacts.success);
        assert!(contacts.error.is_some());

        let db = scheduler.store().get().unwrap();
        assert!(db.cache().get("vehicles").await.unwrap().is_some());
        assert!(db.cache().get("contacts").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reentrant_preload_returns_empty() {
        let api = MockApi {
            fetch_delay: Some(Duration::from_millis(100)),
            ..Default::default()
        };
        let scheduler = scheduler_with(api).await;
        let second = scheduler.clone();

        let (first, second) = tokio::join!(scheduler.preload(), async move {
            // Let the first call take the guard before its first
            // suspension point resolves.
            tokio::time::sleep(Duration::from_millis(20)).await;
            second.preload().await
        });

        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(first.len(), EntityKind::ALL.len(), "one real execution");
        assert!(second.is_empty(), "one immediate empty-result no-op");
        assert!(!scheduler.is_preloading(), "guard released afterwards");
    }

    #[tokio::test]
    async fn test_preload_on_uninitialized_store_fails_fast() {
        let scheduler = SyncScheduler::builder(SharedDatabase::new())
            .with_api(Arc::new(MockApi::default()))
            .build()
            .unwrap();

        match scheduler.preload().await {
            Err(SyncError::StoreNotInitialized) => {}
            other => panic!("expected StoreNotInitialized, got {other:?}"),
        }
        assert!(!scheduler.is_preloading(), "guard released on early error");
    }

    // -------------------------------------------------------------------------
    // Pending Flush
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_flush_batches_interventions_and_deletes_on_success() {
        let scheduler = scheduler_with(MockApi::default()).await;
        let db = scheduler.store().get().unwrap();

        scheduler.queue_intervention(1, &json!({"v": 1})).await.unwrap();
        scheduler.queue_intervention(2, &json!({"v": 2})).await.unwrap();

        let results = scheduler.flush_pending().await.unwrap();
        let batch_result = results.iter().find(|r| r.entity == "interventions").unwrap();
        assert!(batch_result.success);
        assert_eq!(batch_result.count, 2);

        // Confirmed rows are destroyed.
        assert_eq!(db.interventions().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_parks_rows_in_error() {
        let api = MockApi {
            fail_batch: true,
            ..Default::default()
        };
        let scheduler = scheduler_with(api).await;
        let db = scheduler.store().get().unwrap();

        scheduler.queue_intervention(7, &json!({})).await.unwrap();
        scheduler.flush_pending().await.unwrap();

        let errored = db
            .interventions()
            .list_by_status(InterventionStatus::Error)
            .await
            .unwrap();
        assert_eq!(errored.len(), 1);

        // Error is terminal for the automatic path: a second flush
        // sends nothing.
        let results = scheduler.flush_pending().await.unwrap();
        assert!(results.iter().all(|r| r.entity != "interventions"));

        // Explicit user retry re-enters the queue.
        scheduler.retry_intervention(7).await.unwrap();
        let requeued = db
            .interventions()
            .list_by_status(InterventionStatus::Offline)
            .await
            .unwrap();
        assert_eq!(requeued.len(), 1);
    }

    #[tokio::test]
    async fn test_sequential_upload_with_mid_queue_failure() {
        let shared = shared_db().await;
        let db = shared.get().unwrap();

        // Three captures in FIFO order; the middle one will fail.
        let mut ids = Vec::new();
        for offset in 0..3 {
            let media = PendingMedia {
                id: format!("m{offset}"),
                intervention_id: 1,
                kind: MediaKind::Photo,
                blob: vec![offset as u8],
                geo_tag: None,
                status: MediaStatus::Pending,
                created_at: Utc::now() + chrono::Duration::milliseconds(offset),
            };
            db.media().enqueue(&media).await.unwrap();
            ids.push(media.id);
        }

        let api = Arc::new(MockApi {
            failing_media: HashSet::from(["m1".to_string()]),
            ..Default::default()
        });
        let scheduler = SyncScheduler::builder(shared)
            .with_api(api.clone())
            .build()
            .unwrap();

        let results = scheduler.flush_pending().await.unwrap();

        // One at a time, FIFO.
        assert_eq!(api.upload_order(), ids);

        // Failure on item 2 still lets items 1 and 3 through.
        assert!(db.media().get("m0").await.unwrap().is_none());
        assert!(db.media().get("m2").await.unwrap().is_none());
        let stuck = db.media().get("m1").await.unwrap().unwrap();
        assert_eq!(stuck.status, MediaStatus::Error);

        assert_eq!(results.iter().filter(|r| r.success).count(), 2);
        assert_eq!(results.iter().filter(|r| !r.success).count(), 1);

        // Errored media is retried automatically on the next flush.
        let results = scheduler.flush_pending().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(api.upload_order().len(), 4);
    }

    // -------------------------------------------------------------------------
    // Travel Mode
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_travel_mode_prefetches_vehicle_working_set() {
        let scheduler = scheduler_with(MockApi::default()).await;
        let db = scheduler.store().get().unwrap();

        let config = TravelModeConfig {
            vehicle_ids: vec![42],
            ..Default::default()
        };
        let results = scheduler.enable_travel_mode(config).await.unwrap();
        assert!(results.iter().all(|r| r.success));

        // Offline afterwards: both targets answer from cache.
        assert!(db.cache().get("vehicle_42").await.unwrap().is_some());
        assert!(db
            .cache()
            .get("vehicle_42_interventions")
            .await
            .unwrap()
            .is_some());

        assert!(scheduler.travel_mode().await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_disable_travel_mode_keeps_cached_data() {
        let scheduler = scheduler_with(MockApi::default()).await;
        let db = scheduler.store().get().unwrap();

        let config = TravelModeConfig {
            vehicle_ids: vec![42],
            contact_ids: vec![5],
            ..Default::default()
        };
        scheduler.enable_travel_mode(config).await.unwrap();
        scheduler.disable_travel_mode().await.unwrap();

        assert!(!scheduler.travel_mode().await.unwrap().enabled);
        // No eviction: the working set expires via TTL only.
        assert!(db.cache().get("vehicle_42").await.unwrap().is_some());
        assert!(db.cache().get("contact_5").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_travel_mode_rejects_empty_scope() {
        let scheduler = scheduler_with(MockApi::default()).await;

        match scheduler.enable_travel_mode(TravelModeConfig::default()).await {
            Err(SyncError::InvalidConfig(_)) => {}
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_geo_prefetch_without_gps_degrades() {
        let scheduler = scheduler_with(MockApi::default()).await;

        let config = TravelModeConfig {
            geo_radius_km: 25.0,
            ..Default::default()
        };
        let results = scheduler.enable_travel_mode(config).await.unwrap();

        // The default geolocator has no GPS: the geographic target is
        // skipped, not an error that aborts the prefetch.
        let geo = results.iter().find(|r| r.entity == "geography").unwrap();
        assert!(!geo.success);
        assert!(geo.error.as_deref().unwrap().contains("no GPS"));
    }

    // -------------------------------------------------------------------------
    // Background Cycle
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_interval_change_leaves_exactly_one_timer() {
        let probe = CountingProbe::offline();
        let scheduler = SyncScheduler::builder(shared_db().await)
            .with_api(Arc::new(MockApi::default()))
            .with_connectivity(probe.clone())
            .build()
            .unwrap();

        scheduler.set_sync_interval(5).await.unwrap();
        scheduler.set_sync_interval(10).await.unwrap();
        assert!(scheduler.is_timer_active());

        // Pause only once the store writes are done; an offline tick
        // never touches the store, so advancing stays deterministic.
        tokio::time::pause();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        // The 5-minute timer is dead: nothing fires at t+5m.
        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);

        // The 10-minute timer fires once at t+10m.
        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        // And exactly once more per period.
        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);

        scheduler.stop();
        assert!(!scheduler.is_timer_active());
    }

    #[tokio::test]
    async fn test_offline_tick_is_a_no_op() {
        let probe = CountingProbe::offline();
        let scheduler = SyncScheduler::builder(shared_db().await)
            .with_api(Arc::new(MockApi::default()))
            .with_connectivity(probe.clone())
            .build()
            .unwrap();
        let db = scheduler.store().get().unwrap();

        scheduler.queue_intervention(1, &json!({})).await.unwrap();
        scheduler.set_sync_interval(1).await.unwrap();

        tokio::time::pause();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        tokio::time::resume();

        // The tick ran but, offline, touched nothing.
        assert!(probe.calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(db.interventions().count_pending().await.unwrap(), 1);
        assert!(db.cache().get("vehicles").await.unwrap().is_none());

        scheduler.stop();
    }

    // -------------------------------------------------------------------------
    // Media Capture
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_queue_media_without_gps_still_captures() {
        let scheduler = scheduler_with(MockApi::default()).await;
        let db = scheduler.store().get().unwrap();

        let media = scheduler
            .queue_media(9, MediaKind::Signature, vec![1, 2, 3])
            .await
            .unwrap();

        assert!(media.geo_tag.is_none(), "no GPS degrades to an untagged capture");
        assert_eq!(media.status, MediaStatus::Pending);

        let stored = db.media().get(&media.id).await.unwrap().unwrap();
        assert_eq!(stored.blob, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_queue_media_attaches_gps_fix() {
        struct FixedGeolocator;

        #[async_trait]
        impl Geolocator for FixedGeolocator {
            async fn current_position(&self) -> Option<GeoPoint> {
                Some(GeoPoint { lat: 45.76, lon: 4.84 })
            }
        }

        let scheduler = SyncScheduler::builder(shared_db().await)
            .with_api(Arc::new(MockApi::default()))
            .with_geolocator(Arc::new(FixedGeolocator))
            .build()
            .unwrap();

        let media = scheduler
            .queue_media(9, MediaKind::Photo, vec![0xFF])
            .await
            .unwrap();
        assert_eq!(media.geo_tag, Some(GeoPoint { lat: 45.76, lon: 4.84 }));
    }
}
