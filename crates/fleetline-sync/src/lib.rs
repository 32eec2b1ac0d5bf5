//! # fleetline-sync: Offline Sync Engine for Fleetline
//!
//! This crate provides the synchronization layer for the Fleetline
//! fleet-maintenance client, enabling field technicians to keep
//! working while network connectivity is absent or flaky and
//! reconciling state once connectivity returns.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Fleetline Sync Layer                               │
//! │                                                                         │
//! │  ┌──────────────────────────────┐   ┌──────────────────────────────┐   │
//! │  │        CacheRouter           │   │        SyncScheduler         │   │
//! │  │   (own execution context)    │   │   (app execution context)    │   │
//! │  │                              │   │                              │   │
//! │  │  Intercepts every outbound   │   │  Preload-on-login fan-out    │   │
//! │  │  request and picks a         │   │  Recurring background cycle  │   │
//! │  │  strategy:                   │   │  Pending flush (batch +      │   │
//! │  │  • bypass                    │   │    sequential media uploads) │   │
//! │  │  • cache-first               │   │  Travel-mode prefetch        │   │
//! │  │  • network-first             │   │  Media capture + retries     │   │
//! │  │  • stale-while-revalidate    │   │                              │   │
//! │  └──────────────┬───────────────┘   └──────────────┬───────────────┘   │
//! │                 │        no shared memory —        │                    │
//! │                 │     only the store + network     │                    │
//! │                 ▼                                  ▼                    │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            fleetline-db (the Durable Store)                     │   │
//! │  │   cached_resources • pending_interventions • pending_media      │   │
//! │  │   sync_audit • config singletons under reserved keys            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            StatusAggregator (consumer contract)                 │   │
//! │  │   {online, preloading, travelMode, lastSync, pending counts,    │   │
//! │  │    storageUsed, storageQuota}                                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`scheduler`] - The `SyncScheduler` orchestrator
//! - [`router`] - The `CacheRouter` strategy engine
//! - [`api`] - REST contract (`ApiClient` trait + reqwest adapter)
//! - [`platform`] - Capability traits (connectivity, geolocation, clock)
//! - [`status`] - UI-facing status aggregation
//! - [`error`] - Sync error taxonomy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleetline_db::{DbConfig, SharedDatabase};
//! use fleetline_sync::{HttpApiClient, SyncScheduler};
//!
//! // One-time startup wiring.
//! let store = SharedDatabase::new();
//! store.initialize(DbConfig::new("./fleetline.db")).await?;
//!
//! let scheduler = SyncScheduler::builder(store.clone())
//!     .with_api(Arc::new(HttpApiClient::new("https://api.example.test/v1")?))
//!     .build()?;
//!
//! // Login hook: preload the working set, arm the background cycle.
//! let results = scheduler.preload().await?;
//! scheduler.start().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod api;
pub mod error;
pub mod platform;
pub mod router;
pub mod scheduler;
pub mod status;

// =============================================================================
// Re-exports
// =============================================================================

pub use api::{ApiClient, EntityPage, HttpApiClient};
pub use error::{SyncError, SyncOpResult};
pub use platform::{
    acquire_position, AlwaysOnline, Clock, ConnectivityProbe, Geolocator, NoGeolocator,
    SystemClock, GEO_ACQUIRE_TIMEOUT,
};
pub use router::{
    AssetCache, CacheRouter, FetchRequest, FetchedResponse, Fetcher, HttpFetcher,
    MemoryAssetCache, ResponseSource, RouteClass, RoutedResponse, RouterConfig,
};
pub use scheduler::{SyncScheduler, SyncSchedulerBuilder};
pub use status::{StatusAggregator, SyncStatusReport};
