//! # Platform Capabilities
//!
//! Small capability interfaces for everything the sync layer needs
//! from its host platform: connectivity awareness, geolocation and a
//! clock. A non-browser target (mobile app, desktop shell, test
//! harness) supplies its own adapter implementing the same contract.
//!
//! ## Capability Seams
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Platform Capability Traits                            │
//! │                                                                         │
//! │  SyncScheduler ──► ConnectivityProbe   "are we online right now?"       │
//! │                ──► Geolocator          "where are we?" (bounded wait)   │
//! │                ──► Clock               "what time is it?" (injectable)  │
//! │                                                                         │
//! │  Geolocation is the ONLY capability wrapped in a timeout; a denial      │
//! │  or slow fix degrades to "no GPS" and never blocks capture or upload.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use fleetline_core::types::GeoPoint;

// =============================================================================
// Constants
// =============================================================================

/// Bounded wait for a GPS fix before degrading to "no GPS".
pub const GEO_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Connectivity
// =============================================================================

/// Answers whether the device currently has network connectivity.
///
/// The background cycle asks before every tick; an offline answer
/// turns the tick into a logged no-op.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probe for platforms without connectivity signaling: assume online
/// and let requests fail naturally into per-task errors.
pub struct AlwaysOnline;

#[async_trait]
impl ConnectivityProbe for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

// =============================================================================
// Geolocation
// =============================================================================

/// Supplies the device's current position, when the platform can.
///
/// Implementations return `None` on permission denial or missing
/// hardware; slowness is handled by the caller through
/// [`acquire_position`].
#[async_trait]
pub trait Geolocator: Send + Sync {
    async fn current_position(&self) -> Option<GeoPoint>;
}

/// Geolocator for platforms without GPS: every capture and prefetch
/// proceeds untagged.
pub struct NoGeolocator;

#[async_trait]
impl Geolocator for NoGeolocator {
    async fn current_position(&self) -> Option<GeoPoint> {
        None
    }
}

/// Acquires a position with the bounded wait.
///
/// Timeout, denial and missing hardware all collapse to `None`:
/// "no GPS tag", never an error.
pub async fn acquire_position(geolocator: &dyn Geolocator) -> Option<GeoPoint> {
    match tokio::time::timeout(GEO_ACQUIRE_TIMEOUT, geolocator.current_position()).await {
        Ok(position) => position,
        Err(_) => {
            debug!("Geolocation acquisition timed out, continuing without GPS");
            None
        }
    }
}

// =============================================================================
// Clock
// =============================================================================

/// Injectable time source for the scheduler.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// =============================================================================
// Tests
// =============================================================================
