//! # Config Singletons
//!
//! The two configuration singletons of the sync layer: the preload
//! policy and the travel-mode config.
//!
//! ## Storage Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              Config Singletons in the Cached Resource Store             │
//! │                                                                         │
//! │  cached_resources                                                       │
//! │  ┌──────────────────────────┬─────────────────────┬──────────────────┐  │
//! │  │ key                      │ payload             │ expires_at       │  │
//! │  ├──────────────────────────┼─────────────────────┼──────────────────┤  │
//! │  │ vehicles                 │ [...]               │ now + 2h         │  │
//! │  │ __config_preload_policy  │ {"enabled":true,..} │ now + ~1 year    │  │
//! │  │ __config_travel_mode     │ {"enabled":false,..}│ now + ~1 year    │  │
//! │  └──────────────────────────┴─────────────────────┴──────────────────┘  │
//! │                                                                         │
//! │  Config shares the cache's expiry/versioning machinery; the             │
//! │  multi-year TTL makes it effectively permanent.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::{ttl, EntityKind, GeoPoint};
use crate::MAX_ENTITY_LIMIT;

// =============================================================================
// Reserved Keys
// =============================================================================

/// Reserved cache key for the preload policy singleton.
pub const PRELOAD_POLICY_KEY: &str = "__config_preload_policy";

/// Reserved cache key for the travel-mode config singleton.
pub const TRAVEL_MODE_KEY: &str = "__config_travel_mode";

// =============================================================================
// Preload Policy
// =============================================================================

/// Per-entity preload switch and row cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EntityPreload {
    /// Include this entity in preload and background refresh.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum rows fetched for this entity.
    pub limit: u32,
}

fn default_true() -> bool {
    true
}

/// Preload-on-login policy singleton.
///
/// ## Configuration Surface
/// - `enabled` — master switch; disabled means preload is a no-op
/// - per-entity toggles and limits
/// - `sync_interval_minutes` — background cycle recurrence; changing
///   it re-arms the timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PreloadPolicy {
    /// Master switch for preload and background refresh.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_vehicles")]
    pub vehicles: EntityPreload,

    #[serde(default = "default_contacts")]
    pub contacts: EntityPreload,

    #[serde(default = "default_anomalies")]
    pub anomalies: EntityPreload,

    #[serde(default = "default_machines")]
    pub machines: EntityPreload,

    #[serde(default = "default_recent_interventions")]
    pub recent_interventions: EntityPreload,

    /// Recurrence of the background cycle, in minutes.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_minutes: u32,
}

fn default_vehicles() -> EntityPreload {
    EntityPreload { enabled: true, limit: 100 }
}

fn default_contacts() -> EntityPreload {
    EntityPreload { enabled: true, limit: 200 }
}

fn default_anomalies() -> EntityPreload {
    EntityPreload { enabled: true, limit: 50 }
}

fn default_machines() -> EntityPreload {
    EntityPreload { enabled: true, limit: 100 }
}

fn default_recent_interventions() -> EntityPreload {
    EntityPreload { enabled: true, limit: 25 }
}

fn default_sync_interval() -> u32 {
    15
}

impl Default for PreloadPolicy {
    fn default() -> Self {
        PreloadPolicy {
            enabled: true,
            vehicles: default_vehicles(),
            contacts: default_contacts(),
            anomalies: default_anomalies(),
            machines: default_machines(),
            recent_interventions: default_recent_interventions(),
            sync_interval_minutes: default_sync_interval(),
        }
    }
}

impl PreloadPolicy {
    /// Toggle/limit pair for one entity kind.
    pub fn entity(&self, kind: EntityKind) -> EntityPreload {
        match kind {
            EntityKind::Vehicles => self.vehicles,
            EntityKind::Contacts => self.contacts,
            EntityKind::Anomalies => self.anomalies,
            EntityKind::Machines => self.machines,
            EntityKind::RecentInterventions => self.recent_interventions,
        }
    }

    /// Entities included in preload/refresh, with their limits.
    pub fn enabled_entities(&self) -> Vec<(EntityKind, u32)> {
        EntityKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let preload = self.entity(kind);
                preload.enabled.then_some((kind, preload.limit))
            })
            .collect()
    }

    /// Validates the policy before it is persisted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sync_interval_minutes < 1 || self.sync_interval_minutes > 1440 {
            return Err(ValidationError::OutOfRange {
                field: "sync_interval_minutes".to_string(),
                min: 1,
                max: 1440,
            });
        }

        for kind in EntityKind::ALL {
            let preload = self.entity(kind);
            if preload.limit == 0 || preload.limit > MAX_ENTITY_LIMIT {
                return Err(ValidationError::OutOfRange {
                    field: format!("{kind}.limit"),
                    min: 1,
                    max: MAX_ENTITY_LIMIT as i64,
                });
            }
        }

        Ok(())
    }
}

// =============================================================================
// Travel Mode Config
// =============================================================================

/// Travel-mode prefetch scope: a bounded working set of vehicles,
/// contacts and/or geography cached ahead of an expected offline
/// period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TravelModeConfig {
    pub enabled: bool,

    /// Vehicles whose detail and intervention history get prefetched.
    #[serde(default)]
    pub vehicle_ids: Vec<i64>,

    /// Contacts whose detail gets prefetched.
    #[serde(default)]
    pub contact_ids: Vec<i64>,

    /// Center of the geographic prefetch. When absent while a radius
    /// is set, the current position is acquired (bounded wait).
    #[serde(default)]
    pub geo_center: Option<GeoPoint>,

    /// Radius of the geographic prefetch; 0 disables it.
    #[serde(default)]
    pub geo_radius_km: f64,

    /// How long the trip is expected to last.
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u32,
}

fn default_expiry_hours() -> u32 {
    48
}

impl Default for TravelModeConfig {
    fn default() -> Self {
        TravelModeConfig {
            enabled: false,
            vehicle_ids: Vec::new(),
            contact_ids: Vec::new(),
            geo_center: None,
            geo_radius_km: 0.0,
            expiry_hours: default_expiry_hours(),
        }
    }
}

impl TravelModeConfig {
    /// True when a geographic prefetch is requested.
    pub fn wants_geo(&self) -> bool {
        self.geo_radius_km > 0.0
    }

    /// TTL for travel-mode detail caches, clamped to the 24-48h band
    /// the cache is sized for.
    pub fn detail_ttl_ms(&self) -> i64 {
        let requested = self.expiry_hours as i64 * 60 * 60 * 1000;
        requested.clamp(ttl::TRAVEL_CONTACT_MS, ttl::TRAVEL_DETAIL_MS)
    }

    /// Validates the scope before it is persisted and prefetched.
    ///
    /// An enabled config must name at least one target (vehicle ids,
    /// contact ids or a geographic radius), keep the radius bounded
    /// and its coordinates inside the WGS84 envelope.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled
            && self.vehicle_ids.is_empty()
            && self.contact_ids.is_empty()
            && !self.wants_geo()
        {
            return Err(ValidationError::Required {
                field: "vehicle_ids, contact_ids or geo_radius_km".to_string(),
            });
        }

        if self.geo_radius_km < 0.0 || self.geo_radius_km > 500.0 {
            return Err(ValidationError::OutOfRange {
                field: "geo_radius_km".to_string(),
                min: 0,
                max: 500,
            });
        }

        if let Some(center) = &self.geo_center {
            if !center.is_valid() {
                return Err(ValidationError::InvalidFormat {
                    field: "geo_center".to_string(),
                    reason: "coordinates outside WGS84 bounds".to_string(),
                });
            }
        }

        if self.expiry_hours < 1 || self.expiry_hours > 24 * 14 {
            return Err(ValidationError::OutOfRange {
                field: "expiry_hours".to_string(),
                min: 1,
                max: 24 * 14,
            });
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = PreloadPolicy::default();
        assert!(policy.enabled);
        assert!(policy.validate().is_ok());
        assert_eq!(policy.enabled_entities().len(), EntityKind::ALL.len());
    }

    #[test]
    fn test_disabled_entity_excluded_from_fan_out() {
        let mut policy = PreloadPolicy::default();
        policy.contacts.enabled = false;

        let enabled = policy.enabled_entities();
        assert_eq!(enabled.len(), 4);
        assert!(enabled.iter().all(|(kind, _)| *kind != EntityKind::Contacts));
    }

    #[test]
    fn test_policy_rejects_bad_interval() {
        let mut policy = PreloadPolicy::default();
        policy.sync_interval_minutes = 0;
        assert!(policy.validate().is_err());

        policy.sync_interval_minutes = 2000;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_policy_rejects_oversized_limit() {
        let mut policy = PreloadPolicy::default();
        policy.vehicles.limit = MAX_ENTITY_LIMIT + 1;
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        // A minimal payload written by an older build still parses.
        let policy: PreloadPolicy = serde_json::from_str("{\"enabled\":false}").unwrap();
        assert!(!policy.enabled);
        assert_eq!(policy.sync_interval_minutes, 15);
        assert_eq!(policy.vehicles.limit, 100);
    }

    #[test]
    fn test_travel_config_requires_a_target() {
        let config = TravelModeConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TravelModeConfig {
            enabled: true,
            vehicle_ids: vec![42],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_travel_config_bounds() {
        let config = TravelModeConfig {
            enabled: true,
            geo_radius_km: 600.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = TravelModeConfig {
            enabled: true,
            geo_radius_km: 25.0,
            geo_center: Some(GeoPoint { lat: 95.0, lon: 0.0 }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_detail_ttl_clamped_to_trip_band() {
        let mut config = TravelModeConfig::default();

        config.expiry_hours = 4;
        assert_eq!(config.detail_ttl_ms(), ttl::TRAVEL_CONTACT_MS);

        config.expiry_hours = 36;
        assert_eq!(config.detail_ttl_ms(), 36 * 60 * 60 * 1000);

        config.expiry_hours = 120;
        assert_eq!(config.detail_ttl_ms(), ttl::TRAVEL_DETAIL_MS);
    }
}
