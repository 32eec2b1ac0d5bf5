//! # Error Types
//!
//! Domain-specific error types for fleetline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  fleetline-core errors (this file)                                     │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Config/input validation failures               │
//! │                                                                         │
//! │  fleetline-db errors (separate crate)                                  │
//! │  └── DbError          - Durable Store operation failures               │
//! │                                                                         │
//! │  fleetline-sync errors (separate crate)                                │
//! │  └── SyncError        - Network/scheduler failures                     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → per-task SyncResult   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (entity, key, field)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These represent violations of the data model or the configuration
/// rules, independent of any storage or network concern.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An entity name that is not part of the preload catalogue.
    ///
    /// ## When This Occurs
    /// - A cached policy written by an older build names an entity
    ///   this build no longer knows
    /// - A caller passes a free-form entity string to a typed API
    #[error("Unknown entity kind: {0}")]
    UnknownEntity(String),

    /// A status string that does not map to a queue state.
    #[error("Unknown {queue} status: {value}")]
    UnknownStatus { queue: String, value: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Configuration validation errors.
///
/// Raised before a policy or travel-mode config is persisted, so a
/// broken singleton never reaches the Durable Store.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., coordinates outside the WGS84 envelope).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::UnknownEntity("trailers".to_string());
        assert_eq!(err.to_string(), "Unknown entity kind: trailers");

        let err = ValidationError::OutOfRange {
            field: "sync_interval_minutes".to_string(),
            min: 1,
            max: 1440,
        };
        assert_eq!(
            err.to_string(),
            "sync_interval_minutes must be between 1 and 1440"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "vehicle_ids".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
