//! # Sync Error Types
//!
//! Error types for the sync layer.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Network      │  │    Storage      │  │     Configuration       │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Network        │  │  Database       │  │  InvalidConfig          │ │
//! │  │  Http           │  │  StoreNot-      │  │  InvalidUrl             │ │
//! │  │  (retryable)    │  │  Initialized    │  │  (caller bug)           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  In every fan-out or batch context an error becomes ONE                │
//! │  SyncResult{success:false} record; it never unwinds the batch.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncOpResult<T> = Result<T, SyncError>;

/// Sync error type covering router, scheduler and api failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Network Errors
    // =========================================================================
    /// Transport-level failure (DNS, refused connection, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Response body did not match the expected shape.
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// The Durable Store was used before initialization.
    ///
    /// Kept distinct from other database errors because every other
    /// operation depends on it; surfaced immediately, never retried.
    #[error("Durable store is not initialized")]
    StoreNotInitialized,

    /// Durable Store operation failed.
    #[error("Database error: {0}")]
    Database(String),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// A policy or travel-mode config failed validation.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Invalid base or endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal sync layer error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<fleetline_db::DbError> for SyncError {
    fn from(err: fleetline_db::DbError) -> Self {
        match err {
            fleetline_db::DbError::NotInitialized => SyncError::StoreNotInitialized,
            other => SyncError::Database(other.to_string()),
        }
    }
}

impl From<fleetline_core::ValidationError> for SyncError {
    fn from(err: fleetline_core::ValidationError) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}

impl From<fleetline_core::CoreError> for SyncError {
    fn from(err: fleetline_core::CoreError) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Deserialization(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return SyncError::Http {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        if err.is_decode() {
            return SyncError::Deserialization(err.to_string());
        }
        SyncError::Network(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is transient and the operation may
    /// succeed on a later flush or background cycle.
    ///
    /// ## Retryable Errors
    /// - Transport failures (network issues)
    /// - Server-side errors (5xx)
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Client-side HTTP errors (4xx)
    /// - Uninitialized store
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("connection refused".into()).is_retryable());
        assert!(SyncError::Http { status: 503, url: "x".into() }.is_retryable());

        assert!(!SyncError::Http { status: 404, url: "x".into() }.is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::StoreNotInitialized.is_retryable());
    }

    #[test]
    fn test_not_initialized_stays_distinct() {
        let err: SyncError = fleetline_db::DbError::NotInitialized.into();
        assert!(matches!(err, SyncError::StoreNotInitialized));

        let err: SyncError = fleetline_db::DbError::PoolExhausted.into();
        assert!(matches!(err, SyncError::Database(_)));
    }
}
