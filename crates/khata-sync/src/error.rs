//! # Sync Error Types
//!
//! Error types for sync orchestration.
//!
//! ## Errors vs Expected Short-Circuits
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Two Different "Didn't Sync" Shapes                    │
//! │                                                                         │
//! │  SyncError (this module)          SkipReason (orchestrator module)     │
//! │  ────────────────────────         ──────────────────────────────       │
//! │  Something went WRONG:            Nothing went wrong:                  │
//! │  • bad configuration              • device is offline                  │
//! │  • orchestrator misuse            • nobody is logged in                │
//! │  • local store failure            • a sync is already in flight        │
//! │                                   • debounce window still open         │
//! │                                                                         │
//! │  Callers treating a skip as a failure would retry-loop on a device     │
//! │  that is simply offline - keeping them apart is the point.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Gateway failures are not a variant here either: the gateway reports them
//! inside [`crate::gateway::SyncReport`] and the orchestrator records them
//! without retrying (the next natural trigger re-evaluates).

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync orchestration errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// `start()` called on an orchestrator whose triggers are already
    /// running. Dispose first.
    #[error("Sync orchestrator already started")]
    AlreadyStarted,

    /// Local store operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<khata_db::DbError> for SyncError {
    fn from(err: khata_db::DbError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::InvalidConfig("sync_interval_secs must be > 0".into());
        assert!(err.to_string().contains("sync_interval_secs"));

        assert_eq!(
            SyncError::AlreadyStarted.to_string(),
            "Sync orchestrator already started"
        );
    }

    #[test]
    fn test_db_error_conversion() {
        let db_err = khata_db::DbError::PoolExhausted;
        let sync_err: SyncError = db_err.into();
        assert!(matches!(sync_err, SyncError::Database(_)));
    }
}
