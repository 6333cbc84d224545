//! # Remote Sync Gateway Contract
//!
//! The narrow contract through which the orchestrator consumes the actual
//! remote exchange. Implemented elsewhere (the transport layer of the
//! hosting application); this crate only calls it and interprets its
//! result records.
//!
//! ## Division of Labour
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Who Does What During a Sync                           │
//! │                                                                         │
//! │  SyncOrchestrator (this crate)        RemoteSyncGateway (external)     │
//! │  ──────────────────────────────       ───────────────────────────      │
//! │  • decides WHEN to sync               • builds payloads from the       │
//! │  • enforces single-in-flight            local store                    │
//! │  • enforces debounce + guards         • talks to the remote store      │
//! │  • snapshots unsynced ids             • resolves remote conflicts      │
//! │  • clears synced flags on success     • assigns remote ids             │
//! │                                                                         │
//! │  Every gateway call returns a SyncReport - the one tagged result       │
//! │  shape used across all sync-facing operations.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Result Records
// =============================================================================

/// Uniform result of every sync-facing operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Whether the exchange completed.
    pub success: bool,

    /// Human-readable outcome, for logs and the sync status screen.
    pub message: String,
}

impl SyncReport {
    /// A successful report.
    pub fn ok(message: impl Into<String>) -> Self {
        SyncReport {
            success: true,
            message: message.into(),
        }
    }

    /// A failed report.
    pub fn failure(message: impl Into<String>) -> Self {
        SyncReport {
            success: false,
            message: message.into(),
        }
    }
}

/// Remote-side view of the sync state, as reported by the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSyncStatus {
    /// When the last successful exchange completed.
    pub last_success: Option<DateTime<Utc>>,

    /// Message from the last exchange (success or failure).
    pub last_message: Option<String>,

    /// Whether the gateway itself is mid-exchange.
    pub in_progress: bool,
}

// =============================================================================
// Gateway Contract
// =============================================================================

/// The bidirectional exchange with the remote store.
///
/// Consumed, never implemented, by this crate (tests use doubles). All
/// methods are infallible at the type level: transport problems come back
/// as `success = false` reports, never as panics or crate errors.
#[async_trait]
pub trait RemoteSyncGateway: Send + Sync {
    /// Whether the gateway believes an exchange could currently succeed.
    async fn can_sync(&self) -> bool;

    /// Full bidirectional reconciliation of local and remote state.
    async fn sync_all_data(&self) -> SyncReport;

    /// One-directional push of ALL local data, bypassing reconciliation.
    async fn force_upload_all_data(&self) -> SyncReport;

    /// First-run restore: pull remote state into an empty local store.
    async fn restore_if_empty(&self) -> SyncReport;

    /// Clears the gateway's recorded sync state.
    async fn reset_sync_status(&self);

    /// The gateway's current status record.
    async fn sync_status(&self) -> RemoteSyncStatus;
}

// =============================================================================
// Unit Tests
// =============================================================================
