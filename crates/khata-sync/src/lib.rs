//! # khata-sync: Sync Orchestrator for Khata
//!
//! This crate decides **when** the local store reconciles with the remote
//! store, and under what guard conditions. The actual exchange lives behind
//! the [`gateway::RemoteSyncGateway`] contract.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Khata Sync Layer                                  │
//! │                                                                         │
//! │  Timer ──────┐                                                         │
//! │  Network ────┤   ┌──────────────────────────┐   ┌──────────────────┐  │
//! │  observer    ├──►│     SyncOrchestrator     │──►│ RemoteSyncGateway│  │
//! │  Auth ───────┤   │                          │   │    (external)    │  │
//! │  provider    │   │  Idle ⇄ Syncing          │   └──────────────────┘  │
//! │  Manual ─────┘   │  debounce + guards       │                          │
//! │                  │  single in flight        │   ┌──────────────────┐  │
//! │                  │  snapshot → mark synced  │──►│     khata-db     │  │
//! │                  └──────────────────────────┘   │  (sync state)    │  │
//! │                                                 └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`orchestrator`] - The Idle/Syncing state machine, triggers, lifecycle
//! - [`gateway`] - External contract for the remote exchange
//! - [`observer`] - External contracts for connectivity and auth state
//! - [`config`] - Timing configuration (intervals, debounce, settle delays)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use khata_sync::{SyncConfig, SyncOrchestrator};
//!
//! let mut orchestrator = SyncOrchestrator::new(
//!     SyncConfig::load_or_default(None),
//!     db,
//!     gateway,   // Arc<dyn RemoteSyncGateway>
//!     network,   // Arc<dyn NetworkObserver>
//!     auth,      // Arc<dyn AuthProvider>
//! );
//!
//! orchestrator.restore_if_empty().await;  // first run only
//! orchestrator.start()?;                  // periodic + event triggers
//! // ...
//! orchestrator.sync_now().await;          // manual trigger
//! orchestrator.dispose();                 // idempotent shutdown
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod gateway;
pub mod observer;
pub mod orchestrator;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use gateway::{RemoteSyncGateway, RemoteSyncStatus, SyncReport};
pub use observer::{AuthProvider, AuthState, NetworkObserver, NetworkState};
pub use orchestrator::{
    OrchestratorStatus, SkipReason, SyncAttempt, SyncOrchestrator, SyncState, SyncTrigger,
};
