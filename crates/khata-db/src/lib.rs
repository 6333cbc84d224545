//! # khata-db: Local Store for Khata
//!
//! This crate provides the offline-first local store for the Khata ledger.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Khata Data Flow                                 │
//! │                                                                         │
//! │  Business operation (create bill, record payment, close batch)        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     khata-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │SchemaManager │  │   │
//! │  │   │   (pool.rs)   │    │ (client, bill,│    │ (schema.rs)  │  │   │
//! │  │   │               │    │  demand, ...) │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ CRUD + atomic │    │ user_version │  │   │
//! │  │   │ WAL, FK on    │    │ composite ops │    │ 0 → 11       │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (single device, single writer per aggregate)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`schema`] - Versioned, additive-only schema upgrades
//! - [`error`] - Local store error types
//! - [`repository`] - Repository implementations per entity
//!
//! ## Usage
//!
//! ```rust,ignore
//! use khata_db::{Database, DbConfig};
//!
//! // Create store with default config (runs schema upgrades)
//! let db = Database::new(DbConfig::new("path/to/khata.db")).await?;
//!
//! // Composite write: bill + items + stock + ledger, atomically
//! let bill = db.bills().create_bill_with_items(new_bill, &items).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod pool;
pub mod repository;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use schema::CURRENT_VERSION;

// Repository re-exports for convenience
pub use repository::bill::BillRepository;
pub use repository::client::ClientRepository;
pub use repository::demand::DemandRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::product::ProductRepository;
pub use repository::stock::StockRepository;
pub use repository::sync_state::SyncStateRepository;
