//! # Repository Module
//!
//! Repository implementations for the Khata local store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  Business operation                                                    │
//! │       │                                                                 │
//! │       │  db.bills().create_bill_with_items(bill, items)                │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  BillRepository                                                        │
//! │  ├── create_bill_with_items(bill, items)   ← one transaction          │
//! │  ├── update_bill_with_items(id, bill, items)                           │
//! │  ├── adjust_item_quantity(item_id, qty)                                │
//! │  └── get_by_id / list_for_client / delete                              │
//! │       │                                                                 │
//! │       │  SQL                                                            │
//! │       ▼                                                                 │
//! │  SQLite (transaction isolation = the atomicity boundary)               │
//! │                                                                         │
//! │  Every local mutation clears the row's synced flag; only the sync     │
//! │  completion path sets it back.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`client::ClientRepository`] - Client CRUD
//! - [`product::ProductRepository`] - Product CRUD (stock cache included)
//! - [`stock::StockRepository`] - Clamped stock accessors
//! - [`bill::BillRepository`] - Bills, items, and the composite operations
//! - [`ledger::LedgerRepository`] - Ledger entries and balances
//! - [`demand::DemandRepository`] - Demand batches and rows
//! - [`sync_state::SyncStateRepository`] - Unsynced bookkeeping

pub mod bill;
pub mod client;
pub mod demand;
pub mod ledger;
pub mod product;
pub mod stock;
pub mod sync_state;
