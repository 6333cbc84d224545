//! # Domain Types
//!
//! Core domain types used throughout Khata.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Client      │   │    Product      │   │   StockLevel    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  product_id     │       │
//! │  │  name (unique)  │   │  name (unique)  │   │  quantity ≥ 0   │       │
//! │  │  phone, address │   │  price, weight  │   │  (one row per   │       │
//! │  │  remote_id?     │   │  stock (cache)  │   │   product)      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Bill       │──►│    BillItem     │   │  LedgerEntry    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  client_id      │   │  bill_id        │   │  client_id      │       │
//! │  │  total_amount   │   │  product_id     │   │  bill_id?       │       │
//! │  │  paid_amount    │   │  quantity > 0   │   │  Bill | Payment │       │
//! │  │  carry_forward  │   │  price snapshot │   │  amount, note   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │  DemandBatch    │──►│     Demand      │                             │
//! │  │  ─────────────  │   │  ─────────────  │                             │
//! │  │  demand_date    │   │  batch_id       │                             │
//! │  │  closed (1-way) │   │  client_id      │                             │
//! │  │                 │   │  product_id     │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sync Bookkeeping Pattern
//! Every synced row carries a `synced` flag: cleared to false by every local
//! mutation, set to true only by the sync-completion path after the remote
//! store confirms persistence. Clients and products additionally carry a
//! `remote_id` assigned by the remote store on first successful upload.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Client
// =============================================================================

/// A customer with a running ledger balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Client {
    /// Unique identifier (UUID v4). Immutable once assigned.
    pub id: String,

    /// Display name. Unique across clients, enforced at insert.
    pub name: String,

    /// Contact phone number.
    pub phone: Option<String>,

    /// Postal address.
    pub address: Option<String>,

    /// Last local mutation time; used by the remote reconciliation process
    /// for change detection.
    pub updated_at: DateTime<Utc>,

    /// Identifier assigned by the remote store after first successful upload.
    pub remote_id: Option<String>,

    /// Cleared on every local mutation, set by the sync-completion path.
    pub synced: bool,
}

/// Input record for inserting a new client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClient {
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

// =============================================================================
// Product
// =============================================================================

/// A product that can be sold and demand-planned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name. Unique across products, enforced at insert.
    pub name: String,

    /// Unit weight in kilograms.
    pub weight_kg: f64,

    /// Unit price in paisa.
    pub price: Money,

    /// Denormalized stock cache. Must equal the stock row's quantity after
    /// any stock-affecting operation; an absent stock row means 0.
    pub stock: i64,

    /// Last local mutation time.
    pub updated_at: DateTime<Utc>,

    /// Identifier assigned by the remote store after first successful upload.
    pub remote_id: Option<String>,

    /// Cleared on every local mutation, set by the sync-completion path.
    pub synced: bool,
}

/// Input record for inserting a new product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub weight_kg: f64,
    pub price: Money,
}

// =============================================================================
// Stock
// =============================================================================

/// Current stock quantity for a product. One row per product; absence of a
/// row means zero on hand, not missing data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockLevel {
    pub product_id: String,

    /// Never negative. Decrements clamp at zero.
    pub quantity: i64,
}

// =============================================================================
// Bill
// =============================================================================

/// A bill issued to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Bill {
    pub id: String,

    pub client_id: String,

    /// Invariant: equals Σ quantity × price over the bill's current items
    /// after every mutating operation completes.
    pub total_amount: Money,

    /// Amount the client has paid against this bill.
    pub paid_amount: Money,

    /// Unpaid balance rolled in from the client's previous bill.
    pub carry_forward: Money,

    pub date: DateTime<Utc>,

    pub synced: bool,
}

impl Bill {
    /// Outstanding balance on this bill including the carried-in amount.
    #[inline]
    pub fn outstanding(&self) -> Money {
        self.total_amount + self.carry_forward - self.paid_amount
    }
}

/// Input record for creating or replacing a bill. The total is never part of
/// the input; the store computes it from the items so the invariant holds by
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBill {
    pub client_id: String,
    pub paid_amount: Money,
    pub carry_forward: Money,
    pub date: DateTime<Utc>,
}

// =============================================================================
// Bill Item
// =============================================================================

/// A line item on a bill.
/// The price is a snapshot at sale time, independent of later product price
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BillItem {
    pub id: String,
    pub bill_id: String,
    pub product_id: String,

    /// Quantity sold. Always > 0.
    pub quantity: i64,

    /// Unit price in paisa at time of sale (frozen).
    pub price: Money,

    pub updated_at: DateTime<Utc>,
    pub synced: bool,
}

impl BillItem {
    /// Line total (quantity × frozen price).
    #[inline]
    pub fn line_total(&self) -> Money {
        self.price.multiply_quantity(self.quantity)
    }
}

/// Input record for a bill line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBillItem {
    pub product_id: String,
    pub quantity: i64,
    /// Sale-time unit price snapshot.
    pub price: Money,
}

impl NewBillItem {
    /// Line total for this input row.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.price.multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Ledger Entry
// =============================================================================

/// The kind of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    /// A charge created from a bill. Exactly one per live bill; mirrors the
    /// bill's current total.
    Bill,
    /// A cash payment against the client's balance.
    Payment,
}

impl std::fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerEntryType::Bill => write!(f, "bill"),
            LedgerEntryType::Payment => write!(f, "payment"),
        }
    }
}

/// A financial record against a client's running balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LedgerEntry {
    pub id: String,
    pub client_id: String,

    /// Set for entries of type Bill; payments may or may not reference one.
    pub bill_id: Option<String>,

    pub entry_type: LedgerEntryType,

    /// Charge or payment amount in paisa.
    pub amount: Money,

    pub date: DateTime<Utc>,

    /// Free-form note; bill entries reference the originating bill id here.
    pub note: String,

    pub synced: bool,
}

/// Input record for a ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub client_id: String,
    pub bill_id: Option<String>,
    pub entry_type: LedgerEntryType,
    pub amount: Money,
    pub date: DateTime<Utc>,
    pub note: String,
}

// =============================================================================
// Demand Planning
// =============================================================================

/// A dated grouping of demand requests, closed once to commit its totals
/// into stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DemandBatch {
    pub id: String,

    /// The planning date. At most one open batch exists per date.
    pub demand_date: NaiveDate,

    /// One-way transition: once closed, the batch and its rows are terminal.
    pub closed: bool,

    pub synced: bool,
}

/// A single client's demand for a product within a batch.
/// Rows become immutable once their batch is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Demand {
    pub id: String,
    pub batch_id: String,
    pub client_id: String,
    pub product_id: String,

    /// Demanded quantity. Always > 0.
    pub quantity: i64,

    pub date: DateTime<Utc>,
    pub synced: bool,
}

/// Input record for a demand row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDemand {
    pub client_id: String,
    pub product_id: String,
    pub quantity: i64,
}

// =============================================================================
// Entity Kind
// =============================================================================

/// The seven row kinds that carry a `synced` flag.
///
/// Used by the sync bookkeeping layer to address tables generically
/// (unsynced listing, mark-synced, remote-id assignment) without a query
/// per entity type in the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Product,
    Bill,
    BillItem,
    LedgerEntry,
    DemandBatch,
    Demand,
}

impl EntityKind {
    /// All synced entity kinds, in upload order (parents before children so
    /// the remote store can resolve references).
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Client,
        EntityKind::Product,
        EntityKind::Bill,
        EntityKind::BillItem,
        EntityKind::LedgerEntry,
        EntityKind::DemandBatch,
        EntityKind::Demand,
    ];

    /// The SQLite table backing this kind.
    pub const fn table(&self) -> &'static str {
        match self {
            EntityKind::Client => "clients",
            EntityKind::Product => "products",
            EntityKind::Bill => "bills",
            EntityKind::BillItem => "bill_items",
            EntityKind::LedgerEntry => "ledger_entries",
            EntityKind::DemandBatch => "demand_batches",
            EntityKind::Demand => "demands",
        }
    }

    /// Whether rows of this kind carry a `remote_id` column.
    pub const fn has_remote_id(&self) -> bool {
        matches!(self, EntityKind::Client | EntityKind::Product)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_outstanding() {
        let bill = Bill {
            id: "b1".into(),
            client_id: "c1".into(),
            total_amount: Money::from_paisa(10_000),
            paid_amount: Money::from_paisa(4_000),
            carry_forward: Money::from_paisa(1_500),
            date: Utc::now(),
            synced: false,
        };
        assert_eq!(bill.outstanding().paisa(), 7_500);
    }

    #[test]
    fn test_bill_item_line_total() {
        let item = NewBillItem {
            product_id: "p1".into(),
            quantity: 4,
            price: Money::from_paisa(2_550),
        };
        assert_eq!(item.line_total().paisa(), 10_200);
    }

    #[test]
    fn test_entity_kind_tables() {
        assert_eq!(EntityKind::Client.table(), "clients");
        assert_eq!(EntityKind::LedgerEntry.table(), "ledger_entries");
        assert_eq!(EntityKind::ALL.len(), 7);
    }

    #[test]
    fn test_entity_kind_remote_id() {
        assert!(EntityKind::Client.has_remote_id());
        assert!(EntityKind::Product.has_remote_id());
        assert!(!EntityKind::Bill.has_remote_id());
        assert!(!EntityKind::Demand.has_remote_id());
    }

    #[test]
    fn test_ledger_entry_type_display() {
        assert_eq!(LedgerEntryType::Bill.to_string(), "bill");
        assert_eq!(LedgerEntryType::Payment.to_string(), "payment");
    }
}
