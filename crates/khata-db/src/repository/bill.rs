//! # Bill Repository
//!
//! Database operations for bills and their line items, including the
//! composite write operations that keep bills, items, stock, and the
//! ledger mutually consistent.
//!
//! ## Composite Write Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              create_bill_with_items (ONE TRANSACTION)                   │
//! │                                                                         │
//! │  1. INSERT INTO bills          (total = Σ quantity × price)            │
//! │  2. For each item:                                                     │
//! │     a. INSERT INTO bill_items  (price = sale-time snapshot)            │
//! │     b. stock = max(0, stock - quantity)   ← clamp, never reject        │
//! │  3. INSERT INTO ledger_entries (type 'bill', amount = total,           │
//! │                                 note references the bill id)           │
//! │                                                                         │
//! │  COMMIT ← all of it or none of it. A failure at ANY step rolls back    │
//! │  the bill, every item, every stock decrement, and the ledger entry.    │
//! │  No other operation ever observes the intermediate state.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Total Invariant
//! `bills.total_amount` always equals the exact sum of
//! `quantity × price` over the bill's current items. The total is never
//! accepted from the caller; every composite operation recomputes it, so
//! the invariant holds by construction.

use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::stock::apply_stock_delta;
use khata_core::validation::{validate_amount, validate_quantity};
use khata_core::{Bill, BillItem, Money, NewBill, NewBillItem};

/// Repository for bill database operations.
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: SqlitePool,
}

impl BillRepository {
    /// Creates a new BillRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BillRepository { pool }
    }

    // =========================================================================
    // Composite Operations
    // =========================================================================

    /// Creates a bill together with its items, stock decrements, and ledger
    /// entry, atomically.
    ///
    /// ## What This Does (single transaction)
    /// 1. Inserts the bill row with `total = Σ quantity × price`
    /// 2. Inserts each item and decrements that product's stock by the
    ///    item's quantity, floored at zero
    /// 3. Appends exactly one ledger entry of type `bill` mirroring the
    ///    total, with a note referencing the new bill's id
    pub async fn create_bill_with_items(
        &self,
        new: NewBill,
        items: &[NewBillItem],
    ) -> DbResult<Bill> {
        validate_items(items)?;
        validate_amount("paid_amount", new.paid_amount)?;
        validate_amount("carry_forward", new.carry_forward)?;

        let total = Money::sum(items.iter().map(NewBillItem::line_total));

        let bill = Bill {
            id: Uuid::new_v4().to_string(),
            client_id: new.client_id,
            total_amount: total,
            paid_amount: new.paid_amount,
            carry_forward: new.carry_forward,
            date: new.date,
            synced: false,
        };

        debug!(id = %bill.id, client_id = %bill.client_id, total = %total, "Creating bill");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO bills (id, client_id, total_amount, paid_amount, carry_forward, date, synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
            "#,
        )
        .bind(&bill.id)
        .bind(&bill.client_id)
        .bind(bill.total_amount)
        .bind(bill.paid_amount)
        .bind(bill.carry_forward)
        .bind(bill.date)
        .execute(&mut *tx)
        .await?;

        for item in items {
            insert_item_row(&mut tx, &bill.id, item).await?;
            apply_stock_delta(&mut tx, &item.product_id, -item.quantity).await?;
        }

        mirror_ledger_entry(&mut tx, &bill).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(bill)
    }

    /// Replaces a bill's fields and its entire item list, atomically.
    ///
    /// ## What This Does (single transaction)
    /// 1. Updates the bill row (total recomputed from the replacement items)
    /// 2. Deletes all existing items for the bill
    /// 3. Inserts the replacement items
    /// 4. Upserts the bill-type ledger entry so it mirrors the new total
    ///
    /// ## Stock Caveat
    /// No stock re-adjustment is performed for the replaced items. A caller
    /// that needs stock correctness on edit uses
    /// [`BillRepository::adjust_item_quantity`] instead.
    pub async fn update_bill_with_items(
        &self,
        bill_id: &str,
        new: NewBill,
        items: &[NewBillItem],
    ) -> DbResult<Bill> {
        validate_items(items)?;
        validate_amount("paid_amount", new.paid_amount)?;
        validate_amount("carry_forward", new.carry_forward)?;

        let total = Money::sum(items.iter().map(NewBillItem::line_total));

        let bill = Bill {
            id: bill_id.to_string(),
            client_id: new.client_id,
            total_amount: total,
            paid_amount: new.paid_amount,
            carry_forward: new.carry_forward,
            date: new.date,
            synced: false,
        };

        debug!(id = %bill.id, total = %total, "Updating bill with replacement items");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE bills SET
                client_id = ?2,
                total_amount = ?3,
                paid_amount = ?4,
                carry_forward = ?5,
                date = ?6,
                synced = 0
            WHERE id = ?1
            "#,
        )
        .bind(&bill.id)
        .bind(&bill.client_id)
        .bind(bill.total_amount)
        .bind(bill.paid_amount)
        .bind(bill.carry_forward)
        .bind(bill.date)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Bill", bill_id));
        }

        sqlx::query("DELETE FROM bill_items WHERE bill_id = ?1")
            .bind(bill_id)
            .execute(&mut *tx)
            .await?;

        for item in items {
            insert_item_row(&mut tx, &bill.id, item).await?;
        }

        mirror_ledger_entry(&mut tx, &bill).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(bill)
    }

    /// Changes a single item's quantity with stock correction, atomically.
    ///
    /// ## What This Does (single transaction)
    /// 1. Reads the item's old quantity and product
    /// 2. Applies a stock delta of `old − new`, floored at zero
    ///    (shrinking a sale returns stock, growing it takes more)
    /// 3. Updates the item's quantity
    /// 4. Recomputes the parent bill's total as the exact
    ///    Σ quantity × price over its current items
    /// 5. Re-mirrors the bill-type ledger entry to the new total
    ///
    /// ## Returns
    /// The parent bill with its recomputed total.
    pub async fn adjust_item_quantity(&self, item_id: &str, new_quantity: i64) -> DbResult<Bill> {
        validate_quantity(new_quantity)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let item = sqlx::query_as::<_, BillItem>(
            r#"
            SELECT id, bill_id, product_id, quantity, price, updated_at, synced
            FROM bill_items
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("BillItem", item_id))?;

        debug!(
            item_id,
            old_quantity = item.quantity,
            new_quantity,
            "Adjusting bill item quantity"
        );

        apply_stock_delta(&mut tx, &item.product_id, item.quantity - new_quantity).await?;

        sqlx::query(
            r#"
            UPDATE bill_items SET
                quantity = ?2,
                updated_at = ?3,
                synced = 0
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .bind(new_quantity)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity * price), 0) FROM bill_items WHERE bill_id = ?1",
        )
        .bind(&item.bill_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE bills SET
                total_amount = ?2,
                synced = 0
            WHERE id = ?1
            "#,
        )
        .bind(&item.bill_id)
        .bind(total)
        .execute(&mut *tx)
        .await?;

        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, client_id, total_amount, paid_amount, carry_forward, date, synced
            FROM bills
            WHERE id = ?1
            "#,
        )
        .bind(&item.bill_id)
        .fetch_one(&mut *tx)
        .await?;

        mirror_ledger_entry(&mut tx, &bill).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(bill)
    }

    /// Deletes a bill with its items and its bill-type ledger entry,
    /// atomically. Payment entries referencing the bill keep their history
    /// but lose the reference.
    pub async fn delete(&self, bill_id: &str) -> DbResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE ledger_entries SET bill_id = NULL, synced = 0
            WHERE bill_id = ?1 AND entry_type = 'payment'
            "#,
        )
        .bind(bill_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM ledger_entries WHERE bill_id = ?1 AND entry_type = 'bill'")
            .bind(bill_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM bill_items WHERE bill_id = ?1")
            .bind(bill_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM bills WHERE id = ?1")
            .bind(bill_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Bill", bill_id));
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a bill by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Bill>> {
        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, client_id, total_amount, paid_amount, carry_forward, date, synced
            FROM bills
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(bill)
    }

    /// Lists a client's bills, most recent first.
    pub async fn list_for_client(&self, client_id: &str) -> DbResult<Vec<Bill>> {
        let bills = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, client_id, total_amount, paid_amount, carry_forward, date, synced
            FROM bills
            WHERE client_id = ?1
            ORDER BY date DESC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bills)
    }

    /// Gets all items for a bill.
    pub async fn get_items(&self, bill_id: &str) -> DbResult<Vec<BillItem>> {
        let items = sqlx::query_as::<_, BillItem>(
            r#"
            SELECT id, bill_id, product_id, quantity, price, updated_at, synced
            FROM bill_items
            WHERE bill_id = ?1
            ORDER BY updated_at
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Gets a single bill item.
    pub async fn get_item(&self, item_id: &str) -> DbResult<Option<BillItem>> {
        let item = sqlx::query_as::<_, BillItem>(
            r#"
            SELECT id, bill_id, product_id, quantity, price, updated_at, synced
            FROM bill_items
            WHERE id = ?1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// Lists bills awaiting upload (synced = false).
    pub async fn list_unsynced(&self) -> DbResult<Vec<Bill>> {
        let bills = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, client_id, total_amount, paid_amount, carry_forward, date, synced
            FROM bills
            WHERE synced = 0
            ORDER BY date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(bills)
    }

    /// Lists bill items awaiting upload (synced = false).
    pub async fn list_unsynced_items(&self) -> DbResult<Vec<BillItem>> {
        let items = sqlx::query_as::<_, BillItem>(
            r#"
            SELECT id, bill_id, product_id, quantity, price, updated_at, synced
            FROM bill_items
            WHERE synced = 0
            ORDER BY updated_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Validates a bill's item list before any store write is attempted.
fn validate_items(items: &[NewBillItem]) -> DbResult<()> {
    for item in items {
        validate_quantity(item.quantity)?;
        validate_amount("price", item.price)?;
    }
    Ok(())
}

/// Inserts one item row on the caller's transaction.
async fn insert_item_row(
    conn: &mut SqliteConnection,
    bill_id: &str,
    item: &NewBillItem,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO bill_items (id, bill_id, product_id, quantity, price, updated_at, synced)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(bill_id)
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.price)
    .bind(Utc::now())
    .execute(conn)
    .await?;

    Ok(())
}

/// Upserts the bill-type ledger entry so it mirrors the bill's current
/// total. Exactly one such entry exists per live bill.
async fn mirror_ledger_entry(conn: &mut SqliteConnection, bill: &Bill) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE ledger_entries SET
            client_id = ?2,
            amount = ?3,
            date = ?4,
            synced = 0
        WHERE bill_id = ?1 AND entry_type = 'bill'
        "#,
    )
    .bind(&bill.id)
    .bind(&bill.client_id)
    .bind(bill.total_amount)
    .bind(bill.date)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, client_id, bill_id, entry_type, amount, date, note, synced)
            VALUES (?1, ?2, ?3, 'bill', ?4, ?5, ?6, 0)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&bill.client_id)
        .bind(&bill.id)
        .bind(bill.total_amount)
        .bind(bill.date)
        .bind(format!("Bill {}", bill.id))
        .execute(conn)
        .await?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
