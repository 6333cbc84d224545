//! # Demand Repository
//!
//! Database operations for demand planning: dated batches of per-client
//! product demand, committed into stock when the batch closes.
//!
//! ## Batch Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Demand Batch Lifecycle                             │
//! │                                                                         │
//! │  1. OPEN                                                               │
//! │     └── open_batch(date) → find-or-create the open batch for a date   │
//! │         (at most one open batch per date, enforced by a partial       │
//! │          unique index AND by find-or-create)                          │
//! │                                                                         │
//! │  2. COLLECT                                                            │
//! │     └── insert_entry / update_entry_quantity / delete_entry            │
//! │         (every write checks the batch is still open)                   │
//! │                                                                         │
//! │  3. CLOSE (one-way, ONE TRANSACTION)                                   │
//! │     └── close_batch(id, create_next)                                   │
//! │         ├── Σ quantity per product  → stock += Σ                       │
//! │         ├── closed = 1  (no reopen operation exists)                   │
//! │         └── optionally find-or-create the next day's batch             │
//! │                                                                         │
//! │  A closed batch is terminal: inserts, edits, and re-closing are        │
//! │  rejected with BatchClosed, never silently applied.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Duration, NaiveDate, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::stock::apply_stock_delta;
use khata_core::validation::validate_quantity;
use khata_core::{Demand, DemandBatch, NewDemand};

/// Repository for demand-planning operations.
#[derive(Debug, Clone)]
pub struct DemandRepository {
    pool: SqlitePool,
}

impl DemandRepository {
    /// Creates a new DemandRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DemandRepository { pool }
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Finds the open batch for a date, creating one if none exists.
    ///
    /// Never creates a duplicate: if an open batch already exists for the
    /// date it is returned as-is.
    pub async fn open_batch(&self, demand_date: NaiveDate) -> DbResult<DemandBatch> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let batch = find_or_create_open_batch(&mut tx, demand_date).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(batch)
    }

    /// Gets a batch by ID.
    pub async fn get_batch(&self, id: &str) -> DbResult<Option<DemandBatch>> {
        let batch = sqlx::query_as::<_, DemandBatch>(
            "SELECT id, demand_date, closed, synced FROM demand_batches WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(batch)
    }

    /// Lists all batches, most recent date first.
    pub async fn list_batches(&self) -> DbResult<Vec<DemandBatch>> {
        let batches = sqlx::query_as::<_, DemandBatch>(
            "SELECT id, demand_date, closed, synced FROM demand_batches ORDER BY demand_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(batches)
    }

    /// Closes a batch, committing its aggregated demand into stock.
    ///
    /// ## What This Does (single transaction)
    /// 1. Rejects if the batch is already closed (one-way transition)
    /// 2. Aggregates total demanded quantity per product within the batch
    /// 3. Increments each product's stock by its total (increments are
    ///    always non-negative, no floor needed)
    /// 4. Marks the batch closed
    /// 5. If `create_next_period`, finds-or-creates the next day's open
    ///    batch and returns it
    pub async fn close_batch(
        &self,
        batch_id: &str,
        create_next_period: bool,
    ) -> DbResult<Option<DemandBatch>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let batch = sqlx::query_as::<_, DemandBatch>(
            "SELECT id, demand_date, closed, synced FROM demand_batches WHERE id = ?1",
        )
        .bind(batch_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("DemandBatch", batch_id))?;

        if batch.closed {
            return Err(DbError::BatchClosed(batch_id.to_string()));
        }

        let totals: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT product_id, SUM(quantity)
            FROM demands
            WHERE batch_id = ?1
            GROUP BY product_id
            "#,
        )
        .bind(batch_id)
        .fetch_all(&mut *tx)
        .await?;

        info!(
            batch_id,
            products = totals.len(),
            "Closing demand batch into stock"
        );

        for (product_id, total) in &totals {
            apply_stock_delta(&mut tx, product_id, *total).await?;
        }

        sqlx::query(
            r#"
            UPDATE demand_batches SET closed = 1, synced = 0
            WHERE id = ?1 AND closed = 0
            "#,
        )
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

        let next = if create_next_period {
            let next_date = batch.demand_date + Duration::days(1);
            Some(find_or_create_open_batch(&mut tx, next_date).await?)
        } else {
            None
        };

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(next)
    }

    // =========================================================================
    // Demand Rows
    // =========================================================================

    /// Inserts a demand row into an open batch.
    ///
    /// Rejected with [`DbError::BatchClosed`] once the batch has closed.
    pub async fn insert_entry(&self, batch_id: &str, new: NewDemand) -> DbResult<Demand> {
        validate_quantity(new.quantity)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        ensure_batch_open(&mut tx, batch_id).await?;

        let demand = Demand {
            id: Uuid::new_v4().to_string(),
            batch_id: batch_id.to_string(),
            client_id: new.client_id,
            product_id: new.product_id,
            quantity: new.quantity,
            date: Utc::now(),
            synced: false,
        };

        debug!(id = %demand.id, batch_id, quantity = demand.quantity, "Inserting demand row");

        sqlx::query(
            r#"
            INSERT INTO demands (id, batch_id, client_id, product_id, quantity, date, synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
            "#,
        )
        .bind(&demand.id)
        .bind(&demand.batch_id)
        .bind(&demand.client_id)
        .bind(&demand.product_id)
        .bind(demand.quantity)
        .bind(demand.date)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(demand)
    }

    /// Changes a demand row's quantity while its batch is still open.
    pub async fn update_entry_quantity(&self, demand_id: &str, quantity: i64) -> DbResult<()> {
        validate_quantity(quantity)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let batch_id = batch_of_entry(&mut tx, demand_id).await?;
        ensure_batch_open(&mut tx, &batch_id).await?;

        sqlx::query("UPDATE demands SET quantity = ?2, synced = 0 WHERE id = ?1")
            .bind(demand_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    /// Deletes a demand row while its batch is still open.
    pub async fn delete_entry(&self, demand_id: &str) -> DbResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let batch_id = batch_of_entry(&mut tx, demand_id).await?;
        ensure_batch_open(&mut tx, &batch_id).await?;

        sqlx::query("DELETE FROM demands WHERE id = ?1")
            .bind(demand_id)
            .execute(&mut *tx)
            .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(())
    }

    /// Lists a batch's demand rows in insertion order.
    pub async fn list_entries(&self, batch_id: &str) -> DbResult<Vec<Demand>> {
        let entries = sqlx::query_as::<_, Demand>(
            r#"
            SELECT id, batch_id, client_id, product_id, quantity, date, synced
            FROM demands
            WHERE batch_id = ?1
            ORDER BY date
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Lists batches awaiting upload (synced = false).
    pub async fn list_unsynced_batches(&self) -> DbResult<Vec<DemandBatch>> {
        let batches = sqlx::query_as::<_, DemandBatch>(
            "SELECT id, demand_date, closed, synced FROM demand_batches WHERE synced = 0
             ORDER BY demand_date",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(batches)
    }

    /// Lists demand rows awaiting upload (synced = false).
    pub async fn list_unsynced_entries(&self) -> DbResult<Vec<Demand>> {
        let entries = sqlx::query_as::<_, Demand>(
            r#"
            SELECT id, batch_id, client_id, product_id, quantity, date, synced
            FROM demands
            WHERE synced = 0
            ORDER BY date
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

/// Returns the open batch for a date, inserting one if absent.
async fn find_or_create_open_batch(
    conn: &mut SqliteConnection,
    demand_date: NaiveDate,
) -> DbResult<DemandBatch> {
    let existing = sqlx::query_as::<_, DemandBatch>(
        "SELECT id, demand_date, closed, synced FROM demand_batches
         WHERE demand_date = ?1 AND closed = 0",
    )
    .bind(demand_date)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(batch) = existing {
        debug!(batch_id = %batch.id, %demand_date, "Reusing open batch");
        return Ok(batch);
    }

    let batch = DemandBatch {
        id: Uuid::new_v4().to_string(),
        demand_date,
        closed: false,
        synced: false,
    };

    debug!(batch_id = %batch.id, %demand_date, "Creating open batch");

    sqlx::query(
        "INSERT INTO demand_batches (id, demand_date, closed, synced) VALUES (?1, ?2, 0, 0)",
    )
    .bind(&batch.id)
    .bind(batch.demand_date)
    .execute(conn)
    .await?;

    Ok(batch)
}

/// Errors with [`DbError::BatchClosed`] unless the batch exists and is open.
async fn ensure_batch_open(conn: &mut SqliteConnection, batch_id: &str) -> DbResult<()> {
    let closed: Option<bool> =
        sqlx::query_scalar("SELECT closed FROM demand_batches WHERE id = ?1")
            .bind(batch_id)
            .fetch_optional(&mut *conn)
            .await?;

    match closed {
        None => Err(DbError::not_found("DemandBatch", batch_id)),
        Some(true) => Err(DbError::BatchClosed(batch_id.to_string())),
        Some(false) => Ok(()),
    }
}

/// Resolves the batch owning a demand row.
async fn batch_of_entry(conn: &mut SqliteConnection, demand_id: &str) -> DbResult<String> {
    sqlx::query_scalar("SELECT batch_id FROM demands WHERE id = ?1")
        .bind(demand_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found("Demand", demand_id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use crate::error::DbError;
    use crate::pool::{Database, DbConfig};
    use khata_core::{Money, NewClient, NewDemand, NewProduct};

    struct Fixture {
        db: Database,
        client_id: String,
        product_a: String,
        product_b: String,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let client = db
            .clients()
            .insert(NewClient {
                name: "Madina Store".to_string(),
                phone: None,
                address: None,
            })
            .await
            .unwrap();

        let mut ids = Vec::new();
        for name in ["Milk 1L", "Yogurt 500g"] {
            let product = db
                .products()
                .insert(NewProduct {
                    name: name.to_string(),
                    weight_kg: 1.0,
                    price: Money::from_paisa(25_000),
                })
                .await
                .unwrap();
            ids.push(product.id);
        }

        Fixture {
            db,
            client_id: client.id,
            product_b: ids.pop().unwrap(),
            product_a: ids.pop().unwrap(),
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn demand(f: &Fixture, product_id: &str, quantity: i64) -> NewDemand {
        NewDemand {
            client_id: f.client_id.clone(),
            product_id: product_id.to_string(),
            quantity,
        }
    }

    #[tokio::test]
    async fn open_batch_is_find_or_create() {
        let f = fixture().await;

        let first = f.db.demand().open_batch(date("2026-03-01")).await.unwrap();
        let second = f.db.demand().open_batch(date("2026-03-01")).await.unwrap();
        assert_eq!(first.id, second.id);

        let other_day = f.db.demand().open_batch(date("2026-03-02")).await.unwrap();
        assert_ne!(first.id, other_day.id);
    }

    #[tokio::test]
    async fn close_batch_aggregates_into_stock() {
        let f = fixture().await;
        let batch = f.db.demand().open_batch(date("2026-03-01")).await.unwrap();

        // productA: 10 + 5 = 15, productB: 7.
        f.db.demand()
            .insert_entry(&batch.id, demand(&f, &f.product_a, 10))
            .await
            .unwrap();
        f.db.demand()
            .insert_entry(&batch.id, demand(&f, &f.product_a, 5))
            .await
            .unwrap();
        f.db.demand()
            .insert_entry(&batch.id, demand(&f, &f.product_b, 7))
            .await
            .unwrap();

        f.db.demand().close_batch(&batch.id, false).await.unwrap();

        assert_eq!(f.db.stock().get(&f.product_a).await.unwrap(), 15);
        assert_eq!(f.db.stock().get(&f.product_b).await.unwrap(), 7);

        let closed = f.db.demand().get_batch(&batch.id).await.unwrap().unwrap();
        assert!(closed.closed);
    }

    #[tokio::test]
    async fn closed_batch_is_terminal() {
        let f = fixture().await;
        let batch = f.db.demand().open_batch(date("2026-03-01")).await.unwrap();
        let entry = f
            .db
            .demand()
            .insert_entry(&batch.id, demand(&f, &f.product_a, 3))
            .await
            .unwrap();

        f.db.demand().close_batch(&batch.id, false).await.unwrap();

        // Inserts are rejected.
        let insert = f
            .db
            .demand()
            .insert_entry(&batch.id, demand(&f, &f.product_b, 1))
            .await;
        assert!(matches!(insert, Err(DbError::BatchClosed(_))));

        // Edits and deletes of existing rows are rejected.
        let update = f.db.demand().update_entry_quantity(&entry.id, 9).await;
        assert!(matches!(update, Err(DbError::BatchClosed(_))));
        let delete = f.db.demand().delete_entry(&entry.id).await;
        assert!(matches!(delete, Err(DbError::BatchClosed(_))));

        // Re-closing is rejected too.
        let reclose = f.db.demand().close_batch(&batch.id, false).await;
        assert!(matches!(reclose, Err(DbError::BatchClosed(_))));

        // And nothing was double-committed into stock.
        assert_eq!(f.db.stock().get(&f.product_a).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn close_batch_creates_next_period() {
        let f = fixture().await;
        let batch = f.db.demand().open_batch(date("2026-03-01")).await.unwrap();

        let next = f
            .db
            .demand()
            .close_batch(&batch.id, true)
            .await
            .unwrap()
            .expect("next batch requested");

        assert_eq!(next.demand_date, date("2026-03-02"));
        assert!(!next.closed);
    }

    #[tokio::test]
    async fn close_batch_reuses_existing_next_period() {
        let f = fixture().await;
        let batch = f.db.demand().open_batch(date("2026-03-01")).await.unwrap();
        let tomorrow = f.db.demand().open_batch(date("2026-03-02")).await.unwrap();

        let next = f
            .db
            .demand()
            .close_batch(&batch.id, true)
            .await
            .unwrap()
            .unwrap();

        // Reused, not duplicated.
        assert_eq!(next.id, tomorrow.id);
        let batches = f.db.demand().list_batches().await.unwrap();
        assert_eq!(batches.len(), 2);
    }

    #[tokio::test]
    async fn entry_updates_while_open() {
        let f = fixture().await;
        let batch = f.db.demand().open_batch(date("2026-03-01")).await.unwrap();
        let entry = f
            .db
            .demand()
            .insert_entry(&batch.id, demand(&f, &f.product_a, 3))
            .await
            .unwrap();

        f.db.demand().update_entry_quantity(&entry.id, 8).await.unwrap();
        let entries = f.db.demand().list_entries(&batch.id).await.unwrap();
        assert_eq!(entries[0].quantity, 8);

        f.db.demand().delete_entry(&entry.id).await.unwrap();
        assert!(f.db.demand().list_entries(&batch.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_quantity_rejected() {
        let f = fixture().await;
        let batch = f.db.demand().open_batch(date("2026-03-01")).await.unwrap();

        let result = f
            .db
            .demand()
            .insert_entry(&batch.id, demand(&f, &f.product_a, 0))
            .await;
        assert!(matches!(result, Err(DbError::Validation(_))));
    }
}
