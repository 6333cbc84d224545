//! # Stock Repository
//!
//! Clamped stock accessors and the single write path for stock changes.
//!
//! ## Clamp-At-Zero Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Stock Write Discipline                                 │
//! │                                                                         │
//! │  new_quantity = max(0, current + delta)                                │
//! │                                                                         │
//! │  • quantity never goes negative, no matter how aggressive concurrent   │
//! │    decrements are                                                       │
//! │  • overselling is silently absorbed, NOT rejected - the original       │
//! │    system's deliberate leniency (a shopkeeper's hand count beats the   │
//! │    ledger's)                                                            │
//! │  • absence of a stock row reads as 0, never as an error                │
//! │                                                                         │
//! │  Every write also refreshes products.stock so the denormalized cache   │
//! │  equals stock.quantity inside the same transaction.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use khata_core::StockLevel;

/// Repository for stock operations.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Returns the current quantity for a product, or 0 when no stock row
    /// exists (absence means zero, not error).
    pub async fn get(&self, product_id: &str) -> DbResult<i64> {
        let quantity: Option<i64> =
            sqlx::query_scalar("SELECT quantity FROM stock WHERE product_id = ?1")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(quantity.unwrap_or(0))
    }

    /// Lists all stock rows, for stocktaking screens.
    pub async fn list(&self) -> DbResult<Vec<StockLevel>> {
        let levels = sqlx::query_as::<_, StockLevel>(
            "SELECT product_id, quantity FROM stock ORDER BY product_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(levels)
    }

    /// Sets a product's quantity, clamped to a minimum of 0.
    ///
    /// ## Returns
    /// The persisted quantity after clamping.
    pub async fn set(&self, product_id: &str, quantity: i64) -> DbResult<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let clamped = quantity.max(0);
        write_stock(&mut tx, product_id, clamped).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(clamped)
    }

    /// Applies a delta to a product's quantity, clamped to a minimum of 0.
    ///
    /// ## Returns
    /// The persisted quantity after clamping.
    pub async fn adjust(&self, product_id: &str, delta: i64) -> DbResult<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let new_quantity = apply_stock_delta(&mut tx, product_id, delta).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Ok(new_quantity)
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================
// These run on the caller's connection so composite operations (bill
// creation, batch close) move stock inside their own transaction scope.

/// Applies `delta` to a product's stock, clamped at zero, and returns the
/// new quantity.
pub(crate) async fn apply_stock_delta(
    conn: &mut SqliteConnection,
    product_id: &str,
    delta: i64,
) -> DbResult<i64> {
    let current: Option<i64> =
        sqlx::query_scalar("SELECT quantity FROM stock WHERE product_id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await?;

    let new_quantity = (current.unwrap_or(0) + delta).max(0);

    debug!(
        product_id,
        delta,
        new_quantity,
        "Applying stock delta"
    );

    write_stock(conn, product_id, new_quantity).await?;

    Ok(new_quantity)
}

/// Upserts the stock row and refreshes the product's denormalized cache.
async fn write_stock(
    conn: &mut SqliteConnection,
    product_id: &str,
    quantity: i64,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock (product_id, quantity)
        VALUES (?1, ?2)
        ON CONFLICT(product_id) DO UPDATE SET quantity = excluded.quantity
        "#,
    )
    .bind(product_id)
    .bind(quantity)
    .execute(&mut *conn)
    .await?;

    // Keep the cache equal to the stock row; a stock move is a product
    // change as far as the remote store is concerned.
    let result = sqlx::query(
        r#"
        UPDATE products SET
            stock = ?2,
            updated_at = ?3,
            synced = 0
        WHERE id = ?1
        "#,
    )
    .bind(product_id)
    .bind(quantity)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Product", product_id));
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use khata_core::{Money, NewProduct};

    async fn db_with_product() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .insert(NewProduct {
                name: "Flour 10kg".to_string(),
                weight_kg: 10.0,
                price: Money::from_paisa(120_000),
            })
            .await
            .unwrap();
        (db, product.id)
    }

    #[tokio::test]
    async fn absent_row_reads_as_zero() {
        let (db, product_id) = db_with_product().await;
        assert_eq!(db.stock().get(&product_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn set_and_adjust() {
        let (db, product_id) = db_with_product().await;

        assert_eq!(db.stock().set(&product_id, 50).await.unwrap(), 50);
        assert_eq!(db.stock().adjust(&product_id, -20).await.unwrap(), 30);
        assert_eq!(db.stock().adjust(&product_id, 5).await.unwrap(), 35);
        assert_eq!(db.stock().get(&product_id).await.unwrap(), 35);
    }

    #[tokio::test]
    async fn quantity_never_negative() {
        let (db, product_id) = db_with_product().await;

        db.stock().set(&product_id, 10).await.unwrap();

        // Any sequence of adjustments keeps quantity >= 0.
        for delta in [-4, -100, 3, -7, -1] {
            let quantity = db.stock().adjust(&product_id, delta).await.unwrap();
            assert!(quantity >= 0, "quantity went negative on delta {}", delta);
        }

        assert_eq!(db.stock().get(&product_id).await.unwrap(), 0);
        assert_eq!(db.stock().set(&product_id, -5).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cache_follows_stock_row() {
        let (db, product_id) = db_with_product().await;

        db.stock().set(&product_id, 42).await.unwrap();
        let product = db
            .products()
            .get_by_id(&product_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.stock, 42);
        assert!(!product.synced);

        db.stock().adjust(&product_id, -2).await.unwrap();
        let product = db
            .products()
            .get_by_id(&product_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(product.stock, 40);
    }

    #[tokio::test]
    async fn unknown_product_is_an_error() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = db.stock().set("no-such-product", 10).await;
        assert!(result.is_err());
    }
}
