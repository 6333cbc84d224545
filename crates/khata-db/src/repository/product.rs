//! # Product Repository
//!
//! Database operations for products.
//!
//! ## The Stock Cache
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │               products.stock vs stock.quantity                          │
//! │                                                                         │
//! │  stock.quantity      = the authoritative on-hand count (one row per    │
//! │                        product; absent row means zero)                 │
//! │  products.stock      = denormalized cache carried on the product row   │
//! │                        so listings and sync payloads need no join      │
//! │                                                                         │
//! │  INVARIANT: after any stock-affecting operation the two are equal.     │
//! │  Every write path goes through StockRepository::apply_stock_delta,     │
//! │  which updates both inside the caller's transaction.                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use khata_core::validation::{validate_amount, validate_name};
use khata_core::{NewProduct, Product};

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product with an empty stock cache.
    ///
    /// No stock row is created: absence already means zero on hand.
    pub async fn insert(&self, new: NewProduct) -> DbResult<Product> {
        validate_name(&new.name)?;
        validate_amount("price", new.price)?;

        let product = Product {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            weight_kg: new.weight_kg,
            price: new.price,
            stock: 0,
            updated_at: Utc::now(),
            remote_id: None,
            synced: false,
        };

        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, weight_kg, price, stock, updated_at, remote_id, synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.weight_kg)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.updated_at)
        .bind(&product.remote_id)
        .bind(product.synced)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, weight_kg, price, stock, updated_at, remote_id, synced
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by its unique name.
    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, weight_kg, price, stock, updated_at, remote_id, synced
            FROM products
            WHERE name = ?1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists all products ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, weight_kg, price, stock, updated_at, remote_id, synced
            FROM products
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Updates a product's descriptive fields (name, weight, price).
    ///
    /// The stock cache is deliberately NOT written here; it only moves
    /// through stock operations so it can never drift from the stock row.
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        validate_name(&product.name)?;
        validate_amount("price", product.price)?;

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?2,
                weight_kg = ?3,
                price = ?4,
                updated_at = ?5,
                synced = 0
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(product.name.trim())
        .bind(product.weight_kg)
        .bind(product.price)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Deletes a product. The stock row goes with it (cascading delete);
    /// bill items and demands referencing it keep the store from deleting
    /// products that are part of history.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Lists products awaiting upload (synced = false).
    pub async fn list_unsynced(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, name, weight_kg, price, stock, updated_at, remote_id, synced
            FROM products
            WHERE synced = 0
            ORDER BY updated_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use khata_core::{Money, NewProduct};

    fn new_product(name: &str) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            weight_kg: 1.0,
            price: Money::from_paisa(5_000),
        }
    }

    #[tokio::test]
    async fn insert_and_fetch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let product = db.products().insert(new_product("Sugar 1kg")).await.unwrap();
        assert_eq!(product.stock, 0);

        let fetched = db
            .products()
            .get_by_id(&product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.price.paisa(), 5_000);
        assert_eq!(fetched.stock, 0);
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.products().insert(new_product("Sugar 1kg")).await.unwrap();
        let dup = db.products().insert(new_product("Sugar 1kg")).await;
        assert!(matches!(
            dup,
            Err(crate::error::DbError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn negative_price_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let result = db
            .products()
            .insert(NewProduct {
                name: "Bad".to_string(),
                weight_kg: 1.0,
                price: Money::from_paisa(-1),
            })
            .await;
        assert!(matches!(result, Err(crate::error::DbError::Validation(_))));
    }

    #[tokio::test]
    async fn update_does_not_touch_stock_cache() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut product = db.products().insert(new_product("Sugar 1kg")).await.unwrap();
        db.stock().set(&product.id, 40).await.unwrap();

        product.price = Money::from_paisa(5_500);
        product.stock = 999; // stale caller copy must not leak into the store
        db.products().update(&product).await.unwrap();

        let fetched = db
            .products()
            .get_by_id(&product.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.price.paisa(), 5_500);
        assert_eq!(fetched.stock, 40);
    }
}
