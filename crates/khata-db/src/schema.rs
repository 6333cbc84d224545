//! # Schema Manager
//!
//! Versioned, additive-only schema upgrades for the Khata local store.
//!
//! ## How Upgrades Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Upgrade Process                                    │
//! │                                                                         │
//! │  Store Startup                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Read PRAGMA user_version  (0 on a fresh database)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  For each version v in 1..=CURRENT_VERSION:                            │
//! │       │                                                                 │
//! │       ├── user_version >= v ?  Skip                                    │
//! │       │                                                                 │
//! │       └── Otherwise: BEGIN                                             │
//! │              apply step v   (CREATE ... IF NOT EXISTS /                │
//! │                              column-checked ALTER TABLE)               │
//! │              PRAGMA user_version = v                                   │
//! │           COMMIT                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Store continues startup                                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules for New Steps
//!
//! 1. Append a new version; **NEVER** modify an existing step
//! 2. Additive only: new tables, new columns, new indexes - no drops, no
//!    destructive rewrites
//! 3. Every step must be safe to re-run. A prior partial upgrade may have
//!    already applied part of it, so add-column steps check
//!    `pragma_table_info` for the column - presence is never inferred from
//!    the version number alone
//! 4. A fresh database runs the same step list as an upgrade, so fresh
//!    creation and stepwise upgrade always agree on the final schema
//!    (asserted by test, not assumed)
//!
//! ## Failure Semantics
//! Any step failure is fatal: the enclosing transaction rolls back, the
//! version is not bumped, and store initialization aborts with
//! [`DbError::MigrationFailed`].

use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// The schema version this build targets.
pub const CURRENT_VERSION: i64 = 11;

/// Tables that carry a per-row `synced` flag.
const SYNCED_TABLES: [&str; 7] = [
    "clients",
    "products",
    "bills",
    "bill_items",
    "ledger_entries",
    "demand_batches",
    "demands",
];

/// Epoch default for `updated_at` columns added to pre-existing rows;
/// every local mutation refreshes the value.
const EPOCH_TEXT: &str = "'1970-01-01T00:00:00+00:00'";

// =============================================================================
// Public API
// =============================================================================

/// Brings the store to [`CURRENT_VERSION`], applying any pending steps.
///
/// ## Safety
/// - Idempotent: safe to run multiple times
/// - Transactional: each step runs in its own transaction together with the
///   version bump
/// - Ordered: steps run in increasing version order
pub async fn upgrade(pool: &SqlitePool) -> DbResult<()> {
    upgrade_to(pool, CURRENT_VERSION).await
}

/// Reads the persisted schema version (`PRAGMA user_version`).
pub async fn schema_version(pool: &SqlitePool) -> DbResult<i64> {
    let version: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;
    Ok(version)
}

/// Upgrades to an explicit target version. Exposed within the crate so
/// tests can park a database at a historical version before upgrading it.
pub(crate) async fn upgrade_to(pool: &SqlitePool, target: i64) -> DbResult<()> {
    let current = schema_version(pool).await?;

    if current >= target {
        debug!(current, target, "Schema already up to date");
        return Ok(());
    }

    info!(current, target, "Upgrading schema");

    for version in (current + 1)..=target {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| DbError::MigrationFailed(e.to_string()))?;

        apply_step(&mut tx, version)
            .await
            .map_err(|e| DbError::MigrationFailed(format!("step {}: {}", version, e)))?;

        // PRAGMA arguments cannot be bound; version is a trusted integer.
        sqlx::query(&format!("PRAGMA user_version = {}", version))
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::MigrationFailed(format!("step {}: {}", version, e)))?;

        tx.commit()
            .await
            .map_err(|e| DbError::MigrationFailed(format!("step {}: {}", version, e)))?;

        debug!(version, "Applied schema step");
    }

    info!(version = target, "Schema upgrade complete");
    Ok(())
}

// =============================================================================
// Steps
// =============================================================================

/// Applies a single schema step.
///
/// Version history (a step per release that changed the layout):
///  1. clients, products
///  2. bills, bill_items
///  3. ledger_entries
///  4. stock (one row per product, cascading delete)
///  5. products.stock denormalized cache
///  6. demand_batches, demands
///  7. synced flag on all synced tables
///  8. remote_id on clients and products
///  9. updated_at on clients, products, bill_items
/// 10. bills.carry_forward
/// 11. indexes (unique names, FK lookups, unsynced scans, one open batch
///     per date)
async fn apply_step(conn: &mut SqliteConnection, version: i64) -> sqlx::Result<()> {
    match version {
        1 => {
            execute_all(
                conn,
                &[
                    "CREATE TABLE IF NOT EXISTS clients (
                        id      TEXT PRIMARY KEY,
                        name    TEXT NOT NULL,
                        phone   TEXT,
                        address TEXT
                    )",
                    "CREATE TABLE IF NOT EXISTS products (
                        id        TEXT PRIMARY KEY,
                        name      TEXT NOT NULL,
                        weight_kg REAL NOT NULL DEFAULT 0,
                        price     INTEGER NOT NULL DEFAULT 0
                    )",
                ],
            )
            .await
        }

        2 => {
            execute_all(
                conn,
                &[
                    "CREATE TABLE IF NOT EXISTS bills (
                        id           TEXT PRIMARY KEY,
                        client_id    TEXT NOT NULL REFERENCES clients(id),
                        total_amount INTEGER NOT NULL DEFAULT 0,
                        paid_amount  INTEGER NOT NULL DEFAULT 0,
                        date         TEXT NOT NULL
                    )",
                    "CREATE TABLE IF NOT EXISTS bill_items (
                        id         TEXT PRIMARY KEY,
                        bill_id    TEXT NOT NULL REFERENCES bills(id),
                        product_id TEXT NOT NULL REFERENCES products(id),
                        quantity   INTEGER NOT NULL,
                        price      INTEGER NOT NULL
                    )",
                ],
            )
            .await
        }

        3 => {
            execute_all(
                conn,
                &["CREATE TABLE IF NOT EXISTS ledger_entries (
                    id         TEXT PRIMARY KEY,
                    client_id  TEXT NOT NULL REFERENCES clients(id),
                    bill_id    TEXT REFERENCES bills(id),
                    entry_type TEXT NOT NULL CHECK (entry_type IN ('bill', 'payment')),
                    amount     INTEGER NOT NULL DEFAULT 0,
                    date       TEXT NOT NULL,
                    note       TEXT NOT NULL DEFAULT ''
                )"],
            )
            .await
        }

        4 => {
            execute_all(
                conn,
                &["CREATE TABLE IF NOT EXISTS stock (
                    product_id TEXT PRIMARY KEY REFERENCES products(id) ON DELETE CASCADE,
                    quantity   INTEGER NOT NULL DEFAULT 0 CHECK (quantity >= 0)
                )"],
            )
            .await
        }

        5 => add_column_if_absent(conn, "products", "stock", "INTEGER NOT NULL DEFAULT 0").await,

        6 => {
            execute_all(
                conn,
                &[
                    "CREATE TABLE IF NOT EXISTS demand_batches (
                        id          TEXT PRIMARY KEY,
                        demand_date TEXT NOT NULL,
                        closed      INTEGER NOT NULL DEFAULT 0
                    )",
                    "CREATE TABLE IF NOT EXISTS demands (
                        id         TEXT PRIMARY KEY,
                        batch_id   TEXT NOT NULL REFERENCES demand_batches(id),
                        client_id  TEXT NOT NULL REFERENCES clients(id),
                        product_id TEXT NOT NULL REFERENCES products(id),
                        quantity   INTEGER NOT NULL,
                        date       TEXT NOT NULL
                    )",
                ],
            )
            .await
        }

        7 => {
            for table in SYNCED_TABLES {
                add_column_if_absent(conn, table, "synced", "INTEGER NOT NULL DEFAULT 0").await?;
            }
            Ok(())
        }

        8 => {
            add_column_if_absent(conn, "clients", "remote_id", "TEXT").await?;
            add_column_if_absent(conn, "products", "remote_id", "TEXT").await
        }

        9 => {
            let decl = format!("TEXT NOT NULL DEFAULT {}", EPOCH_TEXT);
            add_column_if_absent(conn, "clients", "updated_at", &decl).await?;
            add_column_if_absent(conn, "products", "updated_at", &decl).await?;
            add_column_if_absent(conn, "bill_items", "updated_at", &decl).await
        }

        10 => {
            add_column_if_absent(conn, "bills", "carry_forward", "INTEGER NOT NULL DEFAULT 0")
                .await
        }

        11 => {
            execute_all(
                conn,
                &[
                    "CREATE UNIQUE INDEX IF NOT EXISTS idx_clients_name ON clients(name)",
                    "CREATE UNIQUE INDEX IF NOT EXISTS idx_products_name ON products(name)",
                    "CREATE INDEX IF NOT EXISTS idx_bills_client ON bills(client_id)",
                    "CREATE INDEX IF NOT EXISTS idx_bill_items_bill ON bill_items(bill_id)",
                    "CREATE INDEX IF NOT EXISTS idx_ledger_client ON ledger_entries(client_id)",
                    "CREATE INDEX IF NOT EXISTS idx_ledger_bill ON ledger_entries(bill_id)",
                    "CREATE INDEX IF NOT EXISTS idx_demands_batch ON demands(batch_id)",
                    // At most one open batch per demand date, enforced by the
                    // storage engine itself.
                    "CREATE UNIQUE INDEX IF NOT EXISTS idx_open_batch_per_date
                         ON demand_batches(demand_date) WHERE closed = 0",
                ],
            )
            .await
        }

        other => Err(sqlx::Error::Protocol(format!(
            "unknown schema version {}",
            other
        ))),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Executes a list of DDL statements one by one on the same connection.
async fn execute_all(conn: &mut SqliteConnection, statements: &[&str]) -> sqlx::Result<()> {
    for stmt in statements {
        sqlx::query(stmt).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Checks `pragma_table_info` for a column's presence.
async fn column_exists(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
) -> sqlx::Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2")
            .bind(table)
            .bind(column)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count > 0)
}

/// Adds a column unless it is already present. Table and column names come
/// from the trusted step list above, never from input.
async fn add_column_if_absent(
    conn: &mut SqliteConnection,
    table: &str,
    column: &str,
    decl: &str,
) -> sqlx::Result<()> {
    if column_exists(conn, table, column).await? {
        debug!(table, column, "Column already present, skipping");
        return Ok(());
    }

    sqlx::query(&format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table, column, decl
    ))
    .execute(conn)
    .await?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn raw_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    /// Normalized schema dump for equivalence comparison.
    async fn schema_dump(pool: &SqlitePool) -> Vec<(String, String, Option<String>)> {
        sqlx::query_as(
            "SELECT type, name, sql FROM sqlite_master
             WHERE name NOT LIKE 'sqlite_%'
             ORDER BY type, name",
        )
        .fetch_all(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn fresh_upgrade_reaches_current_version() {
        let pool = raw_pool().await;
        upgrade(&pool).await.unwrap();
        assert_eq!(schema_version(&pool).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn upgrade_is_idempotent() {
        let pool = raw_pool().await;
        upgrade(&pool).await.unwrap();
        let first = schema_dump(&pool).await;

        upgrade(&pool).await.unwrap();
        let second = schema_dump(&pool).await;

        assert_eq!(first, second);
        assert_eq!(schema_version(&pool).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn stepwise_upgrade_matches_fresh_creation() {
        let fresh = raw_pool().await;
        upgrade(&fresh).await.unwrap();
        let fresh_schema = schema_dump(&fresh).await;

        // Park at every historical version, then finish the upgrade.
        for parked_at in 1..CURRENT_VERSION {
            let stepwise = raw_pool().await;
            upgrade_to(&stepwise, parked_at).await.unwrap();
            assert_eq!(schema_version(&stepwise).await.unwrap(), parked_at);

            upgrade(&stepwise).await.unwrap();
            assert_eq!(
                schema_dump(&stepwise).await,
                fresh_schema,
                "schema diverged when upgrading from version {}",
                parked_at
            );
        }
    }

    #[tokio::test]
    async fn add_column_tolerates_out_of_band_columns() {
        let pool = raw_pool().await;
        upgrade_to(&pool, 6).await.unwrap();

        // Simulate a partial prior upgrade: the column exists but the
        // version was never bumped.
        sqlx::query("ALTER TABLE clients ADD COLUMN synced INTEGER NOT NULL DEFAULT 0")
            .execute(&pool)
            .await
            .unwrap();

        // The version-7 step must detect the column and not fail.
        upgrade(&pool).await.unwrap();
        assert_eq!(schema_version(&pool).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn open_batch_uniqueness_enforced_by_index() {
        let pool = raw_pool().await;
        upgrade(&pool).await.unwrap();

        sqlx::query("INSERT INTO demand_batches (id, demand_date, closed) VALUES ('b1', '2026-03-01', 0)")
            .execute(&pool)
            .await
            .unwrap();

        // Second open batch on the same date violates the partial index.
        let dup = sqlx::query(
            "INSERT INTO demand_batches (id, demand_date, closed) VALUES ('b2', '2026-03-01', 0)",
        )
        .execute(&pool)
        .await;
        assert!(dup.is_err());

        // A closed batch on the same date is fine.
        sqlx::query("INSERT INTO demand_batches (id, demand_date, closed) VALUES ('b3', '2026-03-01', 1)")
            .execute(&pool)
            .await
            .unwrap();
    }
}
