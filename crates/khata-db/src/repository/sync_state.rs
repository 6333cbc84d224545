//! # Sync State Repository
//!
//! Bookkeeping for the offline-first reconciliation loop: which rows still
//! need uploading, flipping their flags once the remote store confirms
//! persistence, and aging out stale demand-planning data.
//!
//! ## The Synced Flag Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Synced Flag Protocol                                 │
//! │                                                                         │
//! │  LOCAL MUTATION (any repository write)                                 │
//! │       │                                                                 │
//! │       └── synced = 0   (cleared, always, in the same statement)        │
//! │                                                                         │
//! │  SYNC COMPLETION (orchestrator, after the gateway confirms)            │
//! │       │                                                                 │
//! │       └── mark_synced(kind, id)   →   synced = 1                       │
//! │                                                                         │
//! │  Business logic NEVER sets synced = 1. Only the sync-completion path   │
//! │  does, and only for rows that were actually transmitted.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tables are addressed through [`EntityKind::table`], a closed enum - no
//! caller-supplied table names ever reach the SQL text.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use khata_core::EntityKind;

/// Repository for sync bookkeeping operations.
#[derive(Debug, Clone)]
pub struct SyncStateRepository {
    pool: SqlitePool,
}

impl SyncStateRepository {
    /// Creates a new SyncStateRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncStateRepository { pool }
    }

    /// Counts rows awaiting upload for one entity kind.
    pub async fn count_unsynced(&self, kind: EntityKind) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM {} WHERE synced = 0",
            kind.table()
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Counts rows awaiting upload across every entity kind.
    pub async fn count_all_unsynced(&self) -> DbResult<i64> {
        let mut total = 0;
        for kind in EntityKind::ALL {
            total += self.count_unsynced(kind).await?;
        }
        Ok(total)
    }

    /// Lists the ids of rows awaiting upload for one entity kind.
    pub async fn list_unsynced_ids(&self, kind: EntityKind) -> DbResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE synced = 0",
            kind.table()
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Marks one row as synced.
    ///
    /// Called only by the sync-completion path after the remote store
    /// confirms persistence - never by business logic.
    pub async fn mark_synced(&self, kind: EntityKind, id: &str) -> DbResult<()> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET synced = 1 WHERE id = ?1",
            kind.table()
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(kind.table(), id));
        }

        Ok(())
    }

    /// Marks every row of one entity kind as synced.
    ///
    /// Used after a force-upload confirmed the full dataset remotely.
    pub async fn mark_all_synced(&self, kind: EntityKind) -> DbResult<u64> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET synced = 1 WHERE synced = 0",
            kind.table()
        ))
        .execute(&self.pool)
        .await?;

        debug!(kind = %kind, rows = result.rows_affected(), "Marked all rows synced");
        Ok(result.rows_affected())
    }

    /// Records the identifier the remote store assigned to a row on its
    /// first successful upload. Only clients and products carry one.
    pub async fn set_remote_id(
        &self,
        kind: EntityKind,
        id: &str,
        remote_id: &str,
    ) -> DbResult<()> {
        if !kind.has_remote_id() {
            return Err(DbError::Internal(format!(
                "{} rows do not carry a remote id",
                kind
            )));
        }

        let result = sqlx::query(&format!(
            "UPDATE {} SET remote_id = ?2 WHERE id = ?1",
            kind.table()
        ))
        .bind(id)
        .bind(remote_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(kind.table(), id));
        }

        Ok(())
    }

    /// Deletes demand-planning data that is closed, fully synced, and older
    /// than `age_days`.
    ///
    /// Financial rows (clients, bills, ledger entries) are history and are
    /// never aged out. A batch with any unsynced demand row is kept whole.
    ///
    /// ## Returns
    /// Number of deleted batches.
    pub async fn cleanup_stale(&self, age_days: u32) -> DbResult<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        // Demand rows first (they reference their batch).
        sqlx::query(
            r#"
            DELETE FROM demands WHERE batch_id IN (
                SELECT b.id FROM demand_batches b
                WHERE b.closed = 1 AND b.synced = 1
                  AND b.demand_date < date('now', '-' || ?1 || ' days')
                  AND NOT EXISTS (
                      SELECT 1 FROM demands d
                      WHERE d.batch_id = b.id AND d.synced = 0
                  )
            )
            "#,
        )
        .bind(age_days)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            DELETE FROM demand_batches
            WHERE closed = 1 AND synced = 1
              AND demand_date < date('now', '-' || ?1 || ' days')
              AND NOT EXISTS (
                  SELECT 1 FROM demands d WHERE d.batch_id = demand_batches.id
              )
            "#,
        )
        .bind(age_days)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!(deleted, age_days, "Cleaned up stale demand batches");
        }

        Ok(deleted)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
