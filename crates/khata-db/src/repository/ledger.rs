//! # Ledger Repository
//!
//! Database operations for ledger entries - the financial records against
//! each client's running balance.
//!
//! ## Entry Kinds
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Ledger Entry Kinds                                 │
//! │                                                                         │
//! │  'bill'     One per live bill, written by the bill composite           │
//! │             operations. Mirrors the bill's current total; never        │
//! │             inserted through this repository directly.                 │
//! │                                                                         │
//! │  'payment'  Cash received against a client's balance. Optionally       │
//! │             references the bill it settles.                            │
//! │                                                                         │
//! │  balance(client) = Σ bill entries − Σ payment entries                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use khata_core::validation::validate_amount;
use khata_core::{LedgerEntry, LedgerEntryType, Money, NewLedgerEntry};

/// Repository for ledger entry operations.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Records a payment entry.
    ///
    /// Bill-type entries are owned by the bill composite operations; asking
    /// for one here would let a second mirror slip in beside the real one.
    pub async fn record_payment(&self, new: NewLedgerEntry) -> DbResult<LedgerEntry> {
        if new.entry_type != LedgerEntryType::Payment {
            return Err(DbError::Internal(
                "bill entries are written by bill operations, not directly".to_string(),
            ));
        }
        validate_amount("amount", new.amount)?;

        let entry = LedgerEntry {
            id: Uuid::new_v4().to_string(),
            client_id: new.client_id,
            bill_id: new.bill_id,
            entry_type: new.entry_type,
            amount: new.amount,
            date: new.date,
            note: new.note,
            synced: false,
        };

        debug!(id = %entry.id, client_id = %entry.client_id, amount = %entry.amount, "Recording payment");

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, client_id, bill_id, entry_type, amount, date, note, synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.client_id)
        .bind(&entry.bill_id)
        .bind(entry.entry_type)
        .bind(entry.amount)
        .bind(entry.date)
        .bind(&entry.note)
        .bind(entry.synced)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Gets an entry by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, client_id, bill_id, entry_type, amount, date, note, synced
            FROM ledger_entries
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Gets the bill-type entry mirroring a bill, if the bill is live.
    pub async fn entry_for_bill(&self, bill_id: &str) -> DbResult<Option<LedgerEntry>> {
        let entry = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, client_id, bill_id, entry_type, amount, date, note, synced
            FROM ledger_entries
            WHERE bill_id = ?1 AND entry_type = 'bill'
            "#,
        )
        .bind(bill_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Lists a client's entries, most recent first.
    pub async fn list_for_client(&self, client_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, client_id, bill_id, entry_type, amount, date, note, synced
            FROM ledger_entries
            WHERE client_id = ?1
            ORDER BY date DESC
            "#,
        )
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// A client's running balance: charges minus payments.
    /// Positive means the client owes money.
    pub async fn client_balance(&self, client_id: &str) -> DbResult<Money> {
        let balance: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE entry_type WHEN 'bill' THEN amount ELSE -amount END), 0)
            FROM ledger_entries
            WHERE client_id = ?1
            "#,
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_paisa(balance))
    }

    /// Deletes a payment entry (a mis-keyed payment).
    /// Bill-type entries only leave through their bill's deletion.
    pub async fn delete_payment(&self, id: &str) -> DbResult<()> {
        let result =
            sqlx::query("DELETE FROM ledger_entries WHERE id = ?1 AND entry_type = 'payment'")
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("LedgerEntry (payment)", id));
        }

        Ok(())
    }

    /// Lists entries awaiting upload (synced = false).
    pub async fn list_unsynced(&self) -> DbResult<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT id, client_id, bill_id, entry_type, amount, date, note, synced
            FROM ledger_entries
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
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::pool::{Database, DbConfig};
    use khata_core::{LedgerEntryType, Money, NewClient, NewLedgerEntry};

    async fn db_with_client() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let client = db
            .clients()
            .insert(NewClient {
                name: "Bismillah Karyana".to_string(),
                phone: None,
                address: None,
            })
            .await
            .unwrap();
        (db, client.id)
    }

    fn payment(client_id: &str, paisa: i64) -> NewLedgerEntry {
        NewLedgerEntry {
            client_id: client_id.to_string(),
            bill_id: None,
            entry_type: LedgerEntryType::Payment,
            amount: Money::from_paisa(paisa),
            date: Utc::now(),
            note: "cash".to_string(),
        }
    }

    #[tokio::test]
    async fn record_and_list_payments() {
        let (db, client_id) = db_with_client().await;

        db.ledger().record_payment(payment(&client_id, 50_000)).await.unwrap();
        db.ledger().record_payment(payment(&client_id, 25_000)).await.unwrap();

        let entries = db.ledger().list_for_client(&client_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| !e.synced));
    }

    #[tokio::test]
    async fn direct_bill_entry_rejected() {
        let (db, client_id) = db_with_client().await;

        let mut entry = payment(&client_id, 10_000);
        entry.entry_type = LedgerEntryType::Bill;

        let result = db.ledger().record_payment(entry).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn balance_is_charges_minus_payments() {
        let (db, client_id) = db_with_client().await;

        // A raw bill entry stands in for a bill composite write here.
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, client_id, bill_id, entry_type, amount, date, note, synced)
            VALUES ('e1', ?1, NULL, 'bill', 100000, ?2, '', 0)
            "#,
        )
        .bind(&client_id)
        .bind(Utc::now())
        .execute(db.pool())
        .await
        .unwrap();

        db.ledger().record_payment(payment(&client_id, 30_000)).await.unwrap();

        let balance = db.ledger().client_balance(&client_id).await.unwrap();
        assert_eq!(balance.paisa(), 70_000);
    }

    #[tokio::test]
    async fn delete_payment_only_touches_payments() {
        let (db, client_id) = db_with_client().await;

        let entry = db
            .ledger()
            .record_payment(payment(&client_id, 30_000))
            .await
            .unwrap();
        db.ledger().delete_payment(&entry.id).await.unwrap();
        assert!(db.ledger().get_by_id(&entry.id).await.unwrap().is_none());

        let missing = db.ledger().delete_payment(&entry.id).await;
        assert!(missing.is_err());
    }
}
