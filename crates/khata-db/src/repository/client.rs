//! # Client Repository
//!
//! Database operations for clients.
//!
//! ## Key Operations
//! - CRUD with name uniqueness enforced at insert
//! - Unsynced listing for the reconciliation path
//!
//! ## Identity
//! `id` is a UUID v4 assigned at insert and immutable afterwards; the
//! remote store's identifier arrives later as `remote_id` once the row has
//! been uploaded.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use khata_core::validation::{validate_name, validate_phone};
use khata_core::{Client, NewClient};

/// Repository for client database operations.
#[derive(Debug, Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
}

impl ClientRepository {
    /// Creates a new ClientRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ClientRepository { pool }
    }

    /// Inserts a new client.
    ///
    /// ## Invariants
    /// - `name` must be unique; a duplicate maps to
    ///   [`DbError::UniqueViolation`]
    /// - The generated id never changes afterwards
    pub async fn insert(&self, new: NewClient) -> DbResult<Client> {
        validate_name(&new.name)?;
        validate_phone(new.phone.as_deref())?;

        let client = Client {
            id: Uuid::new_v4().to_string(),
            name: new.name.trim().to_string(),
            phone: new.phone,
            address: new.address,
            updated_at: Utc::now(),
            remote_id: None,
            synced: false,
        };

        debug!(id = %client.id, name = %client.name, "Inserting client");

        sqlx::query(
            r#"
            INSERT INTO clients (id, name, phone, address, updated_at, remote_id, synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&client.id)
        .bind(&client.name)
        .bind(&client.phone)
        .bind(&client.address)
        .bind(client.updated_at)
        .bind(&client.remote_id)
        .bind(client.synced)
        .execute(&self.pool)
        .await?;

        Ok(client)
    }

    /// Gets a client by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Client>> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT id, name, phone, address, updated_at, remote_id, synced
            FROM clients
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    /// Gets a client by its unique name.
    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<Client>> {
        let client = sqlx::query_as::<_, Client>(
            r#"
            SELECT id, name, phone, address, updated_at, remote_id, synced
            FROM clients
            WHERE name = ?1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(client)
    }

    /// Lists all clients ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Client>> {
        let clients = sqlx::query_as::<_, Client>(
            r#"
            SELECT id, name, phone, address, updated_at, remote_id, synced
            FROM clients
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(clients)
    }

    /// Updates a client's mutable fields.
    ///
    /// Refreshes `updated_at` and clears the synced flag; the id and
    /// remote id are never touched by business updates.
    pub async fn update(&self, client: &Client) -> DbResult<()> {
        validate_name(&client.name)?;
        validate_phone(client.phone.as_deref())?;

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE clients SET
                name = ?2,
                phone = ?3,
                address = ?4,
                updated_at = ?5,
                synced = 0
            WHERE id = ?1
            "#,
        )
        .bind(&client.id)
        .bind(client.name.trim())
        .bind(&client.phone)
        .bind(&client.address)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", &client.id));
        }

        Ok(())
    }

    /// Deletes a client.
    ///
    /// Fails with a foreign key violation while bills, ledger entries, or
    /// demand rows still reference the client.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Client", id));
        }

        Ok(())
    }

    /// Lists clients awaiting upload (synced = false).
    pub async fn list_unsynced(&self) -> DbResult<Vec<Client>> {
        let clients = sqlx::query_as::<_, Client>(
            r#"
            SELECT id, name, phone, address, updated_at, remote_id, synced
            FROM clients
            WHERE synced = 0
            ORDER BY updated_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(clients)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use khata_core::NewClient;

    fn new_client(name: &str) -> NewClient {
        NewClient {
            name: name.to_string(),
            phone: Some("0300-1234567".to_string()),
            address: None,
        }
    }

    #[tokio::test]
    async fn insert_and_fetch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let client = db.clients().insert(new_client("Ali Traders")).await.unwrap();
        assert!(!client.synced);
        assert!(client.remote_id.is_none());

        let fetched = db.clients().get_by_id(&client.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Ali Traders");

        let by_name = db
            .clients()
            .get_by_name("Ali Traders")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_name.id, client.id);
    }

    #[tokio::test]
    async fn duplicate_name_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        db.clients().insert(new_client("Ali Traders")).await.unwrap();
        let dup = db.clients().insert(new_client("Ali Traders")).await;

        assert!(matches!(
            dup,
            Err(crate::error::DbError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn update_clears_synced_flag() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let mut client = db.clients().insert(new_client("Ali Traders")).await.unwrap();

        // Pretend the row was uploaded.
        db.sync_state()
            .mark_synced(khata_core::EntityKind::Client, &client.id)
            .await
            .unwrap();

        client.phone = Some("0301-7654321".to_string());
        db.clients().update(&client).await.unwrap();

        let fetched = db.clients().get_by_id(&client.id).await.unwrap().unwrap();
        assert!(!fetched.synced);

        let unsynced = db.clients().list_unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 1);
    }

    #[tokio::test]
    async fn empty_name_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let result = db.clients().insert(new_client("   ")).await;
        assert!(matches!(
            result,
            Err(crate::error::DbError::Validation(_))
        ));
    }
}
