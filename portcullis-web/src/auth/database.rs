//! Database-backed credential storage

use crate::{WebError, WebResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{AuthError, AuthResult, CredentialStore, Identity, Role};
use sqlx::{sqlite::SqlitePoolOptions, Row, SqlitePool};
use tracing::{debug, error, info};

/// Database identity record
#[derive(Debug, sqlx::FromRow)]
struct IdentityRecord {
    username: String,
    password_hash: String,
    role: String,
    created_at: String, // RFC 3339
}

impl IdentityRecord {
    fn into_identity(self) -> AuthResult<Identity> {
        let role: Role = self.role.parse().map_err(AuthError::Storage)?;
        let created_at: DateTime<Utc> = self
            .created_at
            .parse()
            .map_err(|e| AuthError::Storage(format!("bad created_at: {}", e)))?;

        Ok(Identity {
            username: self.username,
            password_hash: self.password_hash,
            role,
            created_at,
        })
    }
}

fn storage_error(operation: &str, e: sqlx::Error) -> AuthError {
    error!("Failed to {}: {}", operation, e);
    AuthError::Storage(e.to_string())
}

/// Credential store backed by SQLite; the UNIQUE constraint on `username`
/// makes `save` insert-if-absent
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    /// Open a pool for `url` and prepare the schema.
    ///
    /// In-memory databases live and die with their connection, so they get a
    /// single connection that is never reaped or recycled.
    pub async fn connect(url: &str) -> WebResult<Self> {
        let pool = Self::pool_options(url)
            .connect(url)
            .await
            .map_err(|e| WebError::Database(format!("Failed to connect to {}: {}", url, e)))?;

        Self::new(pool).await
    }

    fn pool_options(url: &str) -> SqlitePoolOptions {
        if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        }
    }

    /// Wrap an existing pool and create the tables if needed
    pub async fn new(pool: SqlitePool) -> WebResult<Self> {
        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> WebResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS identities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| WebError::Database(format!("Failed to create identities table: {}", e)))?;

        info!("Identities table ready");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn exists_by_username(&self, username: &str) -> AuthResult<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM identities WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("check username", e))?;

        let count: i64 = row
            .try_get("count")
            .map_err(|e| storage_error("read count", e))?;
        Ok(count > 0)
    }

    async fn save(&self, identity: Identity) -> AuthResult<Identity> {
        let result = sqlx::query(
            "INSERT INTO identities (username, password_hash, role, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&identity.username)
        .bind(&identity.password_hash)
        .bind(identity.role.as_str())
        .bind(identity.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Stored identity: {}", identity.username);
                Ok(identity)
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(AuthError::AlreadyExists(identity.username))
            }
            Err(e) => Err(storage_error("insert identity", e)),
        }
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Identity>> {
        let record = sqlx::query_as::<_, IdentityRecord>(
            "SELECT username, password_hash, role, created_at FROM identities WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("load identity", e))?;

        record.map(IdentityRecord::into_identity).transpose()
    }

    async fn count(&self) -> AuthResult<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM identities")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("count identities", e))?;

        let count: i64 = row
            .try_get("count")
            .map_err(|e| storage_error("read count", e))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portcullis_core::{Credentials, PasswordEncoder, RegistrationService};
    use std::sync::Arc;

    async fn memory_store() -> SqliteCredentialStore {
        SqliteCredentialStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_memory_pool_keeps_its_only_connection() {
        let store = memory_store().await;
        let options = store.pool.options();

        assert_eq!(options.get_max_connections(), 1);
        assert!(options.get_idle_timeout().is_none());
        assert!(options.get_max_lifetime().is_none());

        let file_options = SqliteCredentialStore::pool_options("sqlite://portcullis.db");
        assert_eq!(file_options.get_max_connections(), 5);
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let store = memory_store().await;
        let identity = Identity::new("alice", "$argon2id$hash".to_string(), Role::Admin);

        store.save(identity.clone()).await.unwrap();

        let loaded = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(loaded.username, "alice");
        assert_eq!(loaded.role, Role::Admin);
        assert_eq!(loaded.password_hash, identity.password_hash);
        assert!(store.exists_by_username("alice").await.unwrap());
        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_violation_maps_to_already_exists() {
        let store = memory_store().await;
        store
            .save(Identity::new("alice", "first".to_string(), Role::User))
            .await
            .unwrap();

        let second = store
            .save(Identity::new("alice", "second".to_string(), Role::User))
            .await;

        assert_eq!(second, Err(AuthError::AlreadyExists("alice".to_string())));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_registration_against_sqlite() {
        let store = Arc::new(memory_store().await);
        let registration = RegistrationService::new(store.clone(), PasswordEncoder::new());

        registration
            .register(&Credentials::new("alice", "pw1"))
            .await
            .unwrap();
        let duplicate = registration.register(&Credentials::new("alice", "pw2")).await;

        assert!(matches!(duplicate, Err(AuthError::AlreadyExists(_))));
        let stored = store.find_by_username("alice").await.unwrap().unwrap();
        assert!(PasswordEncoder::new().verify("pw1", &stored.password_hash));
    }

    #[tokio::test]
    async fn test_file_database_persists_across_pools() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("portcullis.db").display()
        );

        {
            let store = SqliteCredentialStore::connect(&url).await.unwrap();
            store
                .save(Identity::new("alice", "hash".to_string(), Role::User))
                .await
                .unwrap();
        }

        let reopened = SqliteCredentialStore::connect(&url).await.unwrap();
        assert!(reopened.exists_by_username("alice").await.unwrap());
    }
}
