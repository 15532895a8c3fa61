//! Embedded API key store.
//!
//! A single SQLite file holds salted PBKDF2 hashes of issued keys, their
//! expirations, and one boolean column per scope. The schema is versioned
//! and migrated forward on open.

use std::path::Path;

use benthos_model::Scope;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::Sha256;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::{CoreError, Result};

const SCHEMA_VERSION: i64 = 2;

/// An authenticated caller. The hash doubles as the key's identity for job
/// attribution.
#[derive(Debug, Clone)]
pub struct AuthorizedKey {
    pub hash: String,
}

/// Listing entry for an active key.
#[derive(Debug, Clone)]
pub struct KeyInfo {
    pub hash: String,
    pub expires: DateTime<Utc>,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct KeyStore {
    pool: SqlitePool,
    salt: String,
    iterations: u32,
}

impl KeyStore {
    pub const ITERATIONS: u32 = 200_000;
    /// New keys default to a little over a year of validity.
    pub const DEFAULT_VALIDITY_DAYS: i64 = 400;

    /// Open (creating and migrating as needed) the key database.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        Self::migrate(&pool).await?;

        let row = sqlx::query("SELECT salt, iterations FROM params WHERE idx = 0")
            .fetch_one(&pool)
            .await?;
        let salt: String = row.try_get("salt")?;
        let iterations: i64 = row.try_get("iterations")?;

        Ok(Self {
            pool,
            salt,
            iterations: iterations as u32,
        })
    }

    /// Forward-only migrations keyed on the `version` table.
    async fn migrate(pool: &SqlitePool) -> Result<()> {
        let version: i64 = match sqlx::query("SELECT version FROM version")
            .fetch_optional(pool)
            .await
        {
            Ok(Some(row)) => row.try_get("version")?,
            // No version table yet: fresh database.
            Ok(None) | Err(_) => 0,
        };

        if version < 1 {
            sqlx::query(
                "CREATE TABLE keys (hash TEXT PRIMARY KEY, expires INTEGER, comment TEXT)",
            )
            .execute(pool)
            .await?;
            sqlx::query(
                "CREATE TABLE params (idx INTEGER PRIMARY KEY, salt TEXT, iterations INTEGER)",
            )
            .execute(pool)
            .await?;

            let salt = hex::encode(rand::rng().random::<[u8; 32]>());
            sqlx::query("INSERT INTO params (idx, salt, iterations) VALUES (0, ?1, ?2)")
                .bind(&salt)
                .bind(Self::ITERATIONS as i64)
                .execute(pool)
                .await?;

            sqlx::query("CREATE TABLE version (version INTEGER PRIMARY KEY)")
                .execute(pool)
                .await?;
            sqlx::query("INSERT INTO version (version) VALUES (1)")
                .execute(pool)
                .await?;
        }

        if version < 2 {
            for scope in Scope::ALL {
                let statement = format!(
                    "ALTER TABLE keys ADD COLUMN {} INTEGER NOT NULL DEFAULT 0",
                    scope.column()
                );
                sqlx::query(&statement).execute(pool).await?;
            }
            sqlx::query("UPDATE version SET version = ?1")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await?;
        }

        Ok(())
    }

    fn hash_key(&self, key: &str) -> String {
        let mut derived = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(
            key.as_bytes(),
            self.salt.as_bytes(),
            self.iterations,
            &mut derived,
        );
        hex::encode(derived)
    }

    /// Generate and store a new key. Only the hash is persisted; the
    /// plaintext is returned once and never recoverable.
    pub async fn new_key(
        &self,
        comment: &str,
        expires: Option<DateTime<Utc>>,
    ) -> Result<(String, DateTime<Utc>)> {
        let key = hex::encode(rand::rng().random::<[u8; 32]>());
        let hash = self.hash_key(&key);
        let expires =
            expires.unwrap_or_else(|| Utc::now() + Duration::days(Self::DEFAULT_VALIDITY_DAYS));

        sqlx::query("INSERT INTO keys (hash, expires, comment) VALUES (?1, ?2, ?3)")
            .bind(&hash)
            .bind(expires.timestamp())
            .bind(comment)
            .execute(&self.pool)
            .await?;
        Ok((key, expires))
    }

    /// Verify a key, optionally requiring a scope. Expired or unknown keys
    /// never authorize; the scope booleans are read-only on this path.
    pub async fn authorize_key(
        &self,
        key: &str,
        scope: Option<Scope>,
    ) -> Result<Option<AuthorizedKey>> {
        let hash = self.hash_key(key);
        let statement = match scope {
            Some(scope) => format!(
                "SELECT expires, {} AS scoped FROM keys WHERE hash = ?1 LIMIT 1",
                scope.column()
            ),
            None => "SELECT expires, 1 AS scoped FROM keys WHERE hash = ?1 LIMIT 1".to_string(),
        };

        let row = sqlx::query(&statement)
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let expires: i64 = row.try_get("expires")?;
        let scoped: bool = row.try_get("scoped")?;
        if expires <= Utc::now().timestamp() || !scoped {
            return Ok(None);
        }
        Ok(Some(AuthorizedKey { hash }))
    }

    /// Active (unexpired) keys.
    pub async fn list_keys(&self) -> Result<Vec<KeyInfo>> {
        let rows = sqlx::query("SELECT hash, expires, comment FROM keys WHERE expires > ?1")
            .bind(Utc::now().timestamp())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let expires: i64 = row.try_get("expires")?;
                let expires = DateTime::from_timestamp(expires, 0).ok_or_else(|| {
                    sqlx::Error::Decode("key expiration out of range".into())
                })?;
                Ok(KeyInfo {
                    hash: row.try_get("hash")?,
                    expires,
                    comment: row.try_get::<Option<String>, _>("comment")?.unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Flip one scope boolean on a key. Returns false for unknown keys.
    pub async fn set_scope(&self, key: &str, scope: Scope, value: bool) -> Result<bool> {
        let hash = self.hash_key(key);
        let statement = format!("UPDATE keys SET {} = ?1 WHERE hash = ?2", scope.column());
        let result = sqlx::query(&statement)
            .bind(value)
            .bind(&hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Scopes currently granted to a key.
    pub async fn scopes(&self, key: &str) -> Result<Vec<Scope>> {
        let hash = self.hash_key(key);
        let columns: Vec<String> = Scope::ALL
            .iter()
            .map(|scope| scope.column().to_string())
            .collect();
        let statement = format!(
            "SELECT {} FROM keys WHERE hash = ?1 LIMIT 1",
            columns.join(", ")
        );

        let row = sqlx::query(&statement)
            .bind(&hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::NotFound("unknown api key".to_string()))?;

        let mut granted = Vec::new();
        for scope in Scope::ALL {
            let value: bool = row.try_get(scope.column())?;
            if value {
                granted.push(scope);
            }
        }
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn open_store(dir: &TempDir) -> KeyStore {
        KeyStore::open(&dir.path().join("keys.db")).await.unwrap()
    }

    #[tokio::test]
    async fn fresh_database_migrates_and_issues_keys() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let (key, expires) = store.new_key("ci worker", None).await.unwrap();
        assert_eq!(key.len(), 64);
        assert!(expires > Utc::now());

        let authorized = store.authorize_key(&key, None).await.unwrap();
        assert!(authorized.is_some());
        assert!(store.authorize_key("not-a-key", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_keys_do_not_authorize() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        let past = Utc::now() - Duration::days(1);
        let (key, _) = store.new_key("stale", Some(past)).await.unwrap();
        assert!(store.authorize_key(&key, None).await.unwrap().is_none());
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scopes_default_off_and_toggle() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let (key, _) = store.new_key("scoped", None).await.unwrap();

        assert!(
            store
                .authorize_key(&key, Some(Scope::GetRawFile))
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.set_scope(&key, Scope::GetRawFile, true).await.unwrap());
        assert!(
            store
                .authorize_key(&key, Some(Scope::GetRawFile))
                .await
                .unwrap()
                .is_some()
        );
        // Granting one scope does not grant the others.
        assert!(
            store
                .authorize_key(&key, Some(Scope::DoDiscovery))
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(store.scopes(&key).await.unwrap(), vec![Scope::GetRawFile]);

        // Adding then removing a scope leaves the set unchanged.
        assert!(store.set_scope(&key, Scope::Admin, true).await.unwrap());
        assert!(store.set_scope(&key, Scope::Admin, false).await.unwrap());
        assert_eq!(store.scopes(&key).await.unwrap(), vec![Scope::GetRawFile]);
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let key = {
            let store = open_store(&dir).await;
            store.new_key("persistent", None).await.unwrap().0
        };

        let store = open_store(&dir).await;
        assert!(store.authorize_key(&key, None).await.unwrap().is_some());
        assert_eq!(store.list_keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_key_scopes_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let err = store.scopes("missing").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
