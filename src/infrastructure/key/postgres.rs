//! PostgreSQL key store with connection pooling

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use super::migrations::run_key_migrations;
use crate::domain::identity::Identity;
use crate::domain::key::{AccessKey, AccessToken, CreateOutcome, KeyStats, KeyStore};
use crate::domain::DomainError;

const PRIMARY_KEY_CONSTRAINT: &str = "access_keys_pkey";

/// An upsert that finds an active owner row which is gone by the time it is
/// read back raced with a delete; the statement is simply repeated.
const MAX_UPSERT_ATTEMPTS: usize = 3;

/// PostgreSQL connection configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections to maintain
    pub min_connections: u32,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/keygate".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }
}

/// PostgreSQL key store
///
/// One row per token in `access_keys`, with a unique constraint on
/// `owner_identity`. Issuance is a single `INSERT ... ON CONFLICT` upsert
/// keyed by owner whose update branch only fires when the existing row has
/// expired, so the database serializes concurrent issuance per owner.
pub struct PostgresKeyStore {
    pool: PgPool,
}

impl Debug for PostgresKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresKeyStore")
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl PostgresKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a new store with connection pooling
    pub async fn connect(config: &PostgresConfig) -> Result<Self, DomainError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to connect to PostgreSQL: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// Returns a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies pending schema migrations
    pub async fn migrate(&self) -> Result<usize, DomainError> {
        run_key_migrations(&self.pool).await
    }

    async fn try_upsert(
        &self,
        candidate: &AccessKey,
        now: DateTime<Utc>,
    ) -> Result<Option<CreateOutcome>, DomainError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO access_keys (token, owner_identity, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (owner_identity) DO UPDATE
            SET token = EXCLUDED.token,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            WHERE access_keys.expires_at <= $5
            RETURNING token
            "#,
        )
        .bind(candidate.token().as_str())
        .bind(candidate.owner_identity().as_str())
        .bind(candidate.expires_at().timestamp_millis())
        .bind(candidate.created_at().timestamp_millis())
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await;

        match inserted {
            Ok(Some(_)) => Ok(Some(CreateOutcome::Created(candidate.clone()))),
            Ok(None) => {
                // Conflict on an active owner row: nothing was written
                let existing = self.find_by_owner(candidate.owner_identity()).await?;

                Ok(existing
                    .filter(|key| key.is_active_at(now))
                    .map(CreateOutcome::Existing))
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.is_unique_violation()
                    && db_err.constraint() == Some(PRIMARY_KEY_CONSTRAINT) =>
            {
                Ok(Some(CreateOutcome::TokenCollision))
            }
            Err(e) => Err(DomainError::storage(format!("Failed to issue key: {}", e))),
        }
    }
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, DomainError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| DomainError::storage(format!("Invalid timestamp in store: {}", millis)))
}

fn row_to_key(row: &PgRow) -> Result<AccessKey, DomainError> {
    let token: String = row.get("token");
    let owner: String = row.get("owner_identity");
    let expires_at: i64 = row.get("expires_at");
    let created_at: i64 = row.get("created_at");

    let token = AccessToken::new(token)
        .map_err(|e| DomainError::storage(format!("Corrupt token in store: {}", e)))?;

    Ok(AccessKey::from_parts(
        token,
        Identity::new(owner),
        millis_to_datetime(created_at)?,
        millis_to_datetime(expires_at)?,
    ))
}

#[async_trait]
impl KeyStore for PostgresKeyStore {
    async fn get_or_create(
        &self,
        candidate: AccessKey,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, DomainError> {
        for _ in 0..MAX_UPSERT_ATTEMPTS {
            if let Some(outcome) = self.try_upsert(&candidate, now).await? {
                return Ok(outcome);
            }
        }

        Err(DomainError::conflict(format!(
            "Key issuance kept racing with concurrent deletes for '{}'",
            candidate.owner_identity().masked()
        )))
    }

    async fn lookup(&self, token: &AccessToken) -> Result<Option<AccessKey>, DomainError> {
        let row = sqlx::query(
            "SELECT token, owner_identity, expires_at, created_at FROM access_keys WHERE token = $1",
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to look up key: {}", e)))?;

        row.as_ref().map(row_to_key).transpose()
    }

    async fn find_by_owner(&self, owner: &Identity) -> Result<Option<AccessKey>, DomainError> {
        let row = sqlx::query(
            "SELECT token, owner_identity, expires_at, created_at FROM access_keys WHERE owner_identity = $1",
        )
        .bind(owner.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to find key by owner: {}", e)))?;

        row.as_ref().map(row_to_key).transpose()
    }

    async fn delete(&self, token: &AccessToken) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM access_keys WHERE token = $1")
            .bind(token.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete key: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM access_keys WHERE expires_at <= $1")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to sweep expired keys: {}", e)))?;

        Ok(result.rows_affected())
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<KeyStats, DomainError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE expires_at > $1) AS active,
                COUNT(*) FILTER (WHERE expires_at <= $1) AS expired,
                COUNT(DISTINCT owner_identity) FILTER (WHERE expires_at > $1) AS active_identities
            FROM access_keys
            "#,
        )
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to compute key stats: {}", e)))?;

        let total: i64 = row.get("total");
        let active: i64 = row.get("active");
        let expired: i64 = row.get("expired");
        let active_identities: i64 = row.get("active_identities");

        Ok(KeyStats {
            total: total as u64,
            active: active as u64,
            expired: expired as u64,
            active_identities: active_identities as u64,
        })
    }

    async fn ping(&self) -> Result<(), DomainError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("PostgreSQL unreachable: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_config_default() {
        let config = PostgresConfig::default();

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.idle_timeout_secs, 600);
    }

    #[test]
    fn test_postgres_config_builder() {
        let config = PostgresConfig::new("postgres://localhost/test")
            .with_max_connections(20)
            .with_connect_timeout(5);

        assert_eq!(config.url, "postgres://localhost/test");
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.connect_timeout_secs, 5);
    }

    #[test]
    fn test_millis_conversion() {
        let dt = millis_to_datetime(1_700_000_000_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_123);
        assert!(millis_to_datetime(i64::MAX).is_err());
    }

    // These tests need a reachable PostgreSQL database
    // Run with: DATABASE_URL=postgres://... cargo test -- --ignored

    use std::sync::Arc;

    use chrono::Duration as ChronoDuration;

    use crate::infrastructure::key::KeyGenerator;

    async fn test_store() -> Option<Arc<PostgresKeyStore>> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let store = PostgresKeyStore::connect(&PostgresConfig::new(url).with_connect_timeout(5))
            .await
            .unwrap();
        store.migrate().await.unwrap();
        Some(Arc::new(store))
    }

    /// Identity unique to one test run so parallel runs don't share rows
    fn unique_identity(generator: &KeyGenerator) -> Identity {
        Identity::new(format!("pg-test-{}", generator.generate()))
    }

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_pg_concurrent_get_or_create_has_one_winner() {
        let Some(store) = test_store().await else {
            return;
        };
        let generator = KeyGenerator::default();
        let identity = unique_identity(&generator);
        let now = at(1_700_000_000_000);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let key = AccessKey::new(
                    generator.generate(),
                    identity.clone(),
                    now,
                    ChronoDuration::hours(24),
                );
                tokio::spawn(async move { store.get_or_create(key, now).await })
            })
            .collect();

        let outcomes: Vec<CreateOutcome> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        let winner = outcomes
            .iter()
            .find_map(|o| match o {
                CreateOutcome::Created(k) => Some(k.clone()),
                _ => None,
            })
            .unwrap();
        let created = outcomes
            .iter()
            .filter(|o| matches!(o, CreateOutcome::Created(_)))
            .count();
        assert_eq!(created, 1);

        for outcome in &outcomes {
            if let CreateOutcome::Existing(key) = outcome {
                assert_eq!(key.token(), winner.token());
            }
        }
        assert_eq!(
            store.find_by_owner(&identity).await.unwrap().unwrap().token(),
            winner.token()
        );

        store.delete(winner.token()).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_pg_expired_owner_row_is_replaced() {
        let Some(store) = test_store().await else {
            return;
        };
        let generator = KeyGenerator::default();
        let identity = unique_identity(&generator);
        let ttl = ChronoDuration::hours(24);
        let start = at(1_700_000_000_000);

        let first = AccessKey::new(generator.generate(), identity.clone(), start, ttl);
        assert!(matches!(
            store.get_or_create(first.clone(), start).await.unwrap(),
            CreateOutcome::Created(_)
        ));

        // Still active one millisecond before expiry
        let almost = first.expires_at() - ChronoDuration::milliseconds(1);
        let early = AccessKey::new(generator.generate(), identity.clone(), almost, ttl);
        match store.get_or_create(early, almost).await.unwrap() {
            CreateOutcome::Existing(key) => assert_eq!(key.token(), first.token()),
            other => panic!("expected existing key, got {:?}", other),
        }

        let expiry = first.expires_at();
        let second = AccessKey::new(generator.generate(), identity.clone(), expiry, ttl);
        match store.get_or_create(second.clone(), expiry).await.unwrap() {
            CreateOutcome::Created(key) => assert_eq!(key.token(), second.token()),
            other => panic!("expected replacement, got {:?}", other),
        }
        assert!(store.lookup(first.token()).await.unwrap().is_none());

        store.delete(second.token()).await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires running PostgreSQL instance"]
    async fn test_pg_token_owned_by_other_identity_is_collision() {
        let Some(store) = test_store().await else {
            return;
        };
        let generator = KeyGenerator::default();
        let now = at(1_700_000_000_000);
        let ttl = ChronoDuration::hours(24);

        let existing = AccessKey::new(generator.generate(), unique_identity(&generator), now, ttl);
        store.get_or_create(existing.clone(), now).await.unwrap();

        let clashing = AccessKey::new(
            existing.token().clone(),
            unique_identity(&generator),
            now,
            ttl,
        );
        assert!(matches!(
            store.get_or_create(clashing.clone(), now).await.unwrap(),
            CreateOutcome::TokenCollision
        ));
        assert!(store
            .find_by_owner(clashing.owner_identity())
            .await
            .unwrap()
            .is_none());

        store.delete(existing.token()).await.unwrap();
    }
}
