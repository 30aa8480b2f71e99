//! Database migrations for the key store

use sqlx::postgres::PgPool;

use crate::domain::DomainError;

/// PostgreSQL migrator tracking applied versions in `_migrations`
#[derive(Debug)]
pub struct PostgresMigrator {
    pool: PgPool,
}

impl PostgresMigrator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the migrations table if it doesn't exist
    async fn ensure_migrations_table(&self) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                success BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to create migrations table: {}", e)))?;

        Ok(())
    }

    /// Runs a single migration inside a transaction, skipping it if applied
    pub async fn run_migration(&self, migration: &Migration) -> Result<bool, DomainError> {
        self.ensure_migrations_table().await?;

        let applied: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM _migrations WHERE version = $1)",
        )
        .bind(migration.version)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to check migration status: {}", e)))?;

        if applied {
            return Ok(false);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        for statement in migration.statements() {
            sqlx::query(statement).execute(&mut *tx).await.map_err(|e| {
                DomainError::storage(format!(
                    "Failed to run migration {}: {}",
                    migration.version, e
                ))
            })?;
        }

        sqlx::query("INSERT INTO _migrations (version, description) VALUES ($1, $2)")
            .bind(migration.version)
            .bind(&migration.description)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                DomainError::storage(format!(
                    "Failed to record migration {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit()
            .await
            .map_err(|e| DomainError::storage(format!("Failed to commit migration: {}", e)))?;

        Ok(true)
    }

    /// Returns the latest applied migration version
    pub async fn current_version(&self) -> Result<Option<i64>, DomainError> {
        self.ensure_migrations_table().await?;

        let version: Option<i64> = sqlx::query_scalar(
            "SELECT MAX(version) FROM _migrations WHERE success = TRUE",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get migration version: {}", e)))?;

        Ok(version)
    }
}

/// Represents a database migration
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
    /// SQL statements separated by `;`
    pub up: String,
}

impl Migration {
    pub fn new(version: i64, description: impl Into<String>, up: impl Into<String>) -> Self {
        Self {
            version,
            description: description.into(),
            up: up.into(),
        }
    }

    /// Individual statements, since prepared queries accept one at a time
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.up.split(';').map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Migrations for the `access_keys` table
pub fn key_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            1,
            "Create access_keys table",
            r#"
            CREATE TABLE IF NOT EXISTS access_keys (
                token TEXT PRIMARY KEY,
                owner_identity TEXT NOT NULL,
                expires_at BIGINT NOT NULL,
                created_at BIGINT NOT NULL,
                CONSTRAINT access_keys_owner_identity_key UNIQUE (owner_identity)
            );
            CREATE INDEX IF NOT EXISTS idx_access_keys_expires_at ON access_keys(expires_at)
            "#,
        ),
        Migration::new(
            2,
            "Require expiry after creation",
            r#"
            ALTER TABLE access_keys
                ADD CONSTRAINT access_keys_window_check CHECK (expires_at > created_at)
            "#,
        ),
    ]
}

/// Runs all pending key store migrations, returns how many were applied
pub async fn run_key_migrations(pool: &PgPool) -> Result<usize, DomainError> {
    let migrator = PostgresMigrator::new(pool.clone());
    let mut applied = 0;

    for migration in key_migrations() {
        if migrator.run_migration(&migration).await? {
            tracing::info!(
                version = migration.version,
                description = %migration.description,
                "Applied migration"
            );
            applied += 1;
        }
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creation() {
        let migration = Migration::new(1, "Test migration", "CREATE TABLE test");

        assert_eq!(migration.version, 1);
        assert_eq!(migration.description, "Test migration");
        assert_eq!(migration.up, "CREATE TABLE test");
    }

    #[test]
    fn test_statements_split() {
        let migration = Migration::new(1, "Two statements", "CREATE TABLE a (x INT);\n CREATE INDEX i ON a(x);\n");
        let statements: Vec<&str> = migration.statements().collect();

        assert_eq!(statements, vec!["CREATE TABLE a (x INT)", "CREATE INDEX i ON a(x)"]);
    }

    #[test]
    fn test_key_migrations_order() {
        let migrations = key_migrations();

        assert!(!migrations.is_empty());

        for i in 1..migrations.len() {
            assert!(
                migrations[i].version > migrations[i - 1].version,
                "Migrations should be in ascending order"
            );
        }
    }

    #[test]
    fn test_schema_enforces_unique_owner() {
        let first = &key_migrations()[0];
        assert!(first.up.contains("token TEXT PRIMARY KEY"));
        assert!(first.up.contains("UNIQUE (owner_identity)"));
    }
}
