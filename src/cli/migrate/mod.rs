//! Migrate command - prepares the schema and purges expired keys

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::KeyStore;
use crate::infrastructure::key::{InMemoryKeyStore, PostgresKeyStore, StoreConfig};

pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config()?;
    super::init_logging(&config)?;

    let store: Arc<dyn KeyStore> = match config.storage.store_config()? {
        StoreConfig::Postgres(pg_config) => {
            let store = PostgresKeyStore::connect(&pg_config).await?;
            let applied = store.migrate().await?;
            println!("Applied {} migration(s)", applied);
            Arc::new(store)
        }
        StoreConfig::InMemory => {
            info!("In-memory backend has no schema to migrate");
            Arc::new(InMemoryKeyStore::new())
        }
    };

    let now = Utc::now();
    let removed = store.sweep_expired(now).await?;
    let stats = store.stats(now).await?;

    println!("Removed {} expired key(s)", removed);
    println!("Total keys: {}", stats.total);
    println!("Active keys: {}", stats.active);

    Ok(())
}
