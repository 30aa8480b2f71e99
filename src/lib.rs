//! Keygate
//!
//! Issues short-lived access keys, at most one active key per client
//! identity, behind a provenance gate, and lets third parties validate
//! presented keys:
//! - Atomic get-or-create over an in-memory or PostgreSQL store
//! - Lazy expiry on validation plus a periodic sweep
//! - Layered configuration, structured logging and Prometheus metrics

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use api::state::AppState;
use domain::{Clock, DomainError, KeyStore};
use infrastructure::key::{IssuanceService, KeyStoreFactory, ValidationService};

/// Build the configured key store, failing if it cannot be reached
pub async fn create_key_store(config: &AppConfig) -> Result<Arc<dyn KeyStore>, DomainError> {
    let store_config = config.storage.store_config()?;
    KeyStoreFactory::create(&store_config).await
}

/// Wire the services over an existing store
pub fn create_app_state(
    config: &AppConfig,
    store: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
) -> Result<AppState, DomainError> {
    let issuance = IssuanceService::new(store.clone(), config.gate.access_gate())
        .with_generator(config.keys.generator()?)
        .with_clock(clock.clone())
        .with_ttl(config.keys.ttl()?)
        .with_duplicate_policy(config.keys.duplicate_policy);

    let validation = ValidationService::new(store).with_clock(clock);

    Ok(AppState::new(issuance, validation).with_bind_identity(config.keys.bind_identity))
}
