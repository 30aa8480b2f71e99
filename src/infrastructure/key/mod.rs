//! Access key infrastructure
//!
//! Token generation, the in-memory and PostgreSQL stores, and the services
//! for issuance, validation and periodic sweeping.

mod factory;
mod generator;
mod in_memory;
mod issuance;
mod migrations;
mod postgres;
mod reaper;
mod validation;

pub use factory::{KeyStoreFactory, StoreConfig, StoreType};
pub use generator::{KeyGenerator, DEFAULT_TOKEN_BYTES};
pub use in_memory::InMemoryKeyStore;
pub use issuance::{IssuanceService, IssuedKey, MAX_COLLISION_ATTEMPTS};
pub use migrations::{key_migrations, run_key_migrations, Migration, PostgresMigrator};
pub use postgres::{PostgresConfig, PostgresKeyStore};
pub use reaper::{Reaper, ReaperHandle, DEFAULT_REAPER_INTERVAL};
pub use validation::{KeyStatus, ValidationService};
