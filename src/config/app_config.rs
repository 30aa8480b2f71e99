use std::time::Duration;

use serde::Deserialize;

use crate::domain::key::{
    DuplicatePolicy, DEFAULT_KEY_TTL_SECS, MAX_KEY_TTL_SECS, MIN_TOKEN_BYTES,
};
use crate::domain::{AccessGate, DomainError};
use crate::infrastructure::key::{
    KeyGenerator, PostgresConfig, StoreConfig, StoreType, DEFAULT_TOKEN_BYTES,
};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub keys: KeysConfig,
    pub gate: GateConfig,
    pub reaper: ReaperConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Backing store selection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `memory` or `postgres`
    pub backend: String,
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Token shape and issuance behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    pub byte_length: usize,
    pub ttl_secs: i64,
    pub duplicate_policy: DuplicatePolicy,
    /// Validate tokens against the presenting client's identity
    pub bind_identity: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub allowed_domains: Vec<String>,
    pub allow_missing_provenance: bool,
    pub allow_same_origin: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub interval_secs: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let postgres = PostgresConfig::default();
        Self {
            backend: "memory".to_string(),
            url: postgres.url,
            max_connections: postgres.max_connections,
            connect_timeout_secs: postgres.connect_timeout_secs,
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            byte_length: DEFAULT_TOKEN_BYTES,
            ttl_secs: DEFAULT_KEY_TTL_SECS,
            duplicate_policy: DuplicatePolicy::default(),
            bind_identity: false,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            allowed_domains: vec!["liink.uk".to_string()],
            allow_missing_provenance: false,
            allow_same_origin: false,
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            enabled: true,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("gate.allowed_domains")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.keys.byte_length < MIN_TOKEN_BYTES {
            return Err(DomainError::configuration(format!(
                "keys.byte_length must be at least {}, got {}",
                MIN_TOKEN_BYTES, self.keys.byte_length
            )));
        }
        KeyGenerator::new(self.keys.byte_length)?;

        self.keys.ttl()?;

        if self.reaper.interval_secs == 0 {
            return Err(DomainError::configuration(
                "reaper.interval_secs must be greater than zero",
            ));
        }

        if self.gate.allowed_domains.iter().all(|d| d.trim().is_empty())
            && !self.gate.allow_missing_provenance
        {
            return Err(DomainError::configuration(
                "gate.allowed_domains is empty, no request could ever be issued a key",
            ));
        }

        if !self.metrics.path.starts_with('/') {
            return Err(DomainError::configuration(
                "metrics.path must start with '/'",
            ));
        }

        self.storage.store_config()?;

        Ok(())
    }
}

impl StorageConfig {
    /// Resolve the configured backend
    pub fn store_config(&self) -> Result<StoreConfig, DomainError> {
        match self.backend.parse::<StoreType>()? {
            StoreType::InMemory => Ok(StoreConfig::in_memory()),
            StoreType::Postgres => {
                if self.url.trim().is_empty() {
                    return Err(DomainError::configuration(
                        "storage.url is required for the postgres backend",
                    ));
                }

                Ok(StoreConfig::postgres(
                    PostgresConfig::new(self.url.clone())
                        .with_max_connections(self.max_connections)
                        .with_connect_timeout(self.connect_timeout_secs),
                ))
            }
        }
    }
}

impl KeysConfig {
    /// Validity window, bounded so `created_at + ttl` stays in range
    pub fn ttl(&self) -> Result<chrono::Duration, DomainError> {
        if self.ttl_secs <= 0 || self.ttl_secs > MAX_KEY_TTL_SECS {
            return Err(DomainError::configuration(format!(
                "keys.ttl_secs must be between 1 and {}, got {}",
                MAX_KEY_TTL_SECS, self.ttl_secs
            )));
        }

        chrono::Duration::try_seconds(self.ttl_secs).ok_or_else(|| {
            DomainError::configuration(format!("keys.ttl_secs {} is out of range", self.ttl_secs))
        })
    }

    pub fn generator(&self) -> Result<KeyGenerator, DomainError> {
        KeyGenerator::new(self.byte_length)
    }
}

impl GateConfig {
    pub fn access_gate(&self) -> AccessGate {
        AccessGate::new(self.allowed_domains.iter().map(String::as_str))
            .with_allow_missing_provenance(self.allow_missing_provenance)
            .with_allow_same_origin(self.allow_same_origin)
    }
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Provenance;

    fn from_toml(toml: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.keys.byte_length, 8);
        assert_eq!(config.keys.ttl_secs, 86_400);
        assert_eq!(config.keys.duplicate_policy, DuplicatePolicy::Reject);
        assert!(!config.keys.bind_identity);
        assert_eq!(config.gate.allowed_domains, vec!["liink.uk".to_string()]);
        assert_eq!(config.reaper.interval(), Duration::from_secs(3600));
        assert_eq!(config.metrics.path, "/metrics");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = from_toml(
            r#"
            [keys]
            ttl_secs = 60
            duplicate_policy = "return_existing"

            [gate]
            allowed_domains = ["trusted.example"]
            "#,
        );

        assert_eq!(config.keys.ttl().unwrap(), chrono::Duration::seconds(60));
        assert_eq!(config.keys.duplicate_policy, DuplicatePolicy::ReturnExisting);
        assert_eq!(config.keys.byte_length, 8);
        assert_eq!(config.server.port, 3000);
        assert!(config
            .gate
            .access_gate()
            .check(&Provenance::new().with_referer("https://trusted.example/"))
            .is_allowed());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.keys.byte_length = 4;
        assert!(matches!(
            config.validate(),
            Err(DomainError::Configuration { .. })
        ));

        let mut config = AppConfig::default();
        config.keys.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.reaper.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.keys.ttl_secs = -5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.gate.allowed_domains.clear();
        assert!(config.validate().is_err());
        config.gate.allow_missing_provenance = true;
        assert!(config.validate().is_ok());

        let mut config = AppConfig::default();
        config.storage.backend = "cassandra".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ttl_upper_bound() {
        let mut config = AppConfig::default();
        config.keys.ttl_secs = MAX_KEY_TTL_SECS;
        assert!(config.validate().is_ok());

        for ttl_secs in [MAX_KEY_TTL_SECS + 1, 10_000_000_000_000, i64::MAX] {
            config.keys.ttl_secs = ttl_secs;
            assert!(matches!(
                config.validate(),
                Err(DomainError::Configuration { .. })
            ));
            assert!(config.keys.ttl().is_err());
        }
    }

    #[test]
    fn test_store_config_selection() {
        let mut storage = StorageConfig::default();
        assert_eq!(
            storage.store_config().unwrap().store_type(),
            StoreType::InMemory
        );

        storage.backend = "postgres".to_string();
        storage.url = "postgres://keygate@db/keygate".to_string();
        assert_eq!(
            storage.store_config().unwrap().store_type(),
            StoreType::Postgres
        );

        storage.url = String::new();
        assert!(storage.store_config().is_err());
    }
}
