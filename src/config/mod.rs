//! Layered application configuration

mod app_config;

pub use app_config::{
    AppConfig, GateConfig, KeysConfig, LogFormat, LoggingConfig, MetricsConfig, ReaperConfig,
    ServerConfig, StorageConfig,
};
