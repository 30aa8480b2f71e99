//! CLI module for Keygate
//!
//! Provides subcommands:
//! - `serve`: run the HTTP service and the background reaper
//! - `migrate`: apply storage migrations and purge expired keys
//! - `sweep`: remove expired keys once

pub mod migrate;
pub mod serve;
pub mod sweep;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Keygate - short-lived, single-active access keys
#[derive(Parser)]
#[command(name = "keygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP service
    Serve,

    /// Apply storage migrations, purge expired keys and print statistics
    Migrate,

    /// Remove expired keys once and exit
    Sweep,
}

/// Load `.env`, then layered configuration, and reject invalid settings
pub(crate) fn load_config() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    config.validate()?;
    Ok(config)
}

pub(crate) fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    logging::init_logging(&config.logging)?;
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_subcommands() {
        assert!(matches!(
            Cli::try_parse_from(["keygate", "serve"]).unwrap().command,
            Command::Serve
        ));
        assert!(matches!(
            Cli::try_parse_from(["keygate", "migrate"]).unwrap().command,
            Command::Migrate
        ));
        assert!(matches!(
            Cli::try_parse_from(["keygate", "sweep"]).unwrap().command,
            Command::Sweep
        ));
        assert!(Cli::try_parse_from(["keygate"]).is_err());
    }
}
