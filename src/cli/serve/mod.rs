//! Serve command - runs the HTTP service and the background reaper

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use crate::api::create_router_with_metrics;
use crate::config::AppConfig;
use crate::domain::{Clock, SystemClock};
use crate::infrastructure::key::Reaper;
use crate::infrastructure::observability::init_metrics;

/// Run the service until Ctrl+C or SIGTERM
pub async fn run() -> anyhow::Result<()> {
    let config = super::load_config()?;
    super::init_logging(&config)?;

    let metrics = init_metrics(&config.metrics);

    let store = crate::create_key_store(&config)
        .await
        .context("key store is unavailable, refusing to start")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = crate::create_app_state(&config, store.clone(), clock.clone())?;

    let reaper = if config.reaper.enabled {
        Some(
            Reaper::new(store)
                .with_clock(clock)
                .with_interval(config.reaper.interval())
                .spawn(),
        )
    } else {
        info!("Key reaper disabled, expired keys are only removed on validation");
        None
    };

    let app = create_router_with_metrics(state, metrics, &config.metrics.path);

    let addr = build_socket_addr(&config)?;
    info!("Starting keygate on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(super::shutdown_signal())
    .await?;

    if let Some(reaper) = reaper {
        reaper.shutdown().await;
    }

    info!("Keygate shutdown complete");
    Ok(())
}

fn build_socket_addr(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    Ok(SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    )))
}
