//! Periodic sweep of expired keys
//!
//! Expiry is already enforced on every read, so the sweep only bounds
//! storage growth. It runs once at start and then on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::domain::{Clock, DomainError, KeyStore, SystemClock};
use crate::infrastructure::observability::record_keys_swept;

/// Default time between sweeps
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Background sweeper over a key store
#[derive(Clone)]
pub struct Reaper {
    store: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Reaper {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            interval: DEFAULT_REAPER_INTERVAL,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sweep once, returns the number of removed keys
    pub async fn run_once(&self) -> Result<u64, DomainError> {
        let removed = self.store.sweep_expired(self.clock.now()).await?;

        if removed > 0 {
            info!(removed, "Swept expired keys");
        } else {
            debug!("Sweep found no expired keys");
        }
        record_keys_swept(removed);

        Ok(removed)
    }

    /// Start the sweep loop on the runtime
    ///
    /// The first sweep happens immediately. A failed sweep is logged and the
    /// loop keeps going.
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut interval = time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(interval_secs = self.interval.as_secs(), "Key reaper started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "Key sweep failed");
                        }
                    }
                }
            }

            info!("Key reaper stopped");
        });

        ReaperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running reaper loop
#[derive(Debug)]
pub struct ReaperHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stop the loop and wait for the in-flight sweep, if any, to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());

        if let Err(e) = self.task.await {
            error!(error = %e, "Key reaper task failed");
        }
    }
}
