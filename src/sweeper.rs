use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{error, info, instrument};

use crate::accounts::repo::{AccountStore, StoreError};
use crate::config::AppConfig;

/// Background task that deletes accounts which never verified their email.
pub struct Sweeper {
    store: Arc<dyn AccountStore>,
    interval: Duration,
    retention: time::Duration,
}

impl Sweeper {
    pub fn new(store: Arc<dyn AccountStore>, interval: Duration, retention: time::Duration) -> Self {
        Self {
            store,
            interval,
            retention,
        }
    }

    pub fn from_config(store: Arc<dyn AccountStore>, config: &AppConfig) -> Self {
        Self::new(store, config.sweep_interval(), config.unverified_retention())
    }

    /// Ticks until `shutdown` flips to true or its sender goes away. The first
    /// tick fires immediately. A failed tick is logged and the loop goes on.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(interval_secs = self.interval.as_secs(), "sweeper started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(error = %e, "unverified account sweep failed");
                    }
                }
            }
        }
        info!("sweeper stopped");
    }

    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<u64, StoreError> {
        let cutoff = OffsetDateTime::now_utc() - self.retention;
        let deleted = self.store.delete_expired_unverified(cutoff).await?;
        if deleted > 0 {
            info!(deleted, "removed expired unverified accounts");
        }
        Ok(deleted)
    }
}
