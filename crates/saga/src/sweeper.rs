//! Periodic release of provisional holds that were never confirmed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use inventory::{Hold, InventoryStore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;
use crate::gate::ResourceGate;

/// Ten years; longer TTLs are treated as this.
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Expires stale provisional holds of one store.
///
/// Runs under the participant's read-path gate, the same one rollbacks take.
pub struct HoldSweeper<S> {
    store: Arc<S>,
    gate: ResourceGate,
    ttl: Duration,
    interval: Duration,
}

impl<S: InventoryStore> HoldSweeper<S> {
    pub fn new(store: Arc<S>, gate: ResourceGate, ttl: Duration, interval: Duration) -> Self {
        Self {
            store,
            gate,
            ttl,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Releases every provisional hold older than the TTL.
    pub async fn sweep_once(&self) -> Result<Vec<Hold>> {
        let ttl_secs = self.ttl.as_secs().min(MAX_TTL_SECS) as i64;
        let cutoff = Utc::now() - chrono::Duration::seconds(ttl_secs);

        let released = {
            let _gate = self.gate.enter().await;
            self.store.expire_holds(cutoff).await?
        };

        if !released.is_empty() {
            let table = self.store.table();
            info!(%table, count = released.len(), "Expired provisional holds");
            metrics::counter!("holds_expired_total", "table" => table.as_str())
                .increment(released.len() as u64);
        }
        Ok(released)
    }

    /// Sweeps every interval until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let table = self.store.table();
        info!(%table, interval_secs = self.interval.as_secs(), "Hold sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(%table, error = %e, "Hold sweep failed");
                    }
                }
            }
        }

        info!(%table, "Hold sweeper stopped");
    }
}
