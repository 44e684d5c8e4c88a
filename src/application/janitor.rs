//! Cache janitor: periodic removal of snapshots past their retention window.
//!
//! Runs on every gateway instance, but only the lease holder actually
//! sweeps, so a fleet performs one sweep per interval.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::repos::{SnapshotsRepo, StoreError};

const MAX_INTERVAL: Duration = Duration::from_secs(3_600);

/// Sweep cadence: a fraction of the retention window, capped at one hour.
pub fn sweep_interval(remove_after: Duration) -> Duration {
    (remove_after / 24).min(MAX_INTERVAL)
}

pub struct CacheJanitor {
    snapshots: Arc<dyn SnapshotsRepo>,
    remove_after: Duration,
    interval: Duration,
    holder: String,
}

impl CacheJanitor {
    pub fn new(snapshots: Arc<dyn SnapshotsRepo>, remove_after: Duration, holder: String) -> Self {
        Self {
            snapshots,
            remove_after,
            interval: sweep_interval(remove_after),
            holder,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One leadership attempt plus sweep. Returns the number of snapshots
    /// removed, or `None` when another instance holds the lease.
    pub async fn sweep_once(&self) -> Result<Option<u64>, StoreError> {
        // The lease outlives one missed tick so leadership is sticky.
        let lease_ttl = self.interval * 2;
        if !self
            .snapshots
            .acquire_janitor_lease(&self.holder, lease_ttl)
            .await?
        {
            debug!(target = "kasha::janitor", "lease held elsewhere; skipping sweep");
            return Ok(None);
        }

        let cutoff = OffsetDateTime::now_utc() - self.remove_after;
        let removed = self.snapshots.expire_before(cutoff).await?;
        if removed > 0 {
            info!(target = "kasha::janitor", removed, "expired snapshots removed");
        }
        Ok(Some(removed))
    }

    /// Sweep on the configured interval until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await; // immediate first tick is skipped

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        warn!(target = "kasha::janitor", error = %err, "sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
