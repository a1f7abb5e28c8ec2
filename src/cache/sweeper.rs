//! Background expiry sweep.
//!
//! Reads already purge lazily; the sweeper makes update callbacks (such as the
//! partial poller) run on time while no requests arrive.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use super::store::CacheStore;

/// Spawn a task that purges `store` every `period`. Abort the handle to stop it.
pub fn spawn_sweeper<V>(store: Arc<CacheStore<V>>, period: Duration) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                trace!(target: "vellum::cache", purged, "Sweeper purged entries");
            }
        }
    })
}
