//! Opt-in housekeeping sweep (SPEC_FULL.md §C): when `delete_on_complete`
//! is off, completed records otherwise accumulate forever. Operators who
//! want bounded storage without switching to delete-on-complete can turn
//! this on with `housekeeping_interval_ms`.

use std::sync::Arc;

use outbox_schemas::{RecordRepository, RecordStatus};

/// Spawn the sweep timer. A no-op loop is not spawned at all when
/// `interval_ms` is zero — callers should check that before calling this.
pub fn spawn_housekeeping_loop(
    repository: Arc<dyn RecordRepository>,
    interval: std::time::Duration,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut shutdown = shutdown;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match repository.delete_by_status(RecordStatus::Completed).await {
                        Ok(n) if n > 0 => tracing::debug!(count = n, "housekeeping sweep deleted completed records"),
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "housekeeping sweep failed, retrying next cycle"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
