//! Background task that prunes sessions left empty past a grace period.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::SessionStore;

/// Spawn the janitor. It ticks every `interval` and removes empty sessions
/// older than `grace`. Abort the handle to stop it.
pub fn spawn_janitor(store: Arc<SessionStore>, grace: Duration, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; startup pruning is separate.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.prune_empty(grace)).await {
                Ok(Ok(pruned)) => debug!(pruned, "Session janitor pass complete"),
                Ok(Err(e)) => warn!(error = %e, "Session janitor pass failed"),
                Err(e) => warn!(error = %e, "Session janitor task failed"),
            }
        }
    })
}
