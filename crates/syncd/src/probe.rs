use std::time::Duration;

use fieldtrack_db::connection::ping;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::state::SyncState;

/// Pings the remote store on a fixed interval and publishes the result as
/// the connectivity flag. While online, anything still queued (entries whose
/// replay hit another network error) is swept again on each tick.
pub fn spawn_probe(state: SyncState) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.settings.sync.probe_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let online = match ping(&state.db).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Remote store unreachable");
                    false
                }
            };

            // A transition wakes the reconnect watcher, which does the flush.
            if state.connectivity().set_online(online) || !online {
                continue;
            }

            match state.sync.pending_offline_count() {
                Ok(0) => {}
                Ok(pending) => {
                    debug!(pending, "Sweeping offline queue");
                    if let Err(e) = state.sync.flush_pending().await {
                        error!(error = %e, "Offline queue sweep failed");
                    }
                }
                Err(e) => error!(error = %e, "Could not read offline queue"),
            }
        }
    })
}
