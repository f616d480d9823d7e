use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use fieldtrack_config::Settings;
use fieldtrack_services::{
    AchievementDao, SyncEngine, SystemClock, TaskStore,
    sync::{Connectivity, OfflineQueue, RedbStore, RetryPolicy},
};
use mongodb::Database;

/// Everything the daemon shares between the probe and the reconnect watcher.
///
/// The offline queue file is opened with redb's exclusive lock, so only one
/// syncd process may run per `offline_queue_path`. A second instance, or any
/// other process holding the file, fails at startup rather than sharing it.
#[derive(Clone)]
pub struct SyncState {
    pub db: Database,
    pub settings: Settings,
    pub store: Arc<TaskStore>,
    pub sync: Arc<SyncEngine>,
}

impl SyncState {
    pub fn new(db: Database, settings: Settings) -> anyhow::Result<Self> {
        let queue_dir = Path::new(&settings.sync.offline_queue_path);
        let local = RedbStore::open(queue_dir).with_context(|| {
            format!(
                "offline queue at {} is unavailable (is another syncd running?)",
                queue_dir.display()
            )
        })?;
        let queue = OfflineQueue::new(Arc::new(local));
        let remote = Arc::new(AchievementDao::new(&db));
        let store = Arc::new(TaskStore::new());
        // We only get here after a successful ping.
        let connectivity = Connectivity::new(true);

        let sync = Arc::new(SyncEngine::new(
            remote,
            queue,
            Arc::clone(&store),
            connectivity,
            Arc::new(SystemClock),
            RetryPolicy::from(&settings.sync),
        ));

        Ok(Self {
            db,
            settings,
            store,
            sync,
        })
    }

    pub fn connectivity(&self) -> &Connectivity {
        self.sync.connectivity()
    }
}
