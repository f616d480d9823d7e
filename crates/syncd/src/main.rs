use fieldtrack_config::Settings;
use fieldtrack_db::{connect, indexes::ensure_indexes};
use fieldtrack_syncd::{probe::spawn_probe, state::SyncState};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (silently ignore if missing)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "fieldtrack_syncd=debug,fieldtrack_services=debug,fieldtrack_db=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;
    info!(
        queue = %settings.sync.offline_queue_path,
        max_attempts = settings.sync.max_attempts,
        probe_secs = settings.sync.probe_interval_secs,
        "Starting FieldTrack sync daemon"
    );

    let db = connect(&settings).await?;
    ensure_indexes(&db).await?;

    let state = SyncState::new(db, settings)?;

    // Drain whatever a previous run left behind before watching for reconnects.
    let report = state.sync.flush_pending().await?;
    if !report.failed.is_empty() {
        warn!(failed = report.failed.len(), "Some queued achievements were rejected by the remote store");
    }

    let watcher = state.sync.spawn_reconnect_watcher();
    let probe = spawn_probe(state.clone());

    tokio::signal::ctrl_c().await?;
    info!(
        pending = state.sync.pending_offline_count()?,
        "Shutting down"
    );
    probe.abort();
    watcher.abort();

    Ok(())
}
