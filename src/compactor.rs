use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the journal once it has grown by
/// `threshold` appends since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// One compactor pass. Returns whether a compaction ran and succeeded.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        debug!("compactor: {appends} appends since last compaction, threshold {threshold}");
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!("compacted journal after {appends} appends");
            true
        }
        Err(e) => {
            tracing::error!("journal compaction failed: {e}");
            false
        }
    }
}
