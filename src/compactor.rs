use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::engine::Engine;

/// Background task that rewrites both journals once enough transactions have
/// been appended since the last rewrite, dropping history past retention.
pub async fn run_compactor(engine: Arc<Engine>, config: EngineConfig) {
    let mut interval = tokio::time::interval(config.compact_interval);
    loop {
        interval.tick().await;
        compact_if_due(&engine, &config).await;
    }
}

/// Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, config: &EngineConfig) -> bool {
    let appends = engine.store().appends_since_compact().await;
    if appends < config.compact_threshold {
        return false;
    }
    let keep_from = config.retention_cutoff(Local::now().date_naive());
    match engine.compact(keep_from).await {
        Ok(()) => {
            info!(appends, %keep_from, "journals compacted");
            true
        }
        Err(e) => {
            warn!("compaction failed: {e}");
            false
        }
    }
}
