use annosync::annotation_store::SqliteAnnotationStore;
use annosync::config::{AppConfig, CliArgs};
use annosync::metrics::init_metrics;
use annosync::search_index::SqliteSearchIndex;
use annosync::sync::SyncDriver;
use annosync::sync_queue::SqliteSyncQueueStore;
use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::resolve(CliArgs::parse())?;
    init_metrics();

    let queue = Arc::new(SqliteSyncQueueStore::new(&config.queue_db_path)?);
    let annotations = Arc::new(SqliteAnnotationStore::new(&config.annotations_db_path)?);
    let index = Arc::new(SqliteSearchIndex::new(&config.search_index_db_path)?);

    let driver = SyncDriver::new(
        queue,
        annotations,
        index,
        config.sync.clone(),
        config.worker_id.clone(),
    );

    if config.full_reindex {
        let stats = driver.full_reindex()?;
        info!(
            windows = stats.windows,
            indexed = stats.indexed,
            failed = stats.failed,
            "Reindex finished"
        );
    } else {
        driver.run_pass()?;
    }

    Ok(())
}
