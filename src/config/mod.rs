mod file_config;

pub use file_config::FileConfig;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Tuning knobs for a sync pass.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Max jobs claimed per pass.
    pub batch_limit: usize,
    /// How long a claim shields a job from other workers.
    pub lease_secs: i64,
    /// How long an unserviced job stays eligible before it is discarded.
    pub job_ttl_secs: i64,
    /// Annotations fetched and indexed per round trip.
    pub chunk_size: usize,
    /// Width of each `updated` slice during a full reindex.
    pub reindex_window_secs: i64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            batch_limit: 200,
            lease_secs: 120,
            job_ttl_secs: 604800, // 7 days
            chunk_size: 100,
            reindex_window_secs: 3600,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "annosync", about = "Annotation search index synchronizer")]
pub struct CliArgs {
    /// Path to the sync queue database.
    #[arg(long, default_value = "sync_queue.db")]
    pub queue_db: PathBuf,

    /// Path to the annotation database.
    #[arg(long, default_value = "annotations.db")]
    pub annotations_db: PathBuf,

    /// Path to the search index database.
    #[arg(long, default_value = "search_index.db")]
    pub search_index_db: PathBuf,

    /// Optional TOML config file; its settings override these flags.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Max jobs to claim in this pass.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Identity stamped on claimed jobs. Defaults to annosync-<pid>.
    #[arg(long)]
    pub worker_id: Option<String>,

    /// Rebuild the whole index instead of running a queue pass.
    #[arg(long)]
    pub full_reindex: bool,
}

/// Fully resolved runtime configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub queue_db_path: PathBuf,
    pub annotations_db_path: PathBuf,
    pub search_index_db_path: PathBuf,
    pub worker_id: String,
    pub full_reindex: bool,
    pub sync: SyncSettings,
}

impl AppConfig {
    pub fn resolve(args: CliArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            batch_limit: file
                .sync
                .batch_limit
                .or(args.limit)
                .unwrap_or(defaults.batch_limit),
            lease_secs: file.sync.lease_secs.unwrap_or(defaults.lease_secs),
            job_ttl_secs: file.sync.job_ttl_secs.unwrap_or(defaults.job_ttl_secs),
            chunk_size: file.sync.chunk_size.unwrap_or(defaults.chunk_size),
            reindex_window_secs: file
                .sync
                .reindex_window_secs
                .unwrap_or(defaults.reindex_window_secs),
        };

        Ok(AppConfig {
            queue_db_path: file.queue_db_path.unwrap_or(args.queue_db),
            annotations_db_path: file.annotations_db_path.unwrap_or(args.annotations_db),
            search_index_db_path: file.search_index_db_path.unwrap_or(args.search_index_db),
            worker_id: file
                .worker_id
                .or(args.worker_id)
                .unwrap_or_else(|| format!("annosync-{}", std::process::id())),
            full_reindex: args.full_reindex,
            sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_args() -> CliArgs {
        CliArgs::parse_from(["annosync"])
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::resolve(bare_args()).unwrap();

        assert_eq!(config.queue_db_path, PathBuf::from("sync_queue.db"));
        assert_eq!(config.sync.batch_limit, 200);
        assert_eq!(config.sync.lease_secs, 120);
        assert_eq!(config.sync.job_ttl_secs, 604800);
        assert_eq!(config.sync.chunk_size, 100);
        assert_eq!(config.sync.reindex_window_secs, 3600);
        assert!(config.worker_id.starts_with("annosync-"));
        assert!(!config.full_reindex);
    }

    #[test]
    fn test_cli_limit_and_worker() {
        let args = CliArgs::parse_from(["annosync", "--limit", "25", "--worker-id", "w7"]);
        let config = AppConfig::resolve(args).unwrap();

        assert_eq!(config.sync.batch_limit, 25);
        assert_eq!(config.worker_id, "w7");
    }

    #[test]
    fn test_file_overrides_cli() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("annosync.toml");
        std::fs::write(
            &config_path,
            r#"
            worker_id = "from-file"

            [sync]
            batch_limit = 10
            "#,
        )
        .unwrap();

        let args = CliArgs::parse_from([
            "annosync",
            "--limit",
            "99",
            "--worker-id",
            "from-cli",
            "--config",
            config_path.to_str().unwrap(),
        ]);
        let config = AppConfig::resolve(args).unwrap();

        assert_eq!(config.sync.batch_limit, 10);
        assert_eq!(config.worker_id, "from-file");
    }
}
