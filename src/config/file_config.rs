use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Optional TOML config file. Every field is optional; anything set here
/// overrides the command line.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub queue_db_path: Option<PathBuf>,
    pub annotations_db_path: Option<PathBuf>,
    pub search_index_db_path: Option<PathBuf>,
    pub worker_id: Option<String>,
    #[serde(default)]
    pub sync: SyncFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncFileConfig {
    pub batch_limit: Option<usize>,
    pub lease_secs: Option<i64>,
    pub job_ttl_secs: Option<i64>,
    pub chunk_size: Option<usize>,
    pub reindex_window_secs: Option<i64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file {:?}", path))
    }
}
