//! Shared fixtures for end-to-end sync tests.

use annosync::annotation_store::{NewAnnotation, SqliteAnnotationStore};
use annosync::config::SyncSettings;
use annosync::search_index::{IndexDocument, SearchIndex, SqliteSearchIndex};
use annosync::sync::SyncDriver;
use annosync::sync_queue::{JobQueueService, SqliteSyncQueueStore};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// File-backed stores in a temp directory, wired the way the binary wires
/// them.
pub struct TestEnv {
    pub queue: Arc<SqliteSyncQueueStore>,
    pub annotations: Arc<SqliteAnnotationStore>,
    pub index: Arc<SqliteSearchIndex>,
    _dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let queue =
            Arc::new(SqliteSyncQueueStore::new(dir.path().join("sync_queue.db")).unwrap());
        let annotations =
            Arc::new(SqliteAnnotationStore::new(dir.path().join("annotations.db")).unwrap());
        let index =
            Arc::new(SqliteSearchIndex::new(dir.path().join("search_index.db")).unwrap());
        TestEnv {
            queue,
            annotations,
            index,
            _dir: dir,
        }
    }

    pub fn service(&self) -> JobQueueService {
        JobQueueService::new(
            self.queue.clone(),
            self.annotations.clone(),
            SyncSettings::default().job_ttl_secs,
        )
    }

    pub fn driver(&self) -> SyncDriver {
        self.driver_with_settings(SyncSettings::default())
    }

    pub fn driver_with_settings(&self, settings: SyncSettings) -> SyncDriver {
        SyncDriver::new(
            self.queue.clone(),
            self.annotations.clone(),
            self.index.clone(),
            settings,
            "test-worker".to_string(),
        )
    }

    pub fn driver_with_index(&self, index: Arc<dyn SearchIndex>) -> SyncDriver {
        SyncDriver::new(
            self.queue.clone(),
            self.annotations.clone(),
            index,
            SyncSettings::default(),
            "test-worker".to_string(),
        )
    }

    pub fn add_annotation(&self, id: &str, userid: &str, groupid: &str, updated: i64) {
        self.annotations
            .upsert_annotation_at(
                &NewAnnotation {
                    id: id.to_string(),
                    userid: userid.to_string(),
                    groupid: groupid.to_string(),
                    text: format!("text of {}", id),
                    tags: vec!["test".to_string()],
                    shared: true,
                    target_uri: "https://example.com/article".to_string(),
                    document_id: None,
                },
                updated,
            )
            .unwrap();
    }

    pub fn index_updated(&self, id: &str) -> Option<i64> {
        self.index
            .fetch_metadata(&[id.to_string()])
            .unwrap()
            .get(id)
            .copied()
    }
}

/// Search index wrapper that refuses writes for a chosen set of ids.
pub struct FlakyIndex {
    inner: Arc<SqliteSearchIndex>,
    failing: Mutex<HashSet<String>>,
}

impl FlakyIndex {
    pub fn new(inner: Arc<SqliteSearchIndex>, failing: &[&str]) -> Self {
        FlakyIndex {
            inner,
            failing: Mutex::new(failing.iter().map(|s| s.to_string()).collect()),
        }
    }

    /// Stop failing the given id, as if the index recovered.
    pub fn heal(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }
}

impl SearchIndex for FlakyIndex {
    fn fetch_metadata(&self, ids: &[String]) -> Result<HashMap<String, i64>> {
        self.inner.fetch_metadata(ids)
    }

    fn bulk_upsert(&self, documents: &[IndexDocument]) -> Result<Vec<String>> {
        let failing = self.failing.lock().unwrap();
        let (refused, accepted): (Vec<_>, Vec<_>) = documents
            .iter()
            .cloned()
            .partition(|d| failing.contains(&d.id));
        drop(failing);
        let mut failed = self.inner.bulk_upsert(&accepted)?;
        failed.extend(refused.into_iter().map(|d| d.id));
        Ok(failed)
    }
}
