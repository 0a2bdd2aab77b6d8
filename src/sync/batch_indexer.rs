//! Writes annotations into the search index in bounded chunks.

use crate::annotation_store::AnnotationStore;
use crate::search_index::{IndexDocument, SearchIndex};
use anyhow::Result;
use std::collections::HashSet;
use tracing::{info, warn};

pub struct BatchIndexer<'a> {
    annotations: &'a dyn AnnotationStore,
    index: &'a dyn SearchIndex,
    chunk_size: usize,
}

/// Tally of a full reindex sweep.
#[derive(Debug, Default)]
pub struct ReindexStats {
    pub windows: usize,
    pub indexed: usize,
    pub failed: usize,
}

impl<'a> BatchIndexer<'a> {
    pub fn new(
        annotations: &'a dyn AnnotationStore,
        index: &'a dyn SearchIndex,
        chunk_size: usize,
    ) -> Self {
        BatchIndexer {
            annotations,
            index,
            chunk_size,
        }
    }

    /// Fetch and index the given annotations. Returns the ids whose index
    /// write failed.
    ///
    /// An id deleted between reconciliation and the fetch here is NOT a
    /// failure: there is nothing left to index, so its jobs are done. Only
    /// ids the index refused stay failed, and their jobs go back to the
    /// queue.
    pub fn index(&self, ids: &[String]) -> Result<HashSet<String>> {
        let mut failed = HashSet::new();
        for chunk in ids.chunks(self.chunk_size.max(1)) {
            let annotations = self.annotations.fetch_annotations(chunk)?;
            if annotations.len() < chunk.len() {
                info!(
                    missing = chunk.len() - annotations.len(),
                    "Annotations deleted since reconciliation, skipping"
                );
            }
            let documents: Vec<IndexDocument> = annotations
                .iter()
                .map(IndexDocument::from_annotation)
                .collect();
            for id in self.index.bulk_upsert(&documents)? {
                warn!(annotation_id = %id, "Index write failed, leaving job queued");
                failed.insert(id);
            }
        }
        Ok(failed)
    }

    /// Rebuild the entire index by sweeping the system of record in
    /// `window_secs`-wide slices of `updated` time.
    ///
    /// Windowing keeps each id query bounded on stores too large to list in
    /// one go. Bypasses the queue entirely; used for disaster recovery and
    /// first-time index builds.
    pub fn reindex_all(&self, window_secs: i64) -> Result<ReindexStats> {
        let mut stats = ReindexStats::default();
        let Some((min_updated, max_updated)) = self.annotations.updated_bounds()? else {
            info!("No annotations to reindex");
            return Ok(stats);
        };

        let window_secs = window_secs.max(1);
        let mut start = min_updated;
        while start <= max_updated {
            let end = start + window_secs;
            let ids = self.annotations.annotation_ids_updated_between(start, end)?;
            if !ids.is_empty() {
                let failed = self.index(&ids)?;
                stats.indexed += ids.len() - failed.len();
                stats.failed += failed.len();
            }
            stats.windows += 1;
            start = end;
        }

        info!(
            windows = stats.windows,
            indexed = stats.indexed,
            failed = stats.failed,
            "Full reindex complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation_store::{NewAnnotation, SqliteAnnotationStore};
    use crate::search_index::{SearchIndex, SqliteSearchIndex};

    fn annotation(id: &str) -> NewAnnotation {
        NewAnnotation {
            id: id.to_string(),
            userid: "acct:u1".to_string(),
            groupid: "g1".to_string(),
            text: "body".to_string(),
            tags: vec![],
            shared: true,
            target_uri: "https://example.com".to_string(),
            document_id: None,
        }
    }

    #[test]
    fn test_index_writes_documents() {
        let annotations = SqliteAnnotationStore::in_memory().unwrap();
        let index = SqliteSearchIndex::in_memory().unwrap();
        annotations.upsert_annotation_at(&annotation("a1"), 100).unwrap();
        annotations.upsert_annotation_at(&annotation("a2"), 200).unwrap();

        let indexer = BatchIndexer::new(&annotations, &index, 100);
        let failed = indexer
            .index(&["a1".to_string(), "a2".to_string()])
            .unwrap();

        assert!(failed.is_empty());
        let metadata = index
            .fetch_metadata(&["a1".to_string(), "a2".to_string()])
            .unwrap();
        assert_eq!(metadata.get("a1"), Some(&100));
        assert_eq!(metadata.get("a2"), Some(&200));
    }

    #[test]
    fn test_deleted_since_reconciliation_is_not_a_failure() {
        let annotations = SqliteAnnotationStore::in_memory().unwrap();
        let index = SqliteSearchIndex::in_memory().unwrap();
        annotations.upsert_annotation_at(&annotation("a1"), 100).unwrap();

        let indexer = BatchIndexer::new(&annotations, &index, 100);
        let failed = indexer
            .index(&["a1".to_string(), "vanished".to_string()])
            .unwrap();

        assert!(failed.is_empty());
        assert_eq!(index.document_count().unwrap(), 1);
    }

    #[test]
    fn test_invalid_annotation_reported_failed() {
        let annotations = SqliteAnnotationStore::in_memory().unwrap();
        let index = SqliteSearchIndex::in_memory().unwrap();
        let mut bad = annotation("bad");
        bad.target_uri = String::new();
        annotations.upsert_annotation_at(&bad, 100).unwrap();
        annotations.upsert_annotation_at(&annotation("good"), 100).unwrap();

        let indexer = BatchIndexer::new(&annotations, &index, 100);
        let failed = indexer
            .index(&["bad".to_string(), "good".to_string()])
            .unwrap();

        assert_eq!(failed.len(), 1);
        assert!(failed.contains("bad"));
        assert!(index.fetch_document("good").unwrap().is_some());
    }

    #[test]
    fn test_chunking_covers_all_ids() {
        let annotations = SqliteAnnotationStore::in_memory().unwrap();
        let index = SqliteSearchIndex::in_memory().unwrap();
        let ids: Vec<String> = (0..7).map(|i| format!("a{}", i)).collect();
        for id in &ids {
            annotations.upsert_annotation_at(&annotation(id), 100).unwrap();
        }

        // chunk_size 3 forces three fetch+upsert rounds
        let indexer = BatchIndexer::new(&annotations, &index, 3);
        let failed = indexer.index(&ids).unwrap();

        assert!(failed.is_empty());
        assert_eq!(index.document_count().unwrap(), 7);
    }

    #[test]
    fn test_reindex_all_windows_over_updated_range() {
        let annotations = SqliteAnnotationStore::in_memory().unwrap();
        let index = SqliteSearchIndex::in_memory().unwrap();
        annotations.upsert_annotation_at(&annotation("early"), 0).unwrap();
        annotations.upsert_annotation_at(&annotation("late"), 10_000).unwrap();

        let indexer = BatchIndexer::new(&annotations, &index, 100);
        let stats = indexer.reindex_all(3600).unwrap();

        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.failed, 0);
        assert!(stats.windows >= 3);
        assert_eq!(index.document_count().unwrap(), 2);
    }

    #[test]
    fn test_reindex_all_empty_store() {
        let annotations = SqliteAnnotationStore::in_memory().unwrap();
        let index = SqliteSearchIndex::in_memory().unwrap();

        let indexer = BatchIndexer::new(&annotations, &index, 100);
        let stats = indexer.reindex_all(3600).unwrap();

        assert_eq!(stats.windows, 0);
        assert_eq!(stats.indexed, 0);
    }
}
