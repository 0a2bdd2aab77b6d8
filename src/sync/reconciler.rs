//! Decides what, if anything, each dequeued job still requires.
//!
//! Works on timestamps alone: two bulk metadata fetches (system of record and
//! index) answer every job in the batch without loading a single full
//! annotation.

use crate::annotation_store::AnnotationStore;
use crate::search_index::SearchIndex;
use crate::sync_queue::{JobId, JobPayload, SyncJob};
use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

/// Why an annotation does or does not need another index write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Index copy matches the source; nothing to do.
    UpToDate,
    /// Annotation no longer exists in the system of record. The job's work
    /// is moot, which counts as done.
    SourceMissing,
    /// Never indexed, or pruned out-of-band.
    IndexMissing,
    /// Indexed from an older version of the annotation.
    IndexStale,
    /// Job demanded a rewrite regardless of freshness.
    Forced,
}

impl Outcome {
    /// Label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::UpToDate => "up_to_date",
            Outcome::SourceMissing => "source_missing",
            Outcome::IndexMissing => "index_missing",
            Outcome::IndexStale => "index_stale",
            Outcome::Forced => "forced",
        }
    }

    fn needs_indexing(&self) -> bool {
        matches!(
            self,
            Outcome::IndexMissing | Outcome::IndexStale | Outcome::Forced
        )
    }
}

/// Classify one annotation from the two metadata timestamps.
///
/// A missing source always wins, force included: there is nothing left to
/// index, so the job is complete either way.
pub fn classify(force: bool, source_updated: Option<i64>, index_updated: Option<i64>) -> Outcome {
    match (source_updated, index_updated) {
        (None, _) => Outcome::SourceMissing,
        (Some(_), _) if force => Outcome::Forced,
        (Some(_), None) => Outcome::IndexMissing,
        (Some(source), Some(index)) if source != index => Outcome::IndexStale,
        _ => Outcome::UpToDate,
    }
}

/// The reconciler's verdict over a batch of jobs.
pub struct ReconcilePlan {
    /// Annotation ids that need an index write, in first-seen job order.
    pub needs_indexing: Vec<String>,
    /// Jobs already satisfied (up-to-date or source gone); delete now.
    pub resolved_job_ids: Vec<JobId>,
    /// Every job id that asked about each annotation, duplicates collapsed.
    pub jobs_by_annotation: HashMap<String, Vec<JobId>>,
    /// Outcome tally for the batch.
    pub outcome_counts: HashMap<Outcome, usize>,
}

pub struct Reconciler<'a> {
    annotations: &'a dyn AnnotationStore,
    index: &'a dyn SearchIndex,
}

impl<'a> Reconciler<'a> {
    pub fn new(annotations: &'a dyn AnnotationStore, index: &'a dyn SearchIndex) -> Self {
        Reconciler { annotations, index }
    }

    /// Reconcile decoded jobs against both sides.
    ///
    /// Duplicate jobs for one annotation collapse into a single decision; a
    /// force from any of them forces the annotation.
    pub fn reconcile(&self, jobs: &[(SyncJob, JobPayload)]) -> Result<ReconcilePlan> {
        let mut jobs_by_annotation: HashMap<String, Vec<JobId>> = HashMap::new();
        let mut force_by_annotation: HashMap<String, bool> = HashMap::new();
        let mut order: Vec<String> = Vec::new();

        for (job, payload) in jobs {
            let JobPayload::SyncAnnotation {
                annotation_id,
                force,
            } = payload;
            if !jobs_by_annotation.contains_key(annotation_id) {
                order.push(annotation_id.clone());
            }
            jobs_by_annotation
                .entry(annotation_id.clone())
                .or_default()
                .push(job.id);
            *force_by_annotation.entry(annotation_id.clone()).or_insert(false) |= force;
        }

        let source_metadata = self.annotations.fetch_metadata(&order)?;
        let index_metadata = self.index.fetch_metadata(&order)?;

        let mut needs_indexing = Vec::new();
        let mut resolved_job_ids = Vec::new();
        let mut outcome_counts: HashMap<Outcome, usize> = HashMap::new();

        for annotation_id in &order {
            let force = force_by_annotation[annotation_id];
            let outcome = classify(
                force,
                source_metadata.get(annotation_id).copied(),
                index_metadata.get(annotation_id).copied(),
            );
            debug!(annotation_id, outcome = outcome.as_str(), "Reconciled");
            *outcome_counts.entry(outcome).or_insert(0) += 1;

            if outcome.needs_indexing() {
                needs_indexing.push(annotation_id.clone());
            } else {
                resolved_job_ids.extend(&jobs_by_annotation[annotation_id]);
            }
        }

        Ok(ReconcilePlan {
            needs_indexing,
            resolved_job_ids,
            jobs_by_annotation,
            outcome_counts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation_store::{NewAnnotation, SqliteAnnotationStore};
    use crate::search_index::{IndexDocument, SqliteSearchIndex};
    use crate::sync_queue::SYNC_ANNOTATION;

    #[test]
    fn test_classify_source_missing_wins() {
        assert_eq!(classify(false, None, None), Outcome::SourceMissing);
        assert_eq!(classify(false, None, Some(100)), Outcome::SourceMissing);
        // Even forced jobs have nothing to index
        assert_eq!(classify(true, None, Some(100)), Outcome::SourceMissing);
    }

    #[test]
    fn test_classify_force_beats_up_to_date() {
        assert_eq!(classify(true, Some(100), Some(100)), Outcome::Forced);
    }

    #[test]
    fn test_classify_timestamps() {
        assert_eq!(classify(false, Some(100), None), Outcome::IndexMissing);
        assert_eq!(classify(false, Some(200), Some(100)), Outcome::IndexStale);
        // Any mismatch is stale, direction does not matter
        assert_eq!(classify(false, Some(100), Some(200)), Outcome::IndexStale);
        assert_eq!(classify(false, Some(100), Some(100)), Outcome::UpToDate);
    }

    fn job(id: JobId, annotation_id: &str, force: bool) -> (SyncJob, JobPayload) {
        let payload = JobPayload::sync_annotation(annotation_id, force);
        (
            SyncJob {
                id,
                name: SYNC_ANNOTATION.to_string(),
                priority: 1,
                tag: "test".to_string(),
                payload: payload.to_json(),
                enqueued_at: 0,
                scheduled_at: 0,
                expires_at: None,
                claimed_by: None,
                claim_expires_at: None,
            },
            payload,
        )
    }

    fn stored_annotation(store: &SqliteAnnotationStore, id: &str, updated: i64) {
        store
            .upsert_annotation_at(
                &NewAnnotation {
                    id: id.to_string(),
                    userid: "acct:u1".to_string(),
                    groupid: "g1".to_string(),
                    text: String::new(),
                    tags: vec![],
                    shared: true,
                    target_uri: "https://example.com".to_string(),
                    document_id: None,
                },
                updated,
            )
            .unwrap();
    }

    fn indexed_document(index: &SqliteSearchIndex, id: &str, updated: i64) {
        let failed = index
            .bulk_upsert(&[IndexDocument {
                id: id.to_string(),
                userid: "acct:u1".to_string(),
                groupid: "g1".to_string(),
                text: String::new(),
                tags: vec![],
                shared: true,
                target_uri: "https://example.com".to_string(),
                document_title: None,
                created: updated,
                updated,
            }])
            .unwrap();
        assert!(failed.is_empty());
    }

    #[test]
    fn test_reconcile_partitions_batch() {
        let annotations = SqliteAnnotationStore::in_memory().unwrap();
        let index = SqliteSearchIndex::in_memory().unwrap();

        stored_annotation(&annotations, "current", 100);
        indexed_document(&index, "current", 100);
        stored_annotation(&annotations, "stale", 200);
        indexed_document(&index, "stale", 100);
        stored_annotation(&annotations, "unindexed", 100);
        indexed_document(&index, "orphan", 100);

        let jobs = vec![
            job(1, "current", false),
            job(2, "stale", false),
            job(3, "unindexed", false),
            job(4, "orphan", false),
        ];

        let reconciler = Reconciler::new(&annotations, &index);
        let plan = reconciler.reconcile(&jobs).unwrap();

        assert_eq!(
            plan.needs_indexing,
            vec!["stale".to_string(), "unindexed".to_string()]
        );
        let mut resolved = plan.resolved_job_ids.clone();
        resolved.sort();
        assert_eq!(resolved, vec![1, 4]);
        assert_eq!(plan.outcome_counts[&Outcome::UpToDate], 1);
        assert_eq!(plan.outcome_counts[&Outcome::IndexStale], 1);
        assert_eq!(plan.outcome_counts[&Outcome::IndexMissing], 1);
        assert_eq!(plan.outcome_counts[&Outcome::SourceMissing], 1);
    }

    #[test]
    fn test_reconcile_collapses_duplicates() {
        let annotations = SqliteAnnotationStore::in_memory().unwrap();
        let index = SqliteSearchIndex::in_memory().unwrap();

        stored_annotation(&annotations, "a1", 100);
        indexed_document(&index, "a1", 100);

        // Three jobs for one annotation; one of them is forced
        let jobs = vec![job(1, "a1", false), job(2, "a1", true), job(3, "a1", false)];

        let reconciler = Reconciler::new(&annotations, &index);
        let plan = reconciler.reconcile(&jobs).unwrap();

        assert_eq!(plan.needs_indexing, vec!["a1".to_string()]);
        assert_eq!(plan.outcome_counts[&Outcome::Forced], 1);
        assert_eq!(plan.jobs_by_annotation["a1"], vec![1, 2, 3]);
        assert!(plan.resolved_job_ids.is_empty());
    }

    #[test]
    fn test_reconcile_empty_batch() {
        let annotations = SqliteAnnotationStore::in_memory().unwrap();
        let index = SqliteSearchIndex::in_memory().unwrap();

        let reconciler = Reconciler::new(&annotations, &index);
        let plan = reconciler.reconcile(&[]).unwrap();

        assert!(plan.needs_indexing.is_empty());
        assert!(plan.resolved_job_ids.is_empty());
        assert!(plan.outcome_counts.is_empty());
    }
}
