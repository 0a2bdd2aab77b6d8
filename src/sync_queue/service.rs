//! High-level enqueue API.
//!
//! Callers never build [`NewJob`] rows by hand; they go through this service,
//! which expands "everything for user X" style requests into per-annotation
//! jobs at the right priority band and stamps scheduling and expiry times.

use super::models::{JobId, JobPriority, NewJob};
use super::store::SyncQueueStore;
use crate::annotation_store::AnnotationStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

pub struct JobQueueService {
    store: Arc<dyn SyncQueueStore>,
    annotations: Arc<dyn AnnotationStore>,
    job_ttl_secs: i64,
}

impl JobQueueService {
    pub fn new(
        store: Arc<dyn SyncQueueStore>,
        annotations: Arc<dyn AnnotationStore>,
        job_ttl_secs: i64,
    ) -> Self {
        JobQueueService {
            store,
            annotations,
            job_ttl_secs,
        }
    }

    /// Request a re-sync of one annotation.
    ///
    /// `schedule_in` delays eligibility, letting a caller that knows more
    /// writes are coming debounce them into one pass.
    pub fn add_annotation(
        &self,
        annotation_id: &str,
        tag: &str,
        force: bool,
        schedule_in: Option<i64>,
    ) -> Result<Vec<JobId>> {
        self.add_ids(
            &[annotation_id.to_string()],
            JobPriority::SingleAnnotation,
            tag,
            force,
            schedule_in,
        )
    }

    /// Request a re-sync of every annotation authored by `userid`.
    pub fn add_annotations_for_user(
        &self,
        userid: &str,
        tag: &str,
        force: bool,
        schedule_in: Option<i64>,
    ) -> Result<Vec<JobId>> {
        let ids = self.annotations.annotation_ids_for_user(userid)?;
        info!(userid, count = ids.len(), "Queueing user re-sync");
        self.add_ids(&ids, JobPriority::UserReindex, tag, force, schedule_in)
    }

    /// Request a re-sync of every annotation in `groupid`.
    pub fn add_annotations_for_group(
        &self,
        groupid: &str,
        tag: &str,
        force: bool,
        schedule_in: Option<i64>,
    ) -> Result<Vec<JobId>> {
        let ids = self.annotations.annotation_ids_for_group(groupid)?;
        info!(groupid, count = ids.len(), "Queueing group re-sync");
        self.add_ids(&ids, JobPriority::GroupReindex, tag, force, schedule_in)
    }

    /// Request a re-sync of every annotation updated in `[start, end)`.
    pub fn add_annotations_between_times(
        &self,
        start: i64,
        end: i64,
        tag: &str,
        force: bool,
    ) -> Result<Vec<JobId>> {
        let ids = self.annotations.annotation_ids_updated_between(start, end)?;
        info!(start, end, count = ids.len(), "Queueing time window re-sync");
        self.add_ids(&ids, JobPriority::TimeWindowReindex, tag, force, None)
    }

    fn add_ids(
        &self,
        ids: &[String],
        priority: JobPriority,
        tag: &str,
        force: bool,
        schedule_in: Option<i64>,
    ) -> Result<Vec<JobId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let now = chrono::Utc::now().timestamp();
        let scheduled_at = now + schedule_in.unwrap_or(0);
        // Jobs not serviced within the TTL are stale requests; let dequeue
        // skip them rather than churn the index for nothing.
        let expires_at = Some(now + self.job_ttl_secs);

        let jobs: Vec<NewJob> = ids
            .iter()
            .map(|id| NewJob::sync_annotation(id, force, priority, tag, scheduled_at, expires_at))
            .collect();
        self.store.enqueue(&jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation_store::{NewAnnotation, SqliteAnnotationStore};
    use crate::sync_queue::models::SYNC_ANNOTATION;
    use crate::sync_queue::store::SqliteSyncQueueStore;

    fn service() -> (Arc<SqliteSyncQueueStore>, Arc<SqliteAnnotationStore>, JobQueueService) {
        let store = Arc::new(SqliteSyncQueueStore::in_memory().unwrap());
        let annotations = Arc::new(SqliteAnnotationStore::in_memory().unwrap());
        let svc = JobQueueService::new(store.clone(), annotations.clone(), 604800);
        (store, annotations, svc)
    }

    fn add_annotation(store: &SqliteAnnotationStore, id: &str, userid: &str, groupid: &str) {
        store
            .upsert_annotation(&NewAnnotation {
                id: id.to_string(),
                userid: userid.to_string(),
                groupid: groupid.to_string(),
                text: String::new(),
                tags: vec![],
                shared: true,
                target_uri: "https://example.com".to_string(),
                document_id: None,
            })
            .unwrap();
    }

    #[test]
    fn test_add_annotation_enqueues_single_job() {
        let (store, _annotations, svc) = service();

        let ids = svc.add_annotation("a1", "api_create", false, None).unwrap();

        assert_eq!(ids.len(), 1);
        let jobs = store.dequeue(SYNC_ANNOTATION, 10, "w1", 60).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].priority, JobPriority::SingleAnnotation.as_i32());
        assert_eq!(jobs[0].tag, "api_create");
        assert!(jobs[0].expires_at.is_some());
    }

    #[test]
    fn test_add_annotation_schedule_in_delays_eligibility() {
        let (store, _annotations, svc) = service();

        svc.add_annotation("a1", "debounced", false, Some(3600)).unwrap();

        assert!(store.dequeue(SYNC_ANNOTATION, 10, "w1", 60).unwrap().is_empty());
        assert_eq!(store.pending_count(SYNC_ANNOTATION).unwrap(), 1);
    }

    #[test]
    fn test_add_for_user_expands_to_per_annotation_jobs() {
        let (store, annotations, svc) = service();
        add_annotation(&annotations, "a1", "acct:alice", "g1");
        add_annotation(&annotations, "a2", "acct:alice", "g2");
        add_annotation(&annotations, "a3", "acct:bob", "g1");

        let ids = svc
            .add_annotations_for_user("acct:alice", "user_rename", false, None)
            .unwrap();

        assert_eq!(ids.len(), 2);
        let jobs = store.dequeue(SYNC_ANNOTATION, 10, "w1", 60).unwrap();
        assert!(jobs
            .iter()
            .all(|j| j.priority == JobPriority::UserReindex.as_i32()));
    }

    #[test]
    fn test_add_for_unknown_user_enqueues_nothing() {
        let (store, _annotations, svc) = service();

        let ids = svc
            .add_annotations_for_user("acct:nobody", "user_rename", false, None)
            .unwrap();

        assert!(ids.is_empty());
        assert_eq!(store.pending_count(SYNC_ANNOTATION).unwrap(), 0);
    }

    #[test]
    fn test_add_for_group_uses_group_band() {
        let (store, annotations, svc) = service();
        add_annotation(&annotations, "a1", "acct:alice", "g1");
        add_annotation(&annotations, "a2", "acct:bob", "g1");

        svc.add_annotations_for_group("g1", "group_edit", true, None).unwrap();

        let jobs = store.dequeue(SYNC_ANNOTATION, 10, "w1", 60).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs
            .iter()
            .all(|j| j.priority == JobPriority::GroupReindex.as_i32()));
        let payload = jobs[0].decode_payload().unwrap();
        let crate::sync_queue::models::JobPayload::SyncAnnotation { force, .. } = payload;
        assert!(force);
    }

    #[test]
    fn test_add_between_times_uses_window_band() {
        let (store, annotations, svc) = service();
        annotations
            .upsert_annotation_at(
                &NewAnnotation {
                    id: "old".to_string(),
                    userid: "u".to_string(),
                    groupid: "g".to_string(),
                    text: String::new(),
                    tags: vec![],
                    shared: true,
                    target_uri: "https://example.com".to_string(),
                    document_id: None,
                },
                100,
            )
            .unwrap();

        let ids = svc
            .add_annotations_between_times(0, 1000, "backfill", true)
            .unwrap();

        assert_eq!(ids.len(), 1);
        let jobs = store.dequeue(SYNC_ANNOTATION, 10, "w1", 60).unwrap();
        assert_eq!(jobs[0].priority, JobPriority::TimeWindowReindex.as_i32());
    }
}
