//! The periodic sync pass: claim jobs, reconcile, index, clean up.

use super::batch_indexer::{BatchIndexer, ReindexStats};
use super::reconciler::{Outcome, Reconciler};
use crate::annotation_store::AnnotationStore;
use crate::config::SyncSettings;
use crate::metrics;
use crate::search_index::SearchIndex;
use crate::sync_queue::{JobId, JobPriority, SyncQueueStore, SYNC_ANNOTATION};
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What one pass did, for logs and operators.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    pub dequeued: usize,
    pub malformed: usize,
    pub up_to_date: usize,
    pub source_missing: usize,
    pub index_missing: usize,
    pub index_stale: usize,
    pub forced: usize,
    pub indexed: usize,
    pub index_failed: usize,
    pub jobs_deleted: usize,
    pub jobs_released: usize,
    pub pending_after: usize,
}

pub struct SyncDriver {
    queue: Arc<dyn SyncQueueStore>,
    annotations: Arc<dyn AnnotationStore>,
    index: Arc<dyn SearchIndex>,
    settings: SyncSettings,
    worker_id: String,
}

impl SyncDriver {
    pub fn new(
        queue: Arc<dyn SyncQueueStore>,
        annotations: Arc<dyn AnnotationStore>,
        index: Arc<dyn SearchIndex>,
        settings: SyncSettings,
        worker_id: String,
    ) -> Self {
        SyncDriver {
            queue,
            annotations,
            index,
            settings,
            worker_id,
        }
    }

    /// Run one sync pass over the queue.
    ///
    /// Cleanup discipline: jobs whose work is done (up to date, source gone,
    /// or successfully indexed) are deleted; jobs whose index write failed
    /// are released so the next pass retries them. Malformed jobs are left
    /// claimed and age out through their expiry.
    pub fn run_pass(&self) -> Result<PassStats> {
        let started = Instant::now();
        let mut stats = PassStats::default();

        let jobs = self.queue.dequeue(
            SYNC_ANNOTATION,
            self.settings.batch_limit,
            &self.worker_id,
            self.settings.lease_secs,
        )?;
        stats.dequeued = jobs.len();
        for job in &jobs {
            let label = JobPriority::from_i32(job.priority)
                .map(|p| p.as_str())
                .unwrap_or("unknown");
            metrics::JOBS_DEQUEUED.with_label_values(&[label]).inc();
        }

        let mut decoded = Vec::with_capacity(jobs.len());
        for job in jobs {
            match job.decode_payload() {
                Ok(payload) => decoded.push((job, payload)),
                Err(e) => {
                    warn!(job_id = job.id, error = %e, "Skipping undecodable job");
                    stats.malformed += 1;
                    metrics::JOBS_MALFORMED.inc();
                }
            }
        }

        let reconciler = Reconciler::new(self.annotations.as_ref(), self.index.as_ref());
        let plan = reconciler.reconcile(&decoded)?;

        for (outcome, count) in &plan.outcome_counts {
            metrics::JOBS_RESOLVED
                .with_label_values(&[outcome.as_str()])
                .inc_by(*count as u64);
            match outcome {
                Outcome::UpToDate => stats.up_to_date = *count,
                Outcome::SourceMissing => stats.source_missing = *count,
                Outcome::IndexMissing => stats.index_missing = *count,
                Outcome::IndexStale => stats.index_stale = *count,
                Outcome::Forced => stats.forced = *count,
            }
        }

        let indexer = BatchIndexer::new(
            self.annotations.as_ref(),
            self.index.as_ref(),
            self.settings.chunk_size,
        );
        let failed = indexer.index(&plan.needs_indexing)?;
        stats.index_failed = failed.len();
        stats.indexed = plan.needs_indexing.len() - failed.len();
        metrics::INDEX_WRITE_FAILURES.inc_by(failed.len() as u64);

        let mut deletable: Vec<JobId> = plan.resolved_job_ids;
        let mut releasable: Vec<JobId> = Vec::new();
        for annotation_id in &plan.needs_indexing {
            let job_ids = &plan.jobs_by_annotation[annotation_id];
            if failed.contains(annotation_id) {
                releasable.extend(job_ids);
            } else {
                deletable.extend(job_ids);
            }
        }

        stats.jobs_deleted = self.queue.delete(&deletable)?;
        stats.jobs_released = self.queue.release(&releasable)?;
        stats.pending_after = self.queue.pending_count(SYNC_ANNOTATION)?;

        metrics::QUEUE_PENDING.set(stats.pending_after as i64);
        metrics::SYNC_PASSES.inc();
        metrics::PASS_DURATION.observe(started.elapsed().as_secs_f64());

        info!(
            dequeued = stats.dequeued,
            indexed = stats.indexed,
            up_to_date = stats.up_to_date,
            source_missing = stats.source_missing,
            failed = stats.index_failed,
            released = stats.jobs_released,
            pending = stats.pending_after,
            "Sync pass complete"
        );
        Ok(stats)
    }

    /// Rebuild the whole index, bypassing the queue.
    pub fn full_reindex(&self) -> Result<ReindexStats> {
        let indexer = BatchIndexer::new(
            self.annotations.as_ref(),
            self.index.as_ref(),
            self.settings.chunk_size,
        );
        indexer.reindex_all(self.settings.reindex_window_secs)
    }
}
