//! Data models for the sync job queue.
//!
//! Defines job rows, priority bands, and the typed job payload union.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Job type discriminator for annotation re-sync work.
///
/// The queue table may contain jobs of other names (owned by other
/// subsystems); this crate only ever dequeues and deletes its own.
pub const SYNC_ANNOTATION: &str = "sync_annotation";

/// Opaque job identifier. Assigned by SQLite on insert; insertion order is
/// the FIFO tie-break within a priority band.
pub type JobId = i64;

/// Priority band for sync jobs.
/// Lower values = serviced first, so narrow requests are never starved
/// behind bulk re-syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobPriority {
    SingleAnnotation = 1, // one annotation, precise
    UserReindex = 2,      // every annotation of one user
    GroupReindex = 3,     // every annotation in one group
    TimeWindowReindex = 4, // every annotation updated in a time window
}

impl JobPriority {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(JobPriority::SingleAnnotation),
            2 => Some(JobPriority::UserReindex),
            3 => Some(JobPriority::GroupReindex),
            4 => Some(JobPriority::TimeWindowReindex),
            _ => None,
        }
    }

    /// Label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::SingleAnnotation => "single_annotation",
            JobPriority::UserReindex => "user_reindex",
            JobPriority::GroupReindex => "group_reindex",
            JobPriority::TimeWindowReindex => "time_window_reindex",
        }
    }
}

/// Typed job payload, serialized as tagged JSON in the `payload` column.
///
/// A discriminated union rather than an open key/value bag: the only variant
/// this crate services is `SyncAnnotation`, but the tag keeps the format open
/// for future job types without weakening type safety here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    SyncAnnotation {
        annotation_id: String,
        #[serde(default)]
        force: bool,
    },
}

impl JobPayload {
    pub fn sync_annotation(annotation_id: impl Into<String>, force: bool) -> Self {
        JobPayload::SyncAnnotation {
            annotation_id: annotation_id.into(),
            force,
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a tagged unit-field enum cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Self, PayloadError> {
        serde_json::from_str(json).map_err(|e| PayloadError::Malformed {
            payload: json.to_string(),
            source: e,
        })
    }
}

/// Error decoding a job payload from its stored JSON.
///
/// Jobs with malformed payloads are left queued until `expires_at` discards
/// them, so the error carries the raw payload for diagnostics.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed job payload {payload:?}: {source}")]
    Malformed {
        payload: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A job row as stored in the queue.
///
/// Immutable once created except for the claim fields and deletion; the
/// pipeline never rewrites a job's payload in place.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub id: JobId,
    /// Job type discriminator (raw, may be foreign to this crate).
    pub name: String,
    /// Raw priority value; foreign bands keep their ordering.
    pub priority: i32,
    /// Free-text provenance label. Observability only, never logic.
    pub tag: String,
    /// JSON-serialized `JobPayload`.
    pub payload: String,
    /// Creation time (unix seconds).
    pub enqueued_at: i64,
    /// Earliest eligibility time (unix seconds).
    pub scheduled_at: i64,
    /// Discard-unexamined time, if any.
    pub expires_at: Option<i64>,
    /// Worker currently holding a lease on this job, if any.
    pub claimed_by: Option<String>,
    /// When the current lease lapses and the job becomes reclaimable.
    pub claim_expires_at: Option<i64>,
}

impl SyncJob {
    /// Decode the typed payload.
    pub fn decode_payload(&self) -> Result<JobPayload, PayloadError> {
        JobPayload::from_json(&self.payload)
    }
}

/// A job to be inserted into the queue.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub priority: i32,
    pub tag: String,
    pub payload: String,
    pub scheduled_at: i64,
    pub expires_at: Option<i64>,
}

impl NewJob {
    pub fn sync_annotation(
        annotation_id: &str,
        force: bool,
        priority: JobPriority,
        tag: &str,
        scheduled_at: i64,
        expires_at: Option<i64>,
    ) -> Self {
        NewJob {
            name: SYNC_ANNOTATION.to_string(),
            priority: priority.as_i32(),
            tag: tag.to_string(),
            payload: JobPayload::sync_annotation(annotation_id, force).to_json(),
            scheduled_at,
            expires_at,
        }
    }
}
