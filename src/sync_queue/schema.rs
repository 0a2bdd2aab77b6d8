//! Database schema for sync_queue.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

/// Durable work queue. One row per pending re-sync request; rows are only
/// ever inserted, claimed, and deleted.
const SYNC_JOB_TABLE_V0: Table = Table {
    name: "sync_job",
    columns: &[
        // rowid alias, assigned in insertion order
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("priority", &SqlType::Integer, non_null = true),
        sqlite_column!("tag", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!(
            "enqueued_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("scheduled_at", &SqlType::Integer, non_null = true),
        sqlite_column!("expires_at", &SqlType::Integer),
        // Lease fields: SQLite has no SELECT ... FOR UPDATE SKIP LOCKED, so
        // dequeue stamps an expiring ownership token instead.
        sqlite_column!("claimed_by", &SqlType::Text),
        sqlite_column!("claim_expires_at", &SqlType::Integer),
    ],
    indices: &[
        ("idx_sync_job_dequeue", "name, scheduled_at, priority, enqueued_at"),
        ("idx_sync_job_claim", "claim_expires_at"),
    ],
};

pub const SYNC_QUEUE_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[SYNC_JOB_TABLE_V0],
    migration: None,
}];
