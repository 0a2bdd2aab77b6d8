//! Sync job queue storage and persistence.
//!
//! Provides SQLite-backed storage for the durable work queue consumed by the
//! sync driver. Mutual exclusion between concurrent workers uses an expiring
//! lease stamped at dequeue time (SQLite's substitute for
//! `SELECT ... FOR UPDATE SKIP LOCKED`).

use super::models::{JobId, NewJob, SyncJob};
use super::schema::SYNC_QUEUE_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

// SQLite limits bound parameters per statement; stay well under it.
const ID_CHUNK: usize = 500;

/// Trait for sync queue storage backends.
///
/// The job table is the pipeline's only shared mutable resource; every access
/// to it goes through these operations.
pub trait SyncQueueStore: Send + Sync {
    /// Insert jobs in one transaction. Returns their assigned ids.
    ///
    /// Storage failure propagates to the caller: enqueue runs inside the
    /// mutating code path's transaction, and aborting it is the correct
    /// outcome.
    fn enqueue(&self, jobs: &[NewJob]) -> Result<Vec<JobId>>;

    /// Claim up to `limit` eligible jobs of the given name for `worker`.
    ///
    /// Eligible = due (`scheduled_at <= now`), not expired, and not under a
    /// live lease. Returned in priority-then-age order. Two concurrent
    /// callers partition the queue: a job claimed by one is invisible to the
    /// other until the lease lapses.
    fn dequeue(&self, name: &str, limit: usize, worker: &str, lease_secs: i64)
        -> Result<Vec<SyncJob>>;

    /// Permanently remove jobs. Idempotent: already-deleted ids are no-ops.
    /// Returns the number of rows actually removed.
    fn delete(&self, ids: &[JobId]) -> Result<usize>;

    /// Clear leases so the jobs are immediately reclaimable.
    ///
    /// Used for jobs left queued after a failed index write; a crashed
    /// worker's leases instead lapse on their own.
    fn release(&self, ids: &[JobId]) -> Result<usize>;

    /// Number of physically present jobs with the given name, eligible or
    /// not. Observability only.
    fn pending_count(&self, name: &str) -> Result<usize>;
}

/// Insert jobs using the caller's connection, inside whatever transaction it
/// has open.
///
/// This is the hook for integrators that co-locate `sync_job` with their
/// primary database: enqueue in the same transaction as the mutation, and a
/// rollback leaves no job pointing at a change that never happened.
pub fn enqueue_in_tx(conn: &Connection, jobs: &[NewJob]) -> Result<Vec<JobId>> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO sync_job (name, priority, tag, payload, enqueued_at, scheduled_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let now = now();
    let mut ids = Vec::with_capacity(jobs.len());
    for job in jobs {
        stmt.execute(params![
            job.name,
            job.priority,
            job.tag,
            job.payload,
            now,
            job.scheduled_at,
            job.expires_at,
        ])?;
        ids.push(conn.last_insert_rowid());
    }
    Ok(ids)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// SQLite-backed sync queue store.
pub struct SqliteSyncQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSyncQueueStore {
    /// Open an existing queue database or create a new one with the current
    /// schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = if db_path.as_ref().exists() {
            Connection::open_with_flags(
                &db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            let conn = Connection::open(&db_path)?;
            SYNC_QUEUE_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new sync queue database at {:?}", db_path.as_ref());
            conn
        };

        // Concurrent worker processes share this file; let writers queue up
        // briefly instead of failing with SQLITE_BUSY.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to set WAL mode on sync queue database")?;

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Sync queue database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        let schema_count = SYNC_QUEUE_VERSIONED_SCHEMAS.len();
        if version >= schema_count {
            bail!(
                "Sync queue database version {} is too new (max supported: {})",
                version,
                schema_count - 1
            );
        }

        SYNC_QUEUE_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteSyncQueueStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        SYNC_QUEUE_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteSyncQueueStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, current_version: usize) -> Result<()> {
        let target_version = SYNC_QUEUE_VERSIONED_SCHEMAS.len() - 1;

        if current_version >= target_version {
            return Ok(());
        }

        info!(
            "Migrating sync queue database from version {} to {}",
            current_version, target_version
        );

        for schema in SYNC_QUEUE_VERSIONED_SCHEMAS
            .iter()
            .skip(current_version + 1)
        {
            if let Some(migration_fn) = schema.migration {
                info!("Running sync queue migration to version {}", schema.version);
                migration_fn(conn)?;
            }
        }

        conn.execute(
            &format!(
                "PRAGMA user_version = {}",
                BASE_DB_VERSION + target_version
            ),
            [],
        )?;

        Ok(())
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<SyncJob> {
        Ok(SyncJob {
            id: row.get("id")?,
            name: row.get("name")?,
            priority: row.get("priority")?,
            tag: row.get("tag")?,
            payload: row.get("payload")?,
            enqueued_at: row.get("enqueued_at")?,
            scheduled_at: row.get("scheduled_at")?,
            expires_at: row.get("expires_at")?,
            claimed_by: row.get("claimed_by")?,
            claim_expires_at: row.get("claim_expires_at")?,
        })
    }

    fn placeholders(count: usize) -> String {
        let mut s = String::with_capacity(count * 2);
        for i in 0..count {
            if i > 0 {
                s.push(',');
            }
            s.push('?');
        }
        s
    }
}

impl SyncQueueStore for SqliteSyncQueueStore {
    fn enqueue(&self, jobs: &[NewJob]) -> Result<Vec<JobId>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let ids = enqueue_in_tx(&tx, jobs)?;
        tx.commit()?;
        Ok(ids)
    }

    fn dequeue(
        &self,
        name: &str,
        limit: usize,
        worker: &str,
        lease_secs: i64,
    ) -> Result<Vec<SyncJob>> {
        let mut conn = self.conn.lock().unwrap();
        // IMMEDIATE takes the write lock up front, so select-then-claim is
        // atomic against other worker processes on the same file.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now();

        let mut jobs = {
            let mut stmt = tx.prepare_cached(
                r#"SELECT id, name, priority, tag, payload, enqueued_at,
                          scheduled_at, expires_at, claimed_by, claim_expires_at
                   FROM sync_job
                   WHERE name = ?1
                     AND scheduled_at <= ?2
                     AND (expires_at IS NULL OR expires_at > ?2)
                     AND (claim_expires_at IS NULL OR claim_expires_at <= ?2)
                   ORDER BY priority ASC, enqueued_at ASC, id ASC
                   LIMIT ?3"#,
            )?;
            let rows = stmt
                .query_map(params![name, now, limit as i64], Self::row_to_job)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        if !jobs.is_empty() {
            let claim_expires_at = now + lease_secs;
            let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
            for chunk in ids.chunks(ID_CHUNK) {
                let sql = format!(
                    "UPDATE sync_job SET claimed_by = ?, claim_expires_at = ? WHERE id IN ({})",
                    Self::placeholders(chunk.len())
                );
                let mut sql_params: Vec<Box<dyn rusqlite::ToSql>> =
                    vec![Box::new(worker.to_string()), Box::new(claim_expires_at)];
                for id in chunk {
                    sql_params.push(Box::new(*id));
                }
                let params_refs: Vec<&dyn rusqlite::ToSql> =
                    sql_params.iter().map(|p| p.as_ref()).collect();
                tx.execute(&sql, params_refs.as_slice())?;
            }
            for job in &mut jobs {
                job.claimed_by = Some(worker.to_string());
                job.claim_expires_at = Some(claim_expires_at);
            }
        }

        tx.commit()?;
        Ok(jobs)
    }

    fn delete(&self, ids: &[JobId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let mut removed = 0;
        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "DELETE FROM sync_job WHERE id IN ({})",
                Self::placeholders(chunk.len())
            );
            let sql_params: Vec<Box<dyn rusqlite::ToSql>> =
                chunk.iter().map(|id| Box::new(*id) as Box<dyn rusqlite::ToSql>).collect();
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                sql_params.iter().map(|p| p.as_ref()).collect();
            removed += tx.execute(&sql, params_refs.as_slice())?;
        }
        tx.commit()?;
        Ok(removed)
    }

    fn release(&self, ids: &[JobId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let mut released = 0;
        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "UPDATE sync_job SET claimed_by = NULL, claim_expires_at = NULL WHERE id IN ({})",
                Self::placeholders(chunk.len())
            );
            let sql_params: Vec<Box<dyn rusqlite::ToSql>> =
                chunk.iter().map(|id| Box::new(*id) as Box<dyn rusqlite::ToSql>).collect();
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                sql_params.iter().map(|p| p.as_ref()).collect();
            released += tx.execute(&sql, params_refs.as_slice())?;
        }
        tx.commit()?;
        Ok(released)
    }

    fn pending_count(&self, name: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: usize = conn.query_row(
            "SELECT COUNT(*) FROM sync_job WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
