use super::models::IndexDocument;
use super::schema::SEARCH_INDEX_VERSIONED_SCHEMAS;
use super::trait_def::SearchIndex;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const ID_CHUNK: usize = 500;

/// SQLite-backed search index.
///
/// Reference implementation; real deployments implement [`SearchIndex`] over
/// their search engine. Deliberately has no delete in the trait: documents
/// leave the index through out-of-band pruning, which is what makes
/// reconciliation necessary in the first place.
pub struct SqliteSearchIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSearchIndex {
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
            SEARCH_INDEX_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new search index database at {:?}", db_path.as_ref());
            conn
        };

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Search index database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        let schema_count = SEARCH_INDEX_VERSIONED_SCHEMAS.len();
        if version >= schema_count {
            bail!(
                "Search index database version {} is too new (max supported: {})",
                version,
                schema_count - 1
            );
        }

        SEARCH_INDEX_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteSearchIndex {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory index for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        SEARCH_INDEX_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteSearchIndex {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, current_version: usize) -> Result<()> {
        let target_version = SEARCH_INDEX_VERSIONED_SCHEMAS.len() - 1;

        if current_version >= target_version {
            return Ok(());
        }

        info!(
            "Migrating search index database from version {} to {}",
            current_version, target_version
        );

        for schema in SEARCH_INDEX_VERSIONED_SCHEMAS
            .iter()
            .skip(current_version + 1)
        {
            if let Some(migration_fn) = schema.migration {
                info!("Running search index migration to version {}", schema.version);
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

    /// Remove a document outside of the sync pipeline.
    ///
    /// Stands in for the external pruning (moderation, storage reclaim) that
    /// deletes index entries without going through the queue.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn
            .prepare_cached("DELETE FROM search_document WHERE id = ?1")?
            .execute(params![id])?;
        Ok(removed > 0)
    }

    /// Fetch one document, for inspection in tests and tooling.
    pub fn fetch_document(&self, id: &str) -> Result<Option<IndexDocument>> {
        let conn = self.conn.lock().unwrap();
        let doc = conn
            .prepare_cached(
                "SELECT id, userid, groupid, text, tags, shared, target_uri,
                        document_title, created, updated
                 FROM search_document WHERE id = ?1",
            )?
            .query_row(params![id], Self::row_to_document)
            .optional()?;
        Ok(doc)
    }

    pub fn document_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count = conn.query_row("SELECT COUNT(*) FROM search_document", [], |row| row.get(0))?;
        Ok(count)
    }

    fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<IndexDocument> {
        let tags_json: String = row.get("tags")?;
        Ok(IndexDocument {
            id: row.get("id")?,
            userid: row.get("userid")?,
            groupid: row.get("groupid")?,
            text: row.get("text")?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            shared: row.get("shared")?,
            target_uri: row.get("target_uri")?,
            document_title: row.get("document_title")?,
            created: row.get("created")?,
            updated: row.get("updated")?,
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

impl SearchIndex for SqliteSearchIndex {
    fn fetch_metadata(&self, ids: &[String]) -> Result<HashMap<String, i64>> {
        let conn = self.conn.lock().unwrap();
        let mut metadata = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "SELECT id, updated FROM search_document WHERE id IN ({})",
                Self::placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (id, updated) = row?;
                metadata.insert(id, updated);
            }
        }
        Ok(metadata)
    }

    fn bulk_upsert(&self, documents: &[IndexDocument]) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let tx = conn.unchecked_transaction()?;
        let mut failed = Vec::new();
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO search_document
                     (id, userid, groupid, text, tags, shared, target_uri,
                      document_title, created, updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                     userid = ?2, groupid = ?3, text = ?4, tags = ?5, shared = ?6,
                     target_uri = ?7, document_title = ?8, created = ?9, updated = ?10",
            )?;
            for doc in documents {
                if let Err(e) = doc.validate() {
                    warn!(id = %doc.id, error = %e, "Rejected invalid search document");
                    failed.push(doc.id.clone());
                    continue;
                }
                let tags_json = serde_json::to_string(&doc.tags)?;
                let result = stmt.execute(params![
                    doc.id,
                    doc.userid,
                    doc.groupid,
                    doc.text,
                    tags_json,
                    doc.shared,
                    doc.target_uri,
                    doc.document_title,
                    doc.created,
                    doc.updated,
                ]);
                if let Err(e) = result {
                    warn!(id = %doc.id, error = %e, "Failed to write search document");
                    failed.push(doc.id.clone());
                }
            }
        }
        tx.commit()?;
        Ok(failed)
    }
}
