use super::models::{Annotation, NewAnnotation};
use super::schema::ANNOTATION_VERSIONED_SCHEMAS;
use super::trait_def::AnnotationStore;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const ID_CHUNK: usize = 500;

/// SQLite-backed annotation store.
///
/// Reference implementation of the system of record; deployments backed by a
/// different database implement [`AnnotationStore`] themselves. The mutation
/// methods are concrete rather than part of the trait because the sync
/// pipeline itself never writes annotations.
pub struct SqliteAnnotationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAnnotationStore {
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
            ANNOTATION_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new annotation database at {:?}", db_path.as_ref());
            conn
        };

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;

        if db_version < 0 {
            bail!(
                "Annotation database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;

        let schema_count = ANNOTATION_VERSIONED_SCHEMAS.len();
        if version >= schema_count {
            bail!(
                "Annotation database version {} is too new (max supported: {})",
                version,
                schema_count - 1
            );
        }

        ANNOTATION_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteAnnotationStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        ANNOTATION_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;

        Ok(SqliteAnnotationStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, current_version: usize) -> Result<()> {
        let target_version = ANNOTATION_VERSIONED_SCHEMAS.len() - 1;

        if current_version >= target_version {
            return Ok(());
        }

        info!(
            "Migrating annotation database from version {} to {}",
            current_version, target_version
        );

        for schema in ANNOTATION_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!("Running annotation migration to version {}", schema.version);
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

    /// Insert or update a document record.
    pub fn upsert_document(&self, id: &str, title: Option<&str>, web_uri: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.prepare_cached(
            "INSERT INTO document (id, title, web_uri) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET title = ?2, web_uri = ?3",
        )?
        .execute(params![id, title, web_uri])?;
        Ok(())
    }

    /// Insert or update an annotation, stamping `updated` with the current
    /// time. Returns the new `updated` timestamp.
    pub fn upsert_annotation(&self, annotation: &NewAnnotation) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        self.upsert_annotation_at(annotation, now)?;
        Ok(now)
    }

    /// Insert or update an annotation with an explicit `updated` timestamp.
    pub fn upsert_annotation_at(&self, annotation: &NewAnnotation, updated: i64) -> Result<()> {
        let tags_json = serde_json::to_string(&annotation.tags)?;
        let conn = self.conn.lock().unwrap();
        conn.prepare_cached(
            "INSERT INTO annotation
                 (id, userid, groupid, text, tags, shared, target_uri, document_id, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 userid = ?2, groupid = ?3, text = ?4, tags = ?5, shared = ?6,
                 target_uri = ?7, document_id = ?8, updated = ?9",
        )?
        .execute(params![
            annotation.id,
            annotation.userid,
            annotation.groupid,
            annotation.text,
            tags_json,
            annotation.shared,
            annotation.target_uri,
            annotation.document_id,
            updated,
        ])?;
        Ok(())
    }

    /// Remove an annotation. Returns whether a row was deleted.
    pub fn delete_annotation(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn
            .prepare_cached("DELETE FROM annotation WHERE id = ?1")?
            .execute(params![id])?;
        Ok(deleted > 0)
    }

    fn row_to_annotation(row: &rusqlite::Row) -> rusqlite::Result<Annotation> {
        let tags_json: String = row.get("tags")?;
        let tags = serde_json::from_str(&tags_json).unwrap_or_default();
        Ok(Annotation {
            id: row.get("id")?,
            userid: row.get("userid")?,
            groupid: row.get("groupid")?,
            text: row.get("text")?,
            tags,
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

impl AnnotationStore for SqliteAnnotationStore {
    fn fetch_metadata(&self, ids: &[String]) -> Result<HashMap<String, i64>> {
        let conn = self.conn.lock().unwrap();
        let mut metadata = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "SELECT id, updated FROM annotation WHERE id IN ({})",
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

    fn fetch_annotations(&self, ids: &[String]) -> Result<Vec<Annotation>> {
        let conn = self.conn.lock().unwrap();
        let mut annotations = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "SELECT a.id, a.userid, a.groupid, a.text, a.tags, a.shared,
                        a.target_uri, d.title AS document_title, a.created, a.updated
                 FROM annotation a
                 LEFT JOIN document d ON d.id = a.document_id
                 WHERE a.id IN ({})",
                Self::placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(chunk.iter()),
                Self::row_to_annotation,
            )?;
            for row in rows {
                annotations.push(row?);
            }
        }
        Ok(annotations)
    }

    fn annotation_ids_for_user(&self, userid: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT id FROM annotation WHERE userid = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![userid], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn annotation_ids_for_group(&self, groupid: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT id FROM annotation WHERE groupid = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![groupid], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn annotation_ids_updated_between(&self, start: i64, end: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM annotation WHERE updated >= ?1 AND updated < ?2 ORDER BY id",
        )?;
        let ids = stmt
            .query_map(params![start, end], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn updated_bounds(&self) -> Result<Option<(i64, i64)>> {
        let conn = self.conn.lock().unwrap();
        let bounds = conn
            .query_row(
                "SELECT MIN(updated), MAX(updated) FROM annotation",
                [],
                |row| {
                    let min: Option<i64> = row.get(0)?;
                    let max: Option<i64> = row.get(1)?;
                    Ok(min.zip(max))
                },
            )
            .optional()?
            .flatten();
        Ok(bounds)
    }
}
