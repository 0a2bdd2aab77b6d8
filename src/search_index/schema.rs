//! Database schema for search_index.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const SEARCH_DOCUMENT_TABLE_V0: Table = Table {
    name: "search_document",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("userid", &SqlType::Text, non_null = true),
        sqlite_column!("groupid", &SqlType::Text, non_null = true),
        sqlite_column!("text", &SqlType::Text, non_null = true),
        sqlite_column!("tags", &SqlType::Text, non_null = true),
        sqlite_column!("shared", &SqlType::Integer, non_null = true),
        sqlite_column!("target_uri", &SqlType::Text, non_null = true),
        sqlite_column!("document_title", &SqlType::Text),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
        // Source timestamp this copy was indexed from; the staleness check
        sqlite_column!("updated", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_search_document_userid", "userid"),
        ("idx_search_document_groupid", "groupid"),
    ],
};

pub const SEARCH_INDEX_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[SEARCH_DOCUMENT_TABLE_V0],
    migration: None,
}];
