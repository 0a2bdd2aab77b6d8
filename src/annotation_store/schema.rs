//! Database schema for annotations.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};

const DOCUMENT_TABLE_V0: Table = Table {
    name: "document",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("web_uri", &SqlType::Text),
    ],
    indices: &[],
};

const ANNOTATION_TABLE_V0: Table = Table {
    name: "annotation",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("userid", &SqlType::Text, non_null = true),
        sqlite_column!("groupid", &SqlType::Text, non_null = true),
        sqlite_column!("text", &SqlType::Text, non_null = true),
        // JSON array of strings
        sqlite_column!("tags", &SqlType::Text, non_null = true),
        sqlite_column!("shared", &SqlType::Integer, non_null = true),
        sqlite_column!("target_uri", &SqlType::Text, non_null = true),
        sqlite_column!("document_id", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_annotation_userid", "userid"),
        ("idx_annotation_groupid", "groupid"),
        ("idx_annotation_updated", "updated"),
    ],
};

pub const ANNOTATION_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[DOCUMENT_TABLE_V0, ANNOTATION_TABLE_V0],
    migration: None,
}];
