use super::models::Annotation;
use anyhow::Result;
use std::collections::HashMap;

/// Read access to the annotation system of record, as needed by the sync
/// pipeline.
///
/// The pipeline never writes through this trait; annotations are mutated by
/// the surrounding application, which enqueues sync jobs alongside its own
/// transactions.
pub trait AnnotationStore: Send + Sync {
    /// Map each existing id to its `updated` timestamp. Ids with no
    /// annotation are simply absent from the result.
    fn fetch_metadata(&self, ids: &[String]) -> Result<HashMap<String, i64>>;

    /// Full annotations for the given ids. Ids deleted since they were
    /// requested are silently skipped.
    fn fetch_annotations(&self, ids: &[String]) -> Result<Vec<Annotation>>;

    /// Ids of every annotation authored by the given user.
    fn annotation_ids_for_user(&self, userid: &str) -> Result<Vec<String>>;

    /// Ids of every annotation in the given group.
    fn annotation_ids_for_group(&self, groupid: &str) -> Result<Vec<String>>;

    /// Ids of annotations with `start <= updated < end`.
    fn annotation_ids_updated_between(&self, start: i64, end: i64) -> Result<Vec<String>>;

    /// Min and max `updated` across all annotations, or None when the store
    /// is empty. Used to window a full reindex.
    fn updated_bounds(&self) -> Result<Option<(i64, i64)>>;
}
