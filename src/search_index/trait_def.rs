use super::models::IndexDocument;
use anyhow::Result;
use std::collections::HashMap;

/// The eventually consistent search index, as seen by the sync pipeline.
///
/// Only two operations matter for synchronization: asking which documents
/// exist (and how fresh they are), and writing batches of them. Search
/// queries themselves live outside this crate.
pub trait SearchIndex: Send + Sync {
    /// Map each indexed id to the source `updated` timestamp it was indexed
    /// from. Ids not present in the index are absent from the result.
    fn fetch_metadata(&self, ids: &[String]) -> Result<HashMap<String, i64>>;

    /// Write documents, overwriting any existing copies.
    ///
    /// Per-document failures do not abort the batch; the ids that failed are
    /// returned so their jobs can stay queued for a later retry. An `Err`
    /// means the index itself was unreachable and nothing can be assumed
    /// written.
    fn bulk_upsert(&self, documents: &[IndexDocument]) -> Result<Vec<String>>;
}
