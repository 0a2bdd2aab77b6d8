//! Keeps an annotation search index in step with its system of record.
//!
//! Writes to annotations enqueue durable jobs; a periodic pass claims a batch,
//! reconciles each annotation's timestamps against the index, and rewrites
//! only what actually drifted.

pub mod annotation_store;
pub mod config;
pub mod metrics;
pub mod search_index;
pub mod sqlite_persistence;
pub mod sync;
pub mod sync_queue;
