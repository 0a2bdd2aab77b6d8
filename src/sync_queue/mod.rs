mod models;
mod schema;
mod service;
mod store;

pub use models::{JobId, JobPayload, JobPriority, NewJob, PayloadError, SyncJob, SYNC_ANNOTATION};
pub use service::JobQueueService;
pub use store::{enqueue_in_tx, SqliteSyncQueueStore, SyncQueueStore};
