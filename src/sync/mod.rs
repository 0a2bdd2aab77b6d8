mod batch_indexer;
mod driver;
mod reconciler;

pub use batch_indexer::{BatchIndexer, ReindexStats};
pub use driver::{PassStats, SyncDriver};
pub use reconciler::{classify, Outcome, ReconcilePlan, Reconciler};
