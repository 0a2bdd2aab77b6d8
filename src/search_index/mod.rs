mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{DocumentError, IndexDocument};
pub use store::SqliteSearchIndex;
pub use trait_def::SearchIndex;
