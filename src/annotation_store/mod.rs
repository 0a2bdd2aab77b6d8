mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{Annotation, NewAnnotation};
pub use store::SqliteAnnotationStore;
pub use trait_def::AnnotationStore;
