//! Data models for the annotation system of record.

/// An annotation as stored in the system of record.
///
/// `updated` is the sync pipeline's freshness authority: the index copy of an
/// annotation is current exactly when its recorded timestamp matches this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub id: String,
    pub userid: String,
    pub groupid: String,
    pub text: String,
    pub tags: Vec<String>,
    /// Visible to the group (true) or only to its author (false).
    pub shared: bool,
    pub target_uri: String,
    /// Title of the annotated document, when one is on record.
    pub document_title: Option<String>,
    /// Creation time (unix seconds).
    pub created: i64,
    /// Last modification time (unix seconds).
    pub updated: i64,
}

/// Fields for creating or updating an annotation.
#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub id: String,
    pub userid: String,
    pub groupid: String,
    pub text: String,
    pub tags: Vec<String>,
    pub shared: bool,
    pub target_uri: String,
    pub document_id: Option<String>,
}
