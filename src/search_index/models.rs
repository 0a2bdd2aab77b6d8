//! Documents as they exist in the search index.

use crate::annotation_store::Annotation;
use thiserror::Error;

/// The indexed projection of an annotation.
///
/// Carries everything search needs to match and render a hit, plus the source
/// `updated` timestamp so the next reconciliation can tell whether this copy
/// is current without fetching the full annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDocument {
    pub id: String,
    pub userid: String,
    pub groupid: String,
    pub text: String,
    pub tags: Vec<String>,
    pub shared: bool,
    pub target_uri: String,
    pub document_title: Option<String>,
    pub created: i64,
    pub updated: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document has an empty id")]
    EmptyId,
    #[error("document {id} has an empty target URI")]
    EmptyTargetUri { id: String },
}

impl IndexDocument {
    pub fn from_annotation(annotation: &Annotation) -> Self {
        IndexDocument {
            id: annotation.id.clone(),
            userid: annotation.userid.clone(),
            groupid: annotation.groupid.clone(),
            text: annotation.text.clone(),
            tags: annotation.tags.clone(),
            shared: annotation.shared,
            target_uri: annotation.target_uri.clone(),
            document_title: annotation.document_title.clone(),
            created: annotation.created,
            updated: annotation.updated,
        }
    }

    /// Reject documents the index cannot meaningfully serve.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.id.is_empty() {
            return Err(DocumentError::EmptyId);
        }
        if self.target_uri.is_empty() {
            return Err(DocumentError::EmptyTargetUri {
                id: self.id.clone(),
            });
        }
        Ok(())
    }
}
