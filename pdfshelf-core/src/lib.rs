use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod annotations;
pub mod bookmarks;
pub mod config;
pub mod error;
pub mod library;
pub mod registry;
pub mod render;
pub mod session;
pub mod store;

pub use annotations::AnnotationStore;
pub use bookmarks::BookmarkRegistry;
pub use config::{CacheConfig, Config, ZoomConfig};
pub use error::{Result, ShelfError};
pub use library::Library;
pub use registry::DocumentRegistry;
pub use render::{DocumentBackend, DocumentProvider, PageImage, RenderRequest, RenderTicket};
pub use session::{Command, Download, Session, SessionEvent};
pub use store::{DocumentStore, FsDocumentStore, MemoryDocumentStore};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0d7c52-1b8e-5e4a-9d61-8a2f4c7e0b93").expect("valid namespace UUID")
});

/// A stored PDF, identified by its filename inside the library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(ShelfError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Stable identifier derived from the filename.
    pub fn id(&self) -> DocumentId {
        Uuid::new_v5(&DOCUMENT_NAMESPACE, self.0.as_bytes())
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocumentRef {
    type Error = ShelfError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DocumentRef> for String {
    fn from(value: DocumentRef) -> Self {
        value.0
    }
}

/// Whether `name` can be stored as a library entry: a bare `*.pdf` filename.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && has_pdf_extension(name)
}

pub fn has_pdf_extension(name: &str) -> bool {
    name.len() > 4
        && name
            .get(name.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".pdf"))
}

/// A document that has been parsed by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub reference: DocumentRef,
    pub page_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_ref_accepts_plain_pdf_names() {
        let doc = DocumentRef::new("Moby Dick.PDF").unwrap();
        assert_eq!(doc.name(), "Moby Dick.PDF");
        assert_eq!(doc.to_string(), "Moby Dick.PDF");
    }

    #[test]
    fn document_ref_rejects_paths_and_other_extensions() {
        for name in ["", ".pdf", "../x.pdf", "a/b.pdf", "a\\b.pdf", "notes.txt", "pdf"] {
            assert!(
                matches!(DocumentRef::new(name), Err(ShelfError::InvalidName(_))),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn document_id_is_stable_for_same_name() {
        let a = DocumentRef::new("book.pdf").unwrap();
        let b = DocumentRef::new("book.pdf").unwrap();
        let c = DocumentRef::new("other.pdf").unwrap();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }
}
