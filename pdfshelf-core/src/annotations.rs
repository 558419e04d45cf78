use std::collections::BTreeMap;

use tracing::debug;

use crate::error::ShelfError;
use crate::registry::DocumentRegistry;
use crate::{DocumentInfo, DocumentRef, Result};

/// Free-text notes keyed by page, per document.
///
/// A missing note and an empty note are different things: saving `""`
/// records an explicit clear.
pub struct AnnotationStore {
    notes: DocumentRegistry<BTreeMap<usize, String>>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            notes: DocumentRegistry::with_capacity(capacity),
        }
    }

    pub fn set_note(&self, doc: &DocumentInfo, page: usize, text: impl Into<String>) -> Result<()> {
        ShelfError::check_page(page, doc.page_count)?;
        let text = text.into();
        debug!(document = %doc.reference, page, len = text.len(), "note saved");
        self.notes.update(&doc.reference, |notes| {
            notes.insert(page, text);
        });
        Ok(())
    }

    pub fn get_note(&self, doc: &DocumentRef, page: usize) -> Option<String> {
        self.notes
            .read(doc, |notes| notes.get(&page).cloned())
            .flatten()
    }

    /// Every note of `doc`, ascending by page.
    pub fn list_all(&self, doc: &DocumentRef) -> BTreeMap<usize, String> {
        self.notes.read(doc, BTreeMap::clone).unwrap_or_default()
    }
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, page_count: usize) -> DocumentInfo {
        DocumentInfo {
            reference: DocumentRef::new(name).unwrap(),
            page_count,
        }
    }

    #[test]
    fn saving_again_overwrites() {
        let store = AnnotationStore::new();
        let doc = info("a.pdf", 5);
        store.set_note(&doc, 2, "a").unwrap();
        store.set_note(&doc, 2, "b").unwrap();
        assert_eq!(store.get_note(&doc.reference, 2).as_deref(), Some("b"));
    }

    #[test]
    fn empty_note_differs_from_absent_note() {
        let store = AnnotationStore::new();
        let doc = info("a.pdf", 5);
        assert_eq!(store.get_note(&doc.reference, 1), None);
        store.set_note(&doc, 1, "draft").unwrap();
        store.set_note(&doc, 1, "").unwrap();
        assert_eq!(store.get_note(&doc.reference, 1), Some(String::new()));
        assert_eq!(store.get_note(&doc.reference, 0), None);
    }

    #[test]
    fn list_all_iterates_by_page() {
        let store = AnnotationStore::new();
        let doc = info("a.pdf", 5);
        store.set_note(&doc, 4, "end").unwrap();
        store.set_note(&doc, 0, "start").unwrap();
        store.set_note(&doc, 2, "middle").unwrap();

        let pages: Vec<_> = store.list_all(&doc.reference).into_iter().collect();
        assert_eq!(
            pages,
            vec![
                (0, "start".to_string()),
                (2, "middle".to_string()),
                (4, "end".to_string())
            ]
        );
    }

    #[test]
    fn notes_are_scoped_per_document_and_bounds_checked() {
        let store = AnnotationStore::new();
        let a = info("a.pdf", 3);
        let b = info("b.pdf", 3);
        store.set_note(&a, 0, "only a").unwrap();
        assert!(store.list_all(&b.reference).is_empty());
        assert!(matches!(
            store.set_note(&b, 3, "too far"),
            Err(ShelfError::OutOfRange { .. })
        ));
    }
}
