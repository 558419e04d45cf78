use std::collections::BTreeSet;

use tracing::debug;

use crate::error::ShelfError;
use crate::registry::DocumentRegistry;
use crate::{DocumentInfo, DocumentRef, Result};

/// Bookmarked page indices per document.
pub struct BookmarkRegistry {
    pages: DocumentRegistry<BTreeSet<usize>>,
}

impl BookmarkRegistry {
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            pages: DocumentRegistry::with_capacity(capacity),
        }
    }

    /// Bookmarks `page`. Returns `false` when it was already bookmarked.
    pub fn add(&self, doc: &DocumentInfo, page: usize) -> Result<bool> {
        ShelfError::check_page(page, doc.page_count)?;
        let inserted = self.pages.update(&doc.reference, |set| set.insert(page));
        if inserted {
            debug!(document = %doc.reference, page, "bookmark added");
        }
        Ok(inserted)
    }

    /// Bookmarked pages in ascending order.
    pub fn list(&self, doc: &DocumentRef) -> Vec<usize> {
        self.pages
            .read(doc, |set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, doc: &DocumentRef, page: usize) -> bool {
        self.pages
            .read(doc, |set| set.contains(&page))
            .unwrap_or(false)
    }

    pub fn remove(&self, doc: &DocumentRef, page: usize) -> bool {
        self.pages
            .get(doc)
            .map(|entry| entry.lock().remove(&page))
            .unwrap_or(false)
    }
}

impl Default for BookmarkRegistry {
    fn default() -> Self {
        Self::new()
    }
}
