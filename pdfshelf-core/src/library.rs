use std::sync::Arc;

use tracing::{info, instrument};

use crate::{
    AnnotationStore, BookmarkRegistry, Config, DocumentProvider, DocumentRef, DocumentStore,
    Result,
};

/// Everything sessions share: the stored documents, the renderer, and the
/// per-document bookmark and annotation registries.
pub struct Library {
    store: Arc<dyn DocumentStore>,
    provider: Arc<dyn DocumentProvider>,
    bookmarks: BookmarkRegistry,
    annotations: AnnotationStore,
    config: Config,
}

impl Library {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn DocumentProvider>,
        config: Config,
    ) -> Self {
        let capacity = config.cache.registry_capacity();
        Self {
            store,
            provider,
            bookmarks: BookmarkRegistry::with_capacity(capacity),
            annotations: AnnotationStore::with_capacity(capacity),
            config,
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn provider(&self) -> &dyn DocumentProvider {
        self.provider.as_ref()
    }

    pub fn bookmarks(&self) -> &BookmarkRegistry {
        &self.bookmarks
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn list(&self) -> Result<Vec<DocumentRef>> {
        self.store.list()
    }

    pub fn search(&self, query: &str) -> Result<Vec<DocumentRef>> {
        self.store.search(query)
    }

    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    pub fn upload(&self, name: &str, bytes: &[u8]) -> Result<DocumentRef> {
        let doc = DocumentRef::new(name)?;
        self.store.write(&doc, bytes)?;
        info!(document = %doc, "document uploaded");
        Ok(doc)
    }
}
