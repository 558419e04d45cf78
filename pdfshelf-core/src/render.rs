use std::collections::HashMap;
use std::sync::Arc;

use crate::{DocumentRef, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: usize,
    pub zoom: f32,
}

/// A rasterized page, PNG encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    pub page_index: usize,
    pub zoom: f32,
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// A parsed document able to rasterize its pages.
pub trait DocumentBackend: Send + Sync {
    fn page_count(&self) -> usize;
    fn render_page(&self, request: RenderRequest) -> Result<PageImage>;
}

/// Parses stored bytes into a renderable document.
///
/// Implementations report unparseable input as `ShelfError::CorruptDocument`.
#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, doc: &DocumentRef, bytes: Vec<u8>) -> Result<Arc<dyn DocumentBackend>>;
}

/// A render captured from a session, runnable on any thread.
///
/// The generation identifies the session state the ticket was taken from;
/// `Session::is_current` tells whether the result may still be shown.
#[derive(Clone)]
pub struct RenderTicket {
    pub(crate) backend: Arc<dyn DocumentBackend>,
    pub document: DocumentRef,
    pub request: RenderRequest,
    pub generation: u64,
}

impl RenderTicket {
    pub fn render(&self) -> Result<PageImage> {
        self.backend.render_page(self.request)
    }
}

impl std::fmt::Debug for RenderTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTicket")
            .field("document", &self.document)
            .field("request", &self.request)
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
struct CacheKey {
    page_index: usize,
    zoom_milli: u32,
}

impl CacheKey {
    fn new(request: RenderRequest) -> Self {
        Self {
            page_index: request.page_index,
            zoom_milli: quantize_zoom(request.zoom),
        }
    }

    fn distance(&self, reference_page: usize) -> usize {
        self.page_index.abs_diff(reference_page)
    }
}

fn quantize_zoom(zoom: f32) -> u32 {
    let scaled = (zoom * 1000.0).round();
    if !scaled.is_finite() || scaled <= 0.0 {
        1
    } else if scaled > u32::MAX as f32 {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// Rendered pages of one open document, evicting those farthest from the
/// page being read once over capacity.
pub(crate) struct RenderCache {
    capacity: usize,
    entries: HashMap<CacheKey, PageImage>,
}

impl RenderCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, request: RenderRequest) -> Option<PageImage> {
        self.entries.get(&CacheKey::new(request)).cloned()
    }

    pub(crate) fn insert(&mut self, request: RenderRequest, image: PageImage) {
        if self.capacity == 0 {
            return;
        }
        self.entries.insert(CacheKey::new(request), image);

        if self.entries.len() > self.capacity {
            let reference_page = request.page_index;
            let mut keys: Vec<_> = self.entries.keys().copied().collect();
            keys.sort_by_key(|k| k.distance(reference_page));
            for stale in keys.into_iter().skip(self.capacity) {
                self.entries.remove(&stale);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
