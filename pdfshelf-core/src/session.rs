use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::render::RenderCache;
use crate::{
    DocumentBackend, DocumentId, DocumentInfo, DocumentRef, Library, PageImage, RenderRequest,
    RenderTicket, Result, ShelfError, ZoomConfig,
};

/// User intents the presentation layer forwards to an open session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GotoPage { page: usize },
    NextPage,
    PrevPage,
    SetZoom { zoom: f32 },
    ZoomIn,
    ZoomOut,
    ResetZoom,
    AddBookmark,
    RemoveBookmark,
    GotoBookmark { page: usize },
    SaveNote { text: String },
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    DocumentOpened(DocumentId),
    DocumentClosed(DocumentId),
    RedrawNeeded(DocumentId),
    BookmarksChanged(DocumentId),
    NotesChanged(DocumentId),
}

/// Raw bytes of the open document, named as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

struct OpenDocument {
    info: DocumentInfo,
    backend: Arc<dyn DocumentBackend>,
    render_cache: Mutex<RenderCache>,
}

/// The reading state of one user: which document is open, on which page,
/// at which zoom.
///
/// A session is either Closed (no document) or Open. Page, zoom and render
/// operations fail with `ShelfError::NoDocumentOpen` while Closed.
pub struct Session {
    id: Uuid,
    library: Arc<Library>,
    zoom_bounds: ZoomConfig,
    open: Option<OpenDocument>,
    current_page: usize,
    zoom: f32,
    generation: u64,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Session {
    pub fn new(library: Arc<Library>) -> Self {
        let zoom_bounds = library.config().zoom;
        Self {
            id: Uuid::new_v4(),
            library,
            zoom_bounds,
            open: None,
            current_page: 0,
            zoom: zoom_bounds.default,
            generation: 0,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        self.open.as_ref().map(|doc| &doc.info)
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn page_count(&self) -> Option<usize> {
        self.document().map(|info| info.page_count)
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn zoom_bounds(&self) -> ZoomConfig {
        self.zoom_bounds
    }

    /// Opens `doc` on its first page. On failure the session keeps whatever
    /// it had open before.
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn open(&mut self, doc: &DocumentRef) -> Result<()> {
        let store = self.library.store();
        if !store.contains(doc)? {
            return Err(ShelfError::NotFound(doc.name().to_owned()));
        }
        let bytes = store.read(doc)?;
        let backend = self.library.provider().open(doc, bytes).await?;
        let page_count = backend.page_count();
        if page_count == 0 {
            return Err(ShelfError::CorruptDocument {
                name: doc.name().to_owned(),
                reason: "document has no pages".to_owned(),
            });
        }

        let stale: Vec<_> = self
            .library
            .bookmarks()
            .list(doc)
            .into_iter()
            .filter(|&page| page >= page_count)
            .collect();
        if !stale.is_empty() {
            warn!(document = %doc, page_count, ?stale, "bookmarks point past the last page");
        }

        if let Some(previous) = self.open.take() {
            self.push_event(SessionEvent::DocumentClosed(previous.info.reference.id()));
        }

        let capacity = self.library.config().cache.render_pages;
        self.open = Some(OpenDocument {
            info: DocumentInfo {
                reference: doc.clone(),
                page_count,
            },
            backend,
            render_cache: Mutex::new(RenderCache::new(capacity)),
        });
        self.current_page = 0;
        self.bump_generation();
        info!(document = %doc, page_count, "document opened");
        self.push_event(SessionEvent::DocumentOpened(doc.id()));
        self.push_event(SessionEvent::RedrawNeeded(doc.id()));
        Ok(())
    }

    pub fn close(&mut self) {
        self.current_page = 0;
        if let Some(doc) = self.open.take() {
            info!(session = %self.id, document = %doc.info.reference, "document closed");
            self.bump_generation();
            self.push_event(SessionEvent::DocumentClosed(doc.info.reference.id()));
        }
    }

    /// Jumps to `page`, rejecting indices past the last page.
    pub fn goto_page(&mut self, page: usize) -> Result<()> {
        let page_count = self.require_open()?.page_count;
        ShelfError::check_page(page, page_count)?;
        self.set_page(page);
        Ok(())
    }

    /// Advances one page; stays put on the last page.
    pub fn next_page(&mut self) -> Result<()> {
        let page_count = self.require_open()?.page_count;
        if self.current_page + 1 < page_count {
            self.set_page(self.current_page + 1);
        }
        Ok(())
    }

    /// Goes back one page; stays put on the first page.
    pub fn previous_page(&mut self) -> Result<()> {
        self.require_open()?;
        if let Some(prev) = self.current_page.checked_sub(1) {
            self.set_page(prev);
        }
        Ok(())
    }

    pub fn set_zoom(&mut self, zoom: f32) -> Result<()> {
        self.require_open()?;
        if !self.zoom_bounds.contains(zoom) {
            return Err(ShelfError::InvalidZoom {
                zoom,
                min: self.zoom_bounds.min,
                max: self.zoom_bounds.max,
            });
        }
        self.apply_zoom(zoom);
        Ok(())
    }

    pub fn zoom_in(&mut self) -> Result<()> {
        self.require_open()?;
        let target = self.zoom_bounds.clamp(round_zoom(self.zoom + self.zoom_bounds.step));
        self.apply_zoom(target);
        Ok(())
    }

    pub fn zoom_out(&mut self) -> Result<()> {
        self.require_open()?;
        let target = self.zoom_bounds.clamp(round_zoom(self.zoom - self.zoom_bounds.step));
        self.apply_zoom(target);
        Ok(())
    }

    pub fn reset_zoom(&mut self) -> Result<()> {
        self.require_open()?;
        self.apply_zoom(self.zoom_bounds.default);
        Ok(())
    }

    /// Renders the current page at the current zoom, reusing cached pages.
    #[instrument(skip(self), fields(session = %self.id, page = self.current_page, zoom = self.zoom))]
    pub fn render_current_page(&self) -> Result<PageImage> {
        let doc = self.open.as_ref().ok_or(ShelfError::NoDocumentOpen)?;
        let request = self.current_request();
        if let Some(image) = doc.render_cache.lock().get(request) {
            return Ok(image);
        }
        let image = doc.backend.render_page(request)?;
        doc.render_cache.lock().insert(request, image.clone());
        Ok(image)
    }

    /// The current page if it has already been rendered.
    pub fn cached_page(&self) -> Option<PageImage> {
        let doc = self.open.as_ref()?;
        let request = self.current_request();
        let cached = doc.render_cache.lock().get(request);
        cached
    }

    /// Captures the current render so it can run off the calling thread.
    pub fn render_ticket(&self) -> Result<RenderTicket> {
        let doc = self.open.as_ref().ok_or(ShelfError::NoDocumentOpen)?;
        Ok(RenderTicket {
            backend: Arc::clone(&doc.backend),
            document: doc.info.reference.clone(),
            request: self.current_request(),
            generation: self.generation,
        })
    }

    /// Whether `ticket` still describes what the session displays.
    pub fn is_current(&self, ticket: &RenderTicket) -> bool {
        ticket.generation == self.generation
            && self
                .document()
                .is_some_and(|info| info.reference == ticket.document)
    }

    /// Accepts the result of a ticket rendered elsewhere. Stale results are
    /// dropped and `None` is returned.
    pub fn complete_render(&self, ticket: &RenderTicket, image: PageImage) -> Option<PageImage> {
        if !self.is_current(ticket) {
            debug!(
                generation = ticket.generation,
                current = self.generation,
                page = ticket.request.page_index,
                "discarding stale render"
            );
            return None;
        }
        if let Some(doc) = self.open.as_ref() {
            doc.render_cache.lock().insert(ticket.request, image.clone());
        }
        Some(image)
    }

    /// Bookmarks the current page. Returns `false` if it already was.
    pub fn add_bookmark(&mut self) -> Result<bool> {
        let info = self.require_open()?.clone();
        let added = self
            .library
            .bookmarks()
            .add(&info, self.current_page)?;
        if added {
            self.push_event(SessionEvent::BookmarksChanged(info.reference.id()));
        }
        Ok(added)
    }

    pub fn remove_bookmark(&mut self) -> Result<bool> {
        let doc = self.require_open()?.reference.clone();
        let removed = self.library.bookmarks().remove(&doc, self.current_page);
        if removed {
            self.push_event(SessionEvent::BookmarksChanged(doc.id()));
        }
        Ok(removed)
    }

    pub fn bookmarks(&self) -> Result<Vec<usize>> {
        let doc = &self.require_open()?.reference;
        Ok(self.library.bookmarks().list(doc))
    }

    pub fn is_bookmarked(&self) -> bool {
        self.document()
            .is_some_and(|info| self.library.bookmarks().contains(&info.reference, self.current_page))
    }

    /// Jumps to a bookmarked page. A bookmark past the last page (the file
    /// was replaced by a shorter one) is reported as out of range.
    pub fn goto_bookmark(&mut self, page: usize) -> Result<()> {
        self.goto_page(page)
    }

    pub fn save_note(&mut self, text: impl Into<String>) -> Result<()> {
        let info = self.require_open()?.clone();
        self.library
            .annotations()
            .set_note(&info, self.current_page, text)?;
        self.push_event(SessionEvent::NotesChanged(info.reference.id()));
        Ok(())
    }

    /// The note on the current page, if one was ever saved.
    pub fn note(&self) -> Result<Option<String>> {
        let doc = &self.require_open()?.reference;
        Ok(self.library.annotations().get_note(doc, self.current_page))
    }

    pub fn notes(&self) -> Result<BTreeMap<usize, String>> {
        let doc = &self.require_open()?.reference;
        Ok(self.library.annotations().list_all(doc))
    }

    /// The open document's stored bytes, unmodified.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn download(&self) -> Result<Download> {
        let doc = &self.require_open()?.reference;
        let bytes = self.library.store().read(doc)?;
        Ok(Download {
            file_name: doc.name().to_owned(),
            bytes,
        })
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        debug!(session = %self.id, ?command, "applying command");
        match command {
            Command::GotoPage { page } => self.goto_page(page),
            Command::NextPage => self.next_page(),
            Command::PrevPage => self.previous_page(),
            Command::SetZoom { zoom } => self.set_zoom(zoom),
            Command::ZoomIn => self.zoom_in(),
            Command::ZoomOut => self.zoom_out(),
            Command::ResetZoom => self.reset_zoom(),
            Command::AddBookmark => self.add_bookmark().map(|_| ()),
            Command::RemoveBookmark => self.remove_bookmark().map(|_| ()),
            Command::GotoBookmark { page } => self.goto_bookmark(page),
            Command::SaveNote { text } => self.save_note(text),
            Command::Close => {
                self.close();
                Ok(())
            }
        }
    }

    fn require_open(&self) -> Result<&DocumentInfo> {
        self.document().ok_or(ShelfError::NoDocumentOpen)
    }

    fn current_request(&self) -> RenderRequest {
        RenderRequest {
            page_index: self.current_page,
            zoom: self.zoom,
        }
    }

    fn set_page(&mut self, page: usize) {
        if page != self.current_page {
            debug!(session = %self.id, from = self.current_page, to = page, "page changed");
            self.current_page = page;
            self.redraw();
        }
    }

    fn apply_zoom(&mut self, zoom: f32) {
        if (self.zoom - zoom).abs() > f32::EPSILON {
            debug!(session = %self.id, from = self.zoom, to = zoom, "zoom changed");
            self.zoom = zoom;
            self.redraw();
        }
    }

    fn redraw(&mut self) {
        self.bump_generation();
        if let Some(id) = self.document().map(|info| info.reference.id()) {
            self.push_event(SessionEvent::RedrawNeeded(id));
        }
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn push_event(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}

/// Keeps stepped zoom values on the slider's 0.01 grid.
fn round_zoom(zoom: f32) -> f32 {
    (zoom * 100.0).round() / 100.0
}
