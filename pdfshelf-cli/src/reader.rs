use std::io::{self, Stdout, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::cursor;
use crossterm::event;
use crossterm::style::{Attribute, Print, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType};
use pdfshelf_core::{
    Command, DocumentRef, PageImage, RenderTicket, Session, SessionEvent, ShelfError,
};
use pdfshelf_tty::{write_status_line, DrawParams, EventMapper, InputMode, KittyRenderer, UiEvent};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::write_export;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, cursor::Show);
    }
}

enum LoopAction {
    Continue,
    Redraw,
    Quit,
}

/// A scrollable pick list drawn over the page.
struct ListWindow<T> {
    title: &'static str,
    empty_message: &'static str,
    entries: Vec<T>,
    selected: usize,
    scroll_offset: usize,
}

impl<T> ListWindow<T> {
    fn new(title: &'static str, empty_message: &'static str, entries: Vec<T>) -> Self {
        Self {
            title,
            empty_message,
            entries,
            selected: 0,
            scroll_offset: 0,
        }
    }

    fn select_where(mut self, predicate: impl Fn(&T) -> bool) -> Self {
        if let Some(index) = self.entries.iter().position(predicate) {
            self.selected = index;
        }
        self
    }

    fn selected_entry(&self) -> Option<&T> {
        self.entries.get(self.selected)
    }

    fn move_selection(&mut self, delta: isize) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let len = self.entries.len() as isize;
        let next = (self.selected as isize + delta).clamp(0, len - 1) as usize;
        if next != self.selected {
            self.selected = next;
            true
        } else {
            false
        }
    }

    fn ensure_visible(&mut self, viewport_height: usize) {
        if viewport_height == 0 || self.entries.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        let max_offset = self.entries.len().saturating_sub(viewport_height);
        self.scroll_offset = self.scroll_offset.min(max_offset);
        if self.selected < self.scroll_offset {
            self.scroll_offset = self.selected;
        } else if self.selected >= self.scroll_offset + viewport_height {
            self.scroll_offset = self.selected + 1 - viewport_height;
        }
    }
}

enum Overlay {
    None,
    Bookmarks(ListWindow<usize>),
    Notes(ListWindow<(usize, String)>),
    Library(ListWindow<DocumentRef>),
}

impl Overlay {
    fn is_active(&self) -> bool {
        !matches!(self, Overlay::None)
    }
}

struct RenderJob {
    ticket: RenderTicket,
    handle: JoinHandle<pdfshelf_core::Result<PageImage>>,
}

struct Reader {
    session: Session,
    renderer: KittyRenderer<Stdout>,
    mapper: EventMapper,
    overlay: Overlay,
    filter: String,
    message: Option<String>,
    download_dir: PathBuf,
    in_flight: Option<RenderJob>,
    needs_render: bool,
    shown: Option<PageImage>,
}

pub async fn run(session: Session, download_dir: PathBuf) -> Result<()> {
    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;

    let mut reader = Reader {
        session,
        renderer: KittyRenderer::new(stdout),
        mapper: EventMapper::new(),
        overlay: Overlay::None,
        filter: String::new(),
        message: None,
        download_dir,
        in_flight: None,
        needs_render: true,
        shown: None,
    };
    if !reader.session.is_open() {
        reader.open_library()?;
    }

    let mut dirty = true;
    loop {
        if reader.poll_render().await? {
            dirty = true;
        }
        reader.schedule_render();

        if dirty {
            reader.redraw()?;
            dirty = false;
        }

        if event::poll(POLL_INTERVAL)? {
            let ui_event = reader.mapper.map_event(event::read()?);
            match reader.handle_event(ui_event).await? {
                LoopAction::Continue => {}
                LoopAction::Redraw => dirty = true,
                LoopAction::Quit => break,
            }
            if reader.drain_events() {
                dirty = true;
            }
        }
    }

    reader.renderer.clear_images()?;
    reader.renderer.clear_all()?;
    Ok(())
}

impl Reader {
    /// Collects a finished background render. Returns whether the screen
    /// needs repainting.
    async fn poll_render(&mut self) -> Result<bool> {
        let finished = self
            .in_flight
            .as_ref()
            .is_some_and(|job| job.handle.is_finished());
        if !finished {
            return Ok(false);
        }
        let Some(job) = self.in_flight.take() else {
            return Ok(false);
        };

        match job.handle.await {
            Ok(Ok(image)) => match self.session.complete_render(&job.ticket, image) {
                Some(image) => {
                    self.shown = Some(image);
                    self.needs_render = false;
                }
                None => self.needs_render = true,
            },
            Ok(Err(err)) => {
                warn!(?err, "render failed");
                self.message = Some(err.to_string());
                self.needs_render = false;
            }
            Err(err) => {
                warn!(?err, "render task aborted");
                self.message = Some("render task aborted".to_owned());
                self.needs_render = false;
            }
        }
        Ok(true)
    }

    /// Starts rendering the current page off the UI thread unless it is
    /// cached or a render is already running.
    fn schedule_render(&mut self) {
        if !self.needs_render || self.in_flight.is_some() {
            return;
        }
        if !self.session.is_open() {
            self.needs_render = false;
            self.shown = None;
            return;
        }
        if let Some(image) = self.session.cached_page() {
            self.shown = Some(image);
            self.needs_render = false;
            return;
        }
        match self.session.render_ticket() {
            Ok(ticket) => {
                debug!(page = ticket.request.page_index, zoom = ticket.request.zoom, "render scheduled");
                let job_ticket = ticket.clone();
                let handle = tokio::task::spawn_blocking(move || job_ticket.render());
                self.in_flight = Some(RenderJob { ticket, handle });
                self.needs_render = false;
            }
            Err(err) => {
                self.message = Some(err.to_string());
                self.needs_render = false;
            }
        }
    }

    /// Marks the page for re-rendering after session changes. Returns
    /// whether anything happened.
    fn drain_events(&mut self) -> bool {
        let events = std::mem::take(&mut *self.session.events().lock());
        for event in &events {
            match event {
                SessionEvent::DocumentOpened(_) | SessionEvent::RedrawNeeded(_) => {
                    self.needs_render = true;
                    self.shown = None;
                }
                SessionEvent::DocumentClosed(_) => {
                    self.shown = None;
                }
                SessionEvent::BookmarksChanged(_) | SessionEvent::NotesChanged(_) => {}
            }
        }
        !events.is_empty()
    }

    async fn handle_event(&mut self, event: UiEvent) -> Result<LoopAction> {
        match event {
            UiEvent::Command(Command::Close) => {
                self.session.close();
                self.open_library()?;
                Ok(LoopAction::Redraw)
            }
            UiEvent::Command(command) => {
                let bookmark = matches!(command, Command::AddBookmark | Command::RemoveBookmark);
                let page = self.session.current_page();
                match self.session.apply(command) {
                    Ok(()) if bookmark => {
                        self.message = Some(if self.session.is_bookmarked() {
                            format!("page {} bookmarked", page + 1)
                        } else {
                            format!("page {} not bookmarked", page + 1)
                        });
                    }
                    Ok(()) => self.message = None,
                    Err(err) => self.report(err),
                }
                Ok(LoopAction::Redraw)
            }
            UiEvent::GotoLastPage => {
                if let Some(count) = self.session.page_count() {
                    if let Err(err) = self.session.goto_page(count - 1) {
                        self.report(err);
                    }
                } else {
                    self.report(ShelfError::NoDocumentOpen);
                }
                Ok(LoopAction::Redraw)
            }
            UiEvent::OpenBookmarks => {
                match self.session.bookmarks() {
                    Ok(pages) => {
                        let current = self.session.current_page();
                        let window = ListWindow::new("Bookmarked Pages", "No bookmarks yet", pages)
                            .select_where(|&page| page == current);
                        self.show_overlay(Overlay::Bookmarks(window));
                    }
                    Err(err) => self.report(err),
                }
                Ok(LoopAction::Redraw)
            }
            UiEvent::OpenNotes => {
                match self.session.notes() {
                    Ok(notes) => {
                        let current = self.session.current_page();
                        let window = ListWindow::new(
                            "All Annotations",
                            "No annotations yet",
                            notes.into_iter().collect(),
                        )
                        .select_where(|(page, _)| *page == current);
                        self.show_overlay(Overlay::Notes(window));
                    }
                    Err(err) => self.report(err),
                }
                Ok(LoopAction::Redraw)
            }
            UiEvent::OpenLibrary => {
                self.open_library()?;
                Ok(LoopAction::Redraw)
            }
            UiEvent::OverlayMove { delta } => {
                let moved = match &mut self.overlay {
                    Overlay::Bookmarks(window) => window.move_selection(delta),
                    Overlay::Notes(window) => window.move_selection(delta),
                    Overlay::Library(window) => window.move_selection(delta),
                    Overlay::None => false,
                };
                Ok(if moved {
                    LoopAction::Redraw
                } else {
                    LoopAction::Continue
                })
            }
            UiEvent::OverlayActivate => {
                self.activate_selection().await;
                Ok(LoopAction::Redraw)
            }
            UiEvent::CloseOverlay => {
                self.hide_overlay();
                Ok(LoopAction::Redraw)
            }
            UiEvent::BeginNote => {
                match self.session.note() {
                    Ok(existing) => self.mapper.set_text(&existing.unwrap_or_default()),
                    Err(err) => {
                        self.mapper.set_mode(InputMode::Normal);
                        self.report(err);
                    }
                }
                Ok(LoopAction::Redraw)
            }
            UiEvent::NoteSubmit { text } => {
                match self.session.save_note(text) {
                    Ok(()) => {
                        self.message =
                            Some(format!("note saved on page {}", self.session.current_page() + 1))
                    }
                    Err(err) => self.report(err),
                }
                Ok(LoopAction::Redraw)
            }
            UiEvent::NoteChanged { .. } | UiEvent::NoteCancel | UiEvent::BeginFilter => {
                Ok(LoopAction::Redraw)
            }
            UiEvent::FilterChanged { query } => {
                if matches!(self.overlay, Overlay::Library(_)) {
                    self.filter = query;
                    self.refresh_library()?;
                }
                Ok(LoopAction::Redraw)
            }
            UiEvent::FilterSubmit { query } => {
                self.filter = query;
                self.open_library()?;
                Ok(LoopAction::Redraw)
            }
            UiEvent::FilterCancel => {
                if self.overlay.is_active() {
                    self.mapper.set_mode(InputMode::Overlay);
                }
                Ok(LoopAction::Redraw)
            }
            UiEvent::SaveCopy => {
                self.save_copy();
                Ok(LoopAction::Redraw)
            }
            UiEvent::Quit => Ok(LoopAction::Quit),
            UiEvent::None => Ok(LoopAction::Continue),
        }
    }

    async fn activate_selection(&mut self) {
        let overlay = std::mem::replace(&mut self.overlay, Overlay::None);
        self.mapper.set_mode(InputMode::Normal);
        let result = match &overlay {
            Overlay::Bookmarks(window) => match window.selected_entry() {
                Some(&page) => self.session.goto_bookmark(page),
                None => Ok(()),
            },
            Overlay::Notes(window) => match window.selected_entry() {
                Some(&(page, _)) => self.session.goto_page(page),
                None => Ok(()),
            },
            Overlay::Library(window) => match window.selected_entry() {
                Some(doc) => self.session.open(doc).await,
                None => Ok(()),
            },
            Overlay::None => Ok(()),
        };
        match result {
            Ok(()) => self.message = None,
            Err(err) => {
                self.report(err);
                // Keep the picker up when nothing could be opened.
                if !self.session.is_open() {
                    self.show_overlay(overlay);
                }
            }
        }
        self.clear_screen();
    }

    fn open_library(&mut self) -> Result<()> {
        let docs = self.session.library().search(&self.filter)?;
        let current = self.session.document().map(|info| info.reference.clone());
        let window = ListWindow::new("Library", "No books available.", docs)
            .select_where(|doc| Some(doc) == current.as_ref());
        self.show_overlay(Overlay::Library(window));
        Ok(())
    }

    fn refresh_library(&mut self) -> Result<()> {
        let docs = self.session.library().search(&self.filter)?;
        if let Overlay::Library(window) = &mut self.overlay {
            window.entries = docs;
            window.selected = 0;
            window.scroll_offset = 0;
        }
        Ok(())
    }

    fn show_overlay(&mut self, overlay: Overlay) {
        self.overlay = overlay;
        self.mapper.set_mode(InputMode::Overlay);
        self.clear_screen();
    }

    fn hide_overlay(&mut self) {
        self.overlay = Overlay::None;
        self.mapper.set_mode(InputMode::Normal);
        self.clear_screen();
    }

    fn clear_screen(&mut self) {
        if let Err(err) = self
            .renderer
            .clear_images()
            .and_then(|_| self.renderer.clear_all())
        {
            warn!(?err, "failed to clear screen");
        }
    }

    fn save_copy(&mut self) {
        match self.session.download() {
            Ok(download) => {
                let target = self.download_dir.join(&download.file_name);
                match write_export(&target, &download.bytes) {
                    Ok(()) => self.message = Some(format!("saved {}", target.display())),
                    Err(err) => {
                        warn!(?err, "failed to save copy");
                        self.message = Some(format!("{err:#}"));
                    }
                }
            }
            Err(err) => self.report(err),
        }
    }

    fn report(&mut self, err: ShelfError) {
        debug!(%err, "operation rejected");
        self.message = Some(err.to_string());
    }

    fn redraw(&mut self) -> Result<()> {
        let window = terminal::window_size()?;
        let total_cols = u32::from(window.columns).max(1);
        let total_rows = u32::from(window.rows).max(1);
        let body_rows = total_rows.saturating_sub(1).max(1);

        self.renderer.begin_sync_update()?;
        if self.overlay.is_active() {
            self.draw_overlay(total_cols, body_rows)?;
        } else if let Some(image) = self.shown.as_ref() {
            let cell_width = f32::from(window.width) / total_cols as f32;
            let cell_height = f32::from(window.height) / total_rows as f32;
            let params = DrawParams::fit(
                image,
                total_cols.saturating_sub(2).max(1),
                body_rows.saturating_sub(1).max(1),
                cell_width,
                cell_height,
            );
            let start_col = total_cols.saturating_sub(params.columns) / 2;
            let start_row = body_rows.saturating_sub(params.rows) / 2;
            {
                let writer = self.renderer.writer();
                crossterm::execute!(writer, cursor::MoveTo(start_col as u16, start_row as u16))?;
            }
            self.renderer.draw(image, params)?;
        } else if !self.session.is_open() {
            let writer = self.renderer.writer();
            crossterm::execute!(
                writer,
                cursor::MoveTo(2, 1),
                Print("Select a book and press Enter to start reading (o: library, q: quit).")
            )?;
        }

        let status = self.status_line();
        {
            let writer = self.renderer.writer();
            crossterm::execute!(
                writer,
                cursor::MoveTo(0, (total_rows - 1) as u16),
                Clear(ClearType::CurrentLine)
            )?;
            let max = total_cols as usize;
            let status: String = status.chars().take(max).collect();
            write_status_line(writer, &status)?;
        }
        self.renderer.end_sync_update()?;
        Ok(())
    }

    fn status_line(&self) -> String {
        let mut parts = Vec::new();
        if let Some(info) = self.session.document() {
            let mut page = format!(
                "{} | page {}/{} | zoom {:.0}%",
                info.reference,
                self.session.current_page() + 1,
                info.page_count,
                self.session.zoom() * 100.0
            );
            if self.session.is_bookmarked() {
                page.push_str(" | bookmarked");
            }
            if matches!(self.session.note(), Ok(Some(_))) {
                page.push_str(" | note");
            }
            if self.in_flight.is_some() {
                page.push_str(" | rendering");
            }
            parts.push(page);
        } else {
            parts.push("no document open".to_owned());
        }
        if let Some(message) = &self.message {
            parts.push(message.clone());
        }
        if let Some(pending) = self.mapper.pending_input() {
            parts.push(pending);
        }
        parts.join(" | ")
    }

    fn draw_overlay(&mut self, total_cols: u32, body_rows: u32) -> Result<()> {
        let lines_height = body_rows.saturating_sub(4).max(1) as usize;
        let width = total_cols.saturating_sub(4).max(10) as usize;
        let (title, empty, lines, selected, scroll) = match &mut self.overlay {
            Overlay::Bookmarks(window) => {
                window.ensure_visible(lines_height);
                let lines = window
                    .entries
                    .iter()
                    .map(|page| format!("Go to Page {}", page + 1))
                    .collect::<Vec<_>>();
                (window.title, window.empty_message, lines, window.selected, window.scroll_offset)
            }
            Overlay::Notes(window) => {
                window.ensure_visible(lines_height);
                let lines = window
                    .entries
                    .iter()
                    .map(|(page, text)| format!("Page {}: {}", page + 1, single_line(text)))
                    .collect::<Vec<_>>();
                (window.title, window.empty_message, lines, window.selected, window.scroll_offset)
            }
            Overlay::Library(window) => {
                window.ensure_visible(lines_height);
                let lines = window
                    .entries
                    .iter()
                    .map(|doc| doc.name().to_owned())
                    .collect::<Vec<_>>();
                (window.title, window.empty_message, lines, window.selected, window.scroll_offset)
            }
            Overlay::None => return Ok(()),
        };

        let title = if matches!(self.overlay, Overlay::Library(_)) && !self.filter.is_empty() {
            format!("{} (filter: {})", title, self.filter)
        } else {
            title.to_owned()
        };

        let writer = self.renderer.writer();
        print_inverted(writer, 2, 1, &truncate(&title, width))?;
        if lines.is_empty() {
            crossterm::execute!(writer, cursor::MoveTo(2, 3), Print(empty))?;
            return Ok(());
        }
        for (row, (index, line)) in lines
            .iter()
            .enumerate()
            .skip(scroll)
            .take(lines_height)
            .enumerate()
        {
            let text = truncate(line, width);
            let row = (row + 3) as u16;
            if index == selected {
                print_inverted(writer, 2, row, &text)?;
            } else {
                crossterm::execute!(writer, cursor::MoveTo(2, row), Print(text))?;
            }
        }
        Ok(())
    }
}

fn print_inverted(writer: &mut impl Write, col: u16, row: u16, content: &str) -> Result<()> {
    crossterm::execute!(
        writer,
        cursor::MoveTo(col, row),
        SetAttribute(Attribute::Reverse),
        Print(content),
        SetAttribute(Attribute::Reset)
    )?;
    Ok(())
}

fn single_line(text: &str) -> String {
    let joined = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        "(empty)".to_owned()
    } else {
        joined
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(width.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
