use crossterm::event::{Event, KeyCode, KeyEvent, KeyModifiers};
use pdfshelf_core::Command;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    GotoLastPage,
    OpenBookmarks,
    OpenNotes,
    OpenLibrary,
    OverlayMove { delta: isize },
    OverlayActivate,
    CloseOverlay,
    BeginNote,
    NoteChanged { text: String },
    NoteSubmit { text: String },
    NoteCancel,
    BeginFilter,
    FilterChanged { query: String },
    FilterSubmit { query: String },
    FilterCancel,
    SaveCopy,
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Overlay,
    Note,
    Filter,
}

/// Turns key presses into reader intents, keeping vi-style count prefixes
/// and the text typed into the note and filter prompts.
#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    text_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.text_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    /// Replaces the prompt text, e.g. with the note already saved on the page.
    pub fn set_text(&mut self, text: &str) {
        self.text_buffer = text.to_owned();
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event
        else {
            return UiEvent::None;
        };
        match self.mode {
            InputMode::Normal => self.map_key_normal(code, modifiers),
            InputMode::Overlay => self.map_key_overlay(code, modifiers),
            InputMode::Note => self.map_key_text(code, modifiers),
            InputMode::Filter => self.map_key_text(code, modifiers),
        }
    }

    fn map_key_normal(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE)
            | (KeyCode::Down, KeyModifiers::NONE)
            | (KeyCode::Right, KeyModifiers::NONE)
            | (KeyCode::Char(' '), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::NextPage)
            }
            (KeyCode::Char('k'), KeyModifiers::NONE)
            | (KeyCode::Up, KeyModifiers::NONE)
            | (KeyCode::Left, KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::PrevPage)
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                self.reset_count();
                UiEvent::Command(Command::GotoPage { page: 0 })
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => match self.take_count() {
                Some(page) => UiEvent::Command(Command::GotoPage { page: page - 1 }),
                None => UiEvent::GotoLastPage,
            },
            (KeyCode::Char('+'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomIn)
            }
            (KeyCode::Char('-'), _) => {
                self.reset_count();
                UiEvent::Command(Command::ZoomOut)
            }
            (KeyCode::Char('='), _) => {
                self.reset_count();
                UiEvent::Command(Command::ResetZoom)
            }
            (KeyCode::Char('b'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::AddBookmark)
            }
            (KeyCode::Char('x'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::RemoveBookmark)
            }
            (KeyCode::Char('B'), _) => {
                self.reset_count();
                UiEvent::OpenBookmarks
            }
            (KeyCode::Char('a'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Note);
                UiEvent::BeginNote
            }
            (KeyCode::Char('A'), _) => {
                self.reset_count();
                UiEvent::OpenNotes
            }
            (KeyCode::Char('o'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::OpenLibrary
            }
            (KeyCode::Char('/'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Filter);
                UiEvent::BeginFilter
            }
            (KeyCode::Char('s'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::SaveCopy
            }
            (KeyCode::Char('c'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::Command(Command::Close)
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            (KeyCode::Char('c'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_overlay(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        match (code, modifiers) {
            (KeyCode::Esc, _) => UiEvent::CloseOverlay,
            (KeyCode::Enter, _) => UiEvent::OverlayActivate,
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, KeyModifiers::NONE) => {
                UiEvent::OverlayMove { delta: 1 }
            }
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, KeyModifiers::NONE) => {
                UiEvent::OverlayMove { delta: -1 }
            }
            (KeyCode::Char('/'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Filter);
                UiEvent::BeginFilter
            }
            (KeyCode::Char('q'), _) => UiEvent::Quit,
            _ => UiEvent::None,
        }
    }

    fn map_key_text(&mut self, code: KeyCode, modifiers: KeyModifiers) -> UiEvent {
        let note = matches!(self.mode, InputMode::Note);
        match (code, modifiers) {
            (KeyCode::Esc, _) => {
                self.set_mode(InputMode::Normal);
                if note {
                    UiEvent::NoteCancel
                } else {
                    UiEvent::FilterCancel
                }
            }
            (KeyCode::Enter, _) => {
                let text = std::mem::take(&mut self.text_buffer);
                self.set_mode(InputMode::Normal);
                if note {
                    UiEvent::NoteSubmit { text }
                } else {
                    UiEvent::FilterSubmit { query: text }
                }
            }
            (KeyCode::Backspace, _) => {
                self.text_buffer.pop();
                self.text_changed(note)
            }
            (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                self.text_buffer.push(c);
                self.text_changed(note)
            }
            _ => UiEvent::None,
        }
    }

    fn text_changed(&self, note: bool) -> UiEvent {
        let text = self.text_buffer.clone();
        if note {
            UiEvent::NoteChanged { text }
        } else {
            UiEvent::FilterChanged { query: text }
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    /// The typed count, if any; a count of zero counts as none.
    fn take_count(&mut self) -> Option<usize> {
        let count = self.pending_count.take().filter(|&count| count > 0);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::Note => Some(format!("note: {}", self.text_buffer)),
            InputMode::Filter => Some(format!("/{}", self.text_buffer)),
            InputMode::Normal | InputMode::Overlay => {
                if self.pending_digits.is_empty() {
                    None
                } else {
                    Some(self.pending_digits.clone())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key_event(code: KeyCode) -> Event {
        key_event_with_modifiers(code, KeyModifiers::NONE)
    }

    fn key_event_with_modifiers(code: KeyCode, modifiers: KeyModifiers) -> Event {
        Event::Key(KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        })
    }

    fn type_text(mapper: &mut EventMapper, text: &str) {
        for c in text.chars() {
            mapper.map_event(key_event(KeyCode::Char(c)));
        }
    }

    #[test]
    fn count_prefix_before_capital_g_is_one_based_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('1'))), UiEvent::None);
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('2'))), UiEvent::None);
        assert_eq!(mapper.pending_input().as_deref(), Some("12"));

        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::Command(Command::GotoPage { page: 11 })
        );
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn bare_capital_g_goes_to_last_page() {
        let mut mapper = EventMapper::new();
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::GotoLastPage
        );
        mapper.map_event(key_event(KeyCode::Char('0')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::End)),
            UiEvent::GotoLastPage
        );
    }

    #[test]
    fn other_keys_drop_the_count_prefix() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('4')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::Command(Command::NextPage)
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('G'),
                KeyModifiers::SHIFT
            )),
            UiEvent::GotoLastPage
        );
    }

    #[test]
    fn reader_keys_map_to_session_commands() {
        let mut mapper = EventMapper::new();
        let cases = [
            (KeyCode::Char('k'), UiEvent::Command(Command::PrevPage)),
            (KeyCode::Char('g'), UiEvent::Command(Command::GotoPage { page: 0 })),
            (KeyCode::Char('+'), UiEvent::Command(Command::ZoomIn)),
            (KeyCode::Char('-'), UiEvent::Command(Command::ZoomOut)),
            (KeyCode::Char('='), UiEvent::Command(Command::ResetZoom)),
            (KeyCode::Char('b'), UiEvent::Command(Command::AddBookmark)),
            (KeyCode::Char('x'), UiEvent::Command(Command::RemoveBookmark)),
            (KeyCode::Char('c'), UiEvent::Command(Command::Close)),
            (KeyCode::Char('o'), UiEvent::OpenLibrary),
            (KeyCode::Char('s'), UiEvent::SaveCopy),
            (KeyCode::Char('q'), UiEvent::Quit),
        ];
        for (code, expected) in cases {
            assert_eq!(mapper.map_event(key_event(code)), expected, "{code:?}");
        }
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('B'),
                KeyModifiers::SHIFT
            )),
            UiEvent::OpenBookmarks
        );
        assert_eq!(
            mapper.map_event(key_event_with_modifiers(
                KeyCode::Char('A'),
                KeyModifiers::SHIFT
            )),
            UiEvent::OpenNotes
        );
    }

    #[test]
    fn note_prompt_collects_text_until_enter() {
        let mut mapper = EventMapper::new();
        assert_eq!(mapper.map_event(key_event(KeyCode::Char('a'))), UiEvent::BeginNote);
        assert_eq!(mapper.mode(), InputMode::Note);
        mapper.set_text("old");
        assert_eq!(mapper.pending_input().as_deref(), Some("note: old"));

        type_text(&mut mapper, " ne");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('w'))),
            UiEvent::NoteChanged {
                text: "old new".into()
            }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Backspace)),
            UiEvent::NoteChanged {
                text: "old ne".into()
            }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::NoteSubmit {
                text: "old ne".into()
            }
        );
        assert_eq!(mapper.mode(), InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn note_prompt_keeps_letters_that_are_normal_mode_shortcuts() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('a')));
        type_text(&mut mapper, "jkq");
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::NoteSubmit { text: "jkq".into() }
        );
    }

    #[test]
    fn escape_cancels_prompts() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('a')));
        type_text(&mut mapper, "draft");
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::NoteCancel);
        assert_eq!(mapper.mode(), InputMode::Normal);

        assert_eq!(mapper.map_event(key_event(KeyCode::Char('/'))), UiEvent::BeginFilter);
        assert_eq!(mapper.pending_input().as_deref(), Some("/"));
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::FilterCancel);
        assert!(mapper.pending_input().is_none());
    }

    #[test]
    fn filter_prompt_reports_each_change_and_submits() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('/')));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('r'))),
            UiEvent::FilterChanged { query: "r".into() }
        );
        assert_eq!(mapper.pending_input().as_deref(), Some("/r"));
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Enter)),
            UiEvent::FilterSubmit { query: "r".into() }
        );
    }

    #[test]
    fn overlay_mode_maps_selection_keys() {
        let mut mapper = EventMapper::new();
        mapper.set_mode(InputMode::Overlay);

        assert_eq!(
            mapper.map_event(key_event(KeyCode::Char('j'))),
            UiEvent::OverlayMove { delta: 1 }
        );
        assert_eq!(
            mapper.map_event(key_event(KeyCode::Up)),
            UiEvent::OverlayMove { delta: -1 }
        );
        assert_eq!(mapper.map_event(key_event(KeyCode::Enter)), UiEvent::OverlayActivate);
        assert_eq!(mapper.map_event(key_event(KeyCode::Esc)), UiEvent::CloseOverlay);
    }

    #[test]
    fn switching_modes_clears_pending_state() {
        let mut mapper = EventMapper::new();
        mapper.map_event(key_event(KeyCode::Char('1')));
        assert_eq!(mapper.pending_input().as_deref(), Some("1"));

        mapper.set_mode(InputMode::Overlay);
        assert!(mapper.pending_input().is_none());
        mapper.set_mode(InputMode::Normal);
        assert!(mapper.pending_input().is_none());
    }
}
