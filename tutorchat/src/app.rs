//! Application state and event handling.
//!
//! [`App`] only holds what belongs to the terminal: the input line, focus,
//! scroll and sidebar cursor. Conversation state lives in the chat client;
//! keys that act on it come back as [`Intent`]s for the caller to dispatch.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tutorchat_proto::session::SessionId;

use crate::chat::Snapshot;

/// Which panel is currently focused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelFocus {
    /// Input box is focused (default).
    Input,
    /// Sidebar session list is focused.
    Sidebar,
    /// Chat message list is focused.
    Chat,
}

/// A user action the chat client has to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Make this session active.
    Select(SessionId),
    /// Delete this session.
    Delete(SessionId),
    /// Create a new session.
    Create,
    /// Reload the session list.
    Refresh,
    /// Ask the question in the active session.
    Send(String),
    /// Clear the error banner.
    DismissError,
}

/// Main application state.
pub struct App {
    /// Current text input.
    pub input: String,
    /// Cursor position in input (character index).
    pub cursor_position: usize,
    /// Which panel is focused.
    pub focus: PanelFocus,
    /// Scroll offset for message list.
    pub message_scroll: usize,
    /// Highlighted row in the sidebar.
    pub selected_session: usize,
    /// Local notice shown in the status bar (rejected sends and the like).
    pub notice: Option<String>,
    /// Whether the app should quit.
    pub should_quit: bool,
    session_ids: Vec<SessionId>,
    message_count: usize,
}

impl App {
    /// Create an empty application.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            input: String::new(),
            cursor_position: 0,
            focus: PanelFocus::Input,
            message_scroll: 0,
            selected_session: 0,
            notice: None,
            should_quit: false,
            session_ids: Vec::new(),
            message_count: 0,
        }
    }

    /// Follow a new snapshot: keep the sidebar cursor in range and pin the
    /// message list to the bottom when the timeline grows.
    pub fn sync(&mut self, snapshot: &Snapshot) {
        let ids: Vec<SessionId> = snapshot.sessions.iter().map(|s| s.id).collect();
        if ids != self.session_ids {
            self.selected_session = snapshot
                .active_session_id
                .and_then(|active| ids.iter().position(|&id| id == active))
                .unwrap_or_else(|| self.selected_session.min(ids.len().saturating_sub(1)));
            self.session_ids = ids;
        }

        if snapshot.messages.len() != self.message_count {
            self.message_count = snapshot.messages.len();
            self.message_scroll = self.message_count.saturating_sub(1);
        }
    }

    /// Pin the message list to the bottom while an answer is being revealed.
    pub const fn follow_reveal(&mut self) {
        self.message_scroll = self.message_count.saturating_sub(1);
    }

    /// Handle a key event, returning the intent it maps to, if any.
    pub fn handle_key_event(&mut self, key: KeyEvent) -> Option<Intent> {
        // Global shortcuts
        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Esc, _) => {
                self.should_quit = true;
                return None;
            }
            (KeyCode::Char('r'), KeyModifiers::CONTROL) => return Some(Intent::Refresh),
            (KeyCode::Char('n'), KeyModifiers::CONTROL) => return Some(Intent::Create),
            (KeyCode::Char('l'), KeyModifiers::CONTROL) => {
                self.notice = None;
                return Some(Intent::DismissError);
            }
            (KeyCode::Tab, KeyModifiers::SHIFT) | (KeyCode::BackTab, _) => {
                self.cycle_focus_backward();
                return None;
            }
            (KeyCode::Tab, _) => {
                self.cycle_focus_forward();
                return None;
            }
            _ => {}
        }

        match self.focus {
            PanelFocus::Input => self.handle_input_key(key),
            PanelFocus::Sidebar => self.handle_sidebar_key(key),
            PanelFocus::Chat => {
                self.handle_chat_key(key);
                None
            }
        }
    }

    /// Clear the input line after the client accepted a send.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
        self.notice = None;
    }

    fn handle_input_key(&mut self, key: KeyEvent) -> Option<Intent> {
        match key.code {
            KeyCode::Enter => {
                return (!self.input.trim().is_empty()).then(|| Intent::Send(self.input.clone()));
            }
            KeyCode::Char(c) => self.enter_char(c),
            KeyCode::Backspace => self.delete_char(),
            KeyCode::Left => self.move_cursor_left(),
            KeyCode::Right => self.move_cursor_right(),
            KeyCode::Home => self.cursor_position = 0,
            KeyCode::End => self.cursor_position = self.input.chars().count(),
            _ => {}
        }
        None
    }

    fn handle_sidebar_key(&mut self, key: KeyEvent) -> Option<Intent> {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_session = self.selected_session.saturating_sub(1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected_session + 1 < self.session_ids.len() {
                    self.selected_session += 1;
                }
                None
            }
            KeyCode::Enter => self.highlighted().map(Intent::Select),
            KeyCode::Char('d') | KeyCode::Delete => self.highlighted().map(Intent::Delete),
            KeyCode::Char('n') => Some(Intent::Create),
            KeyCode::Char('r') => Some(Intent::Refresh),
            _ => None,
        }
    }

    const fn handle_chat_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.message_scroll = self.message_scroll.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.message_scroll + 1 < self.message_count {
                    self.message_scroll += 1;
                }
            }
            _ => {}
        }
    }

    fn highlighted(&self) -> Option<SessionId> {
        self.session_ids.get(self.selected_session).copied()
    }

    /// Cycle focus forward: Input -> Sidebar -> Chat -> Input.
    const fn cycle_focus_forward(&mut self) {
        self.focus = match self.focus {
            PanelFocus::Input => PanelFocus::Sidebar,
            PanelFocus::Sidebar => PanelFocus::Chat,
            PanelFocus::Chat => PanelFocus::Input,
        };
    }

    /// Cycle focus backward: Input -> Chat -> Sidebar -> Input.
    const fn cycle_focus_backward(&mut self) {
        self.focus = match self.focus {
            PanelFocus::Input => PanelFocus::Chat,
            PanelFocus::Chat => PanelFocus::Sidebar,
            PanelFocus::Sidebar => PanelFocus::Input,
        };
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor_position)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn enter_char(&mut self, c: char) {
        let index = self.byte_index();
        self.input.insert(index, c);
        self.cursor_position += 1;
    }

    fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let index = self.byte_index();
            self.input.remove(index);
        }
    }

    const fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input.chars().count() {
            self.cursor_position += 1;
        }
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
