//! Terminal UI rendering.
//!
//! Rendering is a pure function of the [`App`] (terminal-local state) and the
//! latest chat [`Snapshot`].

pub mod chat_panel;
pub mod sidebar;
pub mod status_bar;
pub mod theme;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
};
use tutorchat_proto::message::Timestamp;

use crate::app::App;
use crate::chat::Snapshot;

/// Everything a frame is drawn from.
#[derive(Clone, Copy)]
pub struct View<'a> {
    /// Terminal-local state.
    pub app: &'a App,
    /// Latest chat state.
    pub snapshot: &'a Snapshot,
    /// Chrono format for session timestamps.
    pub timestamp_format: &'a str,
}

/// Main draw function for the entire UI.
pub fn draw(frame: &mut Frame, view: View<'_>) {
    // Create main layout with status bar at bottom
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(frame.area());

    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25), // Sessions
            Constraint::Percentage(75), // Chat
        ])
        .split(main_chunks[0]);

    sidebar::render(frame, content_chunks[0], view);
    chat_panel::render(frame, content_chunks[1], view);
    status_bar::render(frame, main_chunks[1], view);
}

/// Format a timestamp in local time with a chrono format string.
#[must_use]
pub fn format_timestamp(timestamp: Timestamp, format: &str) -> String {
    use chrono::{Local, TimeZone};
    let ms = timestamp.as_millis();
    let secs = (ms / 1000).cast_signed();
    let nsecs = u32::try_from((ms % 1000) * 1_000_000).unwrap_or(0);
    match Local.timestamp_opt(secs, nsecs) {
        chrono::LocalResult::Single(dt) => dt.format(format).to_string(),
        _ => "??:??".to_string(),
    }
}
