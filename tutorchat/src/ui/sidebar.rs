//! Sidebar rendering for the session list.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
};

use super::{View, format_timestamp, theme};
use crate::app::PanelFocus;

/// Render the sidebar with the session list.
pub fn render(frame: &mut Frame, area: Rect, view: View<'_>) {
    let is_focused = view.app.focus == PanelFocus::Sidebar;
    let snapshot = view.snapshot;

    let items: Vec<ListItem> = snapshot
        .sessions
        .iter()
        .enumerate()
        .map(|(idx, session)| {
            let is_cursor = idx == view.app.selected_session;
            let is_active = snapshot.active_session_id == Some(session.id);

            let marker = if is_active { "▸ " } else { "  " };
            let line = Line::from(vec![
                Span::raw(marker),
                Span::raw(session.title.as_str()),
                Span::raw(" "),
                Span::styled(
                    format_timestamp(session.created_at, view.timestamp_format),
                    theme::dimmed(),
                ),
            ]);

            let style = if is_cursor && is_focused {
                theme::selected()
            } else if is_active {
                theme::highlighted()
            } else {
                theme::normal()
            };
            ListItem::new(line).style(style)
        })
        .collect();

    let title = if snapshot.session_loading {
        "Sessions …"
    } else {
        "Sessions"
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if is_focused {
            theme::highlighted()
        } else {
            theme::normal()
        });

    frame.render_widget(List::new(items).block(block), area);
}
