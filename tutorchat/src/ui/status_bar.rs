//! Status bar rendering.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
};

use super::{View, theme};
use crate::app::PanelFocus;

/// Render the status bar at the bottom of the screen.
pub fn render(frame: &mut Frame, area: Rect, view: View<'_>) {
    let snapshot = view.snapshot;
    let help_text = match view.app.focus {
        PanelFocus::Input => "Enter: ask | Tab: switch panel | ^N: new | ^L: clear error | Esc: quit",
        PanelFocus::Sidebar => "Enter: open | n: new | d: delete | r: refresh | ↑↓/jk: navigate",
        PanelFocus::Chat => "Tab: switch panel | ↑↓/jk: scroll | Esc: quit",
    };

    let mut spans = vec![Span::styled("TutorChat", theme::bold()), Span::raw(" | ")];

    if let Some(error) = snapshot.error.as_deref().or(view.app.notice.as_deref()) {
        spans.push(Span::styled(format!("✗ {error}"), theme::error()));
    } else {
        let busy = [
            (snapshot.session_loading, "sessions"),
            (snapshot.message_loading, "history"),
            (snapshot.send_loading, "thinking"),
        ]
        .into_iter()
        .filter_map(|(on, label)| on.then_some(label))
        .collect::<Vec<_>>();

        if busy.is_empty() {
            spans.push(Span::styled("●", theme::normal().fg(theme::SUCCESS)));
            spans.push(Span::raw(" ready"));
        } else {
            spans.push(Span::styled("●", theme::normal().fg(theme::WARNING)));
            spans.push(Span::raw(format!(" {}…", busy.join(", "))));
        }
    }

    spans.push(Span::raw(" | "));
    spans.push(Span::styled(help_text, theme::dimmed()));

    let paragraph = Paragraph::new(Line::from(spans)).style(theme::status_bar_bg());
    frame.render_widget(paragraph, area);
}
