//! Chat panel rendering (timeline + input box).

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use super::{View, theme};
use crate::app::PanelFocus;
use crate::chat::timeline::Message;
use crate::chat::{RevealView, Snapshot};

/// Render the chat panel (timeline + input box).
pub fn render(frame: &mut Frame, area: Rect, view: View<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    render_messages(frame, chunks[0], view);
    render_input(frame, chunks[1], view);
}

/// Answer text to show for `message`: partial while it is being revealed.
fn answer_text<'a>(message: &'a Message, snapshot: &'a Snapshot) -> (&'a str, bool) {
    match &snapshot.reveal {
        Some(RevealView {
            message_id,
            visible,
            ..
        }) if message.permanent_id() == Some(*message_id) => (visible.as_str(), true),
        _ => (message.answer.as_str(), false),
    }
}

fn message_item<'a>(message: &'a Message, snapshot: &'a Snapshot) -> ListItem<'a> {
    let question_style = if message.is_optimistic {
        theme::optimistic()
    } else {
        theme::normal()
    };
    let mut lines = vec![Line::from(vec![
        Span::styled("You: ", theme::speaker(theme::QUESTION)),
        Span::styled(message.question.as_str(), question_style),
    ])];

    if message.is_optimistic {
        lines.push(Line::from(vec![
            Span::styled("Tutor: ", theme::speaker(theme::ANSWER)),
            Span::styled("…", theme::dimmed()),
        ]));
    } else {
        let (answer, revealing) = answer_text(message, snapshot);
        let mut answer_lines = answer.split('\n');
        let first = answer_lines.next().unwrap_or_default();
        lines.push(Line::from(vec![
            Span::styled("Tutor: ", theme::speaker(theme::ANSWER)),
            Span::styled(first, theme::normal()),
        ]));
        lines.extend(answer_lines.map(|l| Line::from(Span::styled(l, theme::normal()))));
        if revealing && let Some(last) = lines.last_mut() {
            last.push_span(Span::styled("▌", theme::dimmed()));
        }
    }
    lines.push(Line::default());

    ListItem::new(Text::from(lines))
}

/// Render the message list.
fn render_messages(frame: &mut Frame, area: Rect, view: View<'_>) {
    let is_focused = view.app.focus == PanelFocus::Chat;
    let snapshot = view.snapshot;

    let items: Vec<ListItem> = if snapshot.messages.is_empty() {
        let hint = match (snapshot.active_session_id, snapshot.message_loading) {
            (None, _) => "Select or create a session to start.",
            (Some(_), true) => "Loading history…",
            (Some(_), false) => "Ask the tutor a question.",
        };
        vec![ListItem::new(Line::from(Span::styled(hint, theme::dimmed())))]
    } else {
        snapshot
            .messages
            .iter()
            .map(|m| message_item(m, snapshot))
            .collect()
    };

    let title = snapshot
        .active_session()
        .map_or_else(|| "Chat".to_string(), |s| s.title.clone());
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if is_focused {
            theme::highlighted()
        } else {
            theme::normal()
        });

    let list = List::new(items).block(block).highlight_style(Style::default());
    let mut state = ListState::default().with_selected(Some(view.app.message_scroll));
    frame.render_stateful_widget(list, area, &mut state);
}

/// Render the input box.
fn render_input(frame: &mut Frame, area: Rect, view: View<'_>) {
    let app = view.app;
    let is_focused = app.focus == PanelFocus::Input;

    let display_text: String = if is_focused {
        let mut chars: Vec<char> = app.input.chars().collect();
        let at = app.cursor_position.min(chars.len());
        chars.insert(at, '█');
        chars.into_iter().collect()
    } else {
        app.input.clone()
    };

    let input_line = if display_text.is_empty() {
        Line::from(Span::styled("Ask a question...", theme::dimmed()))
    } else {
        Line::from(Span::styled(display_text, theme::normal()))
    };

    let title = if view.snapshot.send_loading {
        "Question (waiting for answer)"
    } else {
        "Question"
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(if is_focused {
            theme::highlighted()
        } else {
            theme::normal()
        });

    frame.render_widget(Paragraph::new(input_line).block(block), area);
}
