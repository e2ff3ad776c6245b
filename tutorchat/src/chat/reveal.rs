//! Progressive reveal of an answer, one unit at a time.
//!
//! An answer is split into [`RevealUnit`]s: single characters for plain
//! text, and whole spans for formatted markup that must never be shown half
//! open (inline code, inline math, fenced code blocks, display math). Each
//! unit kind has its own delay; formatted spans appear atomically.

use std::time::Duration;

use tutorchat_proto::message::MessageId;

/// Block delimiters, tried before inline ones so `$$` wins over `$`.
const BLOCK_DELIMITERS: [(&str, &str); 3] = [("```", "```"), ("$$", "$$"), ("\\[", "\\]")];

/// Inline delimiters. Inline spans never cross a line break.
const INLINE_DELIMITERS: [(&str, &str); 3] = [("\\(", "\\)"), ("`", "`"), ("$", "$")];

/// Per-unit delays of the reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealDelays {
    /// Delay before each plain character.
    pub char_delay: Duration,
    /// Delay before each inline formatted span.
    pub inline_delay: Duration,
    /// Delay before each block formatted span.
    pub block_delay: Duration,
}

impl Default for RevealDelays {
    fn default() -> Self {
        Self {
            char_delay: Duration::from_millis(12),
            inline_delay: Duration::from_millis(40),
            block_delay: Duration::from_millis(120),
        }
    }
}

/// One indivisible step of a reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealUnit {
    /// A single plain-text character.
    Char(char),
    /// An inline formatted span, delimiters included.
    Inline(String),
    /// A block formatted span, delimiters included.
    Block(String),
}

impl RevealUnit {
    /// Delay to wait before exposing this unit.
    #[must_use]
    pub const fn delay(&self, delays: &RevealDelays) -> Duration {
        match self {
            Self::Char(_) => delays.char_delay,
            Self::Inline(_) => delays.inline_delay,
            Self::Block(_) => delays.block_delay,
        }
    }

    fn push_to(&self, out: &mut String) {
        match self {
            Self::Char(c) => out.push(*c),
            Self::Inline(s) | Self::Block(s) => out.push_str(s),
        }
    }
}

/// Splits `text` into reveal units.
///
/// Unclosed or empty delimiters fall back to plain characters.
#[must_use]
pub fn split_units(text: &str) -> Vec<RevealUnit> {
    let mut units = Vec::new();
    let mut rest = text;
    while !rest.is_empty() {
        if let Some((unit, len)) = formatted_span(rest) {
            units.push(unit);
            rest = &rest[len..];
            continue;
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            units.push(RevealUnit::Char(c));
        }
        rest = chars.as_str();
    }
    units
}

fn formatted_span(rest: &str) -> Option<(RevealUnit, usize)> {
    for (open, close) in BLOCK_DELIMITERS {
        if let Some(len) = delimited_len(rest, open, close, true) {
            return Some((RevealUnit::Block(rest[..len].to_string()), len));
        }
    }
    for (open, close) in INLINE_DELIMITERS {
        if let Some(len) = delimited_len(rest, open, close, false) {
            return Some((RevealUnit::Inline(rest[..len].to_string()), len));
        }
    }
    None
}

/// Byte length of the span starting at `rest` if it opens with `open` and
/// a non-empty body is closed by `close`.
fn delimited_len(rest: &str, open: &str, close: &str, multiline: bool) -> Option<usize> {
    let body = rest.strip_prefix(open)?;
    let end = body.find(close)?;
    let inner = &body[..end];
    if inner.is_empty() || (!multiline && inner.contains('\n')) {
        return None;
    }
    Some(open.len() + end + close.len())
}

/// Reveal progress of one message.
#[derive(Debug, Clone)]
pub struct Reveal {
    message_id: MessageId,
    units: Vec<RevealUnit>,
    revealed: usize,
    visible: String,
}

impl Reveal {
    /// Starts a reveal of `content` with nothing visible yet.
    #[must_use]
    pub fn new(message_id: MessageId, content: &str) -> Self {
        let units = split_units(content);
        Self {
            message_id,
            visible: String::with_capacity(content.len()),
            units,
            revealed: 0,
        }
    }

    /// The message being revealed.
    #[must_use]
    pub const fn message_id(&self) -> MessageId {
        self.message_id
    }

    /// The content exposed so far.
    #[must_use]
    pub fn visible(&self) -> &str {
        &self.visible
    }

    /// `(revealed, total)` unit counts.
    #[must_use]
    pub fn progress(&self) -> (usize, usize) {
        (self.revealed, self.units.len())
    }

    /// Whether every unit has been exposed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.revealed >= self.units.len()
    }

    /// Delays of the units not yet revealed, in order.
    #[must_use]
    pub fn schedule(&self, delays: &RevealDelays) -> Vec<Duration> {
        self.units[self.revealed..]
            .iter()
            .map(|unit| unit.delay(delays))
            .collect()
    }

    /// Exposes the next unit. Returns `false` if the reveal was already complete.
    pub fn advance(&mut self) -> bool {
        let Some(unit) = self.units.get(self.revealed) else {
            return false;
        };
        unit.push_to(&mut self.visible);
        self.revealed += 1;
        true
    }
}
