//! The active timeline: ordered messages of the active session.
//!
//! Messages enter the timeline either optimistically (a local placeholder
//! keyed by a [`TempId`] while the send is in flight) or from the server
//! (keyed by a permanent [`MessageId`]). [`Timeline::reconcile`] promotes a
//! placeholder in place; [`Timeline::roll_back`] removes it.
//!
//! # Invariants
//!
//! - No two messages share a permanent id.
//! - At most one placeholder exists per temporary id.

use std::collections::HashSet;

use uuid::Uuid;

use tutorchat_proto::message::{MessageId, MessagePayload};
use tutorchat_proto::session::SessionId;

/// Locally generated identifier of a send that has not been confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(Uuid);

impl TempId {
    /// Creates a new time-ordered temporary identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TempId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

/// Identity of a message in the timeline: temporary until the server confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Placeholder for an unconfirmed send.
    Temp(TempId),
    /// Server-confirmed message.
    Permanent(MessageId),
}

/// One question/answer exchange displayed in the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Temporary or permanent identity.
    pub key: MessageKey,
    /// Owning session.
    pub session_id: SessionId,
    /// The user's question.
    pub question: String,
    /// The answer; empty while optimistic.
    pub answer: String,
    /// Whether the server has not confirmed this message yet.
    pub is_optimistic: bool,
    /// Temporary id of the send that created this placeholder.
    pub temp_id: Option<TempId>,
}

impl Message {
    /// Builds the placeholder inserted when a send starts.
    #[must_use]
    pub fn optimistic(temp_id: TempId, session_id: SessionId, question: impl Into<String>) -> Self {
        Self {
            key: MessageKey::Temp(temp_id),
            session_id,
            question: question.into(),
            answer: String::new(),
            is_optimistic: true,
            temp_id: Some(temp_id),
        }
    }

    /// Returns the permanent id, if the server has confirmed this message.
    #[must_use]
    pub const fn permanent_id(&self) -> Option<MessageId> {
        match self.key {
            MessageKey::Permanent(id) => Some(id),
            MessageKey::Temp(_) => None,
        }
    }
}

impl From<MessagePayload> for Message {
    fn from(payload: MessagePayload) -> Self {
        Self {
            key: MessageKey::Permanent(payload.id),
            session_id: payload.session_id,
            question: payload.question,
            answer: payload.answer,
            is_optimistic: false,
            temp_id: None,
        }
    }
}

/// What [`Timeline::reconcile`] did with a confirmed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The placeholder was replaced in place.
    Promoted,
    /// The permanent id was already present; the placeholder was removed instead.
    DuplicateDropped,
    /// No placeholder carried the temporary id; nothing changed.
    NotFound,
}

/// Ordered message list of the active session plus the ids delivered by the
/// last full history load.
#[derive(Debug, Default)]
pub struct Timeline {
    messages: Vec<Message>,
    seen_history: HashSet<MessageId>,
}

impl Timeline {
    /// Creates an empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Ids recorded by the last history load.
    #[must_use]
    pub const fn seen_history(&self) -> &HashSet<MessageId> {
        &self.seen_history
    }

    /// Number of placeholders currently in the timeline.
    #[must_use]
    pub fn optimistic_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_optimistic).count()
    }

    /// Removes every message and forgets the seen-history set.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.seen_history.clear();
    }

    /// Appends a placeholder for a send that just started.
    pub fn push_optimistic(&mut self, message: Message) {
        debug_assert!(message.is_optimistic);
        self.messages.push(message);
    }

    /// Replaces the placeholder for `temp_id` with the confirmed payload.
    ///
    /// Matching is by temporary id only. If the permanent id already appears
    /// elsewhere in the timeline, the placeholder is dropped rather than
    /// promoted so the id never appears twice. A missing placeholder is
    /// never re-created.
    pub fn reconcile(&mut self, temp_id: &TempId, payload: MessagePayload) -> Reconciled {
        let Some(index) = self.position_of_temp(temp_id) else {
            return Reconciled::NotFound;
        };

        let already_present = self
            .messages
            .iter()
            .any(|m| m.permanent_id() == Some(payload.id));
        if already_present {
            self.messages.remove(index);
            return Reconciled::DuplicateDropped;
        }

        self.messages[index] = Message::from(payload);
        Reconciled::Promoted
    }

    /// Removes the placeholder for `temp_id`. Returns whether one was found.
    pub fn roll_back(&mut self, temp_id: &TempId) -> bool {
        match self.position_of_temp(temp_id) {
            Some(index) => {
                self.messages.remove(index);
                true
            }
            None => false,
        }
    }

    /// Replaces the timeline wholesale with a fetched history.
    ///
    /// Every fetched id is recorded as seen history. Placeholders for sends
    /// still in flight are kept after the fetched messages so their
    /// reconciliation can still find them. Repeated ids in the fetched list
    /// keep their first occurrence.
    pub fn replace_with_history(&mut self, history: Vec<MessagePayload>) {
        let pending: Vec<Message> = self
            .messages
            .drain(..)
            .filter(|m| m.is_optimistic)
            .collect();

        self.seen_history.clear();
        for payload in history {
            if self.seen_history.insert(payload.id) {
                self.messages.push(Message::from(payload));
            }
        }
        self.messages.extend(pending);
    }

    fn position_of_temp(&self, temp_id: &TempId) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.temp_id.as_ref() == Some(temp_id))
    }
}
