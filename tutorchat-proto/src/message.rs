//! Message payloads exchanged with the request gateway.
//!
//! A message is one question/answer exchange inside a session. The server
//! assigns the permanent [`MessageId`]; the client never invents one.

use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// Maximum allowed question size in bytes (16 KB).
pub const MAX_QUESTION_SIZE: usize = 16 * 1024;

/// Server-assigned permanent identifier of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(u64);

impl MessageId {
    /// Creates a `MessageId` from the server's raw integer id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer id.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Millisecond-precision UTC timestamp.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp for the current instant.
    #[must_use]
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Creates a timestamp from milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as milliseconds since the UNIX epoch.
    #[must_use]
    pub const fn as_millis(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A confirmed question/answer pair, as returned by both the send and the
/// history operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Permanent message id.
    pub id: MessageId,
    /// Session the message belongs to.
    pub session_id: SessionId,
    /// The question as stored by the server.
    pub question: String,
    /// The generated answer.
    pub answer: String,
    /// When the server stored the exchange.
    pub timestamp: Timestamp,
}

/// Error returned when a question fails validation before sending.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Question is empty or whitespace only.
    #[error("question is empty")]
    Empty,
    /// Question exceeds the maximum allowed size.
    #[error("question too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the question in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Validates a question for sending and returns it trimmed.
///
/// # Errors
///
/// Returns [`ValidationError::Empty`] if nothing but whitespace remains, or
/// [`ValidationError::TooLarge`] if the trimmed text exceeds
/// [`MAX_QUESTION_SIZE`].
pub fn validate_question(question: &str) -> Result<&str, ValidationError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let size = trimmed.len();
    if size > MAX_QUESTION_SIZE {
        return Err(ValidationError::TooLarge {
            size,
            max: MAX_QUESTION_SIZE,
        });
    }
    Ok(trimmed)
}
