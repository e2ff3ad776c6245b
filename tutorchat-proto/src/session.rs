//! Session payloads exchanged with the request gateway.

use serde::{Deserialize, Serialize};

use crate::message::Timestamp;

/// Server-assigned permanent identifier of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a `SessionId` from the server's raw integer id.
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

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the account owning a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Creates an `OwnerId` from the server's raw integer id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// One entry of the session list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload {
    /// Permanent session id.
    pub id: SessionId,
    /// Display title.
    pub title: String,
    /// When the session was created.
    pub created_at: Timestamp,
}

/// Response to a create-session call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSessionPayload {
    /// Permanent session id.
    pub id: SessionId,
    /// Display title chosen by the server.
    pub title: String,
    /// When the session was created.
    pub created_at: Timestamp,
    /// Account that owns the new session.
    pub owner_id: OwnerId,
}

impl From<CreatedSessionPayload> for SessionPayload {
    fn from(created: CreatedSessionPayload) -> Self {
        Self {
            id: created.id,
            title: created.title,
            created_at: created.created_at,
        }
    }
}
