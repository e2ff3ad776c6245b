//! Session registry: the ordered session list and the active session id.
//!
//! The registry only changes after the gateway confirms a list, create or
//! delete; selection is local. It never holds an active id that is absent
//! from its list.

use tutorchat_proto::message::Timestamp;
use tutorchat_proto::session::{SessionId, SessionPayload};

/// Errors for session operations that name an id the registry does not hold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No session with this id is listed.
    #[error("session not found: {0}")]
    UnknownSession(SessionId),
}

/// A listed chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Permanent session id.
    pub id: SessionId,
    /// Display title.
    pub title: String,
    /// When the session was created.
    pub created_at: Timestamp,
}

impl From<SessionPayload> for Session {
    fn from(payload: SessionPayload) -> Self {
        Self {
            id: payload.id,
            title: payload.title,
            created_at: payload.created_at,
        }
    }
}

/// Outcome of [`SessionRegistry::activate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The requested session was already active.
    Unchanged,
    /// The active session changed.
    Changed,
}

/// Outcome of [`SessionRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    /// Whether a session with the id was listed.
    pub found: bool,
    /// Whether the removed session was the active one.
    pub was_active: bool,
}

/// Ordered session list plus the active session id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
    active: Option<SessionId>,
}

impl SessionRegistry {
    /// Creates an empty registry with no active session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sessions in display order.
    #[must_use]
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Returns the active session id.
    #[must_use]
    pub const fn active(&self) -> Option<SessionId> {
        self.active
    }

    /// Whether `id` is the active session.
    #[must_use]
    pub fn is_active(&self, id: SessionId) -> bool {
        self.active == Some(id)
    }

    /// Whether a session with `id` is listed.
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.iter().any(|s| s.id == id)
    }

    /// Replaces the list with a fetched one, keeping the fetched order.
    ///
    /// If the active session is missing from the new list it is cleared.
    /// Returns `true` when that happened.
    pub fn replace_all(&mut self, fetched: Vec<SessionPayload>) -> bool {
        self.sessions = fetched.into_iter().map(Session::from).collect();
        match self.active {
            Some(id) if !self.contains(id) => {
                self.active = None;
                true
            }
            _ => false,
        }
    }

    /// Puts a newly created session at the front and makes it active.
    pub fn prepend_and_activate(&mut self, session: Session) {
        let id = session.id;
        self.sessions.retain(|s| s.id != id);
        self.sessions.insert(0, session);
        self.active = Some(id);
    }

    /// Sets the active session. `None` clears it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] if `id` is not listed; the
    /// active session is left unchanged.
    pub fn activate(&mut self, id: Option<SessionId>) -> Result<Activation, SessionError> {
        if self.active == id {
            return Ok(Activation::Unchanged);
        }
        if let Some(id) = id
            && !self.contains(id)
        {
            return Err(SessionError::UnknownSession(id));
        }
        self.active = id;
        Ok(Activation::Changed)
    }

    /// Removes a session. Clears the active id if it was the removed one.
    pub fn remove(&mut self, id: SessionId) -> Removal {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        let found = self.sessions.len() != before;
        let was_active = self.active == Some(id);
        if was_active {
            self.active = None;
        }
        Removal { found, was_active }
    }
}
