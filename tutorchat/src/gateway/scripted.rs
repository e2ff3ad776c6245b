//! Scripted gateway for tests.
//!
//! Every call parks as a [`PendingCall`] until the test takes it with
//! [`ScriptedGateway::next_call`] and resolves it. Calls can be resolved in
//! any order, which is how the races between session switches and late
//! responses are reproduced deterministically.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Notify, oneshot};

use tutorchat_proto::codec::{ErrorPayload, GatewayResult};
use tutorchat_proto::message::MessagePayload;
use tutorchat_proto::session::{CreatedSessionPayload, SessionId, SessionPayload};

use super::Gateway;

/// A gateway operation as issued by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `list sessions`
    ListSessions,
    /// `create session`
    CreateSession,
    /// `get history`
    GetHistory(SessionId),
    /// `send message`
    SendMessage {
        /// Session the question was asked in.
        session: SessionId,
        /// The question text.
        question: String,
    },
    /// `delete session`
    DeleteSession(SessionId),
}

/// The answer a test gives to a parked call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Answer to [`Request::ListSessions`].
    Sessions(GatewayResult<Vec<SessionPayload>>),
    /// Answer to [`Request::CreateSession`].
    Created(GatewayResult<CreatedSessionPayload>),
    /// Answer to [`Request::GetHistory`].
    History(GatewayResult<Vec<MessagePayload>>),
    /// Answer to [`Request::SendMessage`].
    Message(GatewayResult<MessagePayload>),
    /// Answer to [`Request::DeleteSession`].
    Deleted(GatewayResult<()>),
}

/// A call waiting for its reply.
///
/// Dropping it without resolving fails the call with a "dropped" error.
#[derive(Debug)]
pub struct PendingCall {
    request: Request,
    reply: oneshot::Sender<Reply>,
}

impl PendingCall {
    /// The request the client issued.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Delivers the reply to the waiting call.
    pub fn resolve(self, reply: Reply) {
        if self.reply.send(reply).is_err() {
            tracing::debug!(request = ?self.request, "scripted call abandoned before reply");
        }
    }

    /// Fails the call with the given detail, whatever its kind.
    pub fn fail(self, detail: &str) {
        let error = ErrorPayload::new(detail);
        let reply = match self.request {
            Request::ListSessions => Reply::Sessions(Err(error)),
            Request::CreateSession => Reply::Created(Err(error)),
            Request::GetHistory(_) => Reply::History(Err(error)),
            Request::SendMessage { .. } => Reply::Message(Err(error)),
            Request::DeleteSession(_) => Reply::Deleted(Err(error)),
        };
        self.resolve(reply);
    }
}

#[derive(Debug, Default)]
struct Shared {
    calls: Mutex<VecDeque<PendingCall>>,
    arrived: Notify,
}

/// Gateway whose calls are resolved by hand.
///
/// Clones share the same call queue: keep one clone in the test and hand
/// the other to the client.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGateway {
    shared: Arc<Shared>,
}

impl ScriptedGateway {
    /// Creates a gateway with no parked calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the oldest parked call and takes it.
    pub async fn next_call(&self) -> PendingCall {
        loop {
            if let Some(call) = self.shared.calls.lock().pop_front() {
                return call;
            }
            self.shared.arrived.notified().await;
        }
    }

    /// Takes the oldest parked call without waiting.
    #[must_use]
    pub fn try_next_call(&self) -> Option<PendingCall> {
        self.shared.calls.lock().pop_front()
    }

    /// Requests of all parked calls, oldest first.
    #[must_use]
    pub fn pending_requests(&self) -> Vec<Request> {
        self.shared
            .calls
            .lock()
            .iter()
            .map(|call| call.request.clone())
            .collect()
    }

    async fn call(&self, request: Request) -> Reply {
        let (tx, rx) = oneshot::channel();
        self.shared.calls.lock().push_back(PendingCall {
            request: request.clone(),
            reply: tx,
        });
        self.shared.arrived.notify_one();

        rx.await.unwrap_or_else(|_| {
            let error = ErrorPayload::new("scripted call dropped");
            match request {
                Request::ListSessions => Reply::Sessions(Err(error)),
                Request::CreateSession => Reply::Created(Err(error)),
                Request::GetHistory(_) => Reply::History(Err(error)),
                Request::SendMessage { .. } => Reply::Message(Err(error)),
                Request::DeleteSession(_) => Reply::Deleted(Err(error)),
            }
        })
    }
}

fn mismatch(reply: &Reply) -> ErrorPayload {
    ErrorPayload::new(format!("scripted reply does not match request: {reply:?}"))
}

impl Gateway for ScriptedGateway {
    async fn list_sessions(&self) -> GatewayResult<Vec<SessionPayload>> {
        match self.call(Request::ListSessions).await {
            Reply::Sessions(result) => result,
            other => Err(mismatch(&other)),
        }
    }

    async fn create_session(&self) -> GatewayResult<CreatedSessionPayload> {
        match self.call(Request::CreateSession).await {
            Reply::Created(result) => result,
            other => Err(mismatch(&other)),
        }
    }

    async fn get_history(&self, session: SessionId) -> GatewayResult<Vec<MessagePayload>> {
        match self.call(Request::GetHistory(session)).await {
            Reply::History(result) => result,
            other => Err(mismatch(&other)),
        }
    }

    async fn send_message(
        &self,
        session: SessionId,
        question: String,
    ) -> GatewayResult<MessagePayload> {
        match self.call(Request::SendMessage { session, question }).await {
            Reply::Message(result) => result,
            other => Err(mismatch(&other)),
        }
    }

    async fn delete_session(&self, session: SessionId) -> GatewayResult<()> {
        match self.call(Request::DeleteSession(session)).await {
            Reply::Deleted(result) => result,
            other => Err(mismatch(&other)),
        }
    }
}
