//! Request gateway abstraction for `TutorChat`.
//!
//! Defines the [`Gateway`] trait the chat core depends on. Concrete
//! implementations include:
//! - [`scripted::ScriptedGateway`]: parks every call until the caller resolves it, for tests
//! - [`demo::DemoGateway`]: in-process stand-in server for offline demos

pub mod demo;
pub mod scripted;

use std::future::Future;

use tutorchat_proto::codec::GatewayResult;
use tutorchat_proto::message::MessagePayload;
use tutorchat_proto::session::{CreatedSessionPayload, SessionId, SessionPayload};

/// Async request gateway: the five server operations the client relies on.
///
/// Every call resolves either to its success payload or to an
/// [`ErrorPayload`](tutorchat_proto::codec::ErrorPayload). Calls never
/// touch client state; the client reconciles their results itself.
///
/// # Invariant
///
/// Implementations must not assume calls resolve in the order they were
/// issued. The client fences every result by the session it was issued for.
pub trait Gateway: Send + Sync + 'static {
    /// Fetch the ordered session list.
    fn list_sessions(&self) -> impl Future<Output = GatewayResult<Vec<SessionPayload>>> + Send;

    /// Create a new, empty session.
    fn create_session(&self) -> impl Future<Output = GatewayResult<CreatedSessionPayload>> + Send;

    /// Fetch the ordered message history of a session, oldest first.
    fn get_history(
        &self,
        session: SessionId,
    ) -> impl Future<Output = GatewayResult<Vec<MessagePayload>>> + Send;

    /// Ask a question in a session and wait for the stored answer.
    fn send_message(
        &self,
        session: SessionId,
        question: String,
    ) -> impl Future<Output = GatewayResult<MessagePayload>> + Send;

    /// Delete a session.
    fn delete_session(&self, session: SessionId) -> impl Future<Output = GatewayResult<()>> + Send;
}
