//! In-process demo gateway.
//!
//! Behaves like a small tutor server: sessions and messages live in memory,
//! answers come from a tiny arithmetic solver, and every call waits a
//! jittered latency. A configurable failure rate makes calls fail at random
//! so the error paths can be exercised by hand.
//!
//! Every response crosses a JSON encode/decode boundary, so the client sees
//! exactly what it would decode from a real server body.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;

use tutorchat_proto::codec::{self, ErrorPayload, GatewayResult};
use tutorchat_proto::message::{MessageId, MessagePayload, Timestamp};
use tutorchat_proto::session::{CreatedSessionPayload, OwnerId, SessionId, SessionPayload};

use super::Gateway;

/// Number of messages returned by a history fetch, newest kept.
pub const HISTORY_LIMIT: usize = 20;

/// Owner reported for every session the demo server creates.
const DEMO_OWNER: OwnerId = OwnerId::new(1);

/// Latency and failure injection for [`DemoGateway`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemoConfig {
    /// Base latency of every call; actual latency is jittered up to twice this.
    pub latency: Duration,
    /// Probability in `[0, 1]` that a call fails.
    pub failure_rate: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(400),
            failure_rate: 0.0,
        }
    }
}

#[derive(Debug, Default)]
struct ServerState {
    next_session: u64,
    next_message: u64,
    /// Newest first, as the list endpoint returns them.
    sessions: Vec<SessionPayload>,
    messages: HashMap<SessionId, Vec<MessagePayload>>,
}

/// In-memory stand-in for the tutor server.
#[derive(Debug, Default)]
pub struct DemoGateway {
    config: DemoConfig,
    state: Mutex<ServerState>,
}

impl DemoGateway {
    /// Creates an empty demo server.
    #[must_use]
    pub fn new(config: DemoConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ServerState::default()),
        }
    }

    /// Creates a demo server with one session holding a short conversation.
    #[must_use]
    pub fn with_sample_session(config: DemoConfig) -> Self {
        let gateway = Self::new(config);
        {
            let mut state = gateway.state.lock();
            let session = state.insert_session();
            for question in ["2+2?", "12 * 3"] {
                state.insert_message(session.id, question);
            }
        }
        gateway
    }

    /// Waits the simulated latency, then decides whether the call fails.
    async fn network(&self) -> GatewayResult<()> {
        let (delay, fail) = {
            let mut rng = rand::rng();
            let base = u64::try_from(self.config.latency.as_millis()).unwrap_or(u64::MAX);
            let jitter = if base == 0 {
                0
            } else {
                rng.random_range(0..=base)
            };
            let fail = self.config.failure_rate > 0.0
                && rng.random_bool(self.config.failure_rate.clamp(0.0, 1.0));
            (Duration::from_millis(base.saturating_add(jitter)), fail)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            tracing::debug!("demo gateway injecting failure");
            return Err(ErrorPayload::new("Simulated network failure"));
        }
        Ok(())
    }
}

impl ServerState {
    fn insert_session(&mut self) -> SessionPayload {
        self.next_session += 1;
        let session = SessionPayload {
            id: SessionId::new(self.next_session),
            title: format!("Chat {}", self.next_session),
            created_at: Timestamp::now(),
        };
        self.sessions.insert(0, session.clone());
        self.messages.insert(session.id, Vec::new());
        session
    }

    fn insert_message(&mut self, session: SessionId, question: &str) -> Option<MessagePayload> {
        let messages = self.messages.get_mut(&session)?;
        self.next_message += 1;
        let payload = MessagePayload {
            id: MessageId::new(self.next_message),
            session_id: session,
            question: question.to_string(),
            answer: answer(question),
            timestamp: Timestamp::now(),
        };
        messages.push(payload.clone());
        Some(payload)
    }
}

fn not_found() -> ErrorPayload {
    ErrorPayload::new("Session not found")
}

/// Encodes a server-side result as a response body and decodes it back.
fn respond<T: Serialize + DeserializeOwned>(result: GatewayResult<T>) -> GatewayResult<T> {
    let encoded = match &result {
        Ok(value) => codec::encode(value).map(|body| (true, body)),
        Err(error) => codec::encode(error).map(|body| (false, body)),
    };
    encoded
        .and_then(|(success, body)| codec::decode_response(success, &body))
        .unwrap_or_else(|e| Err(ErrorPayload::new(format!("malformed response: {e}"))))
}

impl Gateway for DemoGateway {
    async fn list_sessions(&self) -> GatewayResult<Vec<SessionPayload>> {
        self.network().await?;
        let sessions = self.state.lock().sessions.clone();
        respond(Ok(sessions))
    }

    async fn create_session(&self) -> GatewayResult<CreatedSessionPayload> {
        self.network().await?;
        let session = self.state.lock().insert_session();
        respond(Ok(CreatedSessionPayload {
            id: session.id,
            title: session.title,
            created_at: session.created_at,
            owner_id: DEMO_OWNER,
        }))
    }

    async fn get_history(&self, session: SessionId) -> GatewayResult<Vec<MessagePayload>> {
        self.network().await?;
        let history = {
            let state = self.state.lock();
            state.messages.get(&session).map(|messages| {
                let skip = messages.len().saturating_sub(HISTORY_LIMIT);
                messages[skip..].to_vec()
            })
        };
        respond(history.ok_or_else(not_found))
    }

    async fn send_message(
        &self,
        session: SessionId,
        question: String,
    ) -> GatewayResult<MessagePayload> {
        self.network().await?;
        let stored = self.state.lock().insert_message(session, &question);
        respond(stored.ok_or_else(not_found))
    }

    async fn delete_session(&self, session: SessionId) -> GatewayResult<()> {
        self.network().await?;
        let removed = {
            let mut state = self.state.lock();
            let removed = state.messages.remove(&session).is_some();
            state.sessions.retain(|s| s.id != session);
            removed
        };
        respond(if removed { Ok(()) } else { Err(not_found()) })
    }
}

/// Produces the demo tutor's answer to a question.
///
/// Simple binary arithmetic (`12 * 3`, `2+2?`) is solved; anything else gets
/// a canned explanation that exercises inline math and a code block.
#[must_use]
pub fn answer(question: &str) -> String {
    match solve(question) {
        Some(result) => format!(
            "We evaluate the expression step by step: ${}$.\n\nFinal Answer: {result}",
            normalise(question)
        ),
        None => format!(
            "Let's break the problem down.\n\n1. Restate it: \"{}\".\n2. Identify the unknown, \
             for example $x$.\n3. Check the result numerically:\n\n```\nlet x = 2.0;\nassert!(x * x == 4.0);\n```\n\n\
             Final Answer: ask me a concrete expression such as `3 * 7`.",
            question.trim()
        ),
    }
}

fn normalise(question: &str) -> String {
    question
        .trim()
        .trim_end_matches(['?', '='])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn solve(question: &str) -> Option<String> {
    let expr: String = normalise(question)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let op_index = expr
        .char_indices()
        .skip(1)
        .find(|(_, c)| matches!(c, '+' | '-' | '*' | 'x' | '/'))
        .map(|(i, _)| i)?;
    let (lhs, rest) = expr.split_at(op_index);
    let mut rest_chars = rest.chars();
    let op = rest_chars.next()?;
    let lhs: f64 = lhs.parse().ok()?;
    let rhs: f64 = rest_chars.as_str().parse().ok()?;

    let value = match op {
        '+' => lhs + rhs,
        '-' => lhs - rhs,
        '*' | 'x' => lhs * rhs,
        '/' if rhs != 0.0 => lhs / rhs,
        _ => return None,
    };
    Some(format_number(value))
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        let text = format!("{value:.6}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
