//! Chat core for `TutorChat`.
//!
//! Contains the [`ChatClient`], which owns the session registry, the active
//! timeline, the animation scheduler and the error channel, and is the only
//! place any of them is mutated.
//!
//! # Execution model
//!
//! Intents (`select_session`, `send_message`, ...) mutate state synchronously
//! and spawn the matching gateway call. Spawned calls and reveal timers never
//! touch state: they post a [`Completion`] into one channel, and the client
//! applies completions one at a time ([`ChatClient::process_next`] /
//! [`ChatClient::drain_completions`]). Every completion re-checks the session
//! it was issued for before mutating anything, so responses for a session the
//! user has left are inert.
//!
//! Every state change publishes a fresh [`Snapshot`] on a `watch` channel.

pub mod animation;
pub mod registry;
pub mod reveal;
pub mod timeline;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use tutorchat_proto::codec::GatewayResult;
use tutorchat_proto::message::{self, MessageId, MessagePayload, ValidationError};
use tutorchat_proto::session::{CreatedSessionPayload, SessionId, SessionPayload};

use crate::config::ChatConfig;
use crate::gateway::Gateway;

use animation::{AnimationScheduler, AnimationStart};
use registry::{Activation, Session, SessionError, SessionRegistry};
use reveal::Reveal;
use timeline::{Message, Reconciled, TempId, Timeline};

/// Reasons a send is refused before anything is inserted or sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendRejected {
    /// There is no active session to send into.
    #[error("no active session")]
    NoActiveSession,

    /// The question failed validation.
    #[error("invalid question: {0}")]
    Invalid(#[from] ValidationError),

    /// The active session already has a send in flight.
    #[error("a message is already being sent in session {0}")]
    AlreadyPending(SessionId),
}

/// Notifications for the render layer besides snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// One more unit of the animating message became visible.
    RevealUpdated {
        /// The animating message.
        message_id: MessageId,
        /// Units visible so far.
        revealed: usize,
        /// Total units.
        total: usize,
    },
    /// The animating message is fully visible.
    RevealCompleted {
        /// The message that finished.
        message_id: MessageId,
    },
    /// The reveal was abandoned because the active session changed.
    RevealCancelled {
        /// The message that was being revealed.
        message_id: MessageId,
    },
    /// The session-scoped error was set.
    ErrorRaised(String),
}

/// Partially revealed content of the animating message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealView {
    /// The animating message.
    pub message_id: MessageId,
    /// Content visible so far.
    pub visible: String,
    /// Units visible so far.
    pub revealed: usize,
    /// Total units.
    pub total: usize,
}

/// Read-only view of the client state handed to the render layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Sessions in display order.
    pub sessions: Vec<Session>,
    /// The active session, if any.
    pub active_session_id: Option<SessionId>,
    /// The active timeline, oldest first.
    pub messages: Vec<Message>,
    /// A list, create or delete call is in flight.
    pub session_loading: bool,
    /// The active session's history is being fetched.
    pub message_loading: bool,
    /// The active session has a send in flight.
    pub send_loading: bool,
    /// Session-scoped error message.
    pub error: Option<String>,
    /// Message holding the animation token.
    pub animating_message_id: Option<MessageId>,
    /// Reveal progress of the animating message.
    pub reveal: Option<RevealView>,
}

impl Snapshot {
    /// The active session's entry in the list.
    #[must_use]
    pub fn active_session(&self) -> Option<&Session> {
        let id = self.active_session_id?;
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Number of optimistic messages in the timeline.
    #[must_use]
    pub fn optimistic_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_optimistic).count()
    }
}

/// Which kind of completion [`ChatClient::process_next`] applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// A session list fetch finished.
    SessionsListed,
    /// A create call finished.
    SessionCreated,
    /// A delete call finished.
    SessionDeleted,
    /// A history fetch finished.
    HistoryLoaded,
    /// A send finished.
    MessageSent,
    /// A reveal timer fired.
    RevealTick,
}

/// Result of an asynchronous operation, posted back to the client.
#[derive(Debug)]
enum Completion {
    SessionsListed {
        revision: u64,
        result: GatewayResult<Vec<SessionPayload>>,
    },
    SessionCreated(GatewayResult<CreatedSessionPayload>),
    SessionDeleted {
        session_id: SessionId,
        result: GatewayResult<()>,
    },
    HistoryLoaded {
        session_id: SessionId,
        generation: u64,
        result: GatewayResult<Vec<MessagePayload>>,
    },
    MessageSent {
        fenced_session_id: SessionId,
        temp_id: TempId,
        result: GatewayResult<MessagePayload>,
    },
    RevealTick {
        generation: u64,
    },
}

impl Completion {
    const fn kind(&self) -> CompletionKind {
        match self {
            Self::SessionsListed { .. } => CompletionKind::SessionsListed,
            Self::SessionCreated(_) => CompletionKind::SessionCreated,
            Self::SessionDeleted { .. } => CompletionKind::SessionDeleted,
            Self::HistoryLoaded { .. } => CompletionKind::HistoryLoaded,
            Self::MessageSent { .. } => CompletionKind::MessageSent,
            Self::RevealTick { .. } => CompletionKind::RevealTick,
        }
    }
}

/// A registry change the server confirmed while a list fetch was in flight.
#[derive(Debug, Clone)]
enum RegistryChange {
    Created(SessionPayload),
    Deleted(SessionId),
}

/// A reveal in progress and the timer task driving it.
struct ActiveReveal {
    reveal: Reveal,
    generation: u64,
    ticker: JoinHandle<()>,
}

/// Owner of all conversation state.
///
/// Must be used from within a tokio runtime: intents spawn tasks.
pub struct ChatClient<G: Gateway> {
    gateway: Arc<G>,
    config: ChatConfig,
    registry: SessionRegistry,
    timeline: Timeline,
    scheduler: AnimationScheduler,
    reveal: Option<ActiveReveal>,
    error: Option<String>,
    /// One in-flight send per session, keyed by the session it was fenced to.
    pending_sends: HashMap<SessionId, TempId>,
    /// Latest history fetch for the active session: `(session, generation)`.
    pending_history: Option<(SessionId, u64)>,
    history_generation: u64,
    /// Bumped by every confirmed create or delete.
    registry_revision: u64,
    /// Creates and deletes confirmed while a list was in flight, by revision.
    /// Replayed onto lists that were issued before them.
    confirmed_changes: Vec<(u64, RegistryChange)>,
    lists_in_flight: usize,
    session_ops: usize,
    completion_tx: mpsc::Sender<Completion>,
    completion_rx: mpsc::Receiver<Completion>,
    snapshot_tx: watch::Sender<Snapshot>,
    event_tx: mpsc::Sender<ClientEvent>,
}

impl<G: Gateway> ChatClient<G> {
    /// Create a client over the given gateway.
    ///
    /// Returns the client, a receiver of [`Snapshot`]s published on every
    /// state change, and a receiver of [`ClientEvent`]s.
    #[must_use]
    pub fn new(
        gateway: G,
        config: ChatConfig,
    ) -> (Self, watch::Receiver<Snapshot>, mpsc::Receiver<ClientEvent>) {
        let (completion_tx, completion_rx) = mpsc::channel(config.completion_buffer.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());

        let client = Self {
            gateway: Arc::new(gateway),
            config,
            registry: SessionRegistry::new(),
            timeline: Timeline::new(),
            scheduler: AnimationScheduler::new(),
            reveal: None,
            error: None,
            pending_sends: HashMap::new(),
            pending_history: None,
            history_generation: 0,
            registry_revision: 0,
            confirmed_changes: Vec::new(),
            lists_in_flight: 0,
            session_ops: 0,
            completion_tx,
            completion_rx,
            snapshot_tx,
            event_tx,
        };
        (client, snapshot_rx, event_rx)
    }

    /// Build a snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let active = self.registry.active();
        Snapshot {
            sessions: self.registry.sessions().to_vec(),
            active_session_id: active,
            messages: self.timeline.messages().to_vec(),
            session_loading: self.session_ops > 0,
            message_loading: self.pending_history.is_some(),
            send_loading: active.is_some_and(|id| self.pending_sends.contains_key(&id)),
            error: self.error.clone(),
            animating_message_id: self.scheduler.animating(),
            reveal: self.reveal.as_ref().map(|active| {
                let (revealed, total) = active.reveal.progress();
                RevealView {
                    message_id: active.reveal.message_id(),
                    visible: active.reveal.visible().to_string(),
                    revealed,
                    total,
                }
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Intents
    // -----------------------------------------------------------------------

    /// Fetch the session list.
    pub fn refresh_sessions(&mut self) {
        self.session_ops += 1;
        self.lists_in_flight += 1;
        let revision = self.registry_revision;
        let gateway = Arc::clone(&self.gateway);
        self.spawn_call(async move {
            let result = gateway.list_sessions().await;
            Completion::SessionsListed { revision, result }
        });
        self.publish();
    }

    /// Create a session. On success it becomes the active session.
    pub fn create_session(&mut self) {
        self.session_ops += 1;
        let gateway = Arc::clone(&self.gateway);
        self.spawn_call(async move { Completion::SessionCreated(gateway.create_session().await) });
        self.publish();
    }

    /// Make `id` the active session, or clear the active session with `None`.
    ///
    /// Selecting the already active session does nothing. Otherwise the
    /// timeline and any animation are cleared and the history is fetched.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] if `id` is not listed.
    pub fn select_session(&mut self, id: Option<SessionId>) -> Result<(), SessionError> {
        if self.registry.activate(id)? == Activation::Unchanged {
            return Ok(());
        }
        tracing::info!(session_id = ?id, "session selected");
        self.enter_session();
        match id {
            Some(id) => self.load_history(id),
            None => self.publish(),
        }
        Ok(())
    }

    /// Delete a session. Nothing changes locally until the server confirms.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownSession`] if `id` is not listed.
    pub fn delete_session(&mut self, id: SessionId) -> Result<(), SessionError> {
        if !self.registry.contains(id) {
            return Err(SessionError::UnknownSession(id));
        }
        self.session_ops += 1;
        let gateway = Arc::clone(&self.gateway);
        self.spawn_call(async move {
            let result = gateway.delete_session(id).await;
            Completion::SessionDeleted {
                session_id: id,
                result,
            }
        });
        self.publish();
        Ok(())
    }

    /// Ask a question in the active session.
    ///
    /// Appends an optimistic message immediately and sends in the background.
    /// Returns the temporary id of the placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`SendRejected`] if there is no active session, the question
    /// is empty or too large, or a send is already in flight for the active
    /// session. The timeline is untouched in that case.
    pub fn send_message(&mut self, question: &str) -> Result<TempId, SendRejected> {
        let session_id = self.registry.active().ok_or(SendRejected::NoActiveSession)?;
        let question = message::validate_question(question)?.to_string();
        if self.pending_sends.contains_key(&session_id) {
            tracing::debug!(session_id = %session_id, "send rejected, one already pending");
            return Err(SendRejected::AlreadyPending(session_id));
        }

        let temp_id = TempId::new();
        self.timeline
            .push_optimistic(Message::optimistic(temp_id, session_id, question.clone()));
        self.pending_sends.insert(session_id, temp_id);
        tracing::debug!(session_id = %session_id, temp_id = %temp_id, "optimistic message inserted");

        let gateway = Arc::clone(&self.gateway);
        self.spawn_call(async move {
            let result = gateway.send_message(session_id, question).await;
            Completion::MessageSent {
                fenced_session_id: session_id,
                temp_id,
                result,
            }
        });
        self.publish();
        Ok(temp_id)
    }

    /// Fetch the history of `session_id` and replace the timeline with it.
    ///
    /// Ignored unless `session_id` is the active session. Clears the error.
    pub fn load_history(&mut self, session_id: SessionId) {
        if !self.registry.is_active(session_id) {
            tracing::debug!(session_id = %session_id, "history load ignored for inactive session");
            return;
        }
        self.error = None;
        self.history_generation += 1;
        let generation = self.history_generation;
        self.pending_history = Some((session_id, generation));

        let gateway = Arc::clone(&self.gateway);
        self.spawn_call(async move {
            let result = gateway.get_history(session_id).await;
            Completion::HistoryLoaded {
                session_id,
                generation,
                result,
            }
        });
        self.publish();
    }

    /// Clear the session-scoped error.
    pub fn dismiss_error(&mut self) {
        if self.error.take().is_some() {
            self.publish();
        }
    }

    // -----------------------------------------------------------------------
    // Completions
    // -----------------------------------------------------------------------

    /// Wait for the next completion and apply it.
    pub async fn process_next(&mut self) -> Option<CompletionKind> {
        let completion = self.completion_rx.recv().await?;
        Some(self.apply(completion))
    }

    /// Apply every completion that has already arrived, without waiting.
    ///
    /// Returns how many were applied.
    pub fn drain_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.apply(completion);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, completion: Completion) -> CompletionKind {
        let kind = completion.kind();
        match completion {
            Completion::SessionsListed { revision, result } => {
                self.on_sessions_listed(revision, result);
            }
            Completion::SessionCreated(result) => self.on_session_created(result),
            Completion::SessionDeleted { session_id, result } => {
                self.on_session_deleted(session_id, result);
            }
            Completion::HistoryLoaded {
                session_id,
                generation,
                result,
            } => self.on_history_loaded(session_id, generation, result),
            Completion::MessageSent {
                fenced_session_id,
                temp_id,
                result,
            } => self.on_message_sent(fenced_session_id, temp_id, result),
            Completion::RevealTick { generation } => self.on_reveal_tick(generation),
        }
        self.schedule_animation();
        self.publish();
        kind
    }

    fn on_sessions_listed(&mut self, revision: u64, result: GatewayResult<Vec<SessionPayload>>) {
        self.session_ops = self.session_ops.saturating_sub(1);
        self.lists_in_flight = self.lists_in_flight.saturating_sub(1);
        let result = result.map(|sessions| self.rebase_list(revision, sessions));
        if self.lists_in_flight == 0 {
            self.confirmed_changes.clear();
        }
        match result {
            Ok(sessions) => {
                let count = sessions.len();
                if self.registry.replace_all(sessions) {
                    tracing::info!("active session no longer listed, clearing it");
                    self.enter_session();
                }
                tracing::debug!(count, "session list refreshed");
            }
            Err(e) => self.raise(format!("Failed to load sessions: {e}")),
        }
    }

    fn on_session_created(&mut self, result: GatewayResult<CreatedSessionPayload>) {
        self.session_ops = self.session_ops.saturating_sub(1);
        match result {
            Ok(created) => {
                let payload = SessionPayload::from(created);
                self.record_change(RegistryChange::Created(payload.clone()));
                let session = Session::from(payload);
                tracing::info!(session_id = %session.id, "session created");
                self.registry.prepend_and_activate(session);
                self.enter_session();
            }
            Err(e) => self.raise(format!("Failed to create session: {e}")),
        }
    }

    fn on_session_deleted(&mut self, session_id: SessionId, result: GatewayResult<()>) {
        self.session_ops = self.session_ops.saturating_sub(1);
        match result {
            Ok(()) => {
                let removal = self.registry.remove(session_id);
                self.record_change(RegistryChange::Deleted(session_id));
                tracing::info!(session_id = %session_id, found = removal.found, "session deleted");
                if removal.was_active {
                    self.enter_session();
                }
            }
            Err(e) => self.raise(format!("Failed to delete session: {e}")),
        }
    }

    fn on_history_loaded(
        &mut self,
        session_id: SessionId,
        generation: u64,
        result: GatewayResult<Vec<MessagePayload>>,
    ) {
        if self.pending_history != Some((session_id, generation))
            || !self.registry.is_active(session_id)
        {
            tracing::debug!(session_id = %session_id, generation, "discarding stale history");
            return;
        }
        self.pending_history = None;

        match result {
            Ok(history) => {
                let (own, foreign): (Vec<_>, Vec<_>) = history
                    .into_iter()
                    .partition(|m| m.session_id == session_id);
                if !foreign.is_empty() {
                    tracing::warn!(
                        session_id = %session_id,
                        dropped = foreign.len(),
                        "history contained messages of other sessions"
                    );
                }
                tracing::debug!(session_id = %session_id, count = own.len(), "history loaded");
                self.timeline.replace_with_history(own);
            }
            Err(e) => {
                self.timeline.replace_with_history(Vec::new());
                self.raise(format!("Failed to load history: {e}"));
            }
        }
    }

    fn on_message_sent(
        &mut self,
        fenced_session_id: SessionId,
        temp_id: TempId,
        result: GatewayResult<MessagePayload>,
    ) {
        if self.pending_sends.get(&fenced_session_id) == Some(&temp_id) {
            self.pending_sends.remove(&fenced_session_id);
        }

        if !self.registry.is_active(fenced_session_id) {
            tracing::debug!(
                session_id = %fenced_session_id,
                temp_id = %temp_id,
                ok = result.is_ok(),
                "discarding send result for inactive session"
            );
            return;
        }

        match result {
            Ok(payload) if payload.session_id != fenced_session_id => {
                tracing::warn!(
                    session_id = %fenced_session_id,
                    answered_for = %payload.session_id,
                    "send answered for a different session"
                );
                self.timeline.roll_back(&temp_id);
                self.raise("Failed to send message: answer belongs to another session".to_string());
            }
            Ok(payload) => {
                let message_id = payload.id;
                match self.timeline.reconcile(&temp_id, payload) {
                    Reconciled::Promoted => {
                        tracing::debug!(temp_id = %temp_id, message_id = %message_id, "send reconciled");
                    }
                    Reconciled::DuplicateDropped => {
                        tracing::debug!(message_id = %message_id, "send already in timeline, placeholder dropped");
                    }
                    Reconciled::NotFound => {
                        tracing::debug!(temp_id = %temp_id, "placeholder gone, reconciliation dropped");
                    }
                }
            }
            Err(e) => {
                self.timeline.roll_back(&temp_id);
                self.raise(format!("Failed to send message: {e}"));
            }
        }
    }

    fn on_reveal_tick(&mut self, generation: u64) {
        let Some(active) = self.reveal.as_mut() else {
            return;
        };
        if active.generation != generation || !active.reveal.advance() {
            return;
        }
        let message_id = active.reveal.message_id();
        let (revealed, total) = active.reveal.progress();
        let complete = active.reveal.is_complete();

        self.emit(ClientEvent::RevealUpdated {
            message_id,
            revealed,
            total,
        });
        if complete {
            self.scheduler.complete(message_id, generation);
            self.reveal = None;
            self.emit(ClientEvent::RevealCompleted { message_id });
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn record_change(&mut self, change: RegistryChange) {
        self.registry_revision += 1;
        if self.lists_in_flight > 0 {
            self.confirmed_changes.push((self.registry_revision, change));
        }
    }

    /// Replays creates and deletes confirmed after `revision` onto a list
    /// fetched at that revision.
    fn rebase_list(&self, revision: u64, mut sessions: Vec<SessionPayload>) -> Vec<SessionPayload> {
        let newer = self
            .confirmed_changes
            .iter()
            .filter(|(confirmed_at, _)| *confirmed_at > revision);
        for (_, change) in newer {
            match change {
                RegistryChange::Created(created) => {
                    if !sessions.iter().any(|s| s.id == created.id) {
                        sessions.insert(0, created.clone());
                    }
                }
                RegistryChange::Deleted(id) => sessions.retain(|s| s.id != *id),
            }
        }
        sessions
    }

    /// Resets per-session state after the active session changed.
    fn enter_session(&mut self) {
        self.cancel_animation();
        self.timeline.clear();
        self.error = None;
        self.pending_history = None;
    }

    fn schedule_animation(&mut self) {
        if let Some(start) = self.scheduler.observe(&self.timeline) {
            self.start_reveal(start);
        }
    }

    fn start_reveal(&mut self, start: AnimationStart) {
        let Some(message) = self
            .timeline
            .messages()
            .iter()
            .find(|m| m.permanent_id() == Some(start.message_id))
        else {
            self.scheduler.cancel();
            return;
        };

        let reveal = Reveal::new(start.message_id, &message.answer);
        let schedule = reveal.schedule(&self.config.reveal);
        let tx = self.completion_tx.clone();
        let generation = start.generation;
        let ticker = tokio::spawn(async move {
            for delay in schedule {
                tokio::time::sleep(delay).await;
                if tx.send(Completion::RevealTick { generation }).await.is_err() {
                    return;
                }
            }
        });

        self.reveal = Some(ActiveReveal {
            reveal,
            generation,
            ticker,
        });
    }

    fn cancel_animation(&mut self) {
        if let Some(active) = self.reveal.take() {
            active.ticker.abort();
        }
        if let Some(message_id) = self.scheduler.cancel() {
            self.emit(ClientEvent::RevealCancelled { message_id });
        }
    }

    fn raise(&mut self, error: String) {
        tracing::warn!(error = %error, "session error");
        self.error = Some(error.clone());
        self.emit(ClientEvent::ErrorRaised(error));
    }

    fn emit(&self, event: ClientEvent) {
        // Best-effort: a slow render layer drops notifications, never blocks state.
        let _ = self.event_tx.try_send(event);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn spawn_call<F>(&self, call: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let completion = call.await;
            if tx.send(completion).await.is_err() {
                tracing::debug!("client dropped before completion arrived");
            }
        });
    }
}

impl<G: Gateway> Drop for ChatClient<G> {
    fn drop(&mut self) {
        if let Some(active) = self.reveal.take() {
            active.ticker.abort();
        }
    }
}
