//! Integration tests for optimistic sends and history loading.
//!
//! **Success Postconditions:**
//! 1. A send shows a placeholder immediately and becomes exactly one
//!    confirmed message when the server answers.
//! 2. A failed send leaves no placeholder behind and surfaces the error.
//!
//! **Invariants:**
//! 1. Responses for a session the user has left never touch the timeline
//!    or the error.
//! 2. At most one send per session is in flight.

use tutorchat::chat::{ChatClient, CompletionKind, SendRejected};
use tutorchat::config::ChatConfig;
use tutorchat::gateway::scripted::{PendingCall, Reply, Request, ScriptedGateway};

use tutorchat_proto::message::{
    MAX_QUESTION_SIZE, MessageId, MessagePayload, Timestamp, ValidationError,
};
use tutorchat_proto::session::{CreatedSessionPayload, OwnerId, SessionId, SessionPayload};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_client() -> (ChatClient<ScriptedGateway>, ScriptedGateway) {
    let gateway = ScriptedGateway::new();
    let (client, _snapshots, _events) = ChatClient::new(gateway.clone(), ChatConfig::default());
    (client, gateway)
}

fn answered(id: u64, session: u64, question: &str, answer: &str) -> MessagePayload {
    MessagePayload {
        id: MessageId::new(id),
        session_id: SessionId::new(session),
        question: question.to_string(),
        answer: answer.to_string(),
        timestamp: Timestamp::from_millis(id),
    }
}

async fn process_until(client: &mut ChatClient<ScriptedGateway>, kind: CompletionKind) {
    loop {
        match client.process_next().await {
            Some(k) if k == kind => return,
            Some(_) => {}
            None => panic!("completion channel closed"),
        }
    }
}

/// Create session `id`; it becomes active with an empty timeline.
async fn create(client: &mut ChatClient<ScriptedGateway>, gateway: &ScriptedGateway, id: u64) {
    client.create_session();
    gateway
        .next_call()
        .await
        .resolve(Reply::Created(Ok(CreatedSessionPayload {
            id: SessionId::new(id),
            title: format!("Chat {id}"),
            created_at: Timestamp::from_millis(id),
            owner_id: OwnerId::new(1),
        })));
    process_until(client, CompletionKind::SessionCreated).await;
}

/// List sessions `ids` (no active session yet).
async fn list(client: &mut ChatClient<ScriptedGateway>, gateway: &ScriptedGateway, ids: &[u64]) {
    client.refresh_sessions();
    let sessions = ids
        .iter()
        .map(|&id| SessionPayload {
            id: SessionId::new(id),
            title: format!("Chat {id}"),
            created_at: Timestamp::from_millis(id),
        })
        .collect();
    gateway
        .next_call()
        .await
        .resolve(Reply::Sessions(Ok(sessions)));
    process_until(client, CompletionKind::SessionsListed).await;
}

/// Select `id` and return its parked history call.
async fn select(
    client: &mut ChatClient<ScriptedGateway>,
    gateway: &ScriptedGateway,
    id: u64,
) -> PendingCall {
    client.select_session(Some(SessionId::new(id))).unwrap();
    let call = gateway.next_call().await;
    assert_eq!(call.request(), &Request::GetHistory(SessionId::new(id)));
    call
}

/// Send `question` and return its parked call.
async fn send(
    client: &mut ChatClient<ScriptedGateway>,
    gateway: &ScriptedGateway,
    question: &str,
) -> PendingCall {
    client.send_message(question).unwrap();
    gateway.next_call().await
}

// ---------------------------------------------------------------------------
// Send
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_is_reconciled_into_one_confirmed_message() {
    let (mut client, gateway) = new_client();
    create(&mut client, &gateway, 1).await;

    let call = send(&mut client, &gateway, "2+2?").await;
    assert_eq!(
        call.request(),
        &Request::SendMessage {
            session: SessionId::new(1),
            question: "2+2?".into()
        }
    );

    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert!(snapshot.messages[0].is_optimistic);
    assert_eq!(snapshot.messages[0].question, "2+2?");
    assert!(snapshot.messages[0].answer.is_empty());
    assert!(snapshot.send_loading);

    call.resolve(Reply::Message(Ok(answered(7, 1, "2+2?", "4"))));
    process_until(&mut client, CompletionKind::MessageSent).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    let message = &snapshot.messages[0];
    assert!(!message.is_optimistic);
    assert_eq!(message.permanent_id(), Some(MessageId::new(7)));
    assert_eq!(message.question, "2+2?");
    assert_eq!(message.answer, "4");
    assert_eq!(message.temp_id, None);
    assert_eq!(snapshot.optimistic_count(), 0);
    assert!(!snapshot.send_loading);
    assert_eq!(snapshot.error, None);
}

#[tokio::test]
async fn question_is_sent_trimmed() {
    let (mut client, gateway) = new_client();
    create(&mut client, &gateway, 1).await;

    let call = send(&mut client, &gateway, "  12 * 3 \n").await;
    assert_eq!(
        call.request(),
        &Request::SendMessage {
            session: SessionId::new(1),
            question: "12 * 3".into()
        }
    );
}

#[tokio::test]
async fn second_send_while_pending_is_rejected() {
    let (mut client, gateway) = new_client();
    create(&mut client, &gateway, 1).await;
    let _first = send(&mut client, &gateway, "2+2?").await;

    let before = client.snapshot().messages;
    assert_eq!(
        client.send_message("3+3?"),
        Err(SendRejected::AlreadyPending(SessionId::new(1)))
    );
    assert_eq!(client.snapshot().messages, before);
    assert!(gateway.try_next_call().is_none());
}

#[tokio::test]
async fn invalid_questions_are_rejected() {
    let (mut client, gateway) = new_client();
    create(&mut client, &gateway, 1).await;

    assert_eq!(
        client.send_message("   \n\t"),
        Err(SendRejected::Invalid(ValidationError::Empty))
    );
    let huge = "7".repeat(MAX_QUESTION_SIZE + 1);
    assert!(matches!(
        client.send_message(&huge),
        Err(SendRejected::Invalid(ValidationError::TooLarge { .. }))
    ));
    assert!(client.snapshot().messages.is_empty());
    assert!(gateway.try_next_call().is_none());
}

#[tokio::test]
async fn send_after_previous_completes_is_accepted() {
    let (mut client, gateway) = new_client();
    create(&mut client, &gateway, 1).await;

    send(&mut client, &gateway, "1+1")
        .await
        .resolve(Reply::Message(Ok(answered(1, 1, "1+1", "2"))));
    process_until(&mut client, CompletionKind::MessageSent).await;

    send(&mut client, &gateway, "2+2")
        .await
        .fail("busy");
    process_until(&mut client, CompletionKind::MessageSent).await;

    assert!(client.send_message("3+3").is_ok());
}

#[tokio::test]
async fn failed_send_rolls_back_and_surfaces_error() {
    let (mut client, gateway) = new_client();
    create(&mut client, &gateway, 1).await;

    send(&mut client, &gateway, "2+2?").await.fail("model overloaded");
    process_until(&mut client, CompletionKind::MessageSent).await;

    let snapshot = client.snapshot();
    assert!(snapshot.messages.is_empty());
    assert_eq!(
        snapshot.error.as_deref(),
        Some("Failed to send message: model overloaded")
    );
    assert!(!snapshot.send_loading);
}

#[tokio::test]
async fn answer_for_another_session_is_treated_as_failure() {
    let (mut client, gateway) = new_client();
    create(&mut client, &gateway, 1).await;

    send(&mut client, &gateway, "2+2?")
        .await
        .resolve(Reply::Message(Ok(answered(7, 99, "2+2?", "4"))));
    process_until(&mut client, CompletionKind::MessageSent).await;

    let snapshot = client.snapshot();
    assert!(snapshot.messages.is_empty());
    assert!(snapshot.error.is_some());
}

// ---------------------------------------------------------------------------
// Fencing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn answer_arriving_after_switch_leaves_no_trace() {
    let (mut client, gateway) = new_client();
    list(&mut client, &gateway, &[1, 2]).await;
    select(&mut client, &gateway, 1)
        .await
        .resolve(Reply::History(Ok(vec![])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    let send_call = send(&mut client, &gateway, "x").await;
    let history_call = select(&mut client, &gateway, 2).await;

    send_call.resolve(Reply::Message(Ok(answered(7, 1, "x", "x"))));
    process_until(&mut client, CompletionKind::MessageSent).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.active_session_id, Some(SessionId::new(2)));
    assert!(snapshot.messages.is_empty());
    assert_eq!(snapshot.error, None);

    history_call.resolve(Reply::History(Ok(vec![answered(20, 2, "b", "b")])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].permanent_id(), Some(MessageId::new(20)));
}

#[tokio::test]
async fn failure_arriving_after_switch_is_silent() {
    let (mut client, gateway) = new_client();
    create(&mut client, &gateway, 1).await;
    let send_call = send(&mut client, &gateway, "x").await;

    create(&mut client, &gateway, 2).await;
    send_call.fail("timeout");
    process_until(&mut client, CompletionKind::MessageSent).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.error, None);
    assert!(snapshot.messages.is_empty());
}

/// Send in session 1, delete it, then resolve the send with `reply`.
async fn resolve_send_after_delete(reply: Option<MessagePayload>) {
    let (mut client, gateway) = new_client();
    create(&mut client, &gateway, 1).await;
    let send_call = send(&mut client, &gateway, "x").await;

    client.delete_session(SessionId::new(1)).unwrap();
    let delete_call = gateway.next_call().await;
    assert_eq!(delete_call.request(), &Request::DeleteSession(SessionId::new(1)));
    delete_call.resolve(Reply::Deleted(Ok(())));
    process_until(&mut client, CompletionKind::SessionDeleted).await;
    assert_eq!(client.snapshot().active_session_id, None);

    match reply {
        Some(payload) => send_call.resolve(Reply::Message(Ok(payload))),
        None => send_call.fail("session gone"),
    }
    process_until(&mut client, CompletionKind::MessageSent).await;

    let snapshot = client.snapshot();
    assert!(snapshot.messages.is_empty());
    assert_eq!(snapshot.error, None);
    assert!(!snapshot.send_loading);

    // A session reusing the id starts with no send in flight.
    create(&mut client, &gateway, 1).await;
    let snapshot = client.snapshot();
    assert!(snapshot.messages.is_empty());
    assert!(!snapshot.send_loading);
    assert!(client.send_message("y").is_ok());
}

#[tokio::test]
async fn answer_for_deleted_session_is_discarded() {
    resolve_send_after_delete(Some(answered(7, 1, "x", "x"))).await;
}

#[tokio::test]
async fn failure_for_deleted_session_is_discarded() {
    resolve_send_after_delete(None).await;
}

#[tokio::test]
async fn switching_does_not_block_sending_in_new_session() {
    let (mut client, gateway) = new_client();
    create(&mut client, &gateway, 1).await;
    let _pending_in_first = send(&mut client, &gateway, "x").await;

    create(&mut client, &gateway, 2).await;
    assert!(!client.snapshot().send_loading);
    assert!(client.send_message("y").is_ok());
}

#[tokio::test]
async fn returning_before_answer_does_not_resurrect_placeholder() {
    let (mut client, gateway) = new_client();
    list(&mut client, &gateway, &[1, 2]).await;
    select(&mut client, &gateway, 1)
        .await
        .resolve(Reply::History(Ok(vec![])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    let send_call = send(&mut client, &gateway, "x").await;
    let _history_b = select(&mut client, &gateway, 2).await;
    let history_a = select(&mut client, &gateway, 1).await;

    // Back in session 1 with a fresh timeline; the old send is still pending.
    assert!(client.snapshot().messages.is_empty());
    assert!(client.snapshot().send_loading);

    send_call.resolve(Reply::Message(Ok(answered(7, 1, "x", "x"))));
    process_until(&mut client, CompletionKind::MessageSent).await;
    assert!(client.snapshot().messages.is_empty());
    assert!(!client.snapshot().send_loading);

    // The history fetch brings the stored exchange back.
    history_a.resolve(Reply::History(Ok(vec![answered(7, 1, "x", "x")])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;
    assert_eq!(client.snapshot().messages.len(), 1);
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[tokio::test]
async fn loading_same_history_twice_is_idempotent() {
    let (mut client, gateway) = new_client();
    list(&mut client, &gateway, &[1]).await;
    let history = vec![answered(1, 1, "a", "A"), answered(2, 1, "b", "B")];

    select(&mut client, &gateway, 1)
        .await
        .resolve(Reply::History(Ok(history.clone())));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;
    let first = client.snapshot().messages;

    client.load_history(SessionId::new(1));
    gateway
        .next_call()
        .await
        .resolve(Reply::History(Ok(history)));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    assert_eq!(client.snapshot().messages, first);
    assert_eq!(first.len(), 2);
}

#[tokio::test]
async fn older_history_fetch_cannot_overwrite_newer_one() {
    let (mut client, gateway) = new_client();
    list(&mut client, &gateway, &[1]).await;

    let older = select(&mut client, &gateway, 1).await;
    client.load_history(SessionId::new(1));
    let newer = gateway.next_call().await;

    newer.resolve(Reply::History(Ok(vec![answered(2, 1, "new", "N")])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;
    older.resolve(Reply::History(Ok(vec![answered(1, 1, "old", "O")])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].question, "new");
    assert!(!snapshot.message_loading);
}

#[tokio::test]
async fn history_load_for_inactive_session_is_ignored() {
    let (mut client, gateway) = new_client();
    list(&mut client, &gateway, &[1, 2]).await;

    client.load_history(SessionId::new(2));
    assert!(gateway.try_next_call().is_none());
    assert!(!client.snapshot().message_loading);
}

#[tokio::test]
async fn failed_reload_empties_timeline_but_keeps_pending_send() {
    let (mut client, gateway) = new_client();
    list(&mut client, &gateway, &[1]).await;
    select(&mut client, &gateway, 1)
        .await
        .resolve(Reply::History(Ok(vec![
            answered(1, 1, "a", "a"),
            answered(2, 1, "b", "b"),
        ])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;
    assert_eq!(client.snapshot().messages.len(), 2);

    let send_call = send(&mut client, &gateway, "c").await;

    client.load_history(SessionId::new(1));
    gateway.next_call().await.fail("boom");
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    let snapshot = client.snapshot();
    assert_eq!(
        snapshot.error.as_deref(),
        Some("Failed to load history: boom")
    );
    assert_eq!(snapshot.messages.len(), 1);
    assert!(snapshot.messages[0].is_optimistic);

    // The pending send still reconciles into the emptied timeline.
    send_call.resolve(Reply::Message(Ok(answered(3, 1, "c", "c"))));
    process_until(&mut client, CompletionKind::MessageSent).await;
    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].permanent_id(), Some(MessageId::new(3)));
}

#[tokio::test]
async fn pending_send_survives_history_replace() {
    let (mut client, gateway) = new_client();
    list(&mut client, &gateway, &[1]).await;
    let history_call = select(&mut client, &gateway, 1).await;

    let send_call = send(&mut client, &gateway, "3*3").await;
    history_call.resolve(Reply::History(Ok(vec![answered(1, 1, "a", "A")])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 2);
    assert!(snapshot.messages[1].is_optimistic);

    send_call.resolve(Reply::Message(Ok(answered(2, 1, "3*3", "9"))));
    process_until(&mut client, CompletionKind::MessageSent).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.optimistic_count(), 0);
    assert_eq!(snapshot.messages[1].answer, "9");
}

#[tokio::test]
async fn confirmed_id_already_in_history_is_not_duplicated() {
    let (mut client, gateway) = new_client();
    list(&mut client, &gateway, &[1]).await;
    let history_call = select(&mut client, &gateway, 1).await;

    let send_call = send(&mut client, &gateway, "3*3").await;
    // The server stored the exchange before the history was read.
    history_call.resolve(Reply::History(Ok(vec![answered(7, 1, "3*3", "9")])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    send_call.resolve(Reply::Message(Ok(answered(7, 1, "3*3", "9"))));
    process_until(&mut client, CompletionKind::MessageSent).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].permanent_id(), Some(MessageId::new(7)));
    assert_eq!(snapshot.optimistic_count(), 0);
}

#[tokio::test]
async fn history_of_other_sessions_is_filtered_out() {
    let (mut client, gateway) = new_client();
    list(&mut client, &gateway, &[1]).await;
    select(&mut client, &gateway, 1)
        .await
        .resolve(Reply::History(Ok(vec![
            answered(1, 1, "mine", "A"),
            answered(2, 5, "theirs", "B"),
        ])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].question, "mine");
}
