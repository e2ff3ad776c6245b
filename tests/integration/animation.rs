//! Integration tests for the progressive reveal of new answers.
//!
//! Runs on a paused tokio clock: reveal timers fire as soon as the runtime
//! is idle, so whole reveals complete instantly and deterministically.
//!
//! **Invariants:**
//! 1. History never animates; only an answer that arrives while viewing does.
//! 2. A message id animates at most once.
//! 3. Leaving the session cancels the reveal and its timer.

use std::time::Duration;

use tokio::sync::mpsc;

use tutorchat::chat::{ChatClient, ClientEvent, CompletionKind};
use tutorchat::config::ChatConfig;
use tutorchat::gateway::scripted::{Reply, Request, ScriptedGateway};

use tutorchat_proto::message::{MessageId, MessagePayload, Timestamp};
use tutorchat_proto::session::{SessionId, SessionPayload};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_client() -> (
    ChatClient<ScriptedGateway>,
    ScriptedGateway,
    mpsc::Receiver<ClientEvent>,
) {
    let gateway = ScriptedGateway::new();
    let config = ChatConfig {
        event_buffer: 1024,
        ..ChatConfig::default()
    };
    let (client, _snapshots, events) = ChatClient::new(gateway.clone(), config);
    (client, gateway, events)
}

fn answered(id: u64, session: u64, answer: &str) -> MessagePayload {
    MessagePayload {
        id: MessageId::new(id),
        session_id: SessionId::new(session),
        question: format!("question {id}"),
        answer: answer.to_string(),
        timestamp: Timestamp::from_millis(id),
    }
}

fn drain(events: &mut mpsc::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
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

/// Apply reveal ticks until `id` no longer holds the animation token.
async fn run_reveal_of(client: &mut ChatClient<ScriptedGateway>, id: u64) {
    while client.snapshot().animating_message_id == Some(MessageId::new(id)) {
        client.process_next().await;
    }
}

/// List `ids`, select `active` and load `history` into it.
async fn open_session(
    client: &mut ChatClient<ScriptedGateway>,
    gateway: &ScriptedGateway,
    ids: &[u64],
    active: u64,
    history: Vec<MessagePayload>,
) {
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

    client.select_session(Some(SessionId::new(active))).unwrap();
    let call = gateway.next_call().await;
    assert_eq!(call.request(), &Request::GetHistory(SessionId::new(active)));
    call.resolve(Reply::History(Ok(history)));
    process_until(client, CompletionKind::HistoryLoaded).await;
}

/// Send a question and resolve it with `payload`.
async fn send_answered(
    client: &mut ChatClient<ScriptedGateway>,
    gateway: &ScriptedGateway,
    payload: MessagePayload,
) {
    let question = payload.question.clone();
    client.send_message(&question).unwrap();
    gateway
        .next_call()
        .await
        .resolve(Reply::Message(Ok(payload)));
    process_until(client, CompletionKind::MessageSent).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn only_the_new_answer_animates() {
    let (mut client, gateway, mut events) = new_client();
    let history = (1..=3).map(|id| answered(id, 1, "old")).collect();
    open_session(&mut client, &gateway, &[1], 1, history).await;

    assert_eq!(client.snapshot().animating_message_id, None);
    assert_eq!(client.snapshot().reveal, None);
    assert!(drain(&mut events).is_empty());

    send_answered(&mut client, &gateway, answered(4, 1, "Final Answer: 4")).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.animating_message_id, Some(MessageId::new(4)));
    let reveal = snapshot.reveal.unwrap();
    assert_eq!(reveal.message_id, MessageId::new(4));
    assert_eq!((reveal.revealed, reveal.total), (0, 15));
    assert!(reveal.visible.is_empty());

    run_reveal_of(&mut client, 4).await;

    let snapshot = client.snapshot();
    assert_eq!(snapshot.animating_message_id, None);
    assert_eq!(snapshot.reveal, None);
    assert_eq!(snapshot.messages.len(), 4);

    let events = drain(&mut events);
    let progress: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::RevealUpdated {
                message_id,
                revealed,
                total,
            } => {
                assert_eq!(*message_id, MessageId::new(4));
                assert_eq!(*total, 15);
                Some(*revealed)
            }
            _ => None,
        })
        .collect();
    assert_eq!(progress, (1..=15).collect::<Vec<_>>());
    assert_eq!(
        events.last(),
        Some(&ClientEvent::RevealCompleted {
            message_id: MessageId::new(4)
        })
    );
}

#[tokio::test(start_paused = true)]
async fn completed_answer_never_animates_again() {
    let (mut client, gateway, mut events) = new_client();
    open_session(&mut client, &gateway, &[1], 1, vec![]).await;
    send_answered(&mut client, &gateway, answered(4, 1, "42")).await;
    run_reveal_of(&mut client, 4).await;
    drain(&mut events);

    // Reloading history that now contains the answer does not restart it.
    client.load_history(SessionId::new(1));
    gateway
        .next_call()
        .await
        .resolve(Reply::History(Ok(vec![answered(4, 1, "42")])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    assert_eq!(client.snapshot().animating_message_id, None);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(client.drain_completions(), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn switching_session_cancels_reveal() {
    let (mut client, gateway, mut events) = new_client();
    open_session(&mut client, &gateway, &[1, 2], 1, vec![]).await;
    send_answered(
        &mut client,
        &gateway,
        answered(7, 1, "A long explanation of the answer"),
    )
    .await;

    for _ in 0..3 {
        assert_eq!(
            client.process_next().await,
            Some(CompletionKind::RevealTick)
        );
    }
    assert_eq!(client.snapshot().reveal.unwrap().visible, "A l");
    drain(&mut events);

    client.select_session(Some(SessionId::new(2))).unwrap();
    let snapshot = client.snapshot();
    assert_eq!(snapshot.animating_message_id, None);
    assert_eq!(snapshot.reveal, None);
    assert_eq!(
        drain(&mut events),
        vec![ClientEvent::RevealCancelled {
            message_id: MessageId::new(7)
        }]
    );

    gateway
        .next_call()
        .await
        .resolve(Reply::History(Ok(vec![])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;

    // The timer was aborted: time passes, nothing else arrives.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(client.drain_completions(), 0);
    assert!(drain(&mut events).is_empty());

    // Coming back shows the answer in full, as history.
    client.select_session(Some(SessionId::new(1))).unwrap();
    gateway
        .next_call()
        .await
        .resolve(Reply::History(Ok(vec![answered(
            7,
            1,
            "A long explanation of the answer",
        )])));
    process_until(&mut client, CompletionKind::HistoryLoaded).await;
    assert_eq!(client.snapshot().animating_message_id, None);
    assert_eq!(client.snapshot().reveal, None);
}

#[tokio::test(start_paused = true)]
async fn formatted_spans_appear_whole() {
    let (mut client, gateway, _events) = new_client();
    open_session(&mut client, &gateway, &[1], 1, vec![]).await;
    send_answered(&mut client, &gateway, answered(5, 1, "Use `x+1` and $$y$$")).await;

    let mut seen = Vec::new();
    while let Some(reveal) = client.snapshot().reveal {
        seen.push(reveal.visible);
        client.process_next().await;
    }

    // 4 chars, inline code, 5 chars, then display math completes the reveal.
    assert_eq!(seen.len(), 11);
    assert_eq!(seen[4], "Use ");
    assert_eq!(seen[5], "Use `x+1`");
    assert_eq!(seen[10], "Use `x+1` and ");
    assert!(seen.iter().all(|v| v.matches('`').count() != 1));
}

#[tokio::test(start_paused = true)]
async fn unit_delays_follow_configuration() {
    let (mut client, gateway, _events) = new_client();
    open_session(&mut client, &gateway, &[1], 1, vec![]).await;

    let start = tokio::time::Instant::now();
    // 9 chars at 12ms, one inline span at 40ms, one block at 120ms.
    send_answered(&mut client, &gateway, answered(5, 1, "Use `x+1` and $$y$$")).await;
    run_reveal_of(&mut client, 5).await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(268), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn next_answer_waits_for_current_reveal() {
    let (mut client, gateway, _events) = new_client();
    open_session(&mut client, &gateway, &[1], 1, vec![]).await;

    send_answered(&mut client, &gateway, answered(1, 1, "first answer")).await;
    assert_eq!(
        client.snapshot().animating_message_id,
        Some(MessageId::new(1))
    );

    send_answered(&mut client, &gateway, answered(2, 1, "second")).await;
    // Still revealing the first one.
    assert_eq!(
        client.snapshot().animating_message_id,
        Some(MessageId::new(1))
    );

    run_reveal_of(&mut client, 1).await;
    assert_eq!(
        client.snapshot().animating_message_id,
        Some(MessageId::new(2))
    );

    run_reveal_of(&mut client, 2).await;
    assert_eq!(client.snapshot().animating_message_id, None);
}

#[tokio::test(start_paused = true)]
async fn optimistic_placeholder_does_not_animate() {
    let (mut client, gateway, mut events) = new_client();
    open_session(&mut client, &gateway, &[1], 1, vec![]).await;

    client.send_message("2+2?").unwrap();
    let _call = gateway.next_call().await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    client.drain_completions();
    assert_eq!(client.snapshot().animating_message_id, None);
    assert!(drain(&mut events).is_empty());
}
