//! Session behaviour against an in-memory relay.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use nostr_crypto::SecretKey;
use nostr_session::{
    sign_text_note, unix_timestamp, ChannelObserver, ClientMessage, Filter, MemoryConnector,
    MemoryFrame, MemoryPeer, NostrEvent, RelaySession, SessionConfig, SessionEvent,
    SessionHandle, SessionState, SUB_CONTACTS, SUB_MUTES, SUB_NOTES,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

const AUTHOR: &str = "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e";
const A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
const C: &str = "cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";

const WAIT: Duration = Duration::from_secs(5);

fn config() -> SessionConfig {
    let mut config = SessionConfig::new("ws://memory.test", AUTHOR);
    config.recv_timeout = Duration::from_millis(20);
    config
}

fn start(config: SessionConfig) -> (SessionHandle, MemoryPeer, UnboundedReceiver<SessionEvent>) {
    let (connector, peer) = MemoryConnector::pair();
    let (observer, events) = ChannelObserver::new();
    let session =
        RelaySession::with_connector(config, Arc::new(observer), Arc::new(connector)).unwrap();
    (session.spawn(), peer, events)
}

fn event(id: u8, kind: u16, pubkey: &str, tags: &[(&str, &str)], content: &str) -> NostrEvent {
    NostrEvent {
        id: format!("{id:02x}").repeat(32),
        pubkey: pubkey.to_string(),
        created_at: 1_700_000_000,
        kind,
        tags: tags
            .iter()
            .map(|(name, value)| vec![name.to_string(), value.to_string()])
            .collect(),
        content: content.to_string(),
        sig: "00".repeat(64),
    }
}

fn deliver(peer: &MemoryPeer, subscription: &str, event: &NostrEvent) {
    let json = serde_json::json!(["EVENT", subscription, event]).to_string();
    assert!(peer.send_text(json));
}

async fn next_event(events: &mut UnboundedReceiver<SessionEvent>) -> SessionEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("observer channel closed")
}

/// Reads the three REQs every session opens with.
async fn expect_requests(peer: &mut MemoryPeer) -> Vec<(String, Filter)> {
    let mut requests = Vec::new();
    for _ in 0..3 {
        let text = timeout(WAIT, peer.recv()).await.unwrap().unwrap();
        match ClientMessage::from_json(&text).unwrap() {
            ClientMessage::Req {
                subscription_id,
                filter,
            } => requests.push((subscription_id, filter)),
            other => panic!("expected REQ, got {other:?}"),
        }
    }
    requests
}

async fn expect_subscriptions(peer: &mut MemoryPeer) -> Vec<String> {
    expect_requests(peer)
        .await
        .into_iter()
        .map(|(id, _)| id)
        .collect()
}

/// Delivers `event` on every subscription whose filter it matches, the way a
/// relay would. Returns how many subscriptions received it.
fn publish_to_matching(
    peer: &MemoryPeer,
    filters: &HashMap<String, Filter>,
    event: &NostrEvent,
) -> usize {
    let mut delivered = 0;
    for (id, filter) in filters {
        if filter.matches(event) {
            deliver(peer, id, event);
            delivered += 1;
        }
    }
    delivered
}

#[tokio::test]
async fn test_session_subscribes_then_routes_notes() {
    let (handle, mut peer, mut events) = start(config());

    let ids = expect_subscriptions(&mut peer).await;
    assert_eq!(ids, vec![SUB_CONTACTS, SUB_MUTES, SUB_NOTES]);

    deliver(&peer, SUB_CONTACTS, &event(1, 3, AUTHOR, &[("p", A), ("p", B)], ""));
    deliver(&peer, SUB_MUTES, &event(2, 10000, AUTHOR, &[("p", A)], ""));
    peer.send_text(r#"["EOSE","contacts"]"#);
    deliver(&peer, SUB_NOTES, &event(3, 1, A, &[], "from a muted author"));
    deliver(&peer, SUB_NOTES, &event(4, 1, C, &[], "from a stranger"));
    deliver(&peer, SUB_NOTES, &event(5, 1, B, &[], "from a followed author"));

    assert_eq!(next_event(&mut events).await, SessionEvent::FollowListUpdated(2));
    assert_eq!(next_event(&mut events).await, SessionEvent::MuteListUpdated(1));
    match next_event(&mut events).await {
        SessionEvent::NoteAccepted(note) => {
            assert_eq!(note.pubkey, B);
            assert_eq!(note.content, "from a followed author");
            assert!(note.is_followed);
        }
        other => panic!("expected accepted note, got {other:?}"),
    }
    assert_eq!(handle.state(), SessionState::Receiving);

    let report = handle.shutdown().await.unwrap();
    assert_eq!(report.state, SessionState::Disconnected);
    assert_eq!(report.fault, None);
    assert_eq!(report.stats.events_received, 5);
    assert_eq!(report.stats.notes_accepted, 1);
    assert_eq!(report.stats.notes_dropped, 2);
    assert_eq!(report.stats.list_updates, 2);
    assert_eq!(report.stats.eose_received, 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_list_updates_replace_previous_lists() {
    let (handle, mut peer, mut events) = start(config());
    expect_subscriptions(&mut peer).await;

    deliver(&peer, SUB_CONTACTS, &event(1, 3, AUTHOR, &[("p", A)], ""));
    deliver(&peer, SUB_CONTACTS, &event(2, 3, AUTHOR, &[("p", B)], ""));
    deliver(&peer, SUB_NOTES, &event(3, 1, A, &[], "no longer followed"));
    deliver(&peer, SUB_NOTES, &event(4, 1, B, &[], "newly followed"));

    assert_eq!(next_event(&mut events).await, SessionEvent::FollowListUpdated(1));
    assert_eq!(next_event(&mut events).await, SessionEvent::FollowListUpdated(1));
    match next_event(&mut events).await {
        SessionEvent::NoteAccepted(note) => assert_eq!(note.pubkey, B),
        other => panic!("expected accepted note, got {other:?}"),
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_allow_others_accepts_unfollowed_authors() {
    let mut config = config();
    config.allow_others = true;
    let (handle, mut peer, mut events) = start(config);
    expect_subscriptions(&mut peer).await;

    deliver(&peer, SUB_NOTES, &event(1, 1, C, &[], "hello"));
    match next_event(&mut events).await {
        SessionEvent::NoteAccepted(note) => {
            assert_eq!(note.pubkey, C);
            assert!(!note.is_followed);
        }
        other => panic!("expected accepted note, got {other:?}"),
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_closes_subscriptions() {
    let (handle, mut peer, _events) = start(config());
    expect_subscriptions(&mut peer).await;

    let report = timeout(WAIT, handle.shutdown()).await.unwrap().unwrap();
    assert_eq!(report.state, SessionState::Disconnected);

    let mut closed = HashSet::new();
    while let Some(text) = peer.try_recv() {
        if let ClientMessage::Close { subscription_id } = ClientMessage::from_json(&text).unwrap() {
            closed.insert(subscription_id);
        }
    }
    let expected: HashSet<String> = [SUB_CONTACTS, SUB_MUTES, SUB_NOTES]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(closed, expected);
}

#[tokio::test]
async fn test_transport_error_faults_session() {
    let (handle, mut peer, mut events) = start(config());
    expect_subscriptions(&mut peer).await;

    peer.fail("connection reset by peer");
    match next_event(&mut events).await {
        SessionEvent::ConnectionFault(reason) => assert!(reason.contains("connection reset")),
        other => panic!("expected fault, got {other:?}"),
    }

    let report = timeout(WAIT, handle.join()).await.unwrap().unwrap();
    assert_eq!(report.state, SessionState::Faulted);
    assert!(report.fault.is_some());
}

#[tokio::test]
async fn test_relay_close_faults_session() {
    let (handle, mut peer, mut events) = start(config());
    expect_subscriptions(&mut peer).await;

    peer.close();
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::ConnectionFault(_)
    ));
    let report = timeout(WAIT, handle.join()).await.unwrap().unwrap();
    assert_eq!(report.state, SessionState::Faulted);
}

#[tokio::test]
async fn test_refused_connection_faults_session() {
    let (observer, mut events) = ChannelObserver::new();
    let session = RelaySession::with_connector(
        config(),
        Arc::new(observer),
        Arc::new(MemoryConnector::refusing("connection refused")),
    )
    .unwrap();

    let report = timeout(WAIT, session.spawn().join()).await.unwrap().unwrap();
    assert_eq!(report.state, SessionState::Faulted);
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::ConnectionFault(_)
    ));
}

#[tokio::test]
async fn test_malformed_messages_are_skipped() {
    let (handle, mut peer, mut events) = start(config());
    expect_subscriptions(&mut peer).await;

    deliver(&peer, SUB_CONTACTS, &event(1, 3, AUTHOR, &[("p", B)], ""));
    peer.send_text("not json at all");
    peer.send_text(r#"["EVENT","notes"]"#);
    peer.send_text(r#"["AUTH","challenge-string"]"#);
    peer.send_frame(MemoryFrame::Binary(vec![0xff, 0xfe, 0xfd]));
    peer.send_text(r#"["NOTICE","slow down"]"#);
    deliver(&peer, SUB_NOTES, &event(2, 1, B, &[], "still flowing"));

    assert_eq!(next_event(&mut events).await, SessionEvent::FollowListUpdated(1));
    match next_event(&mut events).await {
        SessionEvent::NoteAccepted(note) => assert_eq!(note.content, "still flowing"),
        other => panic!("expected accepted note, got {other:?}"),
    }

    let report = handle.shutdown().await.unwrap();
    assert_eq!(report.state, SessionState::Disconnected);
    assert_eq!(report.stats.protocol_errors, 3);
    assert_eq!(report.stats.unknown_messages, 1);
    assert_eq!(report.stats.notices, 1);
}

#[tokio::test]
async fn test_relay_closed_subscription_is_not_closed_again() {
    let (handle, mut peer, mut events) = start(config());
    expect_subscriptions(&mut peer).await;

    peer.send_text(r#"["CLOSED","notes","error: shutting down"]"#);
    deliver(&peer, SUB_CONTACTS, &event(1, 3, AUTHOR, &[("p", B)], ""));
    assert_eq!(next_event(&mut events).await, SessionEvent::FollowListUpdated(1));

    handle.shutdown().await.unwrap();
    let mut closed = HashSet::new();
    while let Some(text) = peer.try_recv() {
        if let ClientMessage::Close { subscription_id } = ClientMessage::from_json(&text).unwrap() {
            closed.insert(subscription_id);
        }
    }
    assert!(!closed.contains(SUB_NOTES));
    assert_eq!(closed.len(), 2);
}

#[tokio::test]
async fn test_outbox_events_are_written_to_relay() {
    let (handle, mut peer, _events) = start(config());
    expect_subscriptions(&mut peer).await;

    let key = SecretKey::generate();
    let note = sign_text_note(&key, "posted through the session", Vec::new()).unwrap();
    handle.publish(note.clone()).unwrap();

    let text = timeout(WAIT, peer.recv()).await.unwrap().unwrap();
    match ClientMessage::from_json(&text).unwrap() {
        ClientMessage::Event(sent) => {
            assert_eq!(sent, note);
            assert!(sent.verify());
        }
        other => panic!("expected EVENT, got {other:?}"),
    }

    let report = handle.shutdown().await.unwrap();
    assert_eq!(report.stats.events_published, 1);
}

#[tokio::test]
async fn test_publish_after_session_end_fails() {
    let (handle, mut peer, _events) = start(config());
    expect_subscriptions(&mut peer).await;
    peer.close();

    let mut state = handle.state_receiver();
    timeout(WAIT, state.wait_for(|s| *s == SessionState::Faulted))
        .await
        .unwrap()
        .unwrap();
    while !handle.is_finished() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let note = sign_text_note(&SecretKey::generate(), "too late", Vec::new()).unwrap();
    assert!(handle.publish(note).is_err());
}

#[tokio::test]
async fn test_relay_filters_only_forward_author_lists_and_new_notes() {
    let (handle, mut peer, mut events) = start(config());
    let filters: HashMap<String, Filter> = expect_requests(&mut peer).await.into_iter().collect();
    let now = unix_timestamp();

    // Another user's contact list must not reach the session.
    let mut foreign = event(1, 3, C, &[("p", C)], "");
    foreign.created_at = now;
    assert_eq!(publish_to_matching(&peer, &filters, &foreign), 0);

    let mut own = event(2, 3, AUTHOR, &[("p", B)], "");
    own.created_at = 1_600_000_000;
    assert_eq!(publish_to_matching(&peer, &filters, &own), 1);

    // Notes older than the connection are backlog and stay on the relay.
    let old_note = event(3, 1, B, &[], "backlog");
    assert_eq!(publish_to_matching(&peer, &filters, &old_note), 0);

    let mut fresh = event(4, 1, B, &[], "live");
    fresh.created_at = now + 1;
    assert_eq!(publish_to_matching(&peer, &filters, &fresh), 1);

    assert_eq!(next_event(&mut events).await, SessionEvent::FollowListUpdated(1));
    match next_event(&mut events).await {
        SessionEvent::NoteAccepted(note) => assert_eq!(note.content, "live"),
        other => panic!("expected accepted note, got {other:?}"),
    }

    let report = handle.shutdown().await.unwrap();
    assert_eq!(report.stats.events_received, 2);
}

#[tokio::test]
async fn test_stop_does_not_wait_for_receive_timeout() {
    let mut config = config();
    config.recv_timeout = Duration::from_secs(2);
    let (handle, mut peer, _events) = start(config);
    expect_subscriptions(&mut peer).await;
    while handle.state() != SessionState::Receiving {
        tokio::task::yield_now().await;
    }

    let started = tokio::time::Instant::now();
    let report = timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .expect("stop waited for the receive timeout")
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(report.state, SessionState::Disconnected);
}
