#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style client tests for the buzzer client.
//!
//! Uses the channel-driven `MockTransport` from `tests/common` to script
//! server behavior and verify that `BuzzerClient` processes it correctly:
//! subscription ordering, intent wire format, reconnect semantics, and
//! local press suppression.

mod common;

use std::time::Duration;

use buzzer_client::protocol::{room_channel, RoomCode, ServerEvent, PERSONAL_CHANNEL};
use buzzer_client::{
    BuzzerClient, BuzzerConfig, BuzzerError, ConnectionState, RoomView, Viewpoint,
};

use common::{
    button_pressed_json, error_json, player_json, room_created_json, room_state_json,
    round_started_json, MockConnector,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn fast_config() -> BuzzerConfig {
    BuzzerConfig::new()
        .with_subscribe_settle(Duration::from_millis(1))
        .with_reconnect_delay(Duration::from_millis(200))
}

async fn recv_event(rx: &mut tokio::sync::mpsc::Receiver<ServerEvent>) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_state(
    rx: &mut tokio::sync::watch::Receiver<ConnectionState>,
    want: ConnectionState,
) {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == want))
        .await
        .expect("timed out waiting for connection state")
        .expect("state channel closed");
}

fn parse(json: &str) -> ServerEvent {
    serde_json::from_str(json).expect("fixture should parse")
}

/// A player view seeded to an open round in room AB12.
fn armed_player_view(player_id: &str, stunned: bool) -> RoomView {
    let mut view = RoomView::new(Viewpoint::Player(player_id.into()));
    view.apply(&parse(&room_state_json(
        "AB12",
        vec![
            player_json("p1", "Alice", true, stunned && player_id == "p1"),
            player_json("p2", "Bob", true, stunned && player_id == "p2"),
        ],
        "WAITING",
        None,
    )));
    view.apply(&parse(&round_started_json("AB12")));
    view
}

// ════════════════════════════════════════════════════════════════════
// Host flow: subscribe → settle → create → room code
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn host_create_room_flow() {
    let (connector, handles) = MockConnector::with_transports(1);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());

    client.wait_connected().await.expect("connect");

    let mut personal = client.subscribe(PERSONAL_CHANNEL).await.expect("subscribe");
    // The subscription is already on the wire once subscribe() resolves.
    assert_eq!(handles[0].subscriptions(), [PERSONAL_CHANNEL]);

    client.create_room().expect("create_room");
    tokio::time::sleep(Duration::from_millis(50)).await;

    // SUBSCRIBE strictly precedes the first intent.
    let ops = handles[0].ops();
    assert_eq!(ops[0].0, "subscribe");
    assert_eq!(ops[1].0, "send");
    assert_eq!(ops[1].1, "/app/create-room");

    handles[0].deliver(PERSONAL_CHANNEL, room_created_json("AB12"));

    let mut view = RoomView::new(Viewpoint::Host);
    view.apply(&recv_event(&mut personal).await);
    assert_eq!(
        view.projection().room_code.as_ref().map(RoomCode::as_str),
        Some("AB12")
    );

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Press dispatch and local suppression
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn press_button_includes_client_timestamp() {
    let (connector, handles) = MockConnector::with_transports(1);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    let view = armed_player_view("p1", false);
    assert!(client.press_button(&view).expect("press"));

    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = handles[0].sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "/app/press-button");
    let body: serde_json::Value = serde_json::from_str(&sent[0].1).expect("body");
    assert_eq!(body["roomCode"], "AB12");
    assert_eq!(body["playerId"], "p1");
    assert!(
        body["clientTimestamp"].as_i64().expect("timestamp") > 0,
        "press payload must carry the local timestamp"
    );

    client.shutdown().await;
}

#[tokio::test]
async fn stunned_player_press_is_never_sent() {
    let (connector, handles) = MockConnector::with_transports(1);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    let view = armed_player_view("p1", true);
    assert!(!client.press_button(&view).expect("press"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handles[0].sent().is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn repeated_press_is_suppressed_locally() {
    let (connector, handles) = MockConnector::with_transports(1);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    let mut view = armed_player_view("p1", false);
    // The engine acknowledged p1's press without declaring a winner yet.
    view.apply(&parse(&button_pressed_json("p1", 1_700_000_000_000, 1)));

    assert!(!client.press_button(&view).expect("press"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handles[0].sent().is_empty());

    client.shutdown().await;
}

#[tokio::test]
async fn press_before_room_known_is_rejected() {
    let (connector, _handles) = MockConnector::with_transports(1);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    let view = RoomView::new(Viewpoint::Player("p1".into()));
    let err = client.press_button(&view).expect_err("should reject");
    assert!(matches!(err, BuzzerError::RoomUnknown));

    client.shutdown().await;
}

#[tokio::test]
async fn press_while_disconnected_is_rejected_without_send() {
    // A connector with no transports keeps the session connecting forever.
    let (connector, _handles) = MockConnector::with_transports(0);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());

    let view = armed_player_view("p1", false);
    let err = client.press_button(&view).expect_err("should reject");
    assert!(matches!(err, BuzzerError::NotConnected));

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Reconnect: re-subscribe first, then resync state
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn reconnect_restores_subscriptions_then_state() {
    let (connector, handles) = MockConnector::with_transports(2);
    let (mut client, mut state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    let code = RoomCode::new("AB12");
    let mut personal = client.subscribe(PERSONAL_CHANNEL).await.expect("personal");
    let _room = client.subscribe(room_channel(&code)).await.expect("room");

    // Seed the projection mid-round.
    let snapshot = room_state_json(
        "AB12",
        vec![
            player_json("p1", "Alice", true, false),
            player_json("p2", "Bob", true, false),
        ],
        "ACTIVE",
        None,
    );
    handles[0].deliver(PERSONAL_CHANNEL, snapshot.clone());

    let mut view = RoomView::new(Viewpoint::Player("p1".into()));
    view.apply(&recv_event(&mut personal).await);
    let before = view.projection().clone();

    // The server drops the connection mid-round.
    handles[0].drop_connection();
    wait_state(&mut state_rx, ConnectionState::Reconnecting).await;
    wait_state(&mut state_rx, ConnectionState::Connected).await;

    // Both channels were re-attached on the fresh transport before any
    // outbound intent.
    let mut resubscribed = handles[1].subscriptions();
    resubscribed.sort_unstable();
    assert_eq!(resubscribed, ["/topic/room/AB12", "/user/queue/personal"]);
    assert!(handles[1].sent().is_empty());

    // Resync through a fresh snapshot request.
    client.request_room_state(&code).expect("request state");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ops = handles[1].ops();
    let first_send = ops.iter().position(|(op, _, _)| op == "send").expect("send");
    assert_eq!(ops[first_send].1, "/app/get-room-state");
    assert!(
        ops.iter().take(first_send).filter(|(op, _, _)| op == "subscribe").count() == 2,
        "every registered channel must be re-attached before the first resent intent"
    );

    handles[1].deliver(PERSONAL_CHANNEL, snapshot);
    view.apply(&recv_event(&mut personal).await);

    // The restored projection matches the pre-disconnect room exactly.
    assert_eq!(view.projection(), &before);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Routing, replacement, and teardown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn malformed_payload_is_dropped_not_fatal() {
    let (connector, handles) = MockConnector::with_transports(1);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    let mut personal = client.subscribe(PERSONAL_CHANNEL).await.expect("subscribe");

    handles[0].deliver(PERSONAL_CHANNEL, "{not json at all");
    handles[0].deliver(PERSONAL_CHANNEL, r#"{"type":"NO_SUCH_EVENT"}"#);
    handles[0].deliver(PERSONAL_CHANNEL, room_created_json("AB12"));

    // Only the valid event comes through; the session stays alive.
    let event = recv_event(&mut personal).await;
    assert!(matches!(event, ServerEvent::RoomCreated { .. }));
    assert!(client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn events_route_to_their_channel_only() {
    let (connector, handles) = MockConnector::with_transports(1);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    let mut personal = client.subscribe(PERSONAL_CHANNEL).await.expect("personal");
    let mut room = client
        .subscribe(room_channel(&RoomCode::new("AB12")))
        .await
        .expect("room");

    handles[0].deliver("/topic/room/AB12", round_started_json("AB12"));

    let event = recv_event(&mut room).await;
    assert_eq!(event, ServerEvent::RoundStarted);
    // Nothing leaked onto the personal channel.
    assert!(personal.try_recv().is_err());

    client.shutdown().await;
}

#[tokio::test]
async fn resubscribing_replaces_the_previous_handler() {
    let (connector, handles) = MockConnector::with_transports(1);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    let mut first = client.subscribe(PERSONAL_CHANNEL).await.expect("first");
    let mut second = client.subscribe(PERSONAL_CHANNEL).await.expect("second");

    // The first receiver observes the channel closing.
    assert!(
        tokio::time::timeout(Duration::from_secs(1), first.recv())
            .await
            .expect("closed receiver should resolve")
            .is_none()
    );

    handles[0].deliver(PERSONAL_CHANNEL, room_created_json("AB12"));
    let event = recv_event(&mut second).await;
    assert!(matches!(event, ServerEvent::RoomCreated { .. }));

    client.shutdown().await;
}

#[tokio::test]
async fn auxiliary_unsubscribe_keeps_the_connection_alive() {
    let (connector, handles) = MockConnector::with_transports(1);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    let mut personal = client.subscribe(PERSONAL_CHANNEL).await.expect("personal");
    let mut room = client
        .subscribe(room_channel(&RoomCode::new("AB12")))
        .await
        .expect("room");

    // The screen view drops only its own subscription.
    client.unsubscribe(room_channel(&RoomCode::new("AB12"))).expect("unsubscribe");

    // Its receiver closes…
    assert!(
        tokio::time::timeout(Duration::from_secs(1), room.recv())
            .await
            .expect("closed receiver should resolve")
            .is_none()
    );

    // …while the shared connection and other consumers stay up.
    assert!(client.is_connected());
    handles[0].deliver(PERSONAL_CHANNEL, error_json("room is full"));
    let event = recv_event(&mut personal).await;
    assert!(matches!(event, ServerEvent::Error { .. }));

    client.shutdown().await;
}

#[tokio::test]
async fn unsubscribe_unknown_channel_is_a_noop() {
    let (connector, _handles) = MockConnector::with_transports(1);
    let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    client
        .unsubscribe("/topic/room/NEVER")
        .expect("noop unsubscribe");
    assert!(client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_transport_and_reports_disconnected() {
    let (connector, handles) = MockConnector::with_transports(1);
    let (mut client, mut state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    client.shutdown().await;

    assert!(handles[0].was_closed());
    wait_state(&mut state_rx, ConnectionState::Disconnected).await;
    assert!(!client.is_connected());

    let err = client.create_room().expect_err("after shutdown");
    assert!(matches!(err, BuzzerError::NotConnected));
}

#[tokio::test]
async fn transport_error_triggers_reconnect() {
    let (connector, handles) = MockConnector::with_transports(2);
    let (mut client, mut state_rx) = BuzzerClient::start(connector, fast_config());
    client.wait_connected().await.expect("connect");

    handles[0].fail(BuzzerError::TransportReceive("boom".into()));

    wait_state(&mut state_rx, ConnectionState::Reconnecting).await;
    wait_state(&mut state_rx, ConnectionState::Connected).await;
    assert!(client.is_connected());

    client.shutdown().await;
}
