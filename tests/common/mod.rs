#![allow(dead_code)]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for buzzer client integration tests.
//!
//! Provides a channel-driven [`MockTransport`] (tests push frames through a
//! [`MockHandle`] at exactly the moment they need them, so routing races
//! cannot make assertions flaky), a [`MockConnector`] scripting a sequence
//! of transports for reconnect scenarios, and helpers constructing
//! wire-shaped event JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use buzzer_client::{BuzzerError, Connector, Frame, Transport};
use tokio::sync::mpsc;

// ── MockTransport ───────────────────────────────────────────────────

type Inbound = Option<Result<Frame, BuzzerError>>;

/// Ordered record of one transport operation: `(op, destination, body)`.
pub type Op = (String, String, String);

/// Test-side handle for one [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle {
    frames: mpsc::UnboundedSender<Inbound>,
    log: Arc<StdMutex<Vec<Op>>>,
    closed: Arc<AtomicBool>,
}

impl MockHandle {
    /// Deliver one inbound frame on the given channel.
    pub fn deliver(&self, destination: &str, body: impl Into<String>) {
        let _ = self
            .frames
            .send(Some(Ok(Frame::new(destination, body.into()))));
    }

    /// Deliver a transport error.
    pub fn fail(&self, error: BuzzerError) {
        let _ = self.frames.send(Some(Err(error)));
    }

    /// Close the connection from the server side.
    pub fn drop_connection(&self) {
        let _ = self.frames.send(None);
    }

    /// All recorded operations, in order.
    pub fn ops(&self) -> Vec<Op> {
        self.log.lock().unwrap().clone()
    }

    /// `(destination, body)` of every SEND, in order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.ops()
            .into_iter()
            .filter(|(op, _, _)| op == "send")
            .map(|(_, dest, body)| (dest, body))
            .collect()
    }

    /// Destinations subscribed to, in order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter(|(op, _, _)| op == "subscribe")
            .map(|(_, dest, _)| dest)
            .collect()
    }

    /// Whether `close()` was called on the transport.
    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// A channel-driven mock transport. Frames pushed through the paired
/// [`MockHandle`] are yielded by `recv()`; every outbound operation is
/// recorded in the shared log.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Inbound>,
    log: Arc<StdMutex<Vec<Op>>>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a transport plus its test-side handle.
    pub fn new() -> (Self, MockHandle) {
        let (frames, incoming) = mpsc::unbounded_channel();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let handle = MockHandle {
            frames,
            log: Arc::clone(&log),
            closed: Arc::clone(&closed),
        };
        (
            Self {
                incoming,
                log,
                closed,
            },
            handle,
        )
    }

    fn record(&self, op: &str, destination: &str, body: &str) {
        self.log
            .lock()
            .unwrap()
            .push((op.to_string(), destination.to_string(), body.to_string()));
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, destination: &str, body: String) -> Result<(), BuzzerError> {
        self.record("send", destination, &body);
        Ok(())
    }

    async fn subscribe(&mut self, destination: &str) -> Result<(), BuzzerError> {
        self.record("subscribe", destination, "");
        Ok(())
    }

    async fn unsubscribe(&mut self, destination: &str) -> Result<(), BuzzerError> {
        self.record("unsubscribe", destination, "");
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, BuzzerError>> {
        match self.incoming.recv().await {
            Some(Some(item)) => Some(item),
            // Explicit `None` entry or dropped handle: clean close.
            Some(None) | None => None,
        }
    }

    async fn close(&mut self) -> Result<(), BuzzerError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Scripted connector: each `connect()` yields the next prepared
/// transport; once exhausted it hangs until the session shuts down.
pub struct MockConnector {
    transports: VecDeque<MockTransport>,
}

impl MockConnector {
    /// Prepare `count` transports up front, returning their handles in
    /// connect order.
    pub fn with_transports(count: usize) -> (Self, Vec<MockHandle>) {
        let mut transports = VecDeque::new();
        let mut handles = Vec::new();
        for _ in 0..count {
            let (transport, handle) = MockTransport::new();
            transports.push_back(transport);
            handles.push(handle);
        }
        (Self { transports }, handles)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&mut self) -> Result<MockTransport, BuzzerError> {
        match self.transports.pop_front() {
            Some(transport) => Ok(transport),
            // Out of scripted transports — hang until shutdown.
            None => std::future::pending().await,
        }
    }
}

// ── Wire-shaped JSON helpers ────────────────────────────────────────

/// A roster entry as the engine serializes it.
pub fn player_json(id: &str, name: &str, connected: bool, stunned: bool) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "avatar": "🦊",
        "connected": connected,
        "stunned": stunned,
    })
}

pub fn room_created_json(code: &str) -> String {
    serde_json::json!({ "type": "ROOM_CREATED", "roomCode": code }).to_string()
}

pub fn player_joined_json(players: Vec<serde_json::Value>, game_state: &str) -> String {
    serde_json::json!({
        "type": "PLAYER_JOINED",
        "players": players,
        "gameState": game_state,
    })
    .to_string()
}

pub fn player_left_json(players: Vec<serde_json::Value>, player_id: &str) -> String {
    serde_json::json!({
        "type": "PLAYER_LEFT",
        "players": players,
        "playerId": player_id,
    })
    .to_string()
}

pub fn round_started_json(code: &str) -> String {
    serde_json::json!({
        "type": "ROUND_STARTED",
        "roomCode": code,
        "gameState": "ACTIVE",
    })
    .to_string()
}

/// A winner-less press acknowledgment.
pub fn button_pressed_json(player_id: &str, timestamp: i64, position: u32) -> String {
    serde_json::json!({
        "type": "BUTTON_PRESSED",
        "gameState": "ACTIVE",
        "playerId": player_id,
        "buttonPresses": [
            { "playerId": player_id, "timestamp": timestamp, "position": position }
        ],
    })
    .to_string()
}

/// A press acknowledgment carrying the winner declaration.
pub fn winning_press_json(winner_id: &str, winner_name: &str) -> String {
    serde_json::json!({
        "type": "BUTTON_PRESSED",
        "gameState": "ROUND_ENDED",
        "playerId": winner_id,
        "winnerId": winner_id,
        "winnerName": winner_name,
        "winnerAvatar": "🦊",
        "buttonPresses": [
            { "playerId": winner_id, "timestamp": 1_700_000_000_000i64, "position": 1 }
        ],
    })
    .to_string()
}

pub fn round_ended_json(winner_id: &str, winner_name: &str) -> String {
    serde_json::json!({
        "type": "ROUND_ENDED",
        "gameState": "ROUND_ENDED",
        "winnerId": winner_id,
        "winnerName": winner_name,
        "winnerAvatar": "🦊",
    })
    .to_string()
}

pub fn round_reset_json(players: Vec<serde_json::Value>) -> String {
    serde_json::json!({
        "type": "ROUND_RESET",
        "gameState": "WAITING",
        "players": players,
    })
    .to_string()
}

pub fn room_state_json(
    code: &str,
    players: Vec<serde_json::Value>,
    game_state: &str,
    winner_id: Option<&str>,
) -> String {
    serde_json::json!({
        "type": "ROOM_STATE",
        "roomCode": code,
        "players": players,
        "gameState": game_state,
        "winnerId": winner_id.unwrap_or(""),
        "winnerName": "",
        "winnerAvatar": "",
    })
    .to_string()
}

pub fn chapter_updated_json(chapter: u32, part: u32) -> String {
    serde_json::json!({
        "type": "CHAPTER_UPDATED",
        "chapter": chapter,
        "part": part,
    })
    .to_string()
}

pub fn error_json(message: &str) -> String {
    serde_json::json!({ "type": "ERROR", "error": message }).to_string()
}
