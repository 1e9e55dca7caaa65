//! # Buzzer Client
//!
//! Transport-agnostic Rust client for the Quiz Battle realtime buzzer
//! protocol.
//!
//! A moderator hosts a room, players join from their own devices, and when
//! a round opens the first acknowledged press wins. This crate is the
//! client-side synchronization engine for that game: it owns a persistent
//! message-bus connection, multiplexes channel subscriptions, folds the
//! server's at-least-once event stream into a locally consistent room
//! projection, and publishes outbound intents with the metadata the engine
//! needs to arbitrate races fairly. The room engine stays authoritative
//! throughout — the client only ever holds a projection, never the truth.
//!
//! ## Features
//!
//! - **Transport-agnostic** — implement the [`Transport`] and [`Connector`]
//!   traits for any backend
//! - **Wire-compatible** — protocol types match the engine's JSON format
//!   exactly
//! - **STOMP over WebSocket built-in** — the default
//!   `transport-stomp-websocket` feature provides [`StompWebSocketTransport`]
//! - **Event-driven** — per-channel typed [`ServerEvent`] streams, plus a
//!   `watch` channel for connection state
//! - **Pure reducer** — [`RoomProjection`] can be tested by replaying event
//!   sequences without a live transport
//! - **REST snapshot lookup** — the optional `rest-lookup` feature fetches a
//!   full room snapshot for late-joining passive viewers

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod stomp;
pub mod transport;
pub mod transports;

#[cfg(feature = "rest-lookup")]
pub mod rest;

// Re-export primary types for ergonomic imports.
pub use client::{BuzzerClient, BuzzerConfig, ConnectionState};
pub use error::BuzzerError;
pub use protocol::{ClientCommand, GamePhase, PlayerId, PlayerInfo, RoomCode, ServerEvent, Winner};
pub use registry::SubscriptionRegistry;
pub use room::{ButtonMode, RoomProjection, RoomView, Viewpoint};
pub use transport::{Connector, Frame, Transport};

#[cfg(feature = "transport-stomp-websocket")]
pub use transports::{StompConnector, StompOptions, StompWebSocketTransport};
