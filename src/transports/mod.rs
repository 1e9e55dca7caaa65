//! Transport implementations for the Quiz Battle buzzer protocol.
//!
//! This module provides concrete [`Transport`](crate::Transport)
//! implementations behind feature gates. Enable the corresponding Cargo
//! feature to pull in a transport:
//!
//! | Feature                      | Transport                  |
//! |------------------------------|----------------------------|
//! | `transport-stomp-websocket`  | [`StompWebSocketTransport`] |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), buzzer_client::BuzzerError> {
//! use buzzer_client::{StompWebSocketTransport, Transport};
//!
//! let mut bus = StompWebSocketTransport::connect("ws://localhost:8080/ws").await?;
//! bus.subscribe("/user/queue/personal").await?;
//! bus.send("/app/create-room", r#"{"forceNew":false}"#.to_string()).await?;
//!
//! if let Some(Ok(frame)) = bus.recv().await {
//!     println!("{} said: {}", frame.destination, frame.body);
//! }
//!
//! bus.close().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport-stomp-websocket")]
pub mod stomp_ws;

#[cfg(feature = "transport-stomp-websocket")]
pub use stomp_ws::{StompConnector, StompOptions, StompWebSocketTransport};
