//! Transport abstraction for the Quiz Battle buzzer protocol.
//!
//! The [`Transport`] trait defines a destination-addressed message bus
//! between the client and the room engine: outbound intents are sent to
//! named endpoints, inbound events arrive as [`Frame`]s carrying their
//! originating channel. Every implementation handles its own framing
//! (STOMP over WebSocket for the built-in transport).
//!
//! Connection setup lives behind the [`Connector`] trait rather than the
//! transport itself — the session loop reconnects by asking its connector
//! for a fresh transport after the fixed backoff delay, and restoring bus
//! subscriptions is explicitly NOT the transport's job: the session's
//! subscription registry re-attaches every registered channel after each
//! reconnect.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use buzzer_client::error::BuzzerError;
//! use buzzer_client::transport::{Frame, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, destination: &str, body: String) -> Result<(), BuzzerError> {
//!         // Publish one JSON payload to the named endpoint
//!         todo!()
//!     }
//!
//!     async fn subscribe(&mut self, destination: &str) -> Result<(), BuzzerError> {
//!         // Attach to a broadcast or personal channel
//!         todo!()
//!     }
//!
//!     async fn unsubscribe(&mut self, destination: &str) -> Result<(), BuzzerError> {
//!         // Detach; must be a no-op when not subscribed
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<Frame, BuzzerError>> {
//!         // Return the next inbound frame; None when the connection
//!         // closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), BuzzerError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::BuzzerError;

/// One inbound message from the bus: the channel it was delivered on plus
/// the raw JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The logical channel (destination) the message originated from.
    pub destination: String,
    /// The raw JSON body.
    pub body: String,
}

impl Frame {
    /// Convenience constructor.
    pub fn new(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            body: body.into(),
        }
    }
}

/// A destination-addressed duplex message bus.
///
/// Implementors shuttle JSON payloads between the client and the room
/// engine. Each call to [`send`](Transport::send) publishes one complete
/// payload; each call to [`recv`](Transport::recv) yields one complete
/// inbound frame.
///
/// # Object Safety
///
/// This trait is object-safe, so `Box<dyn Transport>` works for dynamic
/// dispatch. The session loop is monomorphized over `impl Transport` for
/// the common case.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it
/// is used inside `tokio::select!`. If `recv` is cancelled before
/// completion, calling it again must not lose data. Channel-based
/// implementations (e.g., wrapping `mpsc::Receiver`) are naturally
/// cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Publish a JSON payload to the named endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::TransportSend`] if the payload could not be
    /// sent (e.g., connection broken).
    async fn send(&mut self, destination: &str, body: String) -> Result<(), BuzzerError>;

    /// Attach to a logical channel so its messages are delivered via
    /// [`recv`](Transport::recv). Subscribing to an already-attached
    /// channel is idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::TransportSend`] if the subscription could
    /// not be issued.
    async fn subscribe(&mut self, destination: &str) -> Result<(), BuzzerError>;

    /// Detach from a logical channel. A no-op when not subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::TransportSend`] if the unsubscription could
    /// not be issued.
    async fn unsubscribe(&mut self, destination: &str) -> Result<(), BuzzerError>;

    /// Receive the next inbound frame.
    ///
    /// Returns:
    /// - `Some(Ok(frame))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<Frame, BuzzerError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to [`send`](Transport::send)
    /// and [`recv`](Transport::recv) may return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), BuzzerError>;
}

/// Factory producing connected [`Transport`]s.
///
/// The session loop holds one connector for its lifetime and calls
/// [`connect`](Connector::connect) on startup and after every disconnect
/// (with the fixed backoff delay in between). Keeping construction out of
/// the transport keeps the connection a session-scoped service: tests
/// instantiate isolated connectors instead of sharing ambient global
/// state.
#[async_trait]
pub trait Connector: Send + 'static {
    /// The transport type this connector produces.
    type Transport: Transport;

    /// Establish a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::Handshake`] or [`BuzzerError::Io`] when the
    /// connection cannot be established; the session loop treats any error
    /// as a failed attempt and retries after the backoff delay.
    async fn connect(&mut self) -> Result<Self::Transport, BuzzerError>;
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn frame_constructor() {
        let frame = Frame::new("/topic/room/AB12", "{}");
        assert_eq!(frame.destination, "/topic/room/AB12");
        assert_eq!(frame.body, "{}");
    }

    #[test]
    fn transport_trait_is_object_safe() {
        fn assert_object_safe(_: Option<Box<dyn Transport>>) {}
        assert_object_safe(None);
    }
}
