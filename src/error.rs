//! Error types for the buzzer client.

use thiserror::Error;

/// Errors that can occur when using the buzzer client.
#[derive(Debug, Error)]
pub enum BuzzerError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// The connection handshake with the message broker failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// Attempted a room operation before a room code was known.
    #[error("no room code known yet")]
    RoomUnknown,

    /// The requested room does not exist on the server.
    #[error("room not found")]
    RoomNotFound,

    /// The server returned an error message.
    #[error("server error: {message}")]
    Server {
        /// Human-readable error message from the server.
        message: String,
    },

    /// The REST snapshot lookup failed.
    #[error("room lookup failed: {0}")]
    Lookup(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for buzzer client operations.
pub type Result<T> = std::result::Result<T, BuzzerError>;
