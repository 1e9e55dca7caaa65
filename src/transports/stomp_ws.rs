//! STOMP-over-WebSocket transport using `tokio-tungstenite`.
//!
//! This module provides [`StompWebSocketTransport`], a [`Transport`]
//! implementation that speaks STOMP 1.2 over a WebSocket connection —
//! the framing the room engine's simple broker expects. Both `ws://` and
//! `wss://` URLs are supported; TLS is handled transparently via
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! A bidirectional heartbeat keeps the broker's liveness window satisfied:
//! [`recv`](Transport::recv) emits a bare-EOL frame every
//! [`StompOptions::heartbeat`] while it is being polled. Detecting *missing*
//! server heartbeats is the broker's concern and is not re-implemented here.
//!
//! # Feature gate
//!
//! Only available with the `transport-stomp-websocket` feature (enabled by
//! default).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::BuzzerError;
use crate::stomp::{ParsedFrame, StompCommand, StompFrame, HEARTBEAT};
use crate::transport::{Connector, Frame, Transport};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Tuning knobs for the STOMP session.
#[derive(Debug, Clone)]
pub struct StompOptions {
    /// Interval of the bidirectional heartbeat advertised to and sent at
    /// the broker. Defaults to **4 seconds**.
    pub heartbeat: Duration,
    /// Value of the CONNECT `host` header. Defaults to the host part of
    /// the connection URL.
    pub virtual_host: Option<String>,
}

impl Default for StompOptions {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(4),
            virtual_host: None,
        }
    }
}

/// A [`Transport`] backed by a STOMP session over a WebSocket connection.
///
/// # Construction
///
/// Use [`StompWebSocketTransport::connect`] to establish a new connection:
///
/// ```rust,no_run
/// # async fn example() -> Result<(), buzzer_client::BuzzerError> {
/// use buzzer_client::StompWebSocketTransport;
///
/// let transport = StompWebSocketTransport::connect("ws://localhost:8080/ws").await?;
/// # Ok(())
/// # }
/// ```
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method is cancel-safe. Dropping the future
/// returned by `recv` before it completes will not consume or lose any
/// messages, making it safe to use inside `tokio::select!`.
#[derive(Debug)]
pub struct StompWebSocketTransport {
    stream: WsStream,
    closed: bool,
    heartbeat: tokio::time::Interval,
    next_sub: usize,
    /// destination → subscription id issued on SUBSCRIBE.
    subs: HashMap<String, String>,
}

impl StompWebSocketTransport {
    /// Establish a WebSocket connection and perform the STOMP CONNECT
    /// handshake with default options.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::Io`] if the connection cannot be established
    /// and [`BuzzerError::Handshake`] if the broker rejects the CONNECT
    /// frame or closes mid-handshake.
    pub async fn connect(url: &str) -> Result<Self, BuzzerError> {
        Self::connect_with_options(url, StompOptions::default()).await
    }

    /// Like [`connect`](Self::connect) with explicit [`StompOptions`].
    pub async fn connect_with_options(
        url: &str,
        options: StompOptions,
    ) -> Result<Self, BuzzerError> {
        tracing::debug!(url = %url, "connecting to STOMP broker");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            BuzzerError::Io(std::io::Error::new(kind, e))
        })?;

        let period = options.heartbeat.max(Duration::from_millis(100));
        let heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        let mut transport = Self {
            stream,
            closed: false,
            heartbeat,
            next_sub: 0,
            subs: HashMap::new(),
        };
        transport.stomp_handshake(url, &options).await?;

        tracing::info!(url = %url, "STOMP session established");
        Ok(transport)
    }

    /// Establish a new connection with a deadline on the whole handshake.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::Timeout`] if the deadline elapses, or any
    /// error that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: Duration,
    ) -> Result<Self, BuzzerError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| BuzzerError::Timeout)?
    }

    async fn stomp_handshake(
        &mut self,
        url: &str,
        options: &StompOptions,
    ) -> Result<(), BuzzerError> {
        let hb = options.heartbeat.as_millis();
        let host = options
            .virtual_host
            .clone()
            .unwrap_or_else(|| host_of(url));
        let connect = StompFrame::new(StompCommand::Connect)
            .header("accept-version", "1.2")
            .header("host", host)
            .header("heart-beat", format!("{hb},{hb}"));
        self.stream
            .send(Message::Text(connect.encode().into()))
            .await
            .map_err(|e| BuzzerError::Handshake(format!("failed to send CONNECT: {e}")))?;

        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(BuzzerError::Handshake(e.to_string())),
                None => {
                    return Err(BuzzerError::Handshake(
                        "connection closed during handshake".into(),
                    ));
                }
            };
            match msg {
                Message::Text(text) => match StompFrame::parse(&text)? {
                    ParsedFrame::Heartbeat => {}
                    ParsedFrame::Frame(frame) if frame.command == StompCommand::Connected => {
                        tracing::debug!(
                            version = frame.header_value("version").unwrap_or("?"),
                            heart_beat = frame.header_value("heart-beat").unwrap_or("0,0"),
                            "broker accepted CONNECT"
                        );
                        return Ok(());
                    }
                    ParsedFrame::Frame(frame) if frame.command == StompCommand::Error => {
                        let reason = frame
                            .header_value("message")
                            .map(str::to_string)
                            .unwrap_or(frame.body);
                        return Err(BuzzerError::Handshake(reason));
                    }
                    ParsedFrame::Frame(frame) => {
                        return Err(BuzzerError::Handshake(format!(
                            "unexpected {} frame before CONNECTED",
                            frame.command.as_str()
                        )));
                    }
                },
                Message::Close(frame) => {
                    tracing::debug!(?frame, "close frame during handshake");
                    return Err(BuzzerError::Handshake(
                        "connection closed during handshake".into(),
                    ));
                }
                // Control and binary frames carry nothing for the handshake.
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn send_frame(&mut self, frame: StompFrame) -> Result<(), BuzzerError> {
        self.stream
            .send(Message::Text(frame.encode().into()))
            .await
            .map_err(|e| BuzzerError::TransportSend(e.to_string()))
    }
}

#[async_trait]
impl Transport for StompWebSocketTransport {
    async fn send(&mut self, destination: &str, body: String) -> Result<(), BuzzerError> {
        if self.closed {
            return Err(BuzzerError::TransportClosed);
        }
        let frame = StompFrame::new(StompCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(body);
        self.send_frame(frame).await
    }

    async fn subscribe(&mut self, destination: &str) -> Result<(), BuzzerError> {
        if self.closed {
            return Err(BuzzerError::TransportClosed);
        }
        if self.subs.contains_key(destination) {
            return Ok(());
        }
        let id = format!("sub-{}", self.next_sub);
        self.next_sub += 1;
        let frame = StompFrame::new(StompCommand::Subscribe)
            .header("id", id.clone())
            .header("destination", destination);
        self.send_frame(frame).await?;
        self.subs.insert(destination.to_string(), id);
        Ok(())
    }

    async fn unsubscribe(&mut self, destination: &str) -> Result<(), BuzzerError> {
        if self.closed {
            return Err(BuzzerError::TransportClosed);
        }
        let Some(id) = self.subs.remove(destination) else {
            return Ok(());
        };
        let frame = StompFrame::new(StompCommand::Unsubscribe).header("id", id);
        self.send_frame(frame).await
    }

    async fn recv(&mut self) -> Option<Result<Frame, BuzzerError>> {
        loop {
            tokio::select! {
                _ = self.heartbeat.tick() => {
                    if let Err(e) = self.stream.send(Message::Text(HEARTBEAT.into())).await {
                        return Some(Err(BuzzerError::TransportSend(format!(
                            "heartbeat send failed: {e}"
                        ))));
                    }
                }

                msg = self.stream.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            return Some(Err(BuzzerError::TransportReceive(e.to_string())));
                        }
                        None => return None,
                    };

                    match msg {
                        Message::Text(text) => match StompFrame::parse(&text) {
                            Ok(ParsedFrame::Heartbeat) => {}
                            Ok(ParsedFrame::Frame(frame)) => match frame.command {
                                StompCommand::Message => {
                                    match frame.header_value("destination").map(str::to_string) {
                                        Some(dest) => {
                                            return Some(Ok(Frame::new(dest, frame.body)));
                                        }
                                        None => {
                                            tracing::warn!(
                                                "MESSAGE frame without destination, skipping"
                                            );
                                        }
                                    }
                                }
                                StompCommand::Error => {
                                    let reason = frame
                                        .header_value("message")
                                        .map(str::to_string)
                                        .unwrap_or(frame.body);
                                    return Some(Err(BuzzerError::TransportReceive(reason)));
                                }
                                StompCommand::Receipt => {
                                    tracing::debug!(
                                        receipt = frame.header_value("receipt-id").unwrap_or("?"),
                                        "broker receipt"
                                    );
                                }
                                other => {
                                    tracing::warn!(
                                        command = other.as_str(),
                                        "unexpected frame from broker, skipping"
                                    );
                                }
                            },
                            Err(e) => {
                                // Malformed frames are dropped, never fatal.
                                tracing::warn!("malformed STOMP frame, skipping: {e}");
                            }
                        },
                        Message::Close(frame) => {
                            tracing::debug!(?frame, "received WebSocket close frame");
                            return None;
                        }
                        Message::Ping(_) => {
                            // tungstenite auto-queues a Pong reply.
                            tracing::debug!("received WebSocket ping");
                        }
                        Message::Pong(_) => {
                            tracing::debug!("received WebSocket pong (ignored)");
                        }
                        Message::Binary(_) => {
                            tracing::warn!("received unexpected binary WebSocket frame, skipping");
                        }
                        Message::Frame(_) => {
                            // Never produced by the read half; kept for
                            // exhaustiveness against future variants.
                            tracing::debug!("received raw WebSocket frame, skipping");
                        }
                    }
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), BuzzerError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // Best effort DISCONNECT so the broker releases the session eagerly.
        let disconnect = StompFrame::new(StompCommand::Disconnect);
        if let Err(e) = self
            .stream
            .send(Message::Text(disconnect.encode().into()))
            .await
        {
            tracing::debug!("DISCONNECT frame not delivered: {e}");
        }
        self.stream
            .close(None)
            .await
            .map_err(|e| BuzzerError::TransportSend(e.to_string()))
    }
}

/// Host part of a `ws://` / `wss://` URL, for the CONNECT `host` header.
fn host_of(url: &str) -> String {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);
    authority
        .split(':')
        .next()
        .unwrap_or(authority)
        .to_string()
}

// ── Connector ───────────────────────────────────────────────────────

/// [`Connector`] that dials the same broker URL on every (re)connect.
#[derive(Debug, Clone)]
pub struct StompConnector {
    url: String,
    options: StompOptions,
}

impl StompConnector {
    /// Connector for the given broker URL with default options.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: StompOptions::default(),
        }
    }

    /// Connector with explicit [`StompOptions`].
    pub fn with_options(url: impl Into<String>, options: StompOptions) -> Self {
        Self {
            url: url.into(),
            options,
        }
    }
}

#[async_trait]
impl Connector for StompConnector {
    type Transport = StompWebSocketTransport;

    async fn connect(&mut self) -> Result<Self::Transport, BuzzerError> {
        StompWebSocketTransport::connect_with_options(&self.url, self.options.clone()).await
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[cfg(feature = "transport-stomp-websocket")]
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
    use tokio::net::TcpListener;

    type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

    #[test]
    fn host_of_extracts_authority() {
        assert_eq!(host_of("ws://localhost:8080/ws"), "localhost");
        assert_eq!(host_of("wss://game.example.com/ws"), "game.example.com");
    }

    #[test]
    fn stomp_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<StompWebSocketTransport>();
    }

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and returns the address to connect to.
    async fn start_mock_broker<F, Fut>(handler: F) -> String
    where
        F: FnOnce(ServerWs) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    /// Server side of the CONNECT handshake: read the CONNECT frame, reply
    /// CONNECTED.
    async fn accept_stomp(ws: &mut ServerWs) {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => {
                    match StompFrame::parse(&text).unwrap() {
                        ParsedFrame::Frame(frame) => {
                            assert_eq!(frame.command, StompCommand::Connect);
                            assert_eq!(frame.header_value("accept-version"), Some("1.2"));
                            break;
                        }
                        ParsedFrame::Heartbeat => {}
                    }
                }
                other => panic!("expected CONNECT text frame, got {other:?}"),
            }
        }
        let connected = StompFrame::new(StompCommand::Connected)
            .header("version", "1.2")
            .header("heart-beat", "4000,4000");
        ws.send(Message::Text(connected.encode().into()))
            .await
            .unwrap();
    }

    fn message_frame(destination: &str, body: &str) -> Message {
        let frame = StompFrame::new(StompCommand::Message)
            .header("destination", destination)
            .header("subscription", "sub-0")
            .header("message-id", "1")
            .body(body);
        Message::Text(frame.encode().into())
    }

    #[tokio::test]
    async fn connect_performs_stomp_handshake() {
        let url = start_mock_broker(|mut ws| async move {
            accept_stomp(&mut ws).await;
            ws.close(None).await.unwrap();
        })
        .await;

        let transport = StompWebSocketTransport::connect(&url).await.unwrap();
        drop(transport);
    }

    #[tokio::test]
    async fn handshake_error_frame_is_rejected() {
        let url = start_mock_broker(|mut ws| async move {
            let _ = ws.next().await; // CONNECT
            let error = StompFrame::new(StompCommand::Error)
                .header("message", "refused")
                .body("no session for you");
            ws.send(Message::Text(error.encode().into())).await.unwrap();
        })
        .await;

        let err = StompWebSocketTransport::connect(&url).await.unwrap_err();
        match err {
            BuzzerError::Handshake(reason) => assert_eq!(reason, "refused"),
            other => panic!("expected Handshake error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recv_yields_message_frames_with_destination() {
        let url = start_mock_broker(|mut ws| async move {
            accept_stomp(&mut ws).await;
            ws.send(message_frame(
                "/topic/room/AB12",
                r#"{"type":"ROUND_STARTED"}"#,
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = StompWebSocketTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame.destination, "/topic/room/AB12");
        assert_eq!(frame.body, r#"{"type":"ROUND_STARTED"}"#);

        // Clean close after the scripted messages.
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn heartbeat_frames_are_skipped() {
        let url = start_mock_broker(|mut ws| async move {
            accept_stomp(&mut ws).await;
            ws.send(Message::Text("\n".into())).await.unwrap();
            ws.send(message_frame("/topic/room/AB12", "{}")).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = StompWebSocketTransport::connect(&url).await.unwrap();
        let frame = transport.recv().await.unwrap().unwrap();
        assert_eq!(frame.body, "{}");
    }

    #[tokio::test]
    async fn subscribe_issues_ids_and_is_idempotent() {
        let url = start_mock_broker(|mut ws| async move {
            accept_stomp(&mut ws).await;
            // First SUBSCRIBE.
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => match StompFrame::parse(&text).unwrap() {
                    ParsedFrame::Frame(frame) => {
                        assert_eq!(frame.command, StompCommand::Subscribe);
                        assert_eq!(frame.header_value("id"), Some("sub-0"));
                        assert_eq!(
                            frame.header_value("destination"),
                            Some("/topic/room/AB12")
                        );
                    }
                    ParsedFrame::Heartbeat => panic!("expected SUBSCRIBE"),
                },
                other => panic!("unexpected {other:?}"),
            }
            // Then UNSUBSCRIBE (the duplicate subscribe sends nothing).
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => match StompFrame::parse(&text).unwrap() {
                    ParsedFrame::Frame(frame) => {
                        assert_eq!(frame.command, StompCommand::Unsubscribe);
                        assert_eq!(frame.header_value("id"), Some("sub-0"));
                    }
                    ParsedFrame::Heartbeat => panic!("expected UNSUBSCRIBE"),
                },
                other => panic!("unexpected {other:?}"),
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = StompWebSocketTransport::connect(&url).await.unwrap();
        transport.subscribe("/topic/room/AB12").await.unwrap();
        // Idempotent: no second SUBSCRIBE frame for the same destination.
        transport.subscribe("/topic/room/AB12").await.unwrap();
        transport.unsubscribe("/topic/room/AB12").await.unwrap();
        // No-op when not subscribed.
        transport.unsubscribe("/topic/room/NOPE").await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_broker(|mut ws| async move {
            accept_stomp(&mut ws).await;
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = StompWebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();

        let err = transport
            .send("/app/create-room", "{}".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, BuzzerError::TransportClosed));
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let url = start_mock_broker(|mut ws| async move {
            accept_stomp(&mut ws).await;
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = StompWebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let result = StompWebSocketTransport::connect("not-a-valid-url").await;
        let err = result.unwrap_err();
        assert!(matches!(err, BuzzerError::Io(_)));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable address guarantees a timeout.
        let result = StompWebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, BuzzerError::Timeout));
    }
}
