//! Async client for the Quiz Battle buzzer protocol.
//!
//! [`BuzzerClient`] is a thin handle that communicates with a background
//! session loop via an unbounded MPSC channel. The loop owns the transport,
//! the subscription registry, and the reconnect policy; subscribers receive
//! typed [`ServerEvent`]s on per-channel bounded channels, and connection
//! state changes are published on a [`watch`] channel.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = StompConnector::new("ws://localhost:8080/ws");
//! let (client, _state) = BuzzerClient::start(connector, BuzzerConfig::new());
//! client.wait_connected().await?;
//!
//! let mut personal = client.subscribe(PERSONAL_CHANNEL).await?;
//! client.create_room()?;
//!
//! let mut view = RoomView::new(Viewpoint::Host);
//! while let Some(event) = personal.recv().await {
//!     view.apply(&event);
//!     if let Some(code) = &view.projection().room_code {
//!         let mut room = client.subscribe(room_channel(code)).await?;
//!         /* … */
//!     }
//! }
//! ```
//!
//! # Lifecycle
//!
//! Primary game views (host console, player device) own the client and call
//! [`shutdown`](BuzzerClient::shutdown) when navigating away. Auxiliary
//! display-only views sharing a client must only
//! [`unsubscribe`](BuzzerClient::unsubscribe) their own channels — other
//! consumers may still depend on the connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, warn};

use crate::error::{BuzzerError, Result};
use crate::protocol::{ClientCommand, PlayerId, RoomCode, ServerEvent};
use crate::registry::SubscriptionRegistry;
use crate::room::RoomView;
use crate::transport::{Connector, Transport};

/// Default fixed delay between reconnect attempts.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default grace between issuing a subscription and the first intent, so
/// the first server reply cannot race the broker-side registration.
const DEFAULT_SUBSCRIBE_SETTLE: Duration = Duration::from_millis(100);

/// Default capacity of each per-channel event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`BuzzerClient`] session.
///
/// All fields have defaults matching the deployed room engine.
///
/// # Example
///
/// ```
/// use buzzer_client::client::BuzzerConfig;
/// use std::time::Duration;
///
/// let config = BuzzerConfig::new()
///     .with_reconnect_delay(Duration::from_secs(2))
///     .with_event_channel_capacity(512);
/// assert_eq!(config.reconnect_delay, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct BuzzerConfig {
    /// Fixed backoff between reconnect attempts. Defaults to **5 seconds**.
    pub reconnect_delay: Duration,
    /// Grace between a subscribe and the first subsequent intent.
    /// Defaults to **100 ms**.
    pub subscribe_settle: Duration,
    /// Capacity of each per-channel event channel. When a consumer cannot
    /// keep up, events for that channel are dropped (with a warning) to
    /// avoid blocking the session loop. Defaults to **256**; values below
    /// 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown, after which the session task is
    /// aborted. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Consecutive failed connection attempts before the session gives up.
    /// `None` (the default) retries indefinitely.
    pub max_reconnect_attempts: Option<u32>,
}

impl BuzzerConfig {
    /// Configuration with default values.
    pub fn new() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            subscribe_settle: DEFAULT_SUBSCRIBE_SETTLE,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_reconnect_attempts: None,
        }
    }

    /// Set the fixed reconnect backoff delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the subscribe settle grace.
    #[must_use]
    pub fn with_subscribe_settle(mut self, settle: Duration) -> Self {
        self.subscribe_settle = settle;
        self
    }

    /// Set the per-channel event channel capacity (clamped to at least 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Limit the number of consecutive failed connection attempts.
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }
}

impl Default for BuzzerConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ── Connection state ────────────────────────────────────────────────

/// Observable connection state, published on the watch channel returned by
/// [`BuzzerClient::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// First connection attempt in progress.
    Connecting,
    /// Transport is up; subscriptions are attached and intents are accepted.
    Connected,
    /// Transport dropped; retrying after the fixed backoff.
    Reconnecting,
    /// Session has ended (shutdown, or retry limit reached).
    Disconnected,
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal state shared between the client handle and the session loop.
struct ClientState {
    connected: AtomicBool,
}

impl ClientState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
        }
    }
}

// ── Session commands ────────────────────────────────────────────────

enum SessionCommand {
    /// Publish a serialized intent to an application endpoint.
    Dispatch {
        endpoint: &'static str,
        body: String,
    },
    /// Attach a handler to a logical channel; replies with the receiver.
    Subscribe {
        channel: String,
        reply: oneshot::Sender<mpsc::Receiver<ServerEvent>>,
    },
    /// Detach a handler from a logical channel.
    Unsubscribe { channel: String },
}

// ── Client handle ───────────────────────────────────────────────────

/// Async client handle for the Quiz Battle buzzer protocol.
///
/// Created via [`BuzzerClient::start`], which spawns a background session
/// loop and returns this handle together with a connection-state watch
/// receiver.
///
/// Intent methods serialize a [`ClientCommand`] and queue it to the session
/// loop, returning once queued (fire-and-forget): confirmation is always
/// the subsequent matching [`ServerEvent`], never the send call. While the
/// transport is down every intent is rejected locally with
/// [`BuzzerError::NotConnected`] — no network round-trip is attempted.
pub struct BuzzerClient {
    /// Sender half of the command channel to the session loop.
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    /// Shared state updated by the session loop.
    state: Arc<ClientState>,
    /// Connection-state notifications (cloned for `wait_connected`).
    state_rx: watch::Receiver<ConnectionState>,
    /// Handle to the background session task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal a graceful shutdown.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
    /// Grace between subscribe and the first subsequent intent.
    settle: Duration,
}

impl BuzzerClient {
    /// Start the session loop and return a handle plus a connection-state
    /// watch receiver.
    ///
    /// The loop connects through the given [`Connector`], re-attaching
    /// every registered channel after each reconnect *before* accepting
    /// outbound intents again.
    #[must_use = "the watch receiver reports connection state changes"]
    pub fn start<C: Connector>(
        connector: C,
        config: BuzzerConfig,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<SessionCommand>();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(ClientState::new());
        let loop_state = Arc::clone(&state);

        let shutdown_timeout = config.shutdown_timeout;
        let settle = config.subscribe_settle;

        let task = tokio::spawn(session_loop(
            connector,
            cmd_rx,
            loop_state,
            state_tx,
            shutdown_rx,
            config,
        ));

        let client = Self {
            cmd_tx,
            state,
            state_rx: state_rx.clone(),
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
            settle,
        };

        (client, state_rx)
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Attach a handler to a logical channel and return its event receiver.
    ///
    /// Subscribing twice to the same channel replaces the previous handler
    /// (its receiver closes) rather than stacking. The returned future
    /// resolves only after the subscription has been issued and the settle
    /// grace has elapsed, so an intent sent immediately afterwards cannot
    /// race the broker-side registration and lose the first reply.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] if the session has ended.
    pub async fn subscribe(&self, channel: impl Into<String>) -> Result<mpsc::Receiver<ServerEvent>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::Subscribe {
                channel: channel.into(),
                reply: reply_tx,
            })
            .map_err(|_| BuzzerError::NotConnected)?;
        let rx = reply_rx.await.map_err(|_| BuzzerError::NotConnected)?;
        tokio::time::sleep(self.settle).await;
        Ok(rx)
    }

    /// Detach a handler from a logical channel. A no-op when not
    /// subscribed. Auxiliary views use this to drop only their own
    /// subscription while the shared connection stays up.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] if the session has ended.
    pub fn unsubscribe(&self, channel: impl Into<String>) -> Result<()> {
        self.cmd_tx
            .send(SessionCommand::Unsubscribe {
                channel: channel.into(),
            })
            .map_err(|_| BuzzerError::NotConnected)
    }

    // ── Intents ─────────────────────────────────────────────────────

    /// Create (or reclaim) a room as host.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] while the transport is down.
    pub fn create_room(&self) -> Result<()> {
        self.dispatch(ClientCommand::CreateRoom {
            user_id: None,
            force_new: false,
        })
    }

    /// Create a room on behalf of a specific host account. `force_new`
    /// skips reclaiming an existing room.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] while the transport is down.
    pub fn create_room_as(&self, user_id: impl Into<String>, force_new: bool) -> Result<()> {
        self.dispatch(ClientCommand::CreateRoom {
            user_id: Some(user_id.into()),
            force_new,
        })
    }

    /// Add a player to the roster (host only).
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] while the transport is down.
    pub fn add_player(
        &self,
        room_code: &RoomCode,
        player_name: impl Into<String>,
        avatar: impl Into<String>,
    ) -> Result<()> {
        self.dispatch(ClientCommand::AddPlayer {
            room_code: room_code.clone(),
            player_name: player_name.into(),
            avatar: avatar.into(),
        })
    }

    /// Bind this session to an existing roster entry.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] while the transport is down.
    pub fn join_room(&self, room_code: &RoomCode, player_id: impl Into<PlayerId>) -> Result<()> {
        self.dispatch(ClientCommand::JoinRoom {
            room_code: room_code.clone(),
            player_id: player_id.into(),
        })
    }

    /// Remove a player from the roster (host only).
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] while the transport is down.
    pub fn remove_player(&self, room_code: &RoomCode, player_id: impl Into<PlayerId>) -> Result<()> {
        self.dispatch(ClientCommand::RemovePlayer {
            room_code: room_code.clone(),
            player_id: player_id.into(),
        })
    }

    /// Open a round.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] while the transport is down.
    pub fn start_round(&self, room_code: &RoomCode) -> Result<()> {
        self.dispatch(ClientCommand::StartRound {
            room_code: room_code.clone(),
        })
    }

    /// Press the buzzer on behalf of the given view's player.
    ///
    /// Captures the local timestamp at the moment of the call and includes
    /// it in the payload for latency diagnostics only — the winner is
    /// determined exclusively by the room engine. The press is suppressed
    /// locally (`Ok(false)`, nothing sent) when the round is not open, the
    /// player already pressed, the player is stunned, or the viewpoint has
    /// no player; the engine remains the enforcement point.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::RoomUnknown`] before a room code is known and
    /// [`BuzzerError::NotConnected`] while the transport is down.
    pub fn press_button(&self, view: &RoomView) -> Result<bool> {
        let Some(room_code) = view.projection().room_code.clone() else {
            return Err(BuzzerError::RoomUnknown);
        };
        if !view.may_press() {
            debug!("press suppressed locally");
            return Ok(false);
        }
        let Some(player_id) = view.self_id().map(str::to_string) else {
            return Ok(false);
        };
        self.dispatch(ClientCommand::PressButton {
            room_code,
            player_id,
            client_timestamp: unix_millis(),
        })?;
        Ok(true)
    }

    /// Return the room to `WAITING` for a fresh question.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] while the transport is down.
    pub fn reset_round(&self, room_code: &RoomCode) -> Result<()> {
        self.dispatch(ClientCommand::ResetRound {
            room_code: room_code.clone(),
        })
    }

    /// Request a full authoritative snapshot, delivered as a `ROOM_STATE`
    /// event on the personal channel. Used to resynchronize after a
    /// reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] while the transport is down.
    pub fn request_room_state(&self, room_code: &RoomCode) -> Result<()> {
        self.dispatch(ClientCommand::GetRoomState {
            room_code: room_code.clone(),
        })
    }

    /// Exclude a player from the current round (host only).
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] while the transport is down.
    pub fn stun_player(&self, room_code: &RoomCode, player_id: impl Into<PlayerId>) -> Result<()> {
        self.dispatch(ClientCommand::StunPlayer {
            room_code: room_code.clone(),
            player_id: player_id.into(),
        })
    }

    /// Advance the auxiliary chapter/part display.
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] while the transport is down.
    pub fn update_chapter(&self, room_code: &RoomCode, chapter: u32, part: u32) -> Result<()> {
        self.dispatch(ClientCommand::UpdateChapter {
            room_code: room_code.clone(),
            chapter,
            part,
        })
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Returns `true` if the transport is believed to be connected.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Wait until the session reports [`ConnectionState::Connected`].
    ///
    /// # Errors
    ///
    /// Returns [`BuzzerError::NotConnected`] if the session ends first.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut rx = self.state_rx.clone();
        rx.wait_for(|s| *s == ConnectionState::Connected)
            .await
            .map_err(|_| BuzzerError::NotConnected)?;
        Ok(())
    }

    /// Shut down the client, closing the transport and stopping the
    /// background task. Full teardown for primary game views.
    pub async fn shutdown(&mut self) {
        debug!("BuzzerClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the session loop with a timeout. If it doesn't exit in
        // time, abort it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Serialize and queue an intent to the session loop.
    fn dispatch(&self, command: ClientCommand) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(BuzzerError::NotConnected);
        }
        let endpoint = command.endpoint();
        let body = serde_json::to_string(&command)?;
        self.cmd_tx
            .send(SessionCommand::Dispatch { endpoint, body })
            .map_err(|_| BuzzerError::NotConnected)
    }
}

impl std::fmt::Debug for BuzzerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuzzerClient")
            .field("connected", &self.is_connected())
            .field("state", &*self.state_rx.borrow())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for BuzzerClient {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the session loop future to be dropped immediately. The
        // `shutdown_tx` oneshot is intentionally *not* sent here: sending
        // it would trigger a graceful path that calls async
        // `transport.close()`, but there is no executor context to drive
        // it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Milliseconds since the Unix epoch, for press-latency diagnostics.
fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ── Session loop ────────────────────────────────────────────────────

/// Why a single connection's drive loop ended.
enum ConnExit {
    /// Shutdown requested or the handle was dropped.
    Shutdown,
    /// Transport failed or closed; reconnect after backoff.
    Lost,
}

/// Background session loop: connects, restores subscriptions, multiplexes
/// commands and inbound frames, reconnects with a fixed backoff.
async fn session_loop<C: Connector>(
    mut connector: C,
    mut cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    state: Arc<ClientState>,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: oneshot::Receiver<()>,
    config: BuzzerConfig,
) {
    debug!("session loop started");

    let mut registry = SubscriptionRegistry::new(config.event_channel_capacity);
    let mut failed_attempts: u32 = 0;

    'session: loop {
        let connect_result = tokio::select! {
            result = connector.connect() => result,
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received while connecting");
                break 'session;
            }
        };

        let exit = match connect_result {
            Ok(mut transport) => {
                // Re-attach every registered channel on the fresh transport
                // BEFORE accepting outbound intents — events racing the
                // reconnect window would otherwise be silently lost.
                match restore_subscriptions(&mut transport, &registry).await {
                    Ok(()) => {
                        failed_attempts = 0;
                        state.connected.store(true, Ordering::Release);
                        let _ = state_tx.send(ConnectionState::Connected);

                        let exit = drive_connection(
                            &mut transport,
                            &mut cmd_rx,
                            &mut registry,
                            &mut shutdown_rx,
                        )
                        .await;

                        state.connected.store(false, Ordering::Release);
                        exit
                    }
                    Err(e) => {
                        warn!("failed to restore subscriptions: {e}");
                        ConnExit::Lost
                    }
                }
            }
            Err(e) => {
                warn!("connect attempt failed: {e}");
                ConnExit::Lost
            }
        };

        match exit {
            ConnExit::Shutdown => break 'session,
            ConnExit::Lost => {
                failed_attempts += 1;
                if let Some(max) = config.max_reconnect_attempts {
                    if failed_attempts > max {
                        error!("giving up after {failed_attempts} failed connection attempts");
                        break 'session;
                    }
                }
                let _ = state_tx.send(ConnectionState::Reconnecting);
                tokio::select! {
                    _ = tokio::time::sleep(config.reconnect_delay) => {}
                    _ = &mut shutdown_rx => {
                        debug!("shutdown signal received during backoff");
                        break 'session;
                    }
                }
            }
        }
    }

    state.connected.store(false, Ordering::Release);
    let _ = state_tx.send(ConnectionState::Disconnected);
    debug!("session loop exited");
}

/// Re-issue a bus subscription for every channel in the registry.
async fn restore_subscriptions(
    transport: &mut impl Transport,
    registry: &SubscriptionRegistry,
) -> Result<()> {
    for channel in registry.channels() {
        debug!(%channel, "restoring subscription");
        transport.subscribe(channel).await?;
    }
    Ok(())
}

/// Multiplex commands, shutdown, and inbound frames over one live
/// transport until it fails or the session ends.
async fn drive_connection(
    transport: &mut impl Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<SessionCommand>,
    registry: &mut SubscriptionRegistry,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> ConnExit {
    loop {
        tokio::select! {
            // Branch 1: command from the client handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(SessionCommand::Dispatch { endpoint, body }) => {
                        debug!(%endpoint, "dispatching intent");
                        if let Err(e) = transport.send(endpoint, body).await {
                            error!("transport send error: {e}");
                            return ConnExit::Lost;
                        }
                    }
                    Some(SessionCommand::Subscribe { channel, reply }) => {
                        let rx = registry.attach(channel.clone());
                        // Reply before issuing the frame: even if the
                        // SUBSCRIBE is lost with the connection, the
                        // registry re-attaches the channel on reconnect.
                        let _ = reply.send(rx);
                        if let Err(e) = transport.subscribe(&channel).await {
                            error!(%channel, "subscribe failed: {e}");
                            return ConnExit::Lost;
                        }
                    }
                    Some(SessionCommand::Unsubscribe { channel }) => {
                        if registry.detach(&channel) {
                            if let Err(e) = transport.unsubscribe(&channel).await {
                                error!(%channel, "unsubscribe failed: {e}");
                                return ConnExit::Lost;
                            }
                        }
                    }
                    // Command channel closed — client handle dropped.
                    None => {
                        debug!("command channel closed, shutting down session loop");
                        let _ = transport.close().await;
                        return ConnExit::Shutdown;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                return ConnExit::Shutdown;
            }

            // Branch 3: inbound frame from the bus
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(frame)) => {
                        match serde_json::from_str::<ServerEvent>(&frame.body) {
                            Ok(event) => registry.route(&frame.destination, event),
                            Err(e) => {
                                warn!(
                                    channel = %frame.destination,
                                    "failed to deserialize server event: {e} — raw: {}",
                                    frame.body
                                );
                            }
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return ConnExit::Lost;
                    }
                    // Transport closed by the server.
                    None => {
                        debug!("transport closed by server");
                        return ConnExit::Lost;
                    }
                }
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::transport::Frame;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// A mock transport that records traffic and replays scripted frames.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<Frame, BuzzerError>>>,
        sent: Arc<StdMutex<Vec<(String, String)>>>,
        subscribed: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(
            &mut self,
            destination: &str,
            body: String,
        ) -> std::result::Result<(), BuzzerError> {
            self.sent.lock().unwrap().push((destination.to_string(), body));
            Ok(())
        }

        async fn subscribe(&mut self, destination: &str) -> std::result::Result<(), BuzzerError> {
            self.subscribed.lock().unwrap().push(destination.to_string());
            Ok(())
        }

        async fn unsubscribe(&mut self, _destination: &str) -> std::result::Result<(), BuzzerError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<Frame, BuzzerError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // All scripted frames delivered — hang forever so the
                // session loop stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), BuzzerError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    struct MockConnector {
        transports: VecDeque<MockTransport>,
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&mut self) -> std::result::Result<MockTransport, BuzzerError> {
            match self.transports.pop_front() {
                Some(transport) => Ok(transport),
                // Out of scripted transports — hang until shutdown.
                None => std::future::pending().await,
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn mock_connector(
        incoming: Vec<Option<std::result::Result<Frame, BuzzerError>>>,
    ) -> (
        MockConnector,
        Arc<StdMutex<Vec<(String, String)>>>,
        Arc<StdMutex<Vec<String>>>,
        Arc<AtomicBool>,
    ) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let subscribed = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = MockTransport {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            subscribed: Arc::clone(&subscribed),
            closed: Arc::clone(&closed),
        };
        (
            MockConnector {
                transports: VecDeque::from([transport]),
            },
            sent,
            subscribed,
            closed,
        )
    }

    fn fast_config() -> BuzzerConfig {
        BuzzerConfig::new()
            .with_subscribe_settle(Duration::from_millis(1))
            .with_reconnect_delay(Duration::from_millis(10))
    }

    // ── Config ──────────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let config = BuzzerConfig::new();
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.subscribe_settle, Duration::from_millis(100));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert!(config.max_reconnect_attempts.is_none());
    }

    #[test]
    fn config_builder_methods() {
        let config = BuzzerConfig::new()
            .with_event_channel_capacity(512)
            .with_shutdown_timeout(Duration::from_secs(5))
            .with_max_reconnect_attempts(3);
        assert_eq!(config.event_channel_capacity, 512);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, Some(3));
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = BuzzerConfig::new().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    #[tokio::test]
    async fn connects_and_reports_connected() {
        let (connector, _sent, _subs, _closed) = mock_connector(vec![]);
        let (mut client, state_rx) = BuzzerClient::start(connector, fast_config());

        client.wait_connected().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(*state_rx.borrow(), ConnectionState::Connected);

        client.shutdown().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn intents_rejected_before_connected() {
        // A connector that never yields keeps the session in Connecting.
        let connector = MockConnector {
            transports: VecDeque::new(),
        };
        let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());

        let result = client.create_room();
        assert!(matches!(result, Err(BuzzerError::NotConnected)));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn intents_rejected_after_shutdown() {
        let (connector, _sent, _subs, _closed) = mock_connector(vec![]);
        let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());

        client.wait_connected().await.unwrap();
        client.shutdown().await;

        let result = client.start_round(&RoomCode::new("AB12"));
        assert!(matches!(result, Err(BuzzerError::NotConnected)));
    }

    #[tokio::test]
    async fn shutdown_closes_transport_and_reports_disconnected() {
        let (connector, _sent, _subs, closed) = mock_connector(vec![]);
        let (mut client, state_rx) = BuzzerClient::start(connector, fast_config());

        client.wait_connected().await.unwrap();
        client.shutdown().await;

        assert!(closed.load(Ordering::Relaxed));
        assert_eq!(*state_rx.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (connector, _sent, _subs, _closed) = mock_connector(vec![]);
        let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());

        client.wait_connected().await.unwrap();
        client.shutdown().await;
        client.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (connector, _sent, _subs, _closed) = mock_connector(vec![]);
        let (client, state_rx) = BuzzerClient::start(connector, fast_config());

        client.wait_connected().await.unwrap();
        drop(client);

        // The aborted task must not leave the watch in Connected forever;
        // we only verify nothing hangs or panics here.
        drop(state_rx);
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (connector, _sent, _subs, _closed) = mock_connector(vec![]);
        let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());

        client.wait_connected().await.unwrap();
        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("BuzzerClient"));
        assert!(debug_str.contains("connected"));

        client.shutdown().await;
    }

    // ── Dispatch ────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_room_publishes_to_endpoint() {
        let (connector, sent, _subs, _closed) = mock_connector(vec![]);
        let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());

        client.wait_connected().await.unwrap();
        client.create_room().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].0, "/app/create-room");
            let body: serde_json::Value = serde_json::from_str(&messages[0].1).unwrap();
            assert_eq!(body, serde_json::json!({ "forceNew": false }));
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn subscribe_is_issued_before_subsequent_intent() {
        let (connector, sent, subscribed, _closed) = mock_connector(vec![]);
        let (mut client, _state_rx) = BuzzerClient::start(connector, fast_config());

        client.wait_connected().await.unwrap();
        let _personal = client.subscribe(crate::protocol::PERSONAL_CHANNEL).await.unwrap();
        client.create_room().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            subscribed.lock().unwrap().as_slice(),
            ["/user/queue/personal"]
        );
        assert_eq!(sent.lock().unwrap().len(), 1);

        client.shutdown().await;
    }
}
