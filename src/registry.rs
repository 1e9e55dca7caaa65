//! Subscription registry: logical channels mapped to typed event handlers.
//!
//! The registry is the single place that knows which channels a session is
//! attached to. Inbound frames are routed to exactly the handler registered
//! for their originating channel, and after a reconnect the session loop
//! walks [`channels`](SubscriptionRegistry::channels) to re-attach every
//! registered channel on the fresh transport before accepting outbound
//! intents again — events racing the reconnect window would otherwise be
//! silently lost.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::ServerEvent;

/// Maps logical channel names to per-channel event senders.
///
/// Handlers are bounded [`mpsc`] channels: a consumer that cannot keep up
/// has events dropped (with a warning) rather than stalling the session
/// loop.
pub struct SubscriptionRegistry {
    capacity: usize,
    subs: HashMap<String, mpsc::Sender<ServerEvent>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry whose handlers buffer up to `capacity`
    /// events. Values below 1 are clamped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subs: HashMap::new(),
        }
    }

    /// Attach a handler to `channel`, returning the receiving half.
    ///
    /// Attaching twice to the same channel REPLACES the previous handler —
    /// its receiver sees the channel close — rather than stacking handlers.
    pub fn attach(&mut self, channel: impl Into<String>) -> mpsc::Receiver<ServerEvent> {
        let channel = channel.into();
        let (tx, rx) = mpsc::channel(self.capacity);
        if self.subs.insert(channel.clone(), tx).is_some() {
            debug!(%channel, "replacing existing subscription handler");
        }
        rx
    }

    /// Detach the handler for `channel`. Returns `false` (a no-op) when the
    /// channel was not registered.
    pub fn detach(&mut self, channel: &str) -> bool {
        self.subs.remove(channel).is_some()
    }

    /// `true` if a handler is registered for `channel`.
    pub fn is_attached(&self, channel: &str) -> bool {
        self.subs.contains_key(channel)
    }

    /// Registered channel names, for re-attachment after a reconnect.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.subs.keys().map(String::as_str)
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.subs.len()
    }

    /// `true` when no channels are registered.
    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// Route an event to the handler registered for its originating
    /// channel. Events for unregistered channels are dropped; a full
    /// handler drops the event with a warning instead of blocking.
    pub fn route(&self, channel: &str, event: ServerEvent) {
        let Some(tx) = self.subs.get(channel) else {
            debug!(%channel, "no handler registered, dropping event");
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    %channel,
                    "handler channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(%channel, "handler receiver dropped");
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

    fn round_started() -> ServerEvent {
        ServerEvent::RoundStarted
    }

    #[test]
    fn routes_to_registered_channel_only() {
        let mut registry = SubscriptionRegistry::new(8);
        let mut personal = registry.attach("/user/queue/personal");
        let mut room = registry.attach("/topic/room/AB12");

        registry.route("/topic/room/AB12", round_started());

        assert_eq!(room.try_recv().unwrap(), ServerEvent::RoundStarted);
        assert!(personal.try_recv().is_err());
    }

    #[test]
    fn unregistered_channel_drops_event() {
        let registry = SubscriptionRegistry::new(8);
        // Must not panic or block.
        registry.route("/topic/room/NOPE", round_started());
    }

    #[test]
    fn attach_twice_replaces_handler() {
        let mut registry = SubscriptionRegistry::new(8);
        let mut first = registry.attach("/topic/room/AB12");
        let mut second = registry.attach("/topic/room/AB12");

        registry.route("/topic/room/AB12", round_started());

        // The first receiver observes a closed channel, not the event.
        assert!(matches!(
            first.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(second.try_recv().unwrap(), ServerEvent::RoundStarted);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn detach_is_noop_when_absent() {
        let mut registry = SubscriptionRegistry::new(8);
        assert!(!registry.detach("/topic/room/AB12"));
        let _rx = registry.attach("/topic/room/AB12");
        assert!(registry.detach("/topic/room/AB12"));
        assert!(registry.is_empty());
    }

    #[test]
    fn full_handler_drops_instead_of_blocking() {
        let mut registry = SubscriptionRegistry::new(1);
        let mut rx = registry.attach("/topic/room/AB12");

        registry.route("/topic/room/AB12", round_started());
        // Second event overflows the single-slot buffer and is dropped.
        registry.route("/topic/room/AB12", round_started());

        assert_eq!(rx.try_recv().unwrap(), ServerEvent::RoundStarted);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn capacity_is_clamped_to_one() {
        let mut registry = SubscriptionRegistry::new(0);
        let mut rx = registry.attach("/x");
        registry.route("/x", round_started());
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::RoundStarted);
    }

    #[test]
    fn channels_enumerates_registrations() {
        let mut registry = SubscriptionRegistry::new(8);
        let _a = registry.attach("/user/queue/personal");
        let _b = registry.attach("/topic/room/AB12");
        let mut names: Vec<&str> = registry.channels().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["/topic/room/AB12", "/user/queue/personal"]);
    }
}
