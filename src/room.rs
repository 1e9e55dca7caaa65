//! Room-state reducer: folds the inbound event stream into a local
//! projection of the authoritative room.
//!
//! [`RoomProjection::apply`] is a pure transition function — no I/O, no
//! timers, no optimistic guesses. Transitions are driven exclusively by
//! [`ServerEvent`]s, so the reducer can be tested by feeding it an event
//! sequence without a live transport. Host, player, and screen views each
//! hold their own [`RoomView`] over the same reducer core; only the derived
//! display differs by [`Viewpoint`].
//!
//! Reconciliation policy for the at-least-once, cross-channel-unordered
//! bus:
//! - `ROOM_STATE` is the authoritative tie-breaker: it unconditionally
//!   replaces the entire projection, so a stale incremental event can never
//!   resurrect state a newer snapshot overwrote.
//! - Roster-bearing events carry the full player set and replace the local
//!   roster wholesale; the reducer never invents or removes players on its
//!   own.
//! - Duplicate deliveries are idempotent by construction (set inserts,
//!   wholesale replacement, absorbing phase transitions).

use std::collections::{BTreeMap, BTreeSet};

use crate::protocol::{GamePhase, PlayerId, PlayerInfo, RoomCode, ServerEvent, Winner};

// ── Projection ──────────────────────────────────────────────────────

/// Locally held projection of one room.
///
/// At most one winner is recorded at a time; it is cleared exactly on
/// `ROUND_RESET` or a fresh `ROUND_STARTED`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomProjection {
    /// Assigned room code, once known.
    pub room_code: Option<RoomCode>,
    /// Current round phase.
    pub phase: GamePhase,
    /// Full roster, in server order.
    pub players: Vec<PlayerInfo>,
    /// Declared winner of the current round, if any.
    pub winner: Option<Winner>,
    /// Players whose press has been acknowledged this round.
    pub pressed: BTreeSet<PlayerId>,
    /// Auxiliary chapter number for the screen projection.
    pub chapter: Option<u32>,
    /// Auxiliary part number for the screen projection.
    pub part: Option<u32>,
    /// Transient server-declared error text. Cleared by the presentation
    /// layer after its display window via [`clear_notice`](Self::clear_notice).
    pub notice: Option<String>,
}

impl RoomProjection {
    /// Empty `WAITING` projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one inbound event, producing the next projection in place.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::RoomCreated { room_code } => {
                self.room_code = Some(room_code.clone());
            }

            ServerEvent::PlayerJoined {
                players, game_state, ..
            } => {
                if let Some(roster) = players {
                    self.players = roster.clone();
                }
                self.phase = *game_state;
            }

            ServerEvent::PlayerLeft { players, .. } => {
                if let Some(roster) = players {
                    self.players = roster.clone();
                }
            }

            ServerEvent::RoundStarted => {
                self.phase = GamePhase::Active;
                self.winner = None;
                self.pressed.clear();
            }

            ServerEvent::ButtonPressed {
                game_state,
                winner_id,
                winner_name,
                winner_avatar,
                button_presses,
                ..
            } => {
                self.phase = *game_state;
                self.record_presses(button_presses.iter().map(|p| p.player_id.clone()));
                if let Some(id) = winner_id {
                    // Winner riding on a press acknowledgment is the legacy
                    // alias of ROUND_ENDED; same effect.
                    self.declare_winner(id.clone(), winner_name.clone(), winner_avatar.clone());
                }
            }

            ServerEvent::RoundEnded {
                winner_id,
                winner_name,
                winner_avatar,
                button_presses,
            } => {
                self.phase = GamePhase::RoundEnded;
                self.record_presses(button_presses.iter().map(|p| p.player_id.clone()));
                if let Some(id) = winner_id {
                    self.declare_winner(id.clone(), winner_name.clone(), winner_avatar.clone());
                }
            }

            ServerEvent::RoundReset { players } => {
                self.phase = GamePhase::Waiting;
                self.winner = None;
                self.pressed.clear();
                if let Some(roster) = players {
                    self.players = roster.clone();
                }
            }

            ServerEvent::RoomState {
                room_code,
                players,
                game_state,
                winner_id,
                winner_name,
                winner_avatar,
                button_presses,
                chapter,
                part,
            } => {
                // Full snapshot: replace the whole projection. The room
                // code is identity rather than state and is kept when the
                // payload omits it.
                if let Some(code) = room_code {
                    self.room_code = Some(code.clone());
                }
                self.players = players.clone();
                self.phase = *game_state;
                self.winner = None;
                self.pressed.clear();
                self.record_presses(button_presses.iter().map(|p| p.player_id.clone()));
                if let Some(id) = winner_id {
                    self.declare_winner(id.clone(), winner_name.clone(), winner_avatar.clone());
                }
                self.chapter = *chapter;
                self.part = *part;
                self.notice = None;
            }

            ServerEvent::ChapterUpdated { chapter, part } => {
                self.chapter = Some(*chapter);
                self.part = Some(*part);
            }

            ServerEvent::Error { error } => {
                self.notice = Some(error.clone());
            }
        }
    }

    /// Look up a roster entry by id.
    pub fn player(&self, id: &str) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Whether a press has been acknowledged for `id` this round.
    pub fn has_pressed(&self, id: &str) -> bool {
        self.pressed.contains(id)
    }

    /// Roster grouped by team for the screen layout. Players without a
    /// team land in team 0.
    pub fn players_by_team(&self) -> BTreeMap<u32, Vec<&PlayerInfo>> {
        let mut teams: BTreeMap<u32, Vec<&PlayerInfo>> = BTreeMap::new();
        for player in &self.players {
            teams.entry(player.team_id.unwrap_or(0)).or_default().push(player);
        }
        teams
    }

    /// Clear the transient error notice once its display window elapses.
    pub fn clear_notice(&mut self) {
        self.notice = None;
    }

    fn record_presses(&mut self, ids: impl Iterator<Item = PlayerId>) {
        self.pressed.extend(ids);
    }

    fn declare_winner(&mut self, id: PlayerId, name: Option<String>, avatar: Option<String>) {
        // A declared winner always terminates the round, whatever phase the
        // carrying payload claimed.
        self.phase = GamePhase::RoundEnded;
        self.pressed.insert(id.clone());
        self.winner = Some(Winner { id, name, avatar });
    }
}

// ── Views ───────────────────────────────────────────────────────────

/// Who is looking at the projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewpoint {
    /// The moderator's console.
    Host,
    /// A player's device; carries that player's id.
    Player(PlayerId),
    /// The public screen display.
    Screen,
}

/// Per-viewer buzzer state, derived from phase, winner, and "have I
/// pressed". Recomputed on every read — never cached — so it cannot drift
/// from the projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonMode {
    /// No round is open.
    Waiting,
    /// The round is open and this viewer has not pressed yet.
    Armed,
    /// This viewer is the declared winner.
    Won,
    /// Someone else won, or this viewer's press did not win.
    Lost,
}

/// One viewer's handle on the shared reducer core.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomView {
    viewpoint: Viewpoint,
    projection: RoomProjection,
}

impl RoomView {
    /// Fresh view over an empty projection.
    pub fn new(viewpoint: Viewpoint) -> Self {
        Self {
            viewpoint,
            projection: RoomProjection::new(),
        }
    }

    /// Feed one inbound event into the shared reducer core.
    pub fn apply(&mut self, event: &ServerEvent) {
        self.projection.apply(event);
    }

    /// The underlying projection.
    pub fn projection(&self) -> &RoomProjection {
        &self.projection
    }

    /// Mutable access for presentation-layer concerns (notice expiry).
    pub fn projection_mut(&mut self) -> &mut RoomProjection {
        &mut self.projection
    }

    /// This view's viewpoint.
    pub fn viewpoint(&self) -> &Viewpoint {
        &self.viewpoint
    }

    /// The viewer's own player id, when the viewpoint is a player.
    pub fn self_id(&self) -> Option<&str> {
        match &self.viewpoint {
            Viewpoint::Player(id) => Some(id),
            Viewpoint::Host | Viewpoint::Screen => None,
        }
    }

    /// The viewer's own roster entry, when present.
    pub fn self_player(&self) -> Option<&PlayerInfo> {
        self.self_id().and_then(|id| self.projection.player(id))
    }

    /// `true` when this viewer is the declared winner.
    pub fn is_winner(&self) -> bool {
        match (self.self_id(), &self.projection.winner) {
            (Some(id), Some(winner)) => winner.id == id,
            _ => false,
        }
    }

    /// `true` when this viewer's press has been acknowledged this round.
    pub fn has_pressed(&self) -> bool {
        self.self_id()
            .is_some_and(|id| self.projection.has_pressed(id))
    }

    /// Current buzzer mode for this viewer.
    pub fn button_mode(&self) -> ButtonMode {
        let winner_declared = self.projection.winner.is_some();
        match self.projection.phase {
            GamePhase::Waiting => ButtonMode::Waiting,
            GamePhase::Active => {
                if self.has_pressed() {
                    ButtonMode::Lost
                } else {
                    ButtonMode::Armed
                }
            }
            GamePhase::RoundEnded => {
                if self.is_winner() {
                    ButtonMode::Won
                } else if winner_declared || self.has_pressed() {
                    ButtonMode::Lost
                } else {
                    // Round ended without a winner and this viewer never
                    // pressed.
                    ButtonMode::Waiting
                }
            }
        }
    }

    /// Whether a local press attempt should be sent at all.
    ///
    /// A stunned player's press is suppressed client-side as a courtesy
    /// before it reaches the wire; the engine remains the enforcement
    /// point.
    pub fn may_press(&self) -> bool {
        if self.projection.phase != GamePhase::Active || self.has_pressed() {
            return false;
        }
        match self.self_player() {
            Some(me) => !me.stunned,
            // Unknown roster entry or non-player viewpoint: nothing to send.
            None => false,
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

    fn player(id: &str, stunned: bool) -> PlayerInfo {
        PlayerInfo {
            id: id.into(),
            name: format!("Player {id}"),
            avatar: Some("🦊".into()),
            team_id: None,
            connected: true,
            stunned,
        }
    }

    fn roster_event(ids: &[&str]) -> ServerEvent {
        ServerEvent::PlayerJoined {
            players: Some(ids.iter().map(|id| player(id, false)).collect()),
            game_state: GamePhase::Waiting,
            player_id: None,
            player_name: None,
            avatar: None,
        }
    }

    fn winning_press(winner: &str) -> ServerEvent {
        ServerEvent::ButtonPressed {
            game_state: GamePhase::RoundEnded,
            winner_id: Some(winner.into()),
            winner_name: Some(format!("Player {winner}")),
            winner_avatar: Some("🦊".into()),
            button_presses: vec![],
            player_id: Some(winner.into()),
        }
    }

    #[test]
    fn room_created_records_code() {
        let mut room = RoomProjection::new();
        room.apply(&ServerEvent::RoomCreated {
            room_code: RoomCode::new("ab12"),
        });
        assert_eq!(room.room_code.as_ref().unwrap().as_str(), "AB12");
        assert_eq!(room.phase, GamePhase::Waiting);
    }

    #[test]
    fn round_started_clears_winner_and_presses() {
        let mut room = RoomProjection::new();
        room.apply(&roster_event(&["p1", "p2"]));
        room.apply(&ServerEvent::RoundStarted);
        room.apply(&winning_press("p1"));
        assert!(room.winner.is_some());

        room.apply(&ServerEvent::RoundStarted);
        assert_eq!(room.phase, GamePhase::Active);
        assert!(room.winner.is_none());
        assert!(room.pressed.is_empty());
    }

    #[test]
    fn non_winning_press_only_sets_flag() {
        let mut room = RoomProjection::new();
        room.apply(&roster_event(&["p1", "p2"]));
        room.apply(&ServerEvent::RoundStarted);
        room.apply(&ServerEvent::ButtonPressed {
            game_state: GamePhase::Active,
            winner_id: None,
            winner_name: None,
            winner_avatar: None,
            button_presses: vec![crate::protocol::ButtonPressInfo {
                player_id: "p2".into(),
                timestamp: 1_700_000_000_000,
                position: Some(1),
            }],
            player_id: Some("p2".into()),
        });

        assert_eq!(room.phase, GamePhase::Active);
        assert!(room.winner.is_none());
        assert!(room.has_pressed("p2"));
        assert!(!room.has_pressed("p1"));
    }

    #[test]
    fn winner_forces_round_ended() {
        let mut room = RoomProjection::new();
        room.apply(&ServerEvent::RoundStarted);
        // Payload claims ACTIVE but carries a winner; the declaration wins.
        room.apply(&ServerEvent::ButtonPressed {
            game_state: GamePhase::Active,
            winner_id: Some("p1".into()),
            winner_name: None,
            winner_avatar: None,
            button_presses: vec![],
            player_id: Some("p1".into()),
        });
        assert_eq!(room.phase, GamePhase::RoundEnded);
        assert!(room.has_pressed("p1"));
    }

    #[test]
    fn reset_while_round_ended_returns_to_waiting() {
        let mut room = RoomProjection::new();
        room.apply(&roster_event(&["p1"]));
        room.apply(&ServerEvent::RoundStarted);
        room.apply(&winning_press("p1"));
        assert_eq!(room.phase, GamePhase::RoundEnded);

        room.apply(&ServerEvent::RoundReset {
            players: Some(vec![player("p1", false)]),
        });
        assert_eq!(room.phase, GamePhase::Waiting);
        assert!(room.winner.is_none());
        assert!(room.pressed.is_empty());
        assert_eq!(room.players.len(), 1);
    }

    #[test]
    fn reset_without_roster_keeps_players() {
        let mut room = RoomProjection::new();
        room.apply(&roster_event(&["p1", "p2"]));
        room.apply(&ServerEvent::RoundReset { players: None });
        assert_eq!(room.players.len(), 2);
    }

    #[test]
    fn overlapping_rosters_last_payload_wins() {
        let mut room = RoomProjection::new();
        room.apply(&roster_event(&["p1", "p2"]));
        room.apply(&roster_event(&["p2", "p3"]));
        let ids: Vec<&str> = room.players.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p3"]);
    }

    #[test]
    fn snapshot_overwrites_everything() {
        let mut drifted = RoomProjection::new();
        drifted.apply(&roster_event(&["p1", "p2", "p3"]));
        drifted.apply(&ServerEvent::RoundStarted);
        drifted.apply(&winning_press("p3"));
        drifted.apply(&ServerEvent::Error {
            error: "stale".into(),
        });

        let snapshot = ServerEvent::RoomState {
            room_code: Some(RoomCode::new("AB12")),
            players: vec![player("p1", false), player("p2", false)],
            game_state: GamePhase::Active,
            winner_id: None,
            winner_name: None,
            winner_avatar: None,
            button_presses: vec![],
            chapter: Some(3),
            part: Some(1),
        };

        drifted.apply(&snapshot);

        let mut fresh = RoomProjection::new();
        fresh.apply(&snapshot);

        assert_eq!(drifted, fresh);
    }

    #[test]
    fn duplicate_events_are_idempotent() {
        let mut once = RoomProjection::new();
        let mut twice = RoomProjection::new();
        for room in [&mut once, &mut twice] {
            room.apply(&roster_event(&["p1", "p2"]));
            room.apply(&ServerEvent::RoundStarted);
            room.apply(&winning_press("p1"));
        }
        twice.apply(&winning_press("p1"));
        assert_eq!(once, twice);
    }

    #[test]
    fn chapter_update_is_orthogonal_to_round_state() {
        let mut room = RoomProjection::new();
        room.apply(&ServerEvent::RoundStarted);
        room.apply(&ServerEvent::ChapterUpdated { chapter: 2, part: 4 });
        assert_eq!(room.phase, GamePhase::Active);
        assert_eq!(room.chapter, Some(2));
        assert_eq!(room.part, Some(4));
    }

    #[test]
    fn error_sets_notice_without_touching_state() {
        let mut room = RoomProjection::new();
        room.apply(&ServerEvent::RoundStarted);
        room.apply(&ServerEvent::Error {
            error: "room full".into(),
        });
        assert_eq!(room.phase, GamePhase::Active);
        assert_eq!(room.notice.as_deref(), Some("room full"));
        room.clear_notice();
        assert!(room.notice.is_none());
    }

    #[test]
    fn players_by_team_defaults_to_team_zero() {
        let mut room = RoomProjection::new();
        let mut tifling = player("p2", false);
        tifling.team_id = Some(2);
        room.apply(&ServerEvent::PlayerJoined {
            players: Some(vec![player("p1", false), tifling]),
            game_state: GamePhase::Waiting,
            player_id: None,
            player_name: None,
            avatar: None,
        });
        let teams = room.players_by_team();
        assert_eq!(teams[&0].len(), 1);
        assert_eq!(teams[&2].len(), 1);
    }

    // ── View derivation ─────────────────────────────────────────────

    #[test]
    fn winner_and_loser_views_agree_on_outcome() {
        let events = [
            roster_event(&["p1", "p2"]),
            ServerEvent::RoundStarted,
            winning_press("p1"),
        ];

        let mut p1 = RoomView::new(Viewpoint::Player("p1".into()));
        let mut p2 = RoomView::new(Viewpoint::Player("p2".into()));
        for event in &events {
            p1.apply(event);
            p2.apply(event);
        }

        assert_eq!(p1.button_mode(), ButtonMode::Won);
        assert_eq!(p2.button_mode(), ButtonMode::Lost);
        assert_eq!(p1.projection(), p2.projection());
    }

    #[test]
    fn armed_only_while_active_and_unpressed() {
        let mut view = RoomView::new(Viewpoint::Player("p1".into()));
        view.apply(&roster_event(&["p1"]));
        assert_eq!(view.button_mode(), ButtonMode::Waiting);

        view.apply(&ServerEvent::RoundStarted);
        assert_eq!(view.button_mode(), ButtonMode::Armed);
        assert!(view.may_press());

        view.apply(&ServerEvent::ButtonPressed {
            game_state: GamePhase::Active,
            winner_id: None,
            winner_name: None,
            winner_avatar: None,
            button_presses: vec![crate::protocol::ButtonPressInfo {
                player_id: "p1".into(),
                timestamp: 0,
                position: Some(1),
            }],
            player_id: Some("p1".into()),
        });
        assert_eq!(view.button_mode(), ButtonMode::Lost);
        assert!(!view.may_press());
    }

    #[test]
    fn stunned_player_may_not_press() {
        let mut view = RoomView::new(Viewpoint::Player("p1".into()));
        view.apply(&ServerEvent::PlayerJoined {
            players: Some(vec![player("p1", true)]),
            game_state: GamePhase::Waiting,
            player_id: None,
            player_name: None,
            avatar: None,
        });
        view.apply(&ServerEvent::RoundStarted);
        assert_eq!(view.button_mode(), ButtonMode::Armed);
        assert!(!view.may_press());
    }

    #[test]
    fn non_player_viewpoints_never_press() {
        let mut host = RoomView::new(Viewpoint::Host);
        host.apply(&roster_event(&["p1"]));
        host.apply(&ServerEvent::RoundStarted);
        assert!(!host.may_press());
        assert!(host.self_player().is_none());

        let screen = RoomView::new(Viewpoint::Screen);
        assert!(!screen.may_press());
    }
}
