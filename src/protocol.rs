//! Wire-compatible protocol types for the Quiz Battle buzzer protocol.
//!
//! Every type in this module produces JSON identical to the room engine's
//! message format: inbound events are flat objects tagged by a
//! SCREAMING_SNAKE_CASE `type` field with camelCase payload fields; outbound
//! intents are bare camelCase objects published to `/app/...` endpoints.
//!
//! Player ids and room codes are opaque server-issued strings. Room codes are
//! case-insensitive on input and normalized to upper-case ([`RoomCode::new`]).

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for players, issued by the external account system.
pub type PlayerId = String;

// ── Room codes ──────────────────────────────────────────────────────

/// A short, human-shareable room code.
///
/// Codes are matched case-insensitively by the room engine; this type
/// normalizes to upper-case at every construction site so the rest of the
/// crate can compare codes byte-wise.
///
/// # Example
///
/// ```
/// use buzzer_client::protocol::RoomCode;
///
/// let code = RoomCode::new(" ab12 ");
/// assert_eq!(code.as_str(), "AB12");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Create a room code, trimming whitespace and upper-casing.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    /// The normalized code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RoomCode {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl From<&str> for RoomCode {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Channel names ───────────────────────────────────────────────────

/// The personal inbox channel carrying replies addressed to this session.
pub const PERSONAL_CHANNEL: &str = "/user/queue/personal";

/// The broadcast channel for a room.
pub fn room_channel(code: &RoomCode) -> String {
    format!("/topic/room/{code}")
}

// ── Enums ───────────────────────────────────────────────────────────

/// Round-state machine of a room.
///
/// The machine cycles `WAITING → ACTIVE → ROUND_ENDED → WAITING` for the
/// room's lifetime; no state is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GamePhase {
    /// No round is open; presses are not accepted.
    #[default]
    Waiting,
    /// A round is open and presses are accepted.
    Active,
    /// A winner has been declared; further presses are ignored.
    RoundEnded,
}

// ── Structs ─────────────────────────────────────────────────────────

/// Information about a player in a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub name: String,
    /// Emoji short string or an `/avatars/...` image path.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Team assignment; absent means team 0 / unassigned.
    #[serde(default)]
    pub team_id: Option<u32>,
    /// Liveness flag maintained by the engine.
    #[serde(default)]
    pub connected: bool,
    /// Excluded from winning the current round.
    #[serde(default)]
    pub stunned: bool,
}

/// One registered button press, as reported by the engine.
///
/// The timestamp is the server clock; the client never derives a winner
/// from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ButtonPressInfo {
    pub player_id: PlayerId,
    pub timestamp: i64,
    /// 1-based arrival order, when the engine reports it.
    #[serde(default)]
    pub position: Option<u32>,
}

/// Identity of a declared round winner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner {
    pub id: PlayerId,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

// ── Inbound events ──────────────────────────────────────────────────

/// Events delivered by the room engine on the personal and room channels.
///
/// The engine's REST lookup serializes absent winner fields as `""`; those
/// deserialize as `None` here so downstream code never sees an empty-string
/// winner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// The host's create intent succeeded; carries the assigned code.
    RoomCreated { room_code: RoomCode },
    /// A player connected or was added. `players` is the full roster, not
    /// a delta.
    PlayerJoined {
        #[serde(default)]
        players: Option<Vec<PlayerInfo>>,
        game_state: GamePhase,
        #[serde(default)]
        player_id: Option<PlayerId>,
        #[serde(default)]
        player_name: Option<String>,
        #[serde(default)]
        avatar: Option<String>,
    },
    /// A player was removed. `players` is the full remaining roster.
    PlayerLeft {
        #[serde(default)]
        players: Option<Vec<PlayerInfo>>,
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
    /// The host opened a round.
    RoundStarted,
    /// A press was acknowledged. Carries a winner only once the engine has
    /// arbitrated; a winner-less press updates press flags alone.
    ButtonPressed {
        game_state: GamePhase,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        winner_id: Option<PlayerId>,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        winner_name: Option<String>,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        winner_avatar: Option<String>,
        #[serde(default)]
        button_presses: Vec<ButtonPressInfo>,
        #[serde(default)]
        player_id: Option<PlayerId>,
    },
    /// Canonical terminal event of a round.
    RoundEnded {
        #[serde(default, deserialize_with = "empty_string_as_none")]
        winner_id: Option<PlayerId>,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        winner_name: Option<String>,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        winner_avatar: Option<String>,
        #[serde(default)]
        button_presses: Vec<ButtonPressInfo>,
    },
    /// The host armed the room for a fresh question.
    RoundReset {
        #[serde(default)]
        players: Option<Vec<PlayerInfo>>,
    },
    /// Full authoritative snapshot; unconditionally replaces the local
    /// projection.
    RoomState {
        #[serde(default)]
        room_code: Option<RoomCode>,
        #[serde(default)]
        players: Vec<PlayerInfo>,
        game_state: GamePhase,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        winner_id: Option<PlayerId>,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        winner_name: Option<String>,
        #[serde(default, deserialize_with = "empty_string_as_none")]
        winner_avatar: Option<String>,
        #[serde(default)]
        button_presses: Vec<ButtonPressInfo>,
        #[serde(default)]
        chapter: Option<u32>,
        #[serde(default)]
        part: Option<u32>,
    },
    /// Auxiliary display sync for the screen projection.
    ChapterUpdated { chapter: u32, part: u32 },
    /// Server-declared application error; transient, does not alter room
    /// state.
    Error { error: String },
}

/// Deserialize the engine's `""`-for-absent convention into `None`.
fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

// ── Outbound intents ────────────────────────────────────────────────

/// Intents published to the room engine's application endpoints.
///
/// Each variant serializes to the bare camelCase payload the engine expects;
/// [`endpoint`](ClientCommand::endpoint) names the destination. Intents are
/// fire-and-forget: confirmation is always the subsequent matching
/// [`ServerEvent`], never the send call.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Create (or reclaim) a room as host.
    CreateRoom {
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        force_new: bool,
    },
    /// Add a player to the roster (host only).
    AddPlayer {
        room_code: RoomCode,
        player_name: String,
        avatar: String,
    },
    /// Bind this session to an existing roster entry.
    JoinRoom {
        room_code: RoomCode,
        player_id: PlayerId,
    },
    /// Remove a player from the roster (host only).
    RemovePlayer {
        room_code: RoomCode,
        player_id: PlayerId,
    },
    /// Open a round.
    StartRound { room_code: RoomCode },
    /// Register a buzzer press. `client_timestamp` is the local press time
    /// in ms since the epoch, for latency diagnostics only — arbitration is
    /// exclusively the engine's.
    PressButton {
        room_code: RoomCode,
        player_id: PlayerId,
        client_timestamp: i64,
    },
    /// Return the room to `WAITING` for a fresh question.
    ResetRound { room_code: RoomCode },
    /// Request a full authoritative snapshot on the personal channel.
    GetRoomState { room_code: RoomCode },
    /// Exclude a player from the current round (host only).
    StunPlayer {
        room_code: RoomCode,
        player_id: PlayerId,
    },
    /// Advance the auxiliary chapter/part display.
    UpdateChapter {
        room_code: RoomCode,
        chapter: u32,
        part: u32,
    },
}

impl ClientCommand {
    /// The application endpoint this intent is published to.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::CreateRoom { .. } => "/app/create-room",
            Self::AddPlayer { .. } => "/app/add-player",
            Self::JoinRoom { .. } => "/app/join-room",
            Self::RemovePlayer { .. } => "/app/remove-player",
            Self::StartRound { .. } => "/app/start-round",
            Self::PressButton { .. } => "/app/press-button",
            Self::ResetRound { .. } => "/app/reset-round",
            Self::GetRoomState { .. } => "/app/get-room-state",
            Self::StunPlayer { .. } => "/app/stun-player",
            Self::UpdateChapter { .. } => "/app/update-chapter",
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

    #[test]
    fn room_code_normalizes_to_upper_case() {
        assert_eq!(RoomCode::new("ab12").as_str(), "AB12");
        assert_eq!(RoomCode::new("  Xy9z ").as_str(), "XY9Z");
    }

    #[test]
    fn room_code_deserializes_normalized() {
        let code: RoomCode = serde_json::from_str("\"ab12\"").unwrap();
        assert_eq!(code.as_str(), "AB12");
    }

    #[test]
    fn room_channel_embeds_code() {
        assert_eq!(room_channel(&RoomCode::new("ab12")), "/topic/room/AB12");
    }

    #[test]
    fn game_phase_wire_names() {
        assert_eq!(
            serde_json::to_string(&GamePhase::RoundEnded).unwrap(),
            "\"ROUND_ENDED\""
        );
        let phase: GamePhase = serde_json::from_str("\"ACTIVE\"").unwrap();
        assert_eq!(phase, GamePhase::Active);
    }

    #[test]
    fn empty_winner_id_is_none() {
        let event: ServerEvent = serde_json::from_str(
            r#"{"type":"ROOM_STATE","players":[],"gameState":"WAITING","winnerId":"","winnerName":"","winnerAvatar":""}"#,
        )
        .unwrap();
        match event {
            ServerEvent::RoomState { winner_id, winner_name, .. } => {
                assert!(winner_id.is_none());
                assert!(winner_name.is_none());
            }
            other => panic!("expected RoomState, got {other:?}"),
        }
    }

    #[test]
    fn press_button_payload_is_camel_case() {
        let cmd = ClientCommand::PressButton {
            room_code: RoomCode::new("ab12"),
            player_id: "p1".into(),
            client_timestamp: 1_700_000_000_000,
        };
        assert_eq!(cmd.endpoint(), "/app/press-button");
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "roomCode": "AB12",
                "playerId": "p1",
                "clientTimestamp": 1_700_000_000_000i64,
            })
        );
    }
}
