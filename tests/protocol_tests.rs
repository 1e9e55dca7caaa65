#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Protocol serialization tests for the buzzer client.
//!
//! Verifies that every inbound event parses from JSON shaped exactly like
//! the room engine's output (SCREAMING_SNAKE_CASE `type` tags, camelCase
//! fields, `""` for absent winner fields on the REST path) and that every
//! outbound intent serializes to the payload the engine expects.

use buzzer_client::protocol::{
    room_channel, ButtonPressInfo, ClientCommand, GamePhase, PlayerInfo, RoomCode, ServerEvent,
    PERSONAL_CHANNEL,
};

fn parse(json: &str) -> ServerEvent {
    serde_json::from_str(json).expect("event should parse")
}

// ════════════════════════════════════════════════════════════════════
// Inbound events: engine-shaped fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn room_created_fixture() {
    let event = parse(r#"{"type":"ROOM_CREATED","roomCode":"ab12"}"#);
    match event {
        ServerEvent::RoomCreated { room_code } => assert_eq!(room_code.as_str(), "AB12"),
        other => panic!("expected RoomCreated, got {other:?}"),
    }
}

#[test]
fn player_joined_fixture_ignores_server_internal_fields() {
    // The engine serializes roster entries with a sessionId the client
    // never uses; unknown fields must be ignored.
    let event = parse(
        r#"{
            "type": "PLAYER_JOINED",
            "roomCode": "AB12",
            "playerId": "7",
            "playerName": "Alice",
            "avatar": "🦊",
            "players": [
                {"id": "7", "name": "Alice", "avatar": "🦊", "sessionId": "s-1",
                 "connected": true, "stunned": false, "teamId": 2}
            ],
            "gameState": "WAITING"
        }"#,
    );
    match event {
        ServerEvent::PlayerJoined {
            players,
            game_state,
            player_id,
            ..
        } => {
            assert_eq!(game_state, GamePhase::Waiting);
            assert_eq!(player_id.as_deref(), Some("7"));
            let players = players.expect("roster");
            assert_eq!(players.len(), 1);
            assert_eq!(players[0].name, "Alice");
            assert_eq!(players[0].team_id, Some(2));
            assert!(players[0].connected);
        }
        other => panic!("expected PlayerJoined, got {other:?}"),
    }
}

#[test]
fn player_info_optional_fields_default() {
    // An older engine revision sends neither teamId nor stunned.
    let info: PlayerInfo =
        serde_json::from_str(r#"{"id":"7","name":"Alice","avatar":null}"#).expect("player");
    assert!(info.avatar.is_none());
    assert!(info.team_id.is_none());
    assert!(!info.connected);
    assert!(!info.stunned);
}

#[test]
fn player_info_avatar_may_be_an_image_path() {
    let info: PlayerInfo = serde_json::from_str(
        r#"{"id":"7","name":"Alice","avatar":"/avatars/alice.png","connected":true}"#,
    )
    .expect("player");
    assert_eq!(info.avatar.as_deref(), Some("/avatars/alice.png"));
}

#[test]
fn round_started_fixture_with_extra_fields() {
    let event = parse(r#"{"type":"ROUND_STARTED","roomCode":"AB12","gameState":"ACTIVE"}"#);
    assert_eq!(event, ServerEvent::RoundStarted);
}

#[test]
fn intermediate_button_press_fixture() {
    let event = parse(
        r#"{
            "type": "BUTTON_PRESSED",
            "roomCode": "AB12",
            "playerId": "p2",
            "playerName": "Bob",
            "avatar": "🐼",
            "gameState": "ACTIVE",
            "buttonPresses": [
                {"playerId": "p2", "timestamp": 1700000000123, "position": 1}
            ]
        }"#,
    );
    match event {
        ServerEvent::ButtonPressed {
            game_state,
            winner_id,
            button_presses,
            ..
        } => {
            assert_eq!(game_state, GamePhase::Active);
            assert!(winner_id.is_none());
            assert_eq!(button_presses.len(), 1);
            assert_eq!(button_presses[0].timestamp, 1_700_000_000_123);
            assert_eq!(button_presses[0].position, Some(1));
        }
        other => panic!("expected ButtonPressed, got {other:?}"),
    }
}

#[test]
fn winning_button_press_fixture() {
    let event = parse(
        r#"{
            "type": "BUTTON_PRESSED",
            "gameState": "ROUND_ENDED",
            "winnerId": "p1",
            "winnerName": "Alice",
            "winnerAvatar": "🦊",
            "buttonPresses": [
                {"playerId": "p1", "timestamp": 1700000000100, "position": 1},
                {"playerId": "p2", "timestamp": 1700000000150, "position": 2}
            ]
        }"#,
    );
    match event {
        ServerEvent::ButtonPressed {
            game_state,
            winner_id,
            winner_name,
            ..
        } => {
            assert_eq!(game_state, GamePhase::RoundEnded);
            assert_eq!(winner_id.as_deref(), Some("p1"));
            assert_eq!(winner_name.as_deref(), Some("Alice"));
        }
        other => panic!("expected ButtonPressed, got {other:?}"),
    }
}

#[test]
fn button_press_without_position_parses() {
    let press: ButtonPressInfo =
        serde_json::from_str(r#"{"playerId":"p1","timestamp":123}"#).expect("press");
    assert!(press.position.is_none());
}

#[test]
fn round_ended_fixture() {
    let event = parse(
        r#"{"type":"ROUND_ENDED","roomCode":"AB12","gameState":"ROUND_ENDED",
            "winnerId":"p1","winnerName":"Alice","winnerAvatar":"🦊","buttonPresses":[]}"#,
    );
    match event {
        ServerEvent::RoundEnded { winner_id, .. } => {
            assert_eq!(winner_id.as_deref(), Some("p1"));
        }
        other => panic!("expected RoundEnded, got {other:?}"),
    }
}

#[test]
fn round_ended_without_winner_fixture() {
    let event = parse(r#"{"type":"ROUND_ENDED","roomCode":"AB12"}"#);
    match event {
        ServerEvent::RoundEnded {
            winner_id,
            button_presses,
            ..
        } => {
            assert!(winner_id.is_none());
            assert!(button_presses.is_empty());
        }
        other => panic!("expected RoundEnded, got {other:?}"),
    }
}

#[test]
fn round_reset_fixture() {
    let event = parse(
        r#"{"type":"ROUND_RESET","roomCode":"AB12","gameState":"WAITING",
            "players":[{"id":"p1","name":"Alice","avatar":"🦊","connected":true,"stunned":false}]}"#,
    );
    match event {
        ServerEvent::RoundReset { players } => {
            assert_eq!(players.expect("roster").len(), 1);
        }
        other => panic!("expected RoundReset, got {other:?}"),
    }
}

#[test]
fn rest_room_state_fixture_with_empty_winner_strings() {
    // The REST lookup serializes absent winner fields as "".
    let event = parse(
        r#"{
            "type": "ROOM_STATE",
            "roomCode": "AB12",
            "gameState": "WAITING",
            "players": [],
            "winnerId": "",
            "winnerName": "",
            "winnerAvatar": ""
        }"#,
    );
    match event {
        ServerEvent::RoomState {
            room_code,
            winner_id,
            winner_name,
            winner_avatar,
            chapter,
            ..
        } => {
            assert_eq!(room_code.expect("code").as_str(), "AB12");
            assert!(winner_id.is_none());
            assert!(winner_name.is_none());
            assert!(winner_avatar.is_none());
            assert!(chapter.is_none());
        }
        other => panic!("expected RoomState, got {other:?}"),
    }
}

#[test]
fn room_state_fixture_with_chapter() {
    let event = parse(
        r#"{"type":"ROOM_STATE","roomCode":"AB12","gameState":"ROUND_ENDED",
            "players":[],"winnerId":"p2","chapter":3,"part":1}"#,
    );
    match event {
        ServerEvent::RoomState {
            winner_id,
            chapter,
            part,
            game_state,
            ..
        } => {
            assert_eq!(winner_id.as_deref(), Some("p2"));
            assert_eq!(game_state, GamePhase::RoundEnded);
            assert_eq!(chapter, Some(3));
            assert_eq!(part, Some(1));
        }
        other => panic!("expected RoomState, got {other:?}"),
    }
}

#[test]
fn chapter_updated_fixture() {
    let event = parse(r#"{"type":"CHAPTER_UPDATED","roomCode":"AB12","chapter":2,"part":4}"#);
    assert_eq!(event, ServerEvent::ChapterUpdated { chapter: 2, part: 4 });
}

#[test]
fn error_fixture() {
    let event = parse(r#"{"type":"ERROR","error":"Комната не найдена"}"#);
    match event {
        ServerEvent::Error { error } => assert_eq!(error, "Комната не найдена"),
        other => panic!("expected Error, got {other:?}"),
    }
}

#[test]
fn unknown_event_type_fails_to_parse() {
    let result = serde_json::from_str::<ServerEvent>(r#"{"type":"NO_SUCH_EVENT"}"#);
    assert!(result.is_err());
}

#[test]
fn missing_type_tag_fails_to_parse() {
    let result = serde_json::from_str::<ServerEvent>(r#"{"roomCode":"AB12"}"#);
    assert!(result.is_err());
}

// ════════════════════════════════════════════════════════════════════
// Outbound intents: endpoint table and payload shape
// ════════════════════════════════════════════════════════════════════

fn payload(cmd: &ClientCommand) -> serde_json::Value {
    serde_json::to_value(cmd).expect("serialize")
}

#[test]
fn endpoint_table_is_complete() {
    let code = RoomCode::new("AB12");
    let cases = [
        (
            ClientCommand::CreateRoom {
                user_id: None,
                force_new: false,
            },
            "/app/create-room",
        ),
        (
            ClientCommand::AddPlayer {
                room_code: code.clone(),
                player_name: "Alice".into(),
                avatar: "🦊".into(),
            },
            "/app/add-player",
        ),
        (
            ClientCommand::JoinRoom {
                room_code: code.clone(),
                player_id: "p1".into(),
            },
            "/app/join-room",
        ),
        (
            ClientCommand::RemovePlayer {
                room_code: code.clone(),
                player_id: "p1".into(),
            },
            "/app/remove-player",
        ),
        (
            ClientCommand::StartRound {
                room_code: code.clone(),
            },
            "/app/start-round",
        ),
        (
            ClientCommand::PressButton {
                room_code: code.clone(),
                player_id: "p1".into(),
                client_timestamp: 1,
            },
            "/app/press-button",
        ),
        (
            ClientCommand::ResetRound {
                room_code: code.clone(),
            },
            "/app/reset-round",
        ),
        (
            ClientCommand::GetRoomState {
                room_code: code.clone(),
            },
            "/app/get-room-state",
        ),
        (
            ClientCommand::StunPlayer {
                room_code: code.clone(),
                player_id: "p1".into(),
            },
            "/app/stun-player",
        ),
        (
            ClientCommand::UpdateChapter {
                room_code: code,
                chapter: 2,
                part: 4,
            },
            "/app/update-chapter",
        ),
    ];
    for (command, endpoint) in cases {
        assert_eq!(command.endpoint(), endpoint);
    }
}

#[test]
fn create_room_payload_omits_absent_user_id() {
    let cmd = ClientCommand::CreateRoom {
        user_id: None,
        force_new: false,
    };
    assert_eq!(payload(&cmd), serde_json::json!({ "forceNew": false }));

    let cmd = ClientCommand::CreateRoom {
        user_id: Some("42".into()),
        force_new: true,
    };
    assert_eq!(
        payload(&cmd),
        serde_json::json!({ "userId": "42", "forceNew": true })
    );
}

#[test]
fn add_player_payload_shape() {
    let cmd = ClientCommand::AddPlayer {
        room_code: RoomCode::new("ab12"),
        player_name: "Alice".into(),
        avatar: "🦊".into(),
    };
    assert_eq!(
        payload(&cmd),
        serde_json::json!({
            "roomCode": "AB12",
            "playerName": "Alice",
            "avatar": "🦊",
        })
    );
}

#[test]
fn join_room_payload_normalizes_code() {
    let cmd = ClientCommand::JoinRoom {
        room_code: RoomCode::new("ab12"),
        player_id: "p1".into(),
    };
    assert_eq!(
        payload(&cmd),
        serde_json::json!({ "roomCode": "AB12", "playerId": "p1" })
    );
}

#[test]
fn update_chapter_payload_shape() {
    let cmd = ClientCommand::UpdateChapter {
        room_code: RoomCode::new("AB12"),
        chapter: 2,
        part: 4,
    };
    assert_eq!(
        payload(&cmd),
        serde_json::json!({ "roomCode": "AB12", "chapter": 2, "part": 4 })
    );
}

// ════════════════════════════════════════════════════════════════════
// Identifiers and channels
// ════════════════════════════════════════════════════════════════════

#[test]
fn room_codes_compare_case_insensitively_via_normalization() {
    assert_eq!(RoomCode::new("ab12"), RoomCode::new("AB12"));
    assert_eq!(RoomCode::new("ab12").to_string(), "AB12");
}

#[test]
fn channel_names() {
    assert_eq!(PERSONAL_CHANNEL, "/user/queue/personal");
    assert_eq!(room_channel(&RoomCode::new("ab12")), "/topic/room/AB12");
}

#[test]
fn game_phase_round_trip() {
    for phase in [GamePhase::Waiting, GamePhase::Active, GamePhase::RoundEnded] {
        let json = serde_json::to_string(&phase).expect("serialize");
        let back: GamePhase = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, phase);
    }
}
