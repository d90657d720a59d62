#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Protocol wire tests for the Pickup client.
//!
//! Verifies outbound intents against the exact JSON the server expects and
//! decodes fixtures shaped like real server output.

use pickup_client::dispatch::decode_frame;
use pickup_client::protocol::{
    ClientMessage, ItemIntent, ItemKind, MoveIntent, Position, RoundPhase, ServerMessage,
};
use pickup_client::PickupError;
use serde_json::json;

fn decode(raw: &str) -> ServerMessage {
    decode_frame(raw).unwrap_or_else(|e| panic!("fixture failed to decode: {e}\n{raw}"))
}

// ════════════════════════════════════════════════════════════════════
// Outbound intents
// ════════════════════════════════════════════════════════════════════

#[test]
fn move_intent_fixture() {
    let msg = ClientMessage::PlayerPosition(MoveIntent {
        id: "u-42".into(),
        position: Position::new(14, 0),
    });
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({"type": "playerPosition", "content": {"id": "u-42", "position": {"x": 14, "y": 0}}})
    );
}

#[test]
fn item_action_fixture() {
    let msg = ClientMessage::ItemAction(ItemIntent {
        id: "u-42".into(),
        position: Position::new(5, 9),
    });
    assert_eq!(
        serde_json::to_value(&msg).unwrap(),
        json!({"type": "itemAction", "content": {"id": "u-42", "position": {"x": 5, "y": 9}}})
    );
}

// ════════════════════════════════════════════════════════════════════
// Inbound fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn rejected_move_fixture() {
    let msg = decode(
        r#"{"type":"playerPosition","content":{"valid":false,"id":"u-42","reason":"obstacle","position":{"x":3,"y":3}}}"#,
    );
    let ServerMessage::PlayerPosition(verdict) = msg else {
        panic!("expected playerPosition");
    };
    assert!(!verdict.valid);
    assert_eq!(verdict.reason.as_deref(), Some("obstacle"));
    assert_eq!(verdict.position, Position::new(3, 3));
}

#[test]
fn broadcast_without_valid_flag_counts_as_valid() {
    let msg = decode(r#"{"type":"playerPosition","content":{"id":"u-7","position":{"x":0,"y":1}}}"#);
    let ServerMessage::PlayerPosition(verdict) = msg else {
        panic!("expected playerPosition");
    };
    assert!(verdict.valid);
}

#[test]
fn obstacle_fixture() {
    assert_eq!(
        decode(r#"{"type":"obstaclePosition","content":{"x":4,"y":11}}"#),
        ServerMessage::ObstaclePosition(Position::new(4, 11))
    );
}

#[test]
fn item_spawn_fixture() {
    let msg = decode(
        r#"{"type":"itemPosition","content":{"position":{"x":2,"y":2},"item":{"type":"coin","value":10}}}"#,
    );
    let ServerMessage::ItemPosition(placement) = msg else {
        panic!("expected itemPosition");
    };
    assert_eq!(placement.position, Position::new(2, 2));
    assert_eq!(placement.item.kind, ItemKind::Coin);
    assert_eq!(placement.item.value, Some(10));
}

#[test]
fn item_collected_fixture() {
    let msg = decode(
        r#"{"type":"itemCollected","content":{"valid":true,"id":"u-7","item":{"type":"diamond","value":50},"position":{"x":2,"y":2}}}"#,
    );
    let ServerMessage::ItemCollected(collected) = msg else {
        panic!("expected itemCollected");
    };
    assert!(collected.valid);
    assert_eq!(collected.id.as_deref(), Some("u-7"));
    assert_eq!(collected.item.unwrap().kind, ItemKind::Diamond);
}

#[test]
fn score_fixture() {
    let msg = decode(r#"{"type":"score","content":{"id":"u-7","score":120}}"#);
    let ServerMessage::Score(update) = msg else {
        panic!("expected score");
    };
    assert_eq!(update.id, "u-7");
    assert_eq!(update.score, 120);
}

#[test]
fn round_state_fixture_every_phase() {
    for (wire, phase) in [
        ("waiting", RoundPhase::Waiting),
        ("preparing", RoundPhase::Preparing),
        ("playing", RoundPhase::Playing),
        ("ended", RoundPhase::Ended),
        ("cleanup", RoundPhase::Cleanup),
    ] {
        let raw = format!(
            r#"{{"type":"roundState","content":{{"state":"{wire}","currentTime":"2024-05-01T12:00:00Z","endTime":"2024-05-01T12:00:10Z"}}}}"#
        );
        let ServerMessage::RoundState(payload) = decode(&raw) else {
            panic!("expected roundState");
        };
        assert_eq!(payload.state, phase);
    }
}

#[test]
fn countdown_fixture() {
    let msg = decode(r#"{"type":"countdown","content":{"remainingTime":3,"currentState":"preparing"}}"#);
    let ServerMessage::Countdown(payload) = msg else {
        panic!("expected countdown");
    };
    assert_eq!(payload.remaining_time, 3);
    assert_eq!(payload.current_state, RoundPhase::Preparing);
}

#[test]
fn error_and_alert_fixtures() {
    assert!(matches!(
        decode(r#"{"type":"errorMsg","content":{"id":"u-42","error":"room is full"}}"#),
        ServerMessage::ErrorMsg(payload) if payload.error == "room is full"
    ));
    assert!(matches!(
        decode(r#"{"type":"alertMsg","content":{"id":"","text":"new round soon"}}"#),
        ServerMessage::AlertMsg(payload) if payload.text == "new round soon"
    ));
}

// ════════════════════════════════════════════════════════════════════
// Rejections
// ════════════════════════════════════════════════════════════════════

#[test]
fn unknown_type_is_reported_by_name() {
    let err = decode_frame(r#"{"type":"playerEffect","content":{"id":"u-1","effect":"slow"}}"#)
        .unwrap_err();
    assert!(matches!(err, PickupError::UnknownMessageType(kind) if kind == "playerEffect"));
}

#[test]
fn known_type_with_bad_content_is_malformed() {
    let err = decode_frame(r#"{"type":"score","content":{"id":"u-1","score":"lots"}}"#).unwrap_err();
    assert!(matches!(err, PickupError::MalformedMessage(_)));
}

#[test]
fn non_json_is_malformed() {
    assert!(matches!(
        decode_frame("not json").unwrap_err(),
        PickupError::MalformedMessage(_)
    ));
    assert!(matches!(
        decode_frame(r#"{"content":{}}"#).unwrap_err(),
        PickupError::MalformedMessage(_)
    ));
}

#[test]
fn unknown_item_kind_is_malformed() {
    let err = decode_frame(
        r#"{"type":"itemPosition","content":{"position":{"x":1,"y":1},"item":{"type":"ruby"}}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, PickupError::MalformedMessage(_)));
}
