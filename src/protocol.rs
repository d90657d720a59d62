//! Wire-compatible protocol types for the Pickup game stream.
//!
//! Every frame is a JSON object `{"type": ..., "content": ...}`. Inbound
//! frames decode into the closed [`ServerMessage`] enumeration and outbound
//! intents serialize from [`ClientMessage`]. Key adaptations from the server
//! models:
//!
//! - Go `time.Time` → [`chrono::DateTime<Utc>`] (RFC 3339 on the wire)
//! - empty `reason` strings are omitted by the server → `Option<String>`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Identifier of a player, as issued by the identity service.
pub type PlayerId = String;

// ── Value types ─────────────────────────────────────────────────────

/// A cell on the square game grid.
///
/// Positions are immutable values: every move produces a new `Position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    /// Create a position from its coordinates.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance between two cells.
    pub fn manhattan_distance(self, other: Position) -> u32 {
        self.x
            .abs_diff(other.x)
            .saturating_add(self.y.abs_diff(other.y))
    }

    /// Returns `true` if both coordinates lie in `[0, grid_size)`.
    pub fn in_bounds(self, grid_size: i32) -> bool {
        (0..grid_size).contains(&self.x) && (0..grid_size).contains(&self.y)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Kind of collectible item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Coin,
    Diamond,
}

impl ItemKind {
    /// Lowercase wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coin => "coin",
            Self::Diamond => "diamond",
        }
    }
}

/// A collectible item as described by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "type")]
    pub kind: ItemKind,
    /// Score value of the item, when the server advertises it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
}

impl Item {
    /// An item of `kind` without an advertised value.
    pub fn new(kind: ItemKind) -> Self {
        Self { kind, value: None }
    }
}

/// An item lying on a grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPlacement {
    pub position: Position,
    pub item: Item,
}

/// Phase of the server-driven round cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundPhase {
    Waiting,
    Preparing,
    Playing,
    Ended,
    Cleanup,
}

// ── Outbound payloads ───────────────────────────────────────────────

/// Move intent: the player asks to occupy `position`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveIntent {
    pub id: PlayerId,
    pub position: Position,
}

/// Item collection intent at the player's current cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemIntent {
    pub id: PlayerId,
    pub position: Position,
}

// ── Inbound payloads ────────────────────────────────────────────────

/// Authoritative verdict on a move, or a position broadcast for another player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveVerdict {
    pub id: PlayerId,
    #[serde(default = "default_true")]
    pub valid: bool,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Verdict on an item collection request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCollected {
    pub valid: bool,
    /// Player that collected the item, when the server includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
    pub position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Score update for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub id: PlayerId,
    pub score: i64,
}

/// Round phase transition pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStatePayload {
    pub state: RoundPhase,
    pub current_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Display-only countdown pushed near the end of a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownPayload {
    pub remaining_time: i64,
    pub current_state: RoundPhase,
}

/// Out-of-band pause notice (e.g. joined while a round is running).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitingNotificationPayload {
    pub message: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub next_round_start: DateTime<Utc>,
}

/// User-facing error text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PlayerId>,
    pub error: String,
}

/// User-facing alert text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PlayerId>,
    pub text: String,
}

fn default_true() -> bool {
    true
}

/// Timestamps that arrive either as RFC 3339 strings or as Unix seconds.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(DateTime<Utc>),
        Seconds(i64),
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Text(at) => Ok(at),
            Raw::Seconds(secs) => DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| D::Error::custom(format!("timestamp {secs} out of range"))),
        }
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Ask to move to a position.
    PlayerPosition(MoveIntent),
    /// Ask to collect the item under the player.
    ItemAction(ItemIntent),
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Move verdict for the local player or a position update for another.
    PlayerPosition(MoveVerdict),
    /// Item collection verdict.
    ItemCollected(ItemCollected),
    /// Static obstacle announcement.
    ObstaclePosition(Position),
    /// Item spawn announcement.
    ItemPosition(ItemPlacement),
    /// Score update for one player.
    Score(ScoreUpdate),
    /// Round phase transition.
    RoundState(RoundStatePayload),
    /// Display-only countdown.
    Countdown(CountdownPayload),
    /// Out-of-band pause notice.
    WaitingNotification(WaitingNotificationPayload),
    /// User-facing error text.
    ErrorMsg(ErrorPayload),
    /// User-facing alert text.
    AlertMsg(AlertPayload),
}

impl ServerMessage {
    /// Every `type` tag the client understands.
    pub const TYPE_TAGS: &'static [&'static str] = &[
        "playerPosition",
        "itemCollected",
        "obstaclePosition",
        "itemPosition",
        "score",
        "roundState",
        "countdown",
        "waitingNotification",
        "errorMsg",
        "alertMsg",
    ];

    /// The wire `type` tag of this message.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::PlayerPosition(_) => "playerPosition",
            Self::ItemCollected(_) => "itemCollected",
            Self::ObstaclePosition(_) => "obstaclePosition",
            Self::ItemPosition(_) => "itemPosition",
            Self::Score(_) => "score",
            Self::RoundState(_) => "roundState",
            Self::Countdown(_) => "countdown",
            Self::WaitingNotification(_) => "waitingNotification",
            Self::ErrorMsg(_) => "errorMsg",
            Self::AlertMsg(_) => "alertMsg",
        }
    }
}

/// Loosely typed envelope used to classify frames that fail strict decoding.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[allow(dead_code)]
    pub content: serde_json::Value,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn move_intent_matches_wire_shape() {
        let msg = ClientMessage::PlayerPosition(MoveIntent {
            id: "p1".into(),
            position: Position::new(7, 6),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "playerPosition", "content": {"id": "p1", "position": {"x": 7, "y": 6}}})
        );
    }

    #[test]
    fn item_action_matches_wire_shape() {
        let msg = ClientMessage::ItemAction(ItemIntent {
            id: "p1".into(),
            position: Position::new(3, 4),
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "itemAction");
        assert_eq!(value["content"]["position"], json!({"x": 3, "y": 4}));
    }

    #[test]
    fn verdict_without_reason_decodes() {
        let raw = r#"{"type":"playerPosition","content":{"valid":true,"id":"p2","position":{"x":1,"y":2}}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ServerMessage::PlayerPosition(v) => {
                assert!(v.valid);
                assert_eq!(v.position, Position::new(1, 2));
                assert!(v.reason.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn round_state_accepts_go_timestamps() {
        let raw = r#"{"type":"roundState","content":{"state":"playing","currentTime":"2024-05-01T12:00:00.123456789+08:00","endTime":"2024-05-01T12:01:00+08:00"}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let ServerMessage::RoundState(payload) = msg else {
            panic!("expected roundState");
        };
        assert_eq!(payload.state, RoundPhase::Playing);
        let span = payload.end_time - payload.current_time;
        assert_eq!(span.num_seconds(), 59);
    }

    #[test]
    fn item_collected_carries_item_value() {
        let raw = r#"{"type":"itemCollected","content":{"valid":true,"id":"p1","item":{"type":"diamond","value":50},"position":{"x":0,"y":0}}}"#;
        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let ServerMessage::ItemCollected(payload) = msg else {
            panic!("expected itemCollected");
        };
        assert_eq!(payload.item.unwrap().value, Some(50));
    }

    #[test]
    fn waiting_notification_accepts_unix_seconds() {
        let raw = r#"{"type":"waitingNotification","content":{"message":"later","nextRoundStart":1714564830}}"#;
        let ServerMessage::WaitingNotification(payload) = serde_json::from_str(raw).unwrap() else {
            panic!("expected waitingNotification");
        };
        assert_eq!(payload.next_round_start.timestamp(), 1_714_564_830);

        let raw = r#"{"type":"waitingNotification","content":{"message":"later","nextRoundStart":"2024-05-01T12:00:30Z"}}"#;
        let ServerMessage::WaitingNotification(payload) = serde_json::from_str(raw).unwrap() else {
            panic!("expected waitingNotification");
        };
        assert_eq!(payload.next_round_start.timestamp(), 1_714_564_830);
    }

    #[test]
    fn type_tags_cover_every_variant() {
        let msg = ServerMessage::ObstaclePosition(Position::new(0, 0));
        assert!(ServerMessage::TYPE_TAGS.contains(&msg.type_tag()));
        assert_eq!(ServerMessage::TYPE_TAGS.len(), 10);
    }

    #[test]
    fn position_helpers() {
        let p = Position::new(2, 3);
        assert_eq!(p.manhattan_distance(Position::new(3, 3)), 1);
        assert_eq!(p.manhattan_distance(Position::new(0, 0)), 5);
        assert!(p.in_bounds(4));
        assert!(!p.in_bounds(3));
        assert!(!Position::new(-1, 0).in_bounds(15));
        assert_eq!(p.to_string(), "(2, 3)");
    }
}
