//! Routing of inbound frames to their handlers.
//!
//! Every frame is a JSON envelope `{"type": <tag>, "content": <payload>}`.
//! A frame that fails to decode is logged and dropped; the session keeps
//! running.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{PickupError, Result};
use crate::event::NoticeKind;
use crate::movement;
use crate::protocol::{Envelope, ServerMessage};
use crate::round;
use crate::session::GameSession;

/// Decode one text frame.
///
/// # Errors
///
/// [`PickupError::UnknownMessageType`] when the envelope is well formed but
/// its tag is not one the client understands, and
/// [`PickupError::MalformedMessage`] for anything else that fails to decode.
pub fn decode_frame(text: &str) -> Result<ServerMessage> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => Ok(message),
        Err(strict) => match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) if !ServerMessage::TYPE_TAGS.contains(&envelope.kind.as_str()) => {
                Err(PickupError::UnknownMessageType(envelope.kind))
            }
            _ => Err(PickupError::MalformedMessage(strict.to_string())),
        },
    }
}

/// Apply one decoded message to the session, with `now` as the local
/// receive time.
pub fn dispatch(session: &mut GameSession, message: ServerMessage, now: DateTime<Utc>) {
    debug!(kind = message.type_tag(), "dispatching message");
    match message {
        ServerMessage::PlayerPosition(verdict) => movement::apply_verdict(session, verdict),
        ServerMessage::ItemCollected(verdict) => movement::apply_item_collected(session, verdict),
        ServerMessage::ObstaclePosition(position) => session.add_obstacle(position),
        ServerMessage::ItemPosition(placement) => session.add_item(placement),
        ServerMessage::Score(update) => session.set_score(&update.id, update.score),
        ServerMessage::RoundState(payload) => round::apply_round_state(session, payload, now),
        ServerMessage::Countdown(payload) => round::apply_countdown(session, payload),
        ServerMessage::WaitingNotification(payload) => {
            round::apply_waiting_notification(session, payload);
        }
        ServerMessage::ErrorMsg(payload) => session.notify(NoticeKind::Error, payload.error),
        ServerMessage::AlertMsg(payload) => session.notify(NoticeKind::Alert, payload.text),
    }
}

/// Decode and apply one text frame. Returns whether it was applied.
///
/// Undecodable frames are logged at `warn` level and otherwise ignored.
pub fn on_frame(session: &mut GameSession, text: &str, now: DateTime<Utc>) -> bool {
    match decode_frame(text) {
        Ok(message) => {
            dispatch(session, message, now);
            true
        }
        Err(PickupError::UnknownMessageType(kind)) => {
            warn!(%kind, "unknown message type, frame ignored");
            false
        }
        Err(e) => {
            warn!(error = %e, "malformed frame ignored");
            false
        }
    }
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
    use crate::protocol::Position;

    #[test]
    fn unknown_type_is_distinguished() {
        let err = decode_frame(r#"{"type":"chat","content":{"text":"hi"}}"#).unwrap_err();
        assert!(matches!(err, PickupError::UnknownMessageType(kind) if kind == "chat"));
    }

    #[test]
    fn bad_payload_for_known_type_is_malformed() {
        let err = decode_frame(r#"{"type":"score","content":{"id":7}}"#).unwrap_err();
        assert!(matches!(err, PickupError::MalformedMessage(_)));
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            decode_frame("not json").unwrap_err(),
            PickupError::MalformedMessage(_)
        ));
    }

    #[test]
    fn bad_frame_leaves_session_untouched() {
        let mut session = GameSession::new("me", 5);
        assert!(!on_frame(&mut session, "{", Utc::now()));
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn obstacle_frame_is_applied() {
        let mut session = GameSession::new("me", 5);
        let applied = on_frame(
            &mut session,
            r#"{"type":"obstaclePosition","content":{"x":2,"y":3}}"#,
            Utc::now(),
        );
        assert!(applied);
        assert!(session.obstacles().contains(Position::new(2, 3)));
    }

    #[test]
    fn error_frame_lands_in_message_log() {
        let mut session = GameSession::new("me", 5);
        on_frame(
            &mut session,
            r#"{"type":"errorMsg","content":{"error":"room full"}}"#,
            Utc::now(),
        );
        assert_eq!(session.message_log()[0].text, "room full");
        assert_eq!(session.message_log()[0].kind, NoticeKind::Error);
    }
}
