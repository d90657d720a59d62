//! Events delivered to the rendering and notification collaborators.

use chrono::{DateTime, Utc};

use crate::protocol::{ItemKind, PlayerId, Position, RoundPhase};
use crate::round::Overlay;

/// Severity of a user-facing [`Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Error,
    Alert,
}

/// A textual, non-modal message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

/// Something the collaborators should react to.
///
/// Events are emitted after each inbound frame or key command has been fully
/// applied to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// The stream is open and the client loop is running.
    Connected,
    /// A player marker moved. `confirmed == false` for an optimistic move.
    PlayerMoved {
        id: PlayerId,
        position: Position,
        confirmed: bool,
    },
    /// An obstacle was announced.
    ObstacleAdded { position: Position },
    /// An item appeared on the board.
    ItemSpawned { kind: ItemKind, position: Position },
    /// An item collection was confirmed and the item removed.
    ItemCollected {
        kind: ItemKind,
        position: Position,
        by: Option<PlayerId>,
    },
    /// A player's score changed.
    ScoreChanged { id: PlayerId, score: i64 },
    /// A new round phase started.
    PhaseChanged {
        phase: RoundPhase,
        end_time: DateTime<Utc>,
        remaining_seconds: i64,
    },
    /// The server pushed a display-only countdown.
    Countdown {
        phase: RoundPhase,
        remaining_seconds: i64,
    },
    /// Keyboard input was enabled or disabled.
    InputEnabled(bool),
    /// A pause overlay is shown (replacing any previous one).
    OverlayShown(Overlay),
    /// The pause overlay was dismissed.
    OverlayDismissed,
    /// Board, players, items and obstacles were reset for the next round.
    RoundReset,
    /// A notice for the user.
    Notice(Notice),
    /// The stream ended. Terminal for the session.
    Disconnected { reason: Option<String> },
}
