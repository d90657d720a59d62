//! The shared state store of one game session.
//!
//! [`GameSession`] is owned by the client loop and passed by `&mut` to every
//! handler. Handlers leave it consistent before returning; nothing in it is
//! shared across tasks. Collaborators observe it through [`GameEvent`]s and
//! cloned [`SessionSnapshot`]s.

use std::mem;

use tracing::{debug, warn};

use crate::board::Board;
use crate::connection::ConnectionState;
use crate::event::{GameEvent, Notice, NoticeKind};
use crate::movement::{self, PlayerAction, SelfPosition};
use crate::protocol::{ClientMessage, ItemPlacement, PlayerId, Position};
use crate::registry::{ItemRegistry, ObstacleRegistry, PlayerRegistry, PlayerState, Scoreboard};
use crate::round::{self, RoundTracker};

/// Default edge length of the square grid.
pub const DEFAULT_GRID_SIZE: i32 = 15;

/// Largest grid the client will allocate a board for.
pub const MAX_GRID_SIZE: i32 = 1024;

/// Mutable state of one game session.
#[derive(Debug)]
pub struct GameSession {
    self_id: PlayerId,
    grid_size: i32,
    connection: ConnectionState,
    pub(crate) players: PlayerRegistry,
    pub(crate) scores: Scoreboard,
    pub(crate) obstacles: ObstacleRegistry,
    pub(crate) items: ItemRegistry,
    pub(crate) position: SelfPosition,
    pub(crate) round: RoundTracker,
    pub(crate) board: Board,
    message_log: Vec<Notice>,
    events: Vec<GameEvent>,
}

impl GameSession {
    /// Create a session for the local player `self_id` on a `grid_size` grid.
    ///
    /// `grid_size` is clamped to `1..=MAX_GRID_SIZE`.
    pub fn new(self_id: impl Into<PlayerId>, grid_size: i32) -> Self {
        let clamped = grid_size.clamp(1, MAX_GRID_SIZE);
        if clamped != grid_size {
            warn!(grid_size, clamped, "grid size out of range, clamped");
        }
        let grid_size = clamped;
        Self {
            self_id: self_id.into(),
            grid_size,
            connection: ConnectionState::Connecting,
            players: PlayerRegistry::default(),
            scores: Scoreboard::default(),
            obstacles: ObstacleRegistry::default(),
            items: ItemRegistry::default(),
            position: SelfPosition::default(),
            round: RoundTracker::default(),
            board: Board::new(grid_size),
            message_log: Vec::new(),
            events: Vec::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn grid_size(&self) -> i32 {
        self.grid_size
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    pub fn scores(&self) -> &Scoreboard {
        &self.scores
    }

    pub fn obstacles(&self) -> &ObstacleRegistry {
        &self.obstacles
    }

    pub fn items(&self) -> &ItemRegistry {
        &self.items
    }

    pub fn position(&self) -> &SelfPosition {
        &self.position
    }

    pub fn round(&self) -> &RoundTracker {
        &self.round
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn message_log(&self) -> &[Notice] {
        &self.message_log
    }

    // ── Connection ──────────────────────────────────────────────────

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        if self.connection != state {
            debug!(from = ?self.connection, to = ?state, "connection state changed");
            self.connection = state;
        }
    }

    // ── Input ───────────────────────────────────────────────────────

    /// Handle a key action from the local player.
    ///
    /// Returns the intent to send, if any. Ignored while input is paused.
    pub fn handle_action(&mut self, action: PlayerAction) -> Option<ClientMessage> {
        if !self.round.input_enabled() {
            debug!(?action, "input paused, ignoring action");
            return None;
        }
        match action {
            PlayerAction::Move(direction) => movement::propose_move(self, direction),
            PlayerAction::CollectItem => movement::request_item_action(self),
        }
    }

    // ── Events ──────────────────────────────────────────────────────

    pub(crate) fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    /// Take every event emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        mem::take(&mut self.events)
    }

    /// Record a user-facing notice in the message log and emit it.
    pub(crate) fn notify(&mut self, kind: NoticeKind, text: impl Into<String>) {
        let notice = Notice {
            kind,
            text: text.into(),
        };
        debug!(?kind, text = %notice.text, "notice");
        self.message_log.push(notice.clone());
        self.emit(GameEvent::Notice(notice));
    }

    // ── Entity updates ──────────────────────────────────────────────

    /// Mirror the local player's two-phase position into the registry and
    /// the board.
    pub(crate) fn sync_self_marker(&mut self) {
        let position = self.position.current();
        let confirmed = self.position.is_confirmed();
        self.players.upsert(&self.self_id, position, confirmed);
        if !self
            .board
            .place_player(&self.self_id, position, true, !confirmed)
        {
            debug!(%position, "cell held by another player, marker skipped");
        }
        self.emit(GameEvent::PlayerMoved {
            id: self.self_id.clone(),
            position,
            confirmed,
        });
    }

    /// Authoritative position of another player.
    pub(crate) fn place_remote_player(&mut self, id: &str, position: Position) {
        self.players.upsert(id, position, true);
        if !self.board.place_player(id, position, false, false) {
            debug!(id, %position, "cell held by another player, marker skipped");
        }
        self.emit(GameEvent::PlayerMoved {
            id: id.to_owned(),
            position,
            confirmed: true,
        });
    }

    pub(crate) fn add_obstacle(&mut self, position: Position) {
        self.obstacles.add(position);
        self.board.mark_obstacle(position);
        self.emit(GameEvent::ObstacleAdded { position });
    }

    pub(crate) fn add_item(&mut self, placement: ItemPlacement) {
        let kind = placement.item.kind;
        let position = placement.position;
        self.items.add(placement);
        self.board.mark_item(position, kind);
        self.emit(GameEvent::ItemSpawned { kind, position });
    }

    pub(crate) fn set_score(&mut self, id: &str, score: i64) {
        self.scores.set(id, score);
        self.emit(GameEvent::ScoreChanged {
            id: id.to_owned(),
            score,
        });
        round::refresh_overlay_top_player(self);
    }

    /// Restart the scoreboard with every known player, the local player
    /// included, at zero. Players who left are dropped.
    pub(crate) fn reset_scores(&mut self) {
        let mut ids: Vec<PlayerId> = self.players.ids().cloned().collect();
        if !ids.contains(&self.self_id) {
            ids.push(self.self_id.clone());
        }
        self.scores.reset(&ids);
        for id in ids {
            self.emit(GameEvent::ScoreChanged { id, score: 0 });
        }
    }

    /// Clear players, obstacles, items, the local position, the board and the
    /// message log. Scores survive so the next `waiting` overlay can name the
    /// top player.
    pub(crate) fn reset_round(&mut self) {
        self.players.clear();
        self.obstacles.clear();
        self.items.clear();
        self.position.reset(Position::default());
        self.board.clear();
        self.message_log.clear();
        debug!("round data reset");
        self.emit(GameEvent::RoundReset);
    }

    // ── Snapshot ────────────────────────────────────────────────────

    /// Owned copy of everything a renderer needs.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            self_id: self.self_id.clone(),
            grid_size: self.grid_size,
            connection: self.connection,
            players: self.players.iter().cloned().collect(),
            scores: self
                .scores
                .iter()
                .map(|(id, score)| (id.clone(), score))
                .collect(),
            obstacles: self.obstacles.iter().copied().collect(),
            items: self.items.iter().cloned().collect(),
            confirmed_position: self.position.confirmed(),
            pending_position: self.position.pending(),
            round: self.round.clone(),
            board: self.board.clone(),
            message_log: self.message_log.clone(),
        }
    }
}

/// Point-in-time copy of a [`GameSession`] for the rendering collaborator.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub self_id: PlayerId,
    pub grid_size: i32,
    pub connection: ConnectionState,
    pub players: Vec<PlayerState>,
    pub scores: Vec<(PlayerId, i64)>,
    pub obstacles: Vec<Position>,
    pub items: Vec<ItemPlacement>,
    pub confirmed_position: Position,
    pub pending_position: Option<Position>,
    pub round: RoundTracker,
    pub board: Board,
    pub message_log: Vec<Notice>,
}

impl SessionSnapshot {
    /// Snapshot of a session that has not connected yet.
    pub fn empty(self_id: impl Into<PlayerId>, grid_size: i32) -> Self {
        GameSession::new(self_id, grid_size).snapshot()
    }

    /// Score of `id`, defaulting to 0.
    pub fn score_of(&self, id: &str) -> i64 {
        self.scores
            .iter()
            .find(|(pid, _)| pid == id)
            .map_or(0, |(_, score)| *score)
    }

    /// `"Player <id>: Score <n>"` lines, the local player marked `(You)`.
    pub fn player_list(&self) -> Vec<String> {
        self.players
            .iter()
            .map(|p| {
                let suffix = if p.id == self.self_id { " (You)" } else { "" };
                format!("Player {}: Score {}{suffix}", p.id, self.score_of(&p.id))
            })
            .collect()
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
    use crate::movement::Direction;

    #[test]
    fn new_session_defaults() {
        let session = GameSession::new("me", DEFAULT_GRID_SIZE);
        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        assert!(session.round().input_enabled());
        assert_eq!(session.position().current(), Position::new(0, 0));
        assert_eq!(session.board().size(), DEFAULT_GRID_SIZE);
    }

    #[test]
    fn grid_size_is_clamped() {
        let huge = GameSession::new("me", i32::MAX);
        assert_eq!(huge.grid_size(), MAX_GRID_SIZE);
        assert_eq!(huge.board().size(), MAX_GRID_SIZE);

        let empty = GameSession::new("me", -3);
        assert_eq!(empty.grid_size(), 1);
        assert_eq!(empty.board().size(), 1);
    }

    #[test]
    fn actions_are_dropped_while_connecting() {
        let mut session = GameSession::new("me", DEFAULT_GRID_SIZE);
        assert!(session
            .handle_action(PlayerAction::Move(Direction::Right))
            .is_none());
        assert!(session.position().is_confirmed());
        assert!(session.drain_events().is_empty());
    }

    #[test]
    fn player_list_marks_self() {
        let mut session = GameSession::new("me", 5);
        session.set_connection_state(ConnectionState::Open);
        session.place_remote_player("p2", Position::new(1, 1));
        session.sync_self_marker();
        session.set_score("p2", 7);
        let lines = session.snapshot().player_list();
        assert_eq!(
            lines,
            vec!["Player me: Score 0 (You)", "Player p2: Score 7"]
        );
    }

    #[test]
    fn reset_round_keeps_scores() {
        let mut session = GameSession::new("me", 5);
        session.place_remote_player("p2", Position::new(1, 1));
        session.add_obstacle(Position::new(2, 2));
        session.set_score("p2", 7);
        session.notify(NoticeKind::Info, "hello");
        session.reset_round();
        assert!(session.players().is_empty());
        assert!(session.obstacles().is_empty());
        assert!(session.message_log().is_empty());
        assert_eq!(session.scores().get("p2"), 7);
    }
}
