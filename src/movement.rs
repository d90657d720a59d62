//! Optimistic movement with server reconciliation.
//!
//! A key press becomes a [`Direction`]; [`propose`] turns the player's current
//! cell into an adjacent candidate. The candidate is applied locally as an
//! unconfirmed position, a move intent is sent, and the server's verdict later
//! commits or rolls it back.
//!
//! The local position is a two-phase value ([`SelfPosition`]): the last
//! confirmed cell plus the optimistic moves still awaiting a verdict. The
//! server answers moves in request order on a single stream, so verdicts are
//! matched to in-flight proposals first-in first-out. A verdict that arrives
//! for a move already discarded by a rollback is recognized as stale and never
//! marks a newer optimistic move as confirmed.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::event::{GameEvent, NoticeKind};
use crate::protocol::{
    ClientMessage, ItemCollected, ItemIntent, MoveIntent, MoveVerdict, Position,
};
use crate::session::GameSession;

// ── Input mapping ───────────────────────────────────────────────────

/// One-cell movement direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Self::Up, Self::Down, Self::Left, Self::Right];

    fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

/// What a key press asks the client to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Move(Direction),
    CollectItem,
}

impl PlayerAction {
    /// Map a DOM-style key name (`"ArrowUp"`, `" "`, ...) to an action.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ArrowUp" => Some(Self::Move(Direction::Up)),
            "ArrowDown" => Some(Self::Move(Direction::Down)),
            "ArrowLeft" => Some(Self::Move(Direction::Left)),
            "ArrowRight" => Some(Self::Move(Direction::Right)),
            " " => Some(Self::CollectItem),
            _ => None,
        }
    }
}

// ── Pure move rules ─────────────────────────────────────────────────

/// Step one cell in `direction`, clamped to `[0, grid_size)` on that axis.
pub fn candidate(current: Position, direction: Direction, grid_size: i32) -> Position {
    let (dx, dy) = direction.delta();
    let max = (grid_size - 1).max(0);
    Position::new(
        current.x.saturating_add(dx).clamp(0, max),
        current.y.saturating_add(dy).clamp(0, max),
    )
}

/// A move is valid when it stays on the grid and changes exactly one axis by
/// exactly one unit.
pub fn is_valid_move(current: Position, next: Position, grid_size: i32) -> bool {
    next.in_bounds(grid_size) && current.manhattan_distance(next) == 1
}

/// Candidate for a move from `current`, or `None` when the player is already
/// at the boundary in that direction.
pub fn propose(current: Position, direction: Direction, grid_size: i32) -> Option<Position> {
    let next = candidate(current, direction, grid_size);
    if next == current || !is_valid_move(current, next, grid_size) {
        return None;
    }
    Some(next)
}

// ── Two-phase self position ─────────────────────────────────────────

/// Result of reconciling one verdict for the local player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictOutcome {
    /// The server accepted the oldest in-flight move. `superseded` is `true`
    /// when newer optimistic moves are still awaiting their verdicts.
    Committed { position: Position, superseded: bool },
    /// The server rejected the oldest in-flight move; every optimistic move
    /// was discarded and the player is back at `to`.
    RolledBack { to: Position },
    /// Verdict for a move discarded by an earlier rollback.
    Stale { valid: bool },
}

/// Last confirmed cell plus optimistic moves awaiting a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfPosition {
    confirmed: Position,
    in_flight: VecDeque<Position>,
    orphaned: usize,
}

impl SelfPosition {
    pub fn new(start: Position) -> Self {
        Self {
            confirmed: start,
            in_flight: VecDeque::new(),
            orphaned: 0,
        }
    }

    /// Last position acknowledged by the server.
    pub fn confirmed(&self) -> Position {
        self.confirmed
    }

    /// Latest optimistic position, if any move awaits a verdict.
    pub fn pending(&self) -> Option<Position> {
        self.in_flight.back().copied()
    }

    /// Position to display and to move from.
    pub fn current(&self) -> Position {
        self.pending().unwrap_or(self.confirmed)
    }

    pub fn is_confirmed(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Number of verdicts still expected, stale ones included.
    pub fn outstanding(&self) -> usize {
        self.in_flight.len() + self.orphaned
    }

    /// Record an optimistic move that was sent to the server.
    pub fn begin(&mut self, candidate: Position) {
        self.in_flight.push_back(candidate);
    }

    /// Reconcile a verdict about the local player.
    pub fn reconcile(&mut self, valid: bool, server_position: Position) -> VerdictOutcome {
        if self.orphaned > 0 {
            self.orphaned -= 1;
            if valid {
                self.confirmed = server_position;
            }
            return VerdictOutcome::Stale { valid };
        }
        if valid {
            self.in_flight.pop_front();
            self.confirmed = server_position;
            VerdictOutcome::Committed {
                position: server_position,
                superseded: !self.in_flight.is_empty(),
            }
        } else {
            if self.in_flight.pop_front().is_some() {
                self.orphaned += self.in_flight.len();
            }
            self.in_flight.clear();
            VerdictOutcome::RolledBack { to: self.confirmed }
        }
    }

    /// Forget all optimistic state and stand at `position`.
    pub fn reset(&mut self, position: Position) {
        self.confirmed = position;
        self.in_flight.clear();
        self.orphaned = 0;
    }
}

impl Default for SelfPosition {
    fn default() -> Self {
        Self::new(Position::default())
    }
}

// ── Session operations ──────────────────────────────────────────────

/// Propose a move of the local player.
///
/// Returns the move intent to send, or `None` when the move was rejected
/// locally (boundary) or the connection is not open. No state changes in
/// either of those cases.
pub fn propose_move(session: &mut GameSession, direction: Direction) -> Option<ClientMessage> {
    if !session.connection_state().can_send() {
        warn!(
            state = ?session.connection_state(),
            "connection not open, dropping move proposal"
        );
        return None;
    }
    let current = session.position.current();
    let Some(next) = propose(current, direction, session.grid_size()) else {
        debug!(?direction, %current, "move rejected locally");
        return None;
    };
    session.position.begin(next);
    session.sync_self_marker();
    Some(ClientMessage::PlayerPosition(MoveIntent {
        id: session.self_id().to_owned(),
        position: next,
    }))
}

/// Apply a `playerPosition` verdict or broadcast.
///
/// The server picks the local player's start cell and announces it as a
/// valid verdict before any move was sent. With nothing in flight that
/// verdict simply commits the start cell, so no placement intent is needed.
pub fn apply_verdict(session: &mut GameSession, verdict: MoveVerdict) {
    if verdict.id != session.self_id() {
        // Remote players are always authoritative; no rollback semantics.
        session.place_remote_player(&verdict.id, verdict.position);
        return;
    }

    match session.position.reconcile(verdict.valid, verdict.position) {
        VerdictOutcome::Committed {
            position,
            superseded,
        } => {
            debug!(%position, superseded, "move confirmed");
        }
        VerdictOutcome::RolledBack { to } => {
            debug!(%to, "move rejected, rolled back");
            session.notify(NoticeKind::Error, rejection_text(verdict.reason.as_deref()));
        }
        VerdictOutcome::Stale { valid } => {
            debug!(valid, position = %verdict.position, "stale verdict for discarded move");
            if !valid {
                session.notify(NoticeKind::Error, rejection_text(verdict.reason.as_deref()));
            }
        }
    }
    session.sync_self_marker();
}

fn rejection_text(reason: Option<&str>) -> String {
    format!("Invalid move: {}", reason.unwrap_or("Unknown reason"))
}

/// Ask to collect the item under the local player.
///
/// Only sends when an item lies at the player's current (optimistic or
/// confirmed) position and the connection is open; otherwise a logged no-op.
pub fn request_item_action(session: &mut GameSession) -> Option<ClientMessage> {
    if !session.connection_state().can_send() {
        warn!("connection not open, dropping item action");
        return None;
    }
    let position = session.position.current();
    if session.items.at(position).is_none() {
        debug!(%position, "no item at current position to collect");
        return None;
    }
    Some(ClientMessage::ItemAction(ItemIntent {
        id: session.self_id().to_owned(),
        position,
    }))
}

/// Apply an `itemCollected` verdict.
pub fn apply_item_collected(session: &mut GameSession, verdict: ItemCollected) {
    if !verdict.valid {
        let reason = verdict.reason.as_deref().unwrap_or("Unknown reason");
        session.notify(
            NoticeKind::Error,
            format!("Failed to collect item: {reason}"),
        );
        return;
    }
    let Some(removed) = session.items.remove_at(verdict.position) else {
        debug!(position = %verdict.position, "collected item was not on the board");
        return;
    };
    session.board.clear_item(verdict.position);
    let kind = verdict.item.map_or(removed.item.kind, |item| item.kind);
    info!(kind = kind.as_str(), position = %verdict.position, "item collected");
    session.emit(GameEvent::ItemCollected {
        kind,
        position: verdict.position,
        by: verdict.id,
    });
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

    const GRID: i32 = 15;

    #[test]
    fn key_mapping() {
        assert_eq!(
            PlayerAction::from_key("ArrowUp"),
            Some(PlayerAction::Move(Direction::Up))
        );
        assert_eq!(PlayerAction::from_key(" "), Some(PlayerAction::CollectItem));
        assert_eq!(PlayerAction::from_key("q"), None);
    }

    #[test]
    fn proposals_are_adjacent_and_in_bounds() {
        for x in 0..GRID {
            for y in 0..GRID {
                let p = Position::new(x, y);
                for d in Direction::ALL {
                    match propose(p, d, GRID) {
                        Some(c) => {
                            assert_eq!(p.manhattan_distance(c), 1, "{p} {d:?}");
                            assert!(c.in_bounds(GRID));
                        }
                        None => {
                            let at_edge = match d {
                                Direction::Up => y == 0,
                                Direction::Down => y == GRID - 1,
                                Direction::Left => x == 0,
                                Direction::Right => x == GRID - 1,
                            };
                            assert!(at_edge, "no candidate away from edge at {p} {d:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn invalid_moves_are_detected() {
        let p = Position::new(5, 5);
        assert!(is_valid_move(p, Position::new(5, 6), GRID));
        assert!(!is_valid_move(p, p, GRID));
        assert!(!is_valid_move(p, Position::new(6, 6), GRID));
        assert!(!is_valid_move(Position::new(0, 0), Position::new(-1, 0), GRID));
    }

    #[test]
    fn commit_converges_to_server_position() {
        let mut pos = SelfPosition::new(Position::new(7, 7));
        pos.begin(Position::new(7, 6));
        assert_eq!(pos.current(), Position::new(7, 6));
        assert!(!pos.is_confirmed());
        let outcome = pos.reconcile(true, Position::new(7, 6));
        assert_eq!(
            outcome,
            VerdictOutcome::Committed {
                position: Position::new(7, 6),
                superseded: false
            }
        );
        assert!(pos.is_confirmed());
        assert_eq!(pos.confirmed(), Position::new(7, 6));
    }

    #[test]
    fn rollback_restores_last_confirmed_not_candidate() {
        let mut pos = SelfPosition::new(Position::new(5, 5));
        pos.begin(Position::new(5, 4));
        pos.begin(Position::new(5, 3));
        let outcome = pos.reconcile(false, Position::new(5, 5));
        assert_eq!(outcome, VerdictOutcome::RolledBack { to: Position::new(5, 5) });
        assert_eq!(pos.current(), Position::new(5, 5));
        assert!(pos.is_confirmed());
        // The verdict for the discarded second move is still owed.
        assert_eq!(pos.outstanding(), 1);
    }

    #[test]
    fn redelivered_verdict_is_idempotent() {
        let mut pos = SelfPosition::new(Position::new(1, 1));
        pos.begin(Position::new(1, 2));
        pos.reconcile(true, Position::new(1, 2));
        let after_first = pos.clone();
        pos.reconcile(true, Position::new(1, 2));
        assert_eq!(pos, after_first);
    }

    #[test]
    fn late_verdict_does_not_confirm_newer_move() {
        let mut pos = SelfPosition::new(Position::new(0, 0));
        pos.begin(Position::new(1, 0));
        pos.begin(Position::new(2, 0));
        let outcome = pos.reconcile(true, Position::new(1, 0));
        assert_eq!(
            outcome,
            VerdictOutcome::Committed {
                position: Position::new(1, 0),
                superseded: true
            }
        );
        assert!(!pos.is_confirmed());
        assert_eq!(pos.current(), Position::new(2, 0));
        assert_eq!(pos.confirmed(), Position::new(1, 0));
    }

    #[test]
    fn stale_verdict_after_rollback_keeps_new_proposal() {
        let mut pos = SelfPosition::new(Position::new(0, 0));
        pos.begin(Position::new(1, 0));
        pos.begin(Position::new(2, 0));
        pos.reconcile(false, Position::new(0, 0));
        pos.begin(Position::new(0, 1));
        let outcome = pos.reconcile(false, Position::new(0, 0));
        assert_eq!(outcome, VerdictOutcome::Stale { valid: false });
        assert_eq!(pos.current(), Position::new(0, 1));
        assert_eq!(pos.outstanding(), 1);
    }
}
