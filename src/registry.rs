//! Entity registries populated from server pushes.
//!
//! Each registry is a plain keyed collection. Handlers in
//! [`dispatch`](crate::dispatch) mutate them and the rendering collaborator
//! reads them through a [`SessionSnapshot`](crate::session::SessionSnapshot).

use std::collections::BTreeMap;

use crate::protocol::{ItemPlacement, PlayerId, Position};

// ── Players ─────────────────────────────────────────────────────────

/// Last known state of one player.
///
/// `confirmed == false` marks a locally predicted position that the server
/// has not acknowledged yet. Only the local player is ever unconfirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub id: PlayerId,
    pub position: Position,
    pub confirmed: bool,
}

/// One [`PlayerState`] per known player id.
#[derive(Debug, Clone, Default)]
pub struct PlayerRegistry {
    players: BTreeMap<PlayerId, PlayerState>,
}

impl PlayerRegistry {
    /// Insert or replace the state of `id`. Returns `true` on first sighting.
    pub fn upsert(&mut self, id: &str, position: Position, confirmed: bool) -> bool {
        match self.players.get_mut(id) {
            Some(state) => {
                state.position = position;
                state.confirmed = confirmed;
                false
            }
            None => {
                self.players.insert(
                    id.to_owned(),
                    PlayerState {
                        id: id.to_owned(),
                        position,
                        confirmed,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&PlayerState> {
        self.players.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    /// Known player ids in stable order.
    pub fn ids(&self) -> impl Iterator<Item = &PlayerId> {
        self.players.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

// ── Scores ──────────────────────────────────────────────────────────

/// Player id → score. Absent players score 0.
///
/// Entries keep the order in which players were first scored; that order
/// breaks ties for the top player.
#[derive(Debug, Clone, Default)]
pub struct Scoreboard {
    scores: Vec<(PlayerId, i64)>,
}

impl Scoreboard {
    /// Score of `id`, defaulting to 0.
    pub fn get(&self, id: &str) -> i64 {
        self.scores
            .iter()
            .find(|(known, _)| known == id)
            .map_or(0, |(_, score)| *score)
    }

    pub fn set(&mut self, id: &str, score: i64) {
        match self.scores.iter_mut().find(|(known, _)| known == id) {
            Some(entry) => entry.1 = score,
            None => self.scores.push((id.to_owned(), score)),
        }
    }

    /// Drop every entry and start the given players at 0.
    pub fn reset<'a>(&mut self, ids: impl IntoIterator<Item = &'a PlayerId>) {
        self.scores.clear();
        for id in ids {
            self.set(id, 0);
        }
    }

    /// Highest-scoring player. Ties go to the player scored first; an empty
    /// board has no top player.
    pub fn top_player(&self) -> Option<(&PlayerId, i64)> {
        let mut top: Option<(&PlayerId, i64)> = None;
        for (id, score) in &self.scores {
            match top {
                Some((_, best)) if *score <= best => {}
                _ => top = Some((id, *score)),
            }
        }
        top
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PlayerId, i64)> {
        self.scores.iter().map(|(id, score)| (id, *score))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

// ── Obstacles ───────────────────────────────────────────────────────

/// Obstacles announced for the current round. Append-only until reset.
#[derive(Debug, Clone, Default)]
pub struct ObstacleRegistry {
    obstacles: Vec<Position>,
}

impl ObstacleRegistry {
    pub fn add(&mut self, position: Position) {
        self.obstacles.push(position);
    }

    pub fn contains(&self, position: Position) -> bool {
        self.obstacles.contains(&position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.obstacles.iter()
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn clear(&mut self) {
        self.obstacles.clear();
    }
}

// ── Items ───────────────────────────────────────────────────────────

/// Items lying on the board.
#[derive(Debug, Clone, Default)]
pub struct ItemRegistry {
    items: Vec<ItemPlacement>,
}

impl ItemRegistry {
    pub fn add(&mut self, placement: ItemPlacement) {
        self.items.push(placement);
    }

    /// The item lying at `position`, if any.
    pub fn at(&self, position: Position) -> Option<&ItemPlacement> {
        self.items.iter().find(|p| p.position == position)
    }

    /// Remove the first item lying at `position`.
    pub fn remove_at(&mut self, position: Position) -> Option<ItemPlacement> {
        let index = self.items.iter().position(|p| p.position == position)?;
        Some(self.items.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemPlacement> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
