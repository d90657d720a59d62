//! Render model of the grid consumed by the rendering collaborator.
//!
//! The board mirrors the registries cell by cell. Player markers follow a
//! first-writer-wins rule: a marker is never placed on a cell already held by
//! a different player. This is a rendering-conflict guard only; authoritative
//! occupancy is decided by the server.

use crate::protocol::{ItemKind, PlayerId, Position};

/// A player marker on a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    pub id: PlayerId,
    pub is_self: bool,
    /// The local player's optimistic, not yet acknowledged position.
    pub unconfirmed: bool,
}

/// Contents of one grid cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub obstacle: bool,
    pub item: Option<ItemKind>,
    pub occupant: Option<Occupant>,
}

/// Square grid of [`Cell`]s.
#[derive(Debug, Clone)]
pub struct Board {
    size: i32,
    cells: Vec<Cell>,
}

impl Board {
    /// Create an empty `size × size` board.
    pub fn new(size: i32) -> Self {
        let size = size.max(0);
        let side = usize::try_from(size).unwrap_or(0);
        Self {
            size,
            cells: vec![Cell::default(); side * side],
        }
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    fn index(&self, position: Position) -> Option<usize> {
        if !position.in_bounds(self.size) {
            return None;
        }
        usize::try_from(position.y * self.size + position.x).ok()
    }

    /// The cell at `position`, or `None` outside the grid.
    pub fn cell(&self, position: Position) -> Option<&Cell> {
        self.index(position).and_then(|i| self.cells.get(i))
    }

    fn cell_mut(&mut self, position: Position) -> Option<&mut Cell> {
        let index = self.index(position)?;
        self.cells.get_mut(index)
    }

    pub fn mark_obstacle(&mut self, position: Position) {
        if let Some(cell) = self.cell_mut(position) {
            cell.obstacle = true;
        }
    }

    pub fn mark_item(&mut self, position: Position, kind: ItemKind) {
        if let Some(cell) = self.cell_mut(position) {
            cell.item = Some(kind);
        }
    }

    pub fn clear_item(&mut self, position: Position) {
        if let Some(cell) = self.cell_mut(position) {
            cell.item = None;
        }
    }

    /// Move the marker of `id` to `position`.
    ///
    /// The previous marker of `id` is always lifted. Returns `false` (and
    /// places nothing) when the target cell is held by another player or lies
    /// outside the grid.
    pub fn place_player(
        &mut self,
        id: &str,
        position: Position,
        is_self: bool,
        unconfirmed: bool,
    ) -> bool {
        self.remove_player(id);
        let Some(cell) = self.cell_mut(position) else {
            return false;
        };
        if let Some(existing) = &cell.occupant {
            if existing.id != id {
                return false;
            }
        }
        cell.occupant = Some(Occupant {
            id: id.to_owned(),
            is_self,
            unconfirmed: is_self && unconfirmed,
        });
        true
    }

    /// Lift the marker of `id` wherever it is.
    pub fn remove_player(&mut self, id: &str) {
        for cell in &mut self.cells {
            if cell.occupant.as_ref().is_some_and(|o| o.id == id) {
                cell.occupant = None;
            }
        }
    }

    /// Position of the marker of `id`, if placed.
    pub fn marker_of(&self, id: &str) -> Option<Position> {
        let index = self
            .cells
            .iter()
            .position(|c| c.occupant.as_ref().is_some_and(|o| o.id == id))?;
        let index = i32::try_from(index).ok()?;
        Some(Position::new(index % self.size, index / self.size))
    }

    /// Remove every marker, obstacle and item.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::default();
        }
    }

    /// Plain-text rendering, one row per line.
    ///
    /// `@` local player, `?` local player unconfirmed, `P` other player,
    /// `#` obstacle, `c` coin, `d` diamond, `.` empty.
    pub fn render_text(&self) -> String {
        let side = usize::try_from(self.size).unwrap_or(0);
        let mut out = String::with_capacity(self.cells.len() + side);
        for row in self.cells.chunks(side.max(1)) {
            for cell in row {
                out.push(cell_glyph(cell));
            }
            out.push('\n');
        }
        out
    }
}

fn cell_glyph(cell: &Cell) -> char {
    match (&cell.occupant, cell.obstacle, cell.item) {
        (Some(o), _, _) if o.is_self && o.unconfirmed => '?',
        (Some(o), _, _) if o.is_self => '@',
        (Some(_), _, _) => 'P',
        (None, true, _) => '#',
        (None, false, Some(ItemKind::Coin)) => 'c',
        (None, false, Some(ItemKind::Diamond)) => 'd',
        (None, false, None) => '.',
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn first_writer_wins_on_shared_cell() {
        let mut board = Board::new(5);
        assert!(board.place_player("p2", Position::new(2, 2), false, false));
        assert!(!board.place_player("me", Position::new(2, 2), true, true));
        let occupant = board.cell(Position::new(2, 2)).unwrap().occupant.as_ref().unwrap();
        assert_eq!(occupant.id, "p2");
        assert!(board.marker_of("me").is_none());
    }

    #[test]
    fn placing_moves_the_existing_marker() {
        let mut board = Board::new(5);
        board.place_player("me", Position::new(0, 0), true, false);
        board.place_player("me", Position::new(1, 0), true, true);
        assert!(board.cell(Position::new(0, 0)).unwrap().occupant.is_none());
        assert_eq!(board.marker_of("me"), Some(Position::new(1, 0)));
        assert!(board.cell(Position::new(1, 0)).unwrap().occupant.as_ref().unwrap().unconfirmed);
    }

    #[test]
    fn out_of_bounds_is_ignored() {
        let mut board = Board::new(3);
        assert!(!board.place_player("p", Position::new(3, 0), false, false));
        board.mark_obstacle(Position::new(-1, 0));
        assert!(board.cell(Position::new(-1, 0)).is_none());
    }

    #[test]
    fn render_text_shows_every_layer() {
        let mut board = Board::new(3);
        board.mark_obstacle(Position::new(0, 0));
        board.mark_item(Position::new(1, 0), ItemKind::Coin);
        board.mark_item(Position::new(2, 0), ItemKind::Diamond);
        board.place_player("me", Position::new(0, 1), true, false);
        board.place_player("p2", Position::new(1, 1), false, false);
        assert_eq!(board.render_text(), "#cd\n@P.\n...\n");
        board.clear();
        assert_eq!(board.render_text(), "...\n...\n...\n");
    }
}
