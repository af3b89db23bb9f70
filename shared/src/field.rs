//! The 12x22 playing field and the grid operations shared by line clearing
//! and special block effects.
//!
//! Row 0 is the top of the field. A cell holds 0 (empty), 1..=5 (normal
//! colors) or 6..=14 (special blocks).

use crate::config::weighted_index;
use crate::piece::{Piece, PieceTable};
use crate::special::Special;
use crate::{FIELD_HEIGHT, FIELD_WIDTH};
use rand::Rng;

pub const EMPTY: u8 = 0;
pub const MAX_TILE: u8 = 14;

const CELL_COUNT: usize = FIELD_WIDTH * FIELD_HEIGHT;

/// Outcome of removing full rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearResult {
    pub lines: usize,
    /// How many blocks of each special kind were destroyed, by kind index.
    pub specials: [u32; 9],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    cells: [[u8; FIELD_WIDTH]; FIELD_HEIGHT],
}

impl Default for Field {
    fn default() -> Self {
        Self::new()
    }
}

fn random_color<R: Rng>(rng: &mut R) -> u8 {
    rng.gen_range(1..=5)
}

impl Field {
    pub fn new() -> Self {
        Self {
            cells: [[EMPTY; FIELD_WIDTH]; FIELD_HEIGHT],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[y][x]
    }

    pub fn set(&mut self, x: usize, y: usize, tile: u8) {
        debug_assert!(tile <= MAX_TILE, "tile {} out of range", tile);
        self.cells[y][x] = tile;
    }

    pub fn row(&self, y: usize) -> &[u8; FIELD_WIDTH] {
        &self.cells[y]
    }

    pub fn set_row(&mut self, y: usize, row: [u8; FIELD_WIDTH]) {
        self.cells[y] = row;
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(|c| *c == EMPTY)
    }

    /// Number of occupied cells, specials included.
    pub fn block_count(&self) -> usize {
        self.cells.iter().flatten().filter(|c| **c != EMPTY).count()
    }

    /// Number of cells that differ from `other`.
    pub fn diff_count(&self, other: &Field) -> usize {
        self.cells
            .iter()
            .flatten()
            .zip(other.cells.iter().flatten())
            .filter(|(a, b)| a != b)
            .count()
    }

    pub fn clear(&mut self) {
        self.cells = [[EMPTY; FIELD_WIDTH]; FIELD_HEIGHT];
    }

    /// Whether the piece with its hot spot at (x, y) would leave the field or
    /// hit an occupied cell. Cells above the top edge never count.
    pub fn overlaps(&self, piece: Piece, rotation: usize, x: i32, y: i32) -> bool {
        let pd = PieceTable::get().data(piece, rotation);
        pd.cells_at(x, y).any(|(cx, cy)| {
            if cy < 0 {
                return false;
            }
            cy >= FIELD_HEIGHT as i32
                || cx < 0
                || cx >= FIELD_WIDTH as i32
                || self.cells[cy as usize][cx as usize] != EMPTY
        })
    }

    /// Writes `tile` into every in-field cell of the piece. Passing
    /// [`EMPTY`] erases a previously drawn piece.
    pub fn stamp(&mut self, piece: Piece, rotation: usize, x: i32, y: i32, tile: u8) {
        let pd = PieceTable::get().data(piece, rotation);
        for (cx, cy) in pd.cells_at(x, y) {
            if (0..FIELD_WIDTH as i32).contains(&cx) && (0..FIELD_HEIGHT as i32).contains(&cy) {
                self.cells[cy as usize][cx as usize] = tile;
            }
        }
    }

    fn row_is_full(&self, y: usize) -> bool {
        self.cells[y].iter().all(|c| *c != EMPTY)
    }

    /// Removes every full row, letting the rows above fall into place, and
    /// tallies the special blocks destroyed.
    pub fn clear_full_lines(&mut self) -> ClearResult {
        let mut result = ClearResult::default();
        for y in 0..FIELD_HEIGHT {
            if !self.row_is_full(y) {
                continue;
            }
            result.lines += 1;
            for tile in self.cells[y] {
                if let Some(special) = Special::from_tile(tile) {
                    result.specials[special.index()] += 1;
                }
            }
            self.cells.copy_within(0..y, 1);
            self.cells[0] = [EMPTY; FIELD_WIDTH];
        }
        result
    }

    /// Turns up to `count` normal blocks into specials drawn from
    /// `frequencies`. Makes at most 10 passes over the field; when there are
    /// fewer blocks than requested, every block is a candidate.
    pub fn place_random_specials<R: Rng>(&mut self, rng: &mut R, count: usize, frequencies: &[u32; 9]) {
        let blocks = self.block_count();
        if blocks == 0 {
            return;
        }
        let target = count.min(blocks);
        let mut left = target;
        let mut passes = 10;

        while left > 0 && passes > 0 {
            'scan: for y in 0..FIELD_HEIGHT {
                for x in 0..FIELD_WIDTH {
                    if left == 0 {
                        break 'scan;
                    }
                    let tile = self.cells[y][x];
                    if tile == EMPTY || Special::from_tile(tile).is_some() {
                        continue;
                    }
                    if rng.gen_range(0..blocks) < target {
                        let which = weighted_index(frequencies, rng.gen_range(0..100));
                        self.cells[y][x] = Special::ALL[which].tile();
                        left -= 1;
                    }
                }
            }
            passes -= 1;
        }
    }

    /// Pushes the field up one row and fills the bottom row with random
    /// normal tiles, then knocks `holes` random cells out of it.
    pub fn add_garbage_line<R: Rng>(&mut self, rng: &mut R, holes: usize) {
        self.cells.copy_within(1..FIELD_HEIGHT, 0);
        let bottom = FIELD_HEIGHT - 1;
        for x in 0..FIELD_WIDTH {
            self.cells[bottom][x] = random_color(rng);
        }
        for _ in 0..holes {
            self.cells[bottom][rng.gen_range(0..FIELD_WIDTH)] = EMPTY;
        }
    }

    /// Drops the bottom row and shifts everything down by one.
    pub fn remove_bottom_line(&mut self) {
        self.cells.copy_within(0..FIELD_HEIGHT - 1, 1);
        self.cells[0] = [EMPTY; FIELD_WIDTH];
    }

    /// Replaces every special block with a random normal tile.
    pub fn randomize_specials<R: Rng>(&mut self, rng: &mut R) {
        for cell in self.cells.iter_mut().flatten() {
            if Special::from_tile(*cell).is_some() {
                *cell = random_color(rng);
            }
        }
    }

    /// Compacts every column downward so no column has a gap under a block.
    pub fn apply_gravity(&mut self) {
        for x in 0..FIELD_WIDTH {
            let mut y = FIELD_HEIGHT - 1;
            while y > 0 {
                if self.cells[y][x] != EMPTY {
                    y -= 1;
                    continue;
                }
                if (0..y).all(|y2| self.cells[y2][x] == EMPTY) {
                    break;
                }
                for y2 in (0..y).rev() {
                    self.cells[y2 + 1][x] = self.cells[y2][x];
                }
                self.cells[0][x] = EMPTY;
            }
        }
    }

    /// Detonates every bomb block: the bomb and its eight neighbours are
    /// scattered to random spots in the lower 16 rows. In windows mode blocks
    /// land regardless of occupancy and empty neighbours scatter too.
    pub fn detonate_bombs<R: Rng>(&mut self, rng: &mut R, windows_mode: bool) {
        let bomb = Special::Bomb.tile();
        for y in 0..FIELD_HEIGHT {
            for x in 0..FIELD_WIDTH {
                if self.cells[y][x] != bomb {
                    continue;
                }
                self.cells[y][x] = EMPTY;
                for y2 in y.saturating_sub(1)..=(y + 1).min(FIELD_HEIGHT - 1) {
                    for x2 in x.saturating_sub(1)..=(x + 1).min(FIELD_WIDTH - 1) {
                        if !windows_mode && self.cells[y2][x2] == EMPTY {
                            continue;
                        }
                        for _ in 0..10 {
                            let xnew = rng.gen_range(0..FIELD_WIDTH);
                            let ynew = FIELD_HEIGHT - 1 - rng.gen_range(0..16);
                            if windows_mode || self.cells[ynew][xnew] == EMPTY {
                                self.cells[ynew][xnew] = self.cells[y2][x2];
                                break;
                            }
                        }
                        self.cells[y2][x2] = EMPTY;
                    }
                }
            }
        }
    }

    /// Shifts each row one cell left, right, or not at all. Cells pushed off
    /// one edge wrap to the other, or vanish in windows mode.
    pub fn quake<R: Rng>(&mut self, rng: &mut R, windows_mode: bool) {
        for row in self.cells.iter_mut() {
            match rng.gen_range(0..3) {
                0 => {
                    row.rotate_left(1);
                    if windows_mode {
                        row[FIELD_WIDTH - 1] = EMPTY;
                    }
                }
                2 => {
                    row.rotate_right(1);
                    if windows_mode {
                        row[0] = EMPTY;
                    }
                }
                _ => {}
            }
        }
    }

    /// Clears one random occupied cell, giving up after ten empty probes.
    pub fn clear_random_block<R: Rng>(&mut self, rng: &mut R) {
        for _ in 0..10 {
            let x = rng.gen_range(0..FIELD_WIDTH);
            let y = rng.gen_range(0..FIELD_HEIGHT);
            if self.cells[y][x] != EMPTY {
                self.cells[y][x] = EMPTY;
                break;
            }
        }
    }

    pub fn clear_top_rows(&mut self, rows: usize) {
        for row in self.cells.iter_mut().take(rows) {
            *row = [EMPTY; FIELD_WIDTH];
        }
    }

    /// Fills every cell with a random normal tile.
    pub fn fill_random<R: Rng>(&mut self, rng: &mut R) {
        for cell in self.cells.iter_mut().flatten() {
            *cell = random_color(rng);
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = u8> + '_ {
        self.cells.iter().flatten().copied()
    }

    /// Builds a field from 264 row-major cell values.
    pub fn from_cells(cells: &[u8]) -> Option<Field> {
        if cells.len() != CELL_COUNT || cells.iter().any(|c| *c > MAX_TILE) {
            return None;
        }
        let mut field = Field::new();
        for (i, tile) in cells.iter().enumerate() {
            field.cells[i / FIELD_WIDTH][i % FIELD_WIDTH] = *tile;
        }
        Some(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn fill_row(field: &mut Field, y: usize, tile: u8) {
        field.set_row(y, [tile; FIELD_WIDTH]);
    }

    #[test]
    fn test_overlaps_bounds() {
        let field = Field::new();
        // Bar lying flat, hot spot at column 2 of its mask.
        assert!(!field.overlaps(Piece::Bar, 0, 2, 0));
        assert!(field.overlaps(Piece::Bar, 0, 1, 0));
        assert!(!field.overlaps(Piece::Bar, 0, 10, 0));
        assert!(field.overlaps(Piece::Bar, 0, 11, 0));
        assert!(field.overlaps(Piece::Bar, 0, 5, FIELD_HEIGHT as i32));
        // Partly above the top edge is allowed.
        assert!(!field.overlaps(Piece::Bar, 1, 5, -2));
    }

    #[test]
    fn test_overlaps_occupied_cell() {
        let mut field = Field::new();
        field.set(5, 10, 3);
        assert!(field.overlaps(Piece::Square, 0, 5, 10));
        assert!(!field.overlaps(Piece::Square, 0, 5, 8));
    }

    #[test]
    fn test_clear_full_lines_compacts_down() {
        let mut field = Field::new();
        for y in 0..FIELD_HEIGHT {
            // Leave a gap in every row so only the ones we fill are full.
            field.set(0, y, (y % 5) as u8 + 1);
        }
        fill_row(&mut field, 5, 2);
        fill_row(&mut field, 9, 3);
        field.set(4, 9, Special::Nuke.tile());
        let before = field;

        let result = field.clear_full_lines();
        assert_eq!(result.lines, 2);
        assert_eq!(result.specials[Special::Nuke.index()], 1);

        // Rows below the lowest cleared row are untouched.
        for y in 10..FIELD_HEIGHT {
            assert_eq!(field.row(y), before.row(y));
        }
        // Rows 6..=8 dropped one, rows 0..=4 dropped two.
        for y in 6..=8 {
            assert_eq!(field.row(y + 1), before.row(y));
        }
        for y in 0..=4 {
            assert_eq!(field.row(y + 2), before.row(y));
        }
        assert_eq!(field.row(0), &[EMPTY; FIELD_WIDTH]);
        assert_eq!(field.row(1), &[EMPTY; FIELD_WIDTH]);
    }

    #[test]
    fn test_clear_full_lines_none() {
        let mut field = Field::new();
        field.set(3, 21, 1);
        let before = field;
        assert_eq!(field.clear_full_lines().lines, 0);
        assert_eq!(field, before);
    }

    #[test]
    fn test_place_random_specials_limited_by_blocks() {
        let mut field = Field::new();
        field.set(0, 21, 1);
        field.set(1, 21, 2);
        let mut freq = [0u32; 9];
        freq[Special::Bomb.index()] = 100;
        field.place_random_specials(&mut rng(), 5, &freq);
        assert_eq!(field.get(0, 21), Special::Bomb.tile());
        assert_eq!(field.get(1, 21), Special::Bomb.tile());
        assert_eq!(field.block_count(), 2);
    }

    #[test]
    fn test_place_random_specials_exact_count() {
        let mut field = Field::new();
        for y in 12..FIELD_HEIGHT {
            fill_row(&mut field, y, 4);
        }
        let freq = [18, 18, 3, 12, 0, 16, 3, 12, 18];
        field.place_random_specials(&mut rng(), 3, &freq);
        let specials = field.cells().filter(|t| *t > 5).count();
        assert_eq!(specials, 3);
    }

    #[test]
    fn test_place_random_specials_empty_field() {
        let mut field = Field::new();
        field.place_random_specials(&mut rng(), 3, &[100, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(field.is_empty());
    }

    #[test]
    fn test_add_garbage_line() {
        let mut field = Field::new();
        field.set(3, 21, 5);
        field.add_garbage_line(&mut rng(), 1);
        assert_eq!(field.get(3, 20), 5);
        let bottom_empty = field.row(21).iter().filter(|c| **c == EMPTY).count();
        assert_eq!(bottom_empty, 1);
    }

    #[test]
    fn test_remove_bottom_line() {
        let mut field = Field::new();
        fill_row(&mut field, 21, 1);
        field.set(2, 20, 3);
        field.remove_bottom_line();
        assert_eq!(field.get(2, 21), 3);
        assert_eq!(field.block_count(), 1);
    }

    #[test]
    fn test_gravity_closes_gaps() {
        let mut field = Field::new();
        field.set(0, 5, 1);
        field.set(0, 10, 2);
        field.set(0, 21, 3);
        field.apply_gravity();
        assert_eq!(field.get(0, 21), 3);
        assert_eq!(field.get(0, 20), 2);
        assert_eq!(field.get(0, 19), 1);
        assert_eq!(field.block_count(), 3);
    }

    #[test]
    fn test_randomize_specials() {
        let mut field = Field::new();
        field.set(1, 1, Special::Quake.tile());
        field.randomize_specials(&mut rng());
        assert!((1..=5).contains(&field.get(1, 1)));
    }

    #[test]
    fn test_quake_preserves_block_count() {
        let mut field = Field::new();
        for y in 10..FIELD_HEIGHT {
            field.set(y % FIELD_WIDTH, y, 2);
        }
        let before = field.block_count();
        field.quake(&mut rng(), false);
        assert_eq!(field.block_count(), before);
    }

    #[test]
    fn test_bomb_removes_bomb_tile() {
        let mut field = Field::new();
        field.set(5, 20, Special::Bomb.tile());
        field.set(4, 20, 1);
        field.detonate_bombs(&mut rng(), false);
        assert!(field.cells().all(|t| t != Special::Bomb.tile()));
        assert!(field.block_count() <= 1);
    }

    #[test]
    fn test_clear_random_block() {
        let mut field = Field::new();
        fill_row(&mut field, 21, 1);
        fill_row(&mut field, 20, 1);
        let mut rng = rng();
        for _ in 0..50 {
            field.clear_random_block(&mut rng);
        }
        assert!(field.block_count() < 2 * FIELD_WIDTH);
    }

    #[test]
    fn test_clear_top_rows_and_fill() {
        let mut field = Field::new();
        field.fill_random(&mut rng());
        assert_eq!(field.block_count(), FIELD_WIDTH * FIELD_HEIGHT);
        field.clear_top_rows(6);
        assert_eq!(field.block_count(), FIELD_WIDTH * (FIELD_HEIGHT - 6));
    }

    #[test]
    fn test_stamp_and_erase() {
        let mut field = Field::new();
        field.stamp(Piece::T, 0, 5, 1, Piece::T.color());
        assert_eq!(field.block_count(), 4);
        assert!(field.overlaps(Piece::T, 0, 5, 1));
        field.stamp(Piece::T, 0, 5, 1, EMPTY);
        assert!(field.is_empty());
    }
}
