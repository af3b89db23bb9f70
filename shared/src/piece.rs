//! Piece geometry: seven shapes in four clockwise rotations.
//!
//! The shapes are written as text and parsed once into [`PieceData`]. Each
//! mask has exactly one hot spot, the cell that a piece's position refers to
//! and that stays put when the piece rotates.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Piece {
    Bar,
    Square,
    ReverseL,
    L,
    Z,
    S,
    T,
}

impl Piece {
    pub const ALL: [Piece; 7] = [
        Piece::Bar,
        Piece::Square,
        Piece::ReverseL,
        Piece::L,
        Piece::Z,
        Piece::S,
        Piece::T,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Piece> {
        Self::ALL.get(index).copied()
    }

    /// Normal tile color (1..=5) this piece is drawn with.
    pub fn color(self) -> u8 {
        (self.index() % 5) as u8 + 1
    }
}

// Rows of the 4x4 masks, each row listing the four rotations left to right.
// `.` empty, `#` filled, `X` filled hot spot, `x` empty hot spot.
const SHAPES: [[[&str; 4]; 4]; 7] = [
    [
        ["##X#", "..X.", "##X#", "..X."],
        ["....", "..#.", "....", "..#."],
        ["....", "..#.", "....", "..#."],
        ["....", "..#.", "....", "..#."],
    ],
    [
        ["....", "....", "....", "...."],
        [".X#.", ".X#.", ".X#.", ".X#."],
        [".##.", ".##.", ".##.", ".##."],
        ["....", "....", "....", "...."],
    ],
    [
        ["....", ".#..", "#...", ".##."],
        ["#X#.", ".X..", "#X#.", ".X.."],
        ["..#.", "##..", "....", ".#.."],
        ["....", "....", "....", "...."],
    ],
    [
        ["....", "##..", "..#.", ".#.."],
        ["#X#.", ".X..", "#X#.", ".X.."],
        ["#...", ".#..", "....", ".##."],
        ["....", "....", "....", "...."],
    ],
    [
        ["....", ".#..", "....", ".#.."],
        ["#X..", "#X..", "#X..", "#X.."],
        [".##.", "#...", ".##.", "#..."],
        ["....", "....", "....", "...."],
    ],
    [
        ["....", "#...", "....", "#..."],
        [".X#.", "#X..", ".X#.", "#X.."],
        ["##..", ".#..", "##..", ".#.."],
        ["....", "....", "....", "...."],
    ],
    [
        ["....", ".#..", ".#..", ".#.."],
        ["#X#.", "#X..", "#X#.", ".X#."],
        [".#..", ".#..", "....", ".#.."],
        ["....", "....", "....", "...."],
    ],
];

/// Geometry of one piece in one rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceData {
    pub hot_x: i32,
    pub hot_y: i32,
    /// Bounding box of the filled cells, in mask coordinates.
    pub top: i32,
    pub left: i32,
    pub bottom: i32,
    pub right: i32,
    pub mask: [[bool; 4]; 4],
}

impl PieceData {
    /// Field coordinates of every filled cell when the hot spot sits at (x, y).
    pub fn cells_at(&self, x: i32, y: i32) -> impl Iterator<Item = (i32, i32)> + '_ {
        let ox = x - self.hot_x;
        let oy = y - self.hot_y;
        (0..4).flat_map(move |j| {
            (0..4).filter_map(move |i| {
                if self.mask[j][i] {
                    Some((ox + i as i32, oy + j as i32))
                } else {
                    None
                }
            })
        })
    }
}

pub struct PieceTable {
    data: [[PieceData; 4]; 7],
}

static TABLE: OnceLock<PieceTable> = OnceLock::new();

impl PieceTable {
    /// The process-wide table, parsed on first use.
    pub fn get() -> &'static PieceTable {
        TABLE.get_or_init(PieceTable::parse)
    }

    /// Panics if a shape has a stray character or not exactly one hot spot.
    fn parse() -> PieceTable {
        let empty = PieceData {
            hot_x: -1,
            hot_y: -1,
            top: 3,
            left: 3,
            bottom: 0,
            right: 0,
            mask: [[false; 4]; 4],
        };
        let mut data = [[empty; 4]; 7];

        for (p, rows) in SHAPES.iter().enumerate() {
            for r in 0..4 {
                let pd = &mut data[p][r];
                let mut hot_spots = 0;
                for (y, row) in rows.iter().enumerate() {
                    for (x, ch) in row[r].chars().enumerate() {
                        let (filled, hot) = match ch {
                            '.' => (false, false),
                            '#' => (true, false),
                            'x' => (false, true),
                            'X' => (true, true),
                            other => panic!(
                                "piece {} rotation {}: unexpected `{}` at ({}, {})",
                                p, r, other, x, y
                            ),
                        };
                        pd.mask[y][x] = filled;
                        if filled {
                            pd.top = pd.top.min(y as i32);
                            pd.left = pd.left.min(x as i32);
                            pd.bottom = pd.bottom.max(y as i32);
                            pd.right = pd.right.max(x as i32);
                        }
                        if hot {
                            hot_spots += 1;
                            pd.hot_x = x as i32;
                            pd.hot_y = y as i32;
                        }
                    }
                }
                assert!(
                    hot_spots == 1,
                    "piece {} rotation {} has {} hot spots",
                    p,
                    r,
                    hot_spots
                );
            }
        }

        PieceTable { data }
    }

    pub fn data(&self, piece: Piece, rotation: usize) -> &PieceData {
        &self.data[piece.index()][rotation % 4]
    }

    /// Colored 4x4 mask for a piece/rotation given as raw indices, or `None`
    /// when either index is out of range.
    pub fn shape(&self, piece: usize, rotation: usize) -> Option<[[u8; 4]; 4]> {
        let kind = Piece::from_index(piece)?;
        if rotation > 3 {
            return None;
        }
        let pd = &self.data[piece][rotation];
        let mut out = [[0u8; 4]; 4];
        for y in 0..4 {
            for x in 0..4 {
                if pd.mask[y][x] {
                    out[y][x] = kind.color();
                }
            }
        }
        Some(out)
    }
}
