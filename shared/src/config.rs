//! Game settings broadcast at the start of every game.

use serde::{Deserialize, Serialize};

/// Largest special inventory a client will allocate.
pub const MAX_SPECIAL_CAPACITY: usize = 64;

/// Rules for one game. The server loads these from its store and sends
/// them to every player in `newgame`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Percent chance of each piece kind; must total 100 to start a game.
    pub piece_freq: [u32; 7],
    /// Percent chance of each special kind; must total 100 to start a game.
    pub special_freq: [u32; 9],
    pub initial_level: u32,
    pub lines_per_level: u32,
    pub level_inc: u32,
    pub level_average: bool,
    pub special_lines: u32,
    pub special_count: u32,
    pub special_capacity: u32,
    /// Classic rules: multi-line clears attack opponents with garbage.
    pub old_mode: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            piece_freq: [14, 14, 15, 14, 14, 14, 15],
            special_freq: [18, 18, 3, 12, 0, 16, 3, 12, 18],
            initial_level: 1,
            lines_per_level: 2,
            level_inc: 1,
            level_average: true,
            special_lines: 1,
            special_count: 1,
            special_capacity: 18,
            old_mode: true,
        }
    }
}

/// Which frequency table failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyTable {
    Pieces,
    Specials,
}

impl FrequencyTable {
    /// Human readable rejection text sent to players.
    pub fn complaint(self) -> &'static str {
        match self {
            FrequencyTable::Pieces => "Piece frequencies do not total 100 percent!",
            FrequencyTable::Specials => "Special frequencies do not total 100 percent!",
        }
    }
}

impl GameConfig {
    /// Checks that both frequency tables total exactly 100.
    pub fn validate(&self) -> Result<(), FrequencyTable> {
        if self.piece_freq.iter().sum::<u32>() != 100 {
            return Err(FrequencyTable::Pieces);
        }
        if self.special_freq.iter().sum::<u32>() != 100 {
            return Err(FrequencyTable::Specials);
        }
        Ok(())
    }

    /// The 100-character piece table sent in `newgame`: `'1' + kind`
    /// repeated by its frequency.
    pub fn piece_sequence(&self) -> String {
        frequency_sequence(&self.piece_freq)
    }

    pub fn special_sequence(&self) -> String {
        frequency_sequence(&self.special_freq)
    }

    /// Inventory capacity clamped to what a client allocates.
    pub fn capacity(&self) -> usize {
        (self.special_capacity as usize).min(MAX_SPECIAL_CAPACITY)
    }
}

fn frequency_sequence(weights: &[u32]) -> String {
    weights
        .iter()
        .enumerate()
        .flat_map(|(i, w)| std::iter::repeat((b'1' + i as u8) as char).take(*w as usize))
        .collect()
}

/// Counts occurrences of `'1' + kind` in a frequency sequence. Characters
/// naming no kind are ignored.
pub fn parse_sequence<const N: usize>(sequence: &str) -> [u32; N] {
    let mut weights = [0u32; N];
    for c in sequence.bytes() {
        if let Some(i) = c.checked_sub(b'1') {
            if let Some(w) = weights.get_mut(i as usize) {
                *w += 1;
            }
        }
    }
    weights
}

/// Selects a kind by walking cumulative weights with a roll in `0..100`.
/// Never returns past the last kind, even if the weights total less.
pub fn weighted_index(weights: &[u32], roll: u32) -> usize {
    let mut n = roll;
    let mut index = 0;
    while index + 1 < weights.len() && n >= weights[index] {
        n -= weights[index];
        index += 1;
    }
    index
}
