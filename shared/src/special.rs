//! Special blocks and the attack names used by `sb` messages.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The nine special block kinds, in wire/frequency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Special {
    AddLine,
    ClearLine,
    Nuke,
    RandomClear,
    Switch,
    ClearSpecials,
    Gravity,
    Quake,
    Bomb,
}

impl Special {
    pub const ALL: [Special; 9] = [
        Special::AddLine,
        Special::ClearLine,
        Special::Nuke,
        Special::RandomClear,
        Special::Switch,
        Special::ClearSpecials,
        Special::Gravity,
        Special::Quake,
        Special::Bomb,
    ];

    /// Cell value of the first special kind; normal colors are 1..=5.
    pub const FIRST_TILE: u8 = 6;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Special> {
        Self::ALL.get(index).copied()
    }

    pub fn tile(self) -> u8 {
        Self::FIRST_TILE + self as u8
    }

    pub fn from_tile(tile: u8) -> Option<Special> {
        tile.checked_sub(Self::FIRST_TILE)
            .and_then(|i| Self::from_index(i as usize))
    }

    /// Letter used for this special in field dumps and `sb` messages.
    pub fn letter(self) -> char {
        b"acnrsbgqo"[self.index()] as char
    }

    pub fn from_letter(c: char) -> Option<Special> {
        Self::ALL.iter().copied().find(|s| s.letter() == c)
    }

    pub fn name(self) -> &'static str {
        match self {
            Special::AddLine => "Add Line",
            Special::ClearLine => "Clear Line",
            Special::Nuke => "Nuke Field",
            Special::RandomClear => "Clear Random Blocks",
            Special::Switch => "Switch Fields",
            Special::ClearSpecials => "Clear Special Blocks",
            Special::Gravity => "Block Gravity",
            Special::Quake => "Blockquake",
            Special::Bomb => "Block Bomb",
        }
    }
}

/// The `<type>` token of an `sb` message: either a special block or a
/// classic-mode line attack (`cs1`, `cs2`, `cs4`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attack {
    Special(Special),
    AddLines(u8),
}

impl fmt::Display for Attack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attack::Special(s) => write!(f, "{}", s.letter()),
            Attack::AddLines(n) => write!(f, "cs{}", n),
        }
    }
}

impl FromStr for Attack {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(count) = s.strip_prefix("cs") {
            return count
                .parse::<u8>()
                .ok()
                .filter(|n| (1..=4).contains(n))
                .map(Attack::AddLines)
                .ok_or_else(|| ProtocolError::BadSpecial(s.to_string()));
        }
        let mut chars = s.chars();
        match (chars.next().and_then(Special::from_letter), chars.next()) {
            (Some(special), None) => Ok(Attack::Special(special)),
            _ => Err(ProtocolError::BadSpecial(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_mapping() {
        assert_eq!(Special::AddLine.tile(), 6);
        assert_eq!(Special::Bomb.tile(), 14);
        assert_eq!(Special::from_tile(14), Some(Special::Bomb));
        assert_eq!(Special::from_tile(5), None);
        assert_eq!(Special::from_tile(15), None);
    }

    #[test]
    fn test_letters() {
        assert_eq!(Special::Switch.letter(), 's');
        assert_eq!(Special::from_letter('q'), Some(Special::Quake));
        assert_eq!(Special::from_letter('z'), None);
    }

    #[test]
    fn test_attack_parse() {
        assert_eq!("o".parse::<Attack>(), Ok(Attack::Special(Special::Bomb)));
        assert_eq!("cs2".parse::<Attack>(), Ok(Attack::AddLines(2)));
        assert!("cs9".parse::<Attack>().is_err());
        assert!("ab".parse::<Attack>().is_err());
        assert!("".parse::<Attack>().is_err());
        assert_eq!(Attack::AddLines(4).to_string(), "cs4");
    }
}
