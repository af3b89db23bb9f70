//! The persistent leaderboard of points and games played.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entries kept in memory.
pub const MAX_ENTRIES: usize = 64;
/// Entries written to the store.
pub const MAX_SAVED: usize = 32;
/// Entries sent in `winlist`; older clients overflow past this.
pub const MAX_ADVERTISED: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinEntry {
    pub name: String,
    /// Whether `name` is a team rather than a player.
    pub team: bool,
    pub points: u32,
    pub games: u32,
}

impl WinEntry {
    pub fn new(name: &str, team: bool) -> Self {
        Self {
            name: crate::clamp_name(name),
            team,
            points: 0,
            games: 0,
        }
    }

    /// Parses `<p|t><name>;<points>[;<games>]`.
    pub fn from_wire(token: &str) -> Result<Self, ProtocolError> {
        let bad = || ProtocolError::BadWinEntry(token.to_string());
        let (head, rest) = token.split_once(';').ok_or_else(bad)?;
        let mut kind = head.chars();
        let team = kind.next().ok_or_else(bad)? == 't';
        let (points, games) = match rest.split_once(';') {
            Some((points, games)) => (points, Some(games)),
            None => (rest, None),
        };
        Ok(Self {
            name: kind.as_str().to_string(),
            team,
            points: points.parse().map_err(|_| bad())?,
            games: games.map(str::parse::<u32>).transpose().map_err(|_| bad())?.unwrap_or(0),
        })
    }

    /// `<p|t><name>;<points>`, with `;<games>` appended when `with_games`.
    pub fn to_wire(&self, with_games: bool) -> String {
        let kind = if self.team { 't' } else { 'p' };
        if with_games {
            format!("{}{};{};{}", kind, self.name, self.points, self.games)
        } else {
            format!("{}{};{}", kind, self.name, self.points)
        }
    }

    /// Parses the store form `<name>;<team 0|1>;<points>;<games>`.
    pub fn from_saved(token: &str) -> Option<Self> {
        let mut parts = token.splitn(4, ';');
        let name = parts.next()?;
        let team = parts.next()?.parse::<u8>().ok()? != 0;
        let points = parts.next()?.parse().ok()?;
        let games = parts.next()?.trim().parse().ok()?;
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: crate::clamp_name(name),
            team,
            points,
            games,
        })
    }

    pub fn to_saved(&self) -> String {
        format!("{};{};{};{}", self.name, self.team as u8, self.points, self.games)
    }
}

impl fmt::Display for WinEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.team { "team" } else { "player" };
        write!(f, "{:>4} pts {:>4} games  {} ({})", self.points, self.games, self.name, kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WinList {
    entries: Vec<WinEntry>,
}

impl WinList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from entries, dropping any past [`MAX_ENTRIES`].
    pub fn from_entries(mut entries: Vec<WinEntry>) -> Self {
        entries.truncate(MAX_ENTRIES);
        Self { entries }
    }

    pub fn entries(&self) -> &[WinEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str, team: bool) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.team == team && crate::names_match(&e.name, name))
    }

    pub fn get(&self, name: &str, team: bool) -> Option<&WinEntry> {
        self.position(name, team).map(|i| &self.entries[i])
    }

    /// Credits points to a player or team, matched ignoring case, creating its entry if there is
    /// room. A full list gives up its last entry only to a newcomer earning
    /// more than that entry holds.
    pub fn add_points(&mut self, name: &str, team: bool, points: u32) {
        if let Some(i) = self.position(name, team) {
            self.entries[i].points += points;
            return;
        }
        let mut entry = WinEntry::new(name, team);
        entry.points = points;
        if self.entries.len() < MAX_ENTRIES {
            self.entries.push(entry);
        } else if let Some(last) = self.entries.last_mut() {
            if last.points < points {
                *last = entry;
            }
        }
    }

    /// Counts a game for an existing entry. Names not on the list are
    /// ignored.
    pub fn add_game(&mut self, name: &str, team: bool) {
        if let Some(i) = self.position(name, team) {
            self.entries[i].games += 1;
        }
    }

    /// Orders entries by points, highest first. Ties keep their order.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| b.points.cmp(&a.points));
    }

    /// Space-separated top entries for a `winlist` message.
    pub fn to_wire(&self, with_games: bool) -> String {
        self.entries
            .iter()
            .take(MAX_ADVERTISED)
            .map(|e| e.to_wire(with_games))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parses a `winlist` body, stopping at the first malformed entry.
    pub fn from_wire(text: &str) -> Self {
        let entries = text
            .split_whitespace()
            .map(WinEntry::from_wire)
            .take_while(Result::is_ok)
            .filter_map(Result::ok)
            .collect();
        Self::from_entries(entries)
    }

    /// Entries in store form, up to [`MAX_SAVED`].
    pub fn saved_tokens(&self) -> impl Iterator<Item = String> + '_ {
        self.entries.iter().take(MAX_SAVED).map(WinEntry::to_saved)
    }

    /// Parses the tokens of a `winlist` store directive, stopping at the
    /// first malformed one.
    pub fn from_saved<'a>(tokens: impl Iterator<Item = &'a str>) -> Self {
        let entries = tokens.map_while(WinEntry::from_saved).collect();
        Self::from_entries(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_entry_forms() {
        let e = WinEntry::from_wire("palice;12").unwrap();
        assert_eq!(e.name, "alice");
        assert!(!e.team);
        assert_eq!((e.points, e.games), (12, 0));

        let t = WinEntry::from_wire("tred;5;9").unwrap();
        assert!(t.team);
        assert_eq!((t.points, t.games), (5, 9));
        assert_eq!(t.to_wire(true), "tred;5;9");
        assert_eq!(t.to_wire(false), "tred;5");

        assert!(WinEntry::from_wire("nopoints").is_err());
        assert!(WinEntry::from_wire("px;abc").is_err());
    }

    #[test]
    fn test_add_points_and_games() {
        let mut list = WinList::new();
        list.add_points("bob", false, 1);
        list.add_points("alice", false, 3);
        list.add_game("alice", false);
        list.add_game("carol", false);
        list.sort();
        assert_eq!(list.entries()[0].name, "alice");
        assert_eq!(list.entries()[0].games, 1);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_team_and_player_names_are_separate() {
        let mut list = WinList::new();
        list.add_points("red", false, 1);
        list.add_points("red", true, 3);
        assert_eq!(list.len(), 2);
        assert_eq!(list.get("red", true).map(|e| e.points), Some(3));
    }

    #[test]
    fn test_full_list_evicts_only_lower_last() {
        let entries = (0..MAX_ENTRIES)
            .map(|i| WinEntry {
                name: format!("p{}", i),
                team: false,
                points: 10,
                games: 1,
            })
            .collect();
        let mut list = WinList::from_entries(entries);
        list.add_points("newbie", false, 3);
        assert!(list.get("newbie", false).is_none());

        list.add_points("champ", false, 11);
        assert_eq!(list.len(), MAX_ENTRIES);
        assert_eq!(list.entries().last().map(|e| e.name.as_str()), Some("champ"));
    }

    #[test]
    fn test_wire_advertises_ten() {
        let mut list = WinList::new();
        for i in 0..15 {
            list.add_points(&format!("p{}", i), false, i);
        }
        list.sort();
        let wire = list.to_wire(false);
        assert_eq!(wire.split(' ').count(), MAX_ADVERTISED);
        assert!(wire.starts_with("pp14;14 "));

        let parsed = WinList::from_wire(&wire);
        assert_eq!(parsed.len(), MAX_ADVERTISED);
        assert_eq!(parsed.entries()[0].points, 14);
    }

    #[test]
    fn test_saved_roundtrip() {
        let mut list = WinList::new();
        list.add_points("blue", true, 7);
        list.add_game("blue", true);
        list.add_points("dave", false, 2);
        let tokens: Vec<String> = list.saved_tokens().collect();
        assert_eq!(tokens, vec!["blue;1;7;1", "dave;0;2;0"]);

        let restored = WinList::from_saved(tokens.iter().map(String::as_str));
        assert_eq!(restored, list);
        assert!(WinList::from_saved(["x;1"].into_iter()).is_empty());
    }
}
