//! Maps typed lines to player actions.
//!
//! The client reads its terminal a line at a time. Outside a game the line
//! is partyline text. During a game each character of the line is a key,
//! so `hhx ` moves left twice, rotates and drops.

/// One player action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Left,
    Right,
    RotateClockwise,
    RotateCounterClockwise,
    SoftDrop,
    HardDrop,
    DiscardSpecial,
    /// Use the front special on this slot.
    UseSpecial(u8),
    Partyline(String),
    Gmsg(String),
    Quit,
}

/// Key bindings, printed at startup.
pub const KEY_HELP: &str = "keys: h/l move, x or k rotate, z rotate back, j down, space or . drop, \
                            d discard special, 1-6 use special, t <text> game message, /quit";

#[derive(Debug, Default)]
pub struct InputManager {
    in_game: bool,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches between game keys and partyline text.
    pub fn set_in_game(&mut self, in_game: bool) {
        self.in_game = in_game;
    }

    pub fn in_game(&self) -> bool {
        self.in_game
    }

    /// Returns the actions typed on one line, in order.
    pub fn parse_line(&self, line: &str) -> Vec<Input> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim() == "/quit" {
            return vec![Input::Quit];
        }
        if !self.in_game || line.starts_with('/') {
            if line.trim().is_empty() {
                return Vec::new();
            }
            return vec![Input::Partyline(line.to_string())];
        }
        if let Some(text) = line.strip_prefix("t ") {
            return vec![Input::Gmsg(text.to_string())];
        }
        line.chars().filter_map(key).collect()
    }
}

fn key(c: char) -> Option<Input> {
    let input = match c {
        'h' => Input::Left,
        'l' => Input::Right,
        'x' | 'k' => Input::RotateClockwise,
        'z' => Input::RotateCounterClockwise,
        'j' => Input::SoftDrop,
        ' ' | '.' => Input::HardDrop,
        'd' => Input::DiscardSpecial,
        '1'..='6' => Input::UseSpecial(c as u8 - b'0'),
        _ => return None,
    };
    Some(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partyline_outside_game() {
        let manager = InputManager::new();
        assert_eq!(manager.parse_line("hello all"), vec![Input::Partyline("hello all".into())]);
        assert!(manager.parse_line("   ").is_empty());
        assert_eq!(manager.parse_line("/quit"), vec![Input::Quit]);
    }

    #[test]
    fn test_keys_in_game() {
        let mut manager = InputManager::new();
        manager.set_in_game(true);
        assert_eq!(
            manager.parse_line("hlxzj ?3d"),
            vec![
                Input::Left,
                Input::Right,
                Input::RotateClockwise,
                Input::RotateCounterClockwise,
                Input::SoftDrop,
                Input::HardDrop,
                Input::UseSpecial(3),
                Input::DiscardSpecial,
            ]
        );
    }

    #[test]
    fn test_messages_in_game() {
        let mut manager = InputManager::new();
        manager.set_in_game(true);
        assert_eq!(manager.parse_line("t gg"), vec![Input::Gmsg("gg".into())]);
        assert_eq!(manager.parse_line("/pause"), vec![Input::Partyline("/pause".into())]);
        assert_eq!(manager.parse_line("7"), Vec::<Input>::new());
    }
}
