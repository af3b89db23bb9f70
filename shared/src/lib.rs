//! # Shared Game Library
//!
//! Types and algorithms used by both the server and the client: the piece
//! geometry table, the 12x22 playing field, the field payload codec, the
//! text command protocol, game settings, the win-list and the line framing
//! used on the wire.
//!
//! Nothing in this crate owns a socket or a clock. The server and client
//! crates drive these types from their own event loops.

pub mod config;
pub mod crypt;
pub mod error;
pub mod field;
pub mod field_codec;
pub mod piece;
pub mod protocol;
pub mod special;
pub mod transport;
pub mod winlist;

pub use config::GameConfig;
pub use error::{FieldError, ProtocolError};
pub use field::{ClearResult, Field};
pub use piece::{Piece, PieceData, PieceTable};
pub use protocol::Command;
pub use special::{Attack, Special};
pub use winlist::{WinEntry, WinList};

pub const FIELD_WIDTH: usize = 12;
pub const FIELD_HEIGHT: usize = 22;

/// Number of player slots in a game room.
pub const MAX_PLAYERS: usize = 6;

pub const DEFAULT_PORT: u16 = 31457;

/// Highest level a player can reach.
pub const MAX_LEVEL: u32 = 100;

/// Client version string sent during registration.
pub const CLIENT_VERSION: &str = "1.13";

/// Longest nickname or team name accepted, in characters.
pub const MAX_NAME_LEN: usize = 63;

/// Truncates a nickname or team name to [`MAX_NAME_LEN`] characters.
pub fn clamp_name(name: &str) -> String {
    name.chars().take(MAX_NAME_LEN).collect()
}

/// Case-insensitive comparison used for nicknames and team names.
pub fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Two optional team names denote the same team only if both are set and
/// equal ignoring case.
pub fn same_team(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => names_match(a, b),
        _ => false,
    }
}
