//! Error types for protocol and field payload decoding.

use thiserror::Error;

/// Failure to decode a single protocol line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,

    #[error("unrecognized command `{0}`")]
    Unknown(String),

    #[error("`{command}` is missing its {field} field")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    #[error("`{command}` has a malformed {field} field: `{value}`")]
    BadNumber {
        command: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("unknown special `{0}`")]
    BadSpecial(String),

    #[error("malformed win-list entry `{0}`")]
    BadWinEntry(String),
}

/// Failure to apply a field payload to a grid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("full field dump has {0} cells")]
    BadLength(usize),

    #[error("invalid tile character `{0}`")]
    BadTile(char),

    #[error("coordinate ({x}, {y}) is outside the field")]
    OutOfRange { x: i32, y: i32 },

    #[error("diff payload ends in the middle of a coordinate pair")]
    Truncated,
}
