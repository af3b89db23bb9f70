//! Text encodings of a field carried by `f` messages.
//!
//! A full dump is one character per cell, row-major: `'0'..='5'` for empty
//! and normal tiles, a special's letter otherwise. A diff lists changed cells
//! grouped by their new tile: a selector byte `'!' + tile` followed by
//! `'3' + x`, `'3' + y` pairs. Every selector sorts below `'0'`, which is how
//! a decoder tells the two forms apart.

use crate::error::FieldError;
use crate::field::{Field, MAX_TILE};
use crate::special::Special;
use crate::{FIELD_HEIGHT, FIELD_WIDTH};

const CELL_COUNT: usize = FIELD_WIDTH * FIELD_HEIGHT;
const SELECTOR_BASE: u8 = b'!';
const COORD_BASE: u8 = b'3';

fn tile_char(tile: u8) -> char {
    match Special::from_tile(tile) {
        Some(special) => special.letter(),
        None => (b'0' + tile) as char,
    }
}

fn char_tile(c: char) -> Result<u8, FieldError> {
    match c {
        '0'..='5' => Ok(c as u8 - b'0'),
        _ => Special::from_letter(c)
            .map(Special::tile)
            .ok_or(FieldError::BadTile(c)),
    }
}

/// Encodes every cell of `field`.
pub fn encode_full(field: &Field) -> String {
    field.cells().map(tile_char).collect()
}

fn encode_diff(field: &Field, old: &Field) -> String {
    let mut out = String::new();
    for tile in 0..=MAX_TILE {
        let mut seen = false;
        for y in 0..FIELD_HEIGHT {
            for x in 0..FIELD_WIDTH {
                if field.get(x, y) != tile || old.get(x, y) == tile {
                    continue;
                }
                if !seen {
                    out.push((SELECTOR_BASE + tile) as char);
                    seen = true;
                }
                out.push((COORD_BASE + x as u8) as char);
                out.push((COORD_BASE + y as u8) as char);
            }
        }
    }
    out
}

/// Picks the payload to send for `field` given what peers last saw. The
/// diff form is used when a previous field is known, fewer than half the
/// cells changed and the diff is no longer than a full dump.
pub fn encode_update(field: &Field, old: Option<&Field>) -> String {
    if let Some(old) = old {
        if field.diff_count(old) < CELL_COUNT / 2 {
            let diff = encode_diff(field, old);
            if diff.len() <= CELL_COUNT {
                return diff;
            }
        }
    }
    encode_full(field)
}

/// Applies a full dump or diff payload to `field`. The field is left
/// untouched if any part of the payload is invalid. An empty payload is a
/// no-op.
pub fn apply_payload(field: &mut Field, payload: &str) -> Result<(), FieldError> {
    let Some(first) = payload.chars().next() else {
        return Ok(());
    };

    if first >= '0' {
        let cells = payload
            .chars()
            .map(char_tile)
            .collect::<Result<Vec<u8>, FieldError>>()?;
        *field = Field::from_cells(&cells).ok_or(FieldError::BadLength(cells.len()))?;
        return Ok(());
    }

    let mut updated = *field;
    let mut tile = 0u8;
    let mut chars = payload.chars();
    while let Some(c) = chars.next() {
        if c < '0' {
            tile = (c as u32)
                .checked_sub(SELECTOR_BASE as u32)
                .filter(|t| *t <= MAX_TILE as u32)
                .ok_or(FieldError::BadTile(c))? as u8;
            continue;
        }
        let cy = chars.next().ok_or(FieldError::Truncated)?;
        let x = c as i32 - COORD_BASE as i32;
        let y = cy as i32 - COORD_BASE as i32;
        if !(0..FIELD_WIDTH as i32).contains(&x) || !(0..FIELD_HEIGHT as i32).contains(&y) {
            return Err(FieldError::OutOfRange { x, y });
        }
        updated.set(x as usize, y as usize, tile);
    }
    *field = updated;
    Ok(())
}
