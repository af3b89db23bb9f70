//! Output side of the client.
//!
//! The controller reports everything worth showing through [`Display`].
//! [`TerminalDisplay`] writes it as plain text lines, which is all a
//! line-oriented terminal client needs.

use log::{debug, warn};
use shared::{Field, Piece, Special, WinList, FIELD_HEIGHT, FIELD_WIDTH};
use std::io::Write;

/// Which text window a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextBuffer {
    Partyline,
    Gmsg,
    AttDef,
}

impl TextBuffer {
    fn tag(self) -> &'static str {
        match self {
            TextBuffer::Partyline => "party",
            TextBuffer::Gmsg => "game",
            TextBuffer::AttDef => "attack",
        }
    }
}

/// Numbers shown beside the player's own field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub lines: u32,
    pub level: u32,
    pub next: Piece,
    pub specials: Vec<Special>,
}

pub trait Display {
    fn text(&mut self, buffer: TextBuffer, line: &str);
    /// The player's field, falling piece included.
    fn own_field(&mut self, field: &Field);
    fn other_field(&mut self, slot: u8, field: &Field);
    fn status(&mut self, status: &Status);
    fn winlist(&mut self, list: &WinList);
}

/// One character per cell: `.` for empty, the color digit for normal
/// tiles and the special's letter for specials.
pub fn render_field(field: &Field) -> Vec<String> {
    (0..FIELD_HEIGHT)
        .map(|y| {
            (0..FIELD_WIDTH)
                .map(|x| match field.get(x, y) {
                    0 => '.',
                    tile => Special::from_tile(tile)
                        .map(Special::letter)
                        .unwrap_or((b'0' + tile) as char),
                })
                .collect()
        })
        .collect()
}

/// Writes text and, optionally, the player's own field to `out`.
pub struct TerminalDisplay<W: Write> {
    out: W,
    draw_fields: bool,
    last_status: Option<Status>,
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, draw_fields: bool) -> Self {
        Self {
            out,
            draw_fields,
            last_status: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{}", line) {
            warn!("Display write failed: {}", e);
        }
    }
}

impl<W: Write> Display for TerminalDisplay<W> {
    fn text(&mut self, buffer: TextBuffer, line: &str) {
        self.write(&format!("[{}] {}", buffer.tag(), line));
    }

    fn own_field(&mut self, field: &Field) {
        if !self.draw_fields {
            return;
        }
        for row in render_field(field) {
            self.write(&row);
        }
        self.write(&"-".repeat(FIELD_WIDTH));
    }

    fn other_field(&mut self, slot: u8, field: &Field) {
        debug!("Slot {} now has {} blocks", slot, field.block_count());
    }

    fn status(&mut self, status: &Status) {
        if self.last_status.as_ref() == Some(status) {
            return;
        }
        let specials: String = status.specials.iter().map(|s| s.letter()).collect();
        self.write(&format!(
            "lines {} level {} next {:?} specials [{}]",
            status.lines, status.level, status.next, specials
        ));
        self.last_status = Some(status.clone());
    }

    fn winlist(&mut self, list: &WinList) {
        self.write("Winlist:");
        for entry in list.entries() {
            let kind = if entry.team { "team" } else { "player" };
            self.write(&format!("  {:<6} {:<20} {}", kind, entry.name, entry.points));
        }
    }
}
