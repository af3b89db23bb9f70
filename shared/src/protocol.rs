//! The space-delimited text commands exchanged between clients and the
//! server.
//!
//! [`Command::parse`] decodes one de-framed line and `Display` encodes one.
//! Trailing free text (chat, team names, field payloads) runs to the end of
//! the line and is never split.

use crate::config::{parse_sequence, GameConfig};
use crate::error::ProtocolError;
use crate::special::Attack;
use crate::winlist::WinList;
use std::fmt;
use std::str::FromStr;

/// `playernum` as sent to clients that registered with `tetrifaster`.
pub const FAST_PLAYERNUM: &str = ")#)(!@(*3";
/// `newgame` as sent to clients that registered with `tetrifaster`.
pub const FAST_NEWGAME: &str = "*******";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `tetrisstart <nick> <version>`, or `tetrifaster` when `fast`.
    Register {
        nick: String,
        version: String,
        fast: bool,
    },
    PlayerNum {
        slot: u8,
        fast: bool,
    },
    NoConnecting(String),
    WinList {
        list: WinList,
        /// Entries carry a games count (`linuxmode` servers).
        with_games: bool,
    },
    PlayerJoin {
        slot: u8,
        nick: String,
    },
    PlayerLeave {
        slot: u8,
    },
    Team {
        slot: u8,
        team: Option<String>,
    },
    Pline {
        slot: u8,
        text: String,
    },
    PlineAct {
        slot: u8,
        text: String,
    },
    StartGame {
        start: bool,
        slot: u8,
    },
    NewGame {
        config: GameConfig,
        fast: bool,
    },
    InGame,
    /// Clients name their slot; the server's broadcast does not.
    Pause {
        paused: bool,
        slot: Option<u8>,
    },
    EndGame,
    PlayerWon {
        slot: u8,
    },
    PlayerLost {
        slot: u8,
    },
    Field {
        slot: u8,
        payload: String,
    },
    Level {
        slot: u8,
        level: u32,
    },
    /// `sb <to> <type> <from>`; `to == 0` targets every opponent.
    Special {
        to: u8,
        attack: Attack,
        from: u8,
    },
    Gmsg(String),
}

/// Cursor over the arguments of one command.
struct Args<'a> {
    command: &'static str,
    rest: &'a str,
}

impl<'a> Args<'a> {
    fn new(command: &'static str, rest: &'a str) -> Self {
        Self { command, rest }
    }

    fn token(&mut self) -> Option<&'a str> {
        let trimmed = self.rest.trim_start_matches(' ');
        if trimmed.is_empty() {
            self.rest = trimmed;
            return None;
        }
        match trimmed.split_once(' ') {
            Some((token, rest)) => {
                self.rest = rest;
                Some(token)
            }
            None => {
                self.rest = "";
                Some(trimmed)
            }
        }
    }

    /// Everything left on the line, or `None` if nothing is.
    fn rest(&mut self) -> Option<&'a str> {
        let rest = std::mem::take(&mut self.rest);
        (!rest.is_empty()).then_some(rest)
    }

    fn required(&mut self, field: &'static str) -> Result<&'a str, ProtocolError> {
        self.token().ok_or(ProtocolError::MissingField {
            command: self.command,
            field,
        })
    }

    fn number<T: FromStr>(&mut self, field: &'static str) -> Result<T, ProtocolError> {
        let value = self.required(field)?;
        value.parse().map_err(|_| ProtocolError::BadNumber {
            command: self.command,
            field,
            value: value.to_string(),
        })
    }

    fn flag(&mut self, field: &'static str) -> Result<bool, ProtocolError> {
        Ok(self.number::<i64>(field)? != 0)
    }

    fn optional_flag(&mut self, field: &'static str) -> Result<Option<bool>, ProtocolError> {
        if self.rest.trim_start_matches(' ').is_empty() {
            return Ok(None);
        }
        self.flag(field).map(Some)
    }
}

impl Command {
    /// Decodes one line. Unknown leading tokens yield
    /// [`ProtocolError::Unknown`]; a missing or malformed argument yields
    /// the matching error rather than a partial command.
    pub fn parse(line: &str) -> Result<Command, ProtocolError> {
        let line = line.trim_start_matches(' ');
        let (name, rest) = line.split_once(' ').unwrap_or((line, ""));

        let command = match name {
            "" => return Err(ProtocolError::Empty),
            "tetrisstart" | "tetrifaster" => {
                let mut args = Args::new("tetrisstart", rest);
                Command::Register {
                    nick: crate::clamp_name(args.required("nick")?),
                    version: args.required("version")?.to_string(),
                    fast: name == "tetrifaster",
                }
            }
            "playernum" | FAST_PLAYERNUM => {
                let mut args = Args::new("playernum", rest);
                Command::PlayerNum {
                    slot: args.number("slot")?,
                    fast: name == FAST_PLAYERNUM,
                }
            }
            "noconnecting" => {
                let mut args = Args::new("noconnecting", rest);
                Command::NoConnecting(args.rest().unwrap_or("Unknown").to_string())
            }
            "winlist" => Command::WinList {
                list: WinList::from_wire(rest),
                with_games: rest
                    .split_whitespace()
                    .next()
                    .is_some_and(|t| t.matches(';').count() > 1),
            },
            "playerjoin" => {
                let mut args = Args::new("playerjoin", rest);
                let slot = args.number("slot")?;
                let nick = args.rest().ok_or(ProtocolError::MissingField {
                    command: "playerjoin",
                    field: "nick",
                })?;
                Command::PlayerJoin {
                    slot,
                    nick: nick.to_string(),
                }
            }
            "playerleave" => Command::PlayerLeave {
                slot: Args::new("playerleave", rest).number("slot")?,
            },
            "team" => {
                let mut args = Args::new("team", rest);
                Command::Team {
                    slot: args.number("slot")?,
                    team: args.rest().map(crate::clamp_name),
                }
            }
            "pline" | "plineact" => {
                let command = if name == "pline" { "pline" } else { "plineact" };
                let mut args = Args::new(command, rest);
                let slot = args.number("slot")?;
                let text = args.rest().unwrap_or_default().to_string();
                if command == "pline" {
                    Command::Pline { slot, text }
                } else {
                    Command::PlineAct { slot, text }
                }
            }
            "startgame" => {
                let mut args = Args::new("startgame", rest);
                Command::StartGame {
                    start: args.flag("start")?,
                    slot: args.number("slot")?,
                }
            }
            "newgame" | FAST_NEWGAME => Command::NewGame {
                config: parse_new_game(rest)?,
                fast: name == FAST_NEWGAME,
            },
            "ingame" => Command::InGame,
            "pause" => {
                let mut args = Args::new("pause", rest);
                let paused = args.flag("paused")?;
                let slot = match args.token() {
                    Some(token) => Some(token.parse::<u8>().map_err(|_| ProtocolError::BadNumber {
                        command: "pause",
                        field: "slot",
                        value: token.to_string(),
                    })?),
                    None => None,
                };
                Command::Pause { paused, slot }
            }
            "endgame" => Command::EndGame,
            "playerwon" => Command::PlayerWon {
                slot: Args::new("playerwon", rest).number("slot")?,
            },
            "playerlost" => Command::PlayerLost {
                slot: Args::new("playerlost", rest).number("slot")?,
            },
            "f" => {
                let mut args = Args::new("f", rest);
                Command::Field {
                    slot: args.number("slot")?,
                    payload: args.rest().unwrap_or_default().to_string(),
                }
            }
            "lvl" => {
                let mut args = Args::new("lvl", rest);
                Command::Level {
                    slot: args.number("slot")?,
                    level: args.number("level")?,
                }
            }
            "sb" => {
                let mut args = Args::new("sb", rest);
                let to = args.number("to")?;
                let attack = args.required("type")?.parse::<Attack>()?;
                let from = args.number("from")?;
                Command::Special { to, attack, from }
            }
            "gmsg" => {
                let mut args = Args::new("gmsg", rest);
                let text = args.rest().ok_or(ProtocolError::MissingField {
                    command: "gmsg",
                    field: "text",
                })?;
                Command::Gmsg(text.to_string())
            }
            other => return Err(ProtocolError::Unknown(other.to_string())),
        };
        Ok(command)
    }

    /// Slot a client claims to be sending from, for commands that carry one.
    pub fn claimed_slot(&self) -> Option<u8> {
        match self {
            Command::Team { slot, .. }
            | Command::Pline { slot, .. }
            | Command::PlineAct { slot, .. }
            | Command::PlayerLost { slot }
            | Command::Field { slot, .. }
            | Command::Level { slot, .. } => Some(*slot),
            Command::Special { from, .. } => Some(*from),
            _ => None,
        }
    }
}

fn parse_new_game(rest: &str) -> Result<GameConfig, ProtocolError> {
    let mut args = Args::new("newgame", rest);
    // Stack height; always 0 and unused.
    args.number::<i64>("stack height")?;
    let initial_level = args.number("initial level")?;
    let lines_per_level = args.number("lines per level")?;
    let level_inc = args.number("level increment")?;
    let special_lines = args.number("special lines")?;
    let special_count = args.number("special count")?;
    let special_capacity = args.number("special capacity")?;
    let piece_freq = parse_sequence(args.required("piece sequence")?);
    let special_freq = parse_sequence(args.required("special sequence")?);
    let level_average = args.optional_flag("level average")?.unwrap_or(false);
    let old_mode = args.optional_flag("old mode")?.unwrap_or(false);
    Ok(GameConfig {
        piece_freq,
        special_freq,
        initial_level,
        lines_per_level,
        level_inc,
        level_average,
        special_lines,
        special_count,
        special_capacity,
        old_mode,
    })
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Register {
                nick,
                version,
                fast,
            } => {
                let name = if *fast { "tetrifaster" } else { "tetrisstart" };
                write!(f, "{} {} {}", name, nick, version)
            }
            Command::PlayerNum { slot, fast } => {
                let name = if *fast { FAST_PLAYERNUM } else { "playernum" };
                write!(f, "{} {}", name, slot)
            }
            Command::NoConnecting(reason) => write!(f, "noconnecting {}", reason),
            Command::WinList { list, with_games } => {
                write!(f, "winlist {}", list.to_wire(*with_games))
            }
            Command::PlayerJoin { slot, nick } => write!(f, "playerjoin {} {}", slot, nick),
            Command::PlayerLeave { slot } => write!(f, "playerleave {}", slot),
            Command::Team { slot, team } => {
                write!(f, "team {} {}", slot, team.as_deref().unwrap_or(""))
            }
            Command::Pline { slot, text } => write!(f, "pline {} {}", slot, text),
            Command::PlineAct { slot, text } => write!(f, "plineact {} {}", slot, text),
            Command::StartGame { start, slot } => {
                write!(f, "startgame {} {}", *start as u8, slot)
            }
            Command::NewGame { config, fast } => {
                let name = if *fast { FAST_NEWGAME } else { "newgame" };
                write!(
                    f,
                    "{} 0 {} {} {} {} {} {} {} {} {} {}",
                    name,
                    config.initial_level,
                    config.lines_per_level,
                    config.level_inc,
                    config.special_lines,
                    config.special_count,
                    config.special_capacity,
                    config.piece_sequence(),
                    config.special_sequence(),
                    config.level_average as u8,
                    config.old_mode as u8
                )
            }
            Command::InGame => write!(f, "ingame"),
            Command::Pause { paused, slot } => match slot {
                Some(slot) => write!(f, "pause {} {}", *paused as u8, slot),
                None => write!(f, "pause {}", *paused as u8),
            },
            Command::EndGame => write!(f, "endgame"),
            Command::PlayerWon { slot } => write!(f, "playerwon {}", slot),
            Command::PlayerLost { slot } => write!(f, "playerlost {}", slot),
            Command::Field { slot, payload } => write!(f, "f {} {}", slot, payload),
            Command::Level { slot, level } => write!(f, "lvl {} {}", slot, level),
            Command::Special { to, attack, from } => write!(f, "sb {} {} {}", to, attack, from),
            Command::Gmsg(text) => write!(f, "gmsg {}", text),
        }
    }
}
