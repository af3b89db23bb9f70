//! Glue between the server connection, the player and the engine.
//!
//! [`ClientController`] consumes decoded server lines and player input,
//! keeps the roster, chat buffers and win-list, and drives the
//! [`TetrisEngine`]. Lines to send to the server collect in an outgoing
//! queue that the transport drains.

use crate::display::{Display, Status, TextBuffer};
use crate::engine::{EngineState, Rotation, TetrisEngine};
use crate::input::Input;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use shared::{clamp_name, same_team, Attack, Command, WinList, CLIENT_VERSION, MAX_PLAYERS};
use std::collections::VecDeque;
use std::time::Instant;

/// Lines kept per text buffer.
pub const MAX_HISTORY: usize = 100;

#[derive(Debug, Default)]
struct History {
    partyline: VecDeque<String>,
    gmsg: VecDeque<String>,
    attdef: VecDeque<String>,
}

impl History {
    fn buffer_mut(&mut self, buffer: TextBuffer) -> &mut VecDeque<String> {
        match buffer {
            TextBuffer::Partyline => &mut self.partyline,
            TextBuffer::Gmsg => &mut self.gmsg,
            TextBuffer::AttDef => &mut self.attdef,
        }
    }

    fn buffer(&self, buffer: TextBuffer) -> &VecDeque<String> {
        match buffer {
            TextBuffer::Partyline => &self.partyline,
            TextBuffer::Gmsg => &self.gmsg,
            TextBuffer::AttDef => &self.attdef,
        }
    }
}

fn slot_index(slot: u8) -> Option<usize> {
    let i = (slot as usize).checked_sub(1)?;
    (i < MAX_PLAYERS).then_some(i)
}

pub struct ClientController<D: Display, R: Rng = StdRng> {
    engine: TetrisEngine<R>,
    display: D,
    nick: String,
    me: Option<u8>,
    players: [Option<String>; MAX_PLAYERS],
    teams: [Option<String>; MAX_PLAYERS],
    winlist: WinList,
    history: History,
    outgoing: Vec<String>,
    refused: Option<String>,
}

impl<D: Display, R: Rng> ClientController<D, R> {
    pub fn new(nick: &str, engine: TetrisEngine<R>, display: D) -> Self {
        Self {
            engine,
            display,
            nick: clamp_name(nick),
            me: None,
            players: Default::default(),
            teams: Default::default(),
            winlist: WinList::new(),
            history: History::default(),
            outgoing: Vec::new(),
            refused: None,
        }
    }

    /// The line that opens the session, before any obfuscation.
    pub fn registration(&self) -> Command {
        Command::Register {
            nick: self.nick.clone(),
            version: CLIENT_VERSION.to_string(),
            fast: self.engine.options().fast,
        }
    }

    pub fn engine(&self) -> &TetrisEngine<R> {
        &self.engine
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn slot(&self) -> Option<u8> {
        self.me
    }

    pub fn player(&self, slot: u8) -> Option<&str> {
        self.players.get(slot_index(slot)?)?.as_deref()
    }

    pub fn team(&self, slot: u8) -> Option<&str> {
        self.teams.get(slot_index(slot)?)?.as_deref()
    }

    pub fn winlist(&self) -> &WinList {
        &self.winlist
    }

    pub fn history(&self, buffer: TextBuffer) -> &VecDeque<String> {
        self.history.buffer(buffer)
    }

    /// Set once the server refuses us; the client should exit.
    pub fn refused(&self) -> Option<&str> {
        self.refused.as_deref()
    }

    /// Whether typed keys steer the piece rather than chat.
    pub fn in_game(&self) -> bool {
        self.engine.state() == EngineState::Playing
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.engine.deadline()
    }

    pub fn take_outgoing(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outgoing)
    }

    fn send(&mut self, command: Command) {
        self.outgoing.push(command.to_string());
    }

    fn message(&mut self, buffer: TextBuffer, text: String) {
        self.display.text(buffer, &text);
        let lines = self.history.buffer_mut(buffer);
        if lines.len() == MAX_HISTORY {
            lines.pop_front();
        }
        lines.push_back(text);
    }

    fn name(&self, slot: u8) -> String {
        match self.player(slot) {
            Some(nick) => nick.to_string(),
            None => format!("Player {}", slot),
        }
    }

    fn describe_attack(&self, attack: Attack, from: u8, to: u8) -> String {
        let mut text = match attack {
            Attack::Special(special) => special.name().to_string(),
            Attack::AddLines(1) => "1 Line Added to All".to_string(),
            Attack::AddLines(n) => format!("{} Lines Added to All", n),
        };
        if to != 0 {
            text.push_str(&format!(" on {}", self.name(to)));
        }
        if from == 0 {
            text.push_str(" by Server");
        } else {
            text.push_str(&format!(" by {}", self.name(from)));
        }
        text
    }

    /// Forwards what the engine queued and redraws the player's side.
    fn sync(&mut self) {
        for command in self.engine.drain_outbox() {
            if let Command::Special { to, attack, from } = &command {
                let text = self.describe_attack(*attack, *from, *to);
                self.message(TextBuffer::AttDef, text);
            }
            self.send(command);
        }
        self.display.own_field(&self.engine.display_field());
        let status = Status {
            lines: self.engine.lines(),
            level: self.engine.level(self.engine.slot()),
            next: self.engine.next_piece(),
            specials: self.engine.inventory().iter().collect(),
        };
        self.display.status(&status);
    }

    /// Handles one line from the server. Lines that do not decode are
    /// dropped.
    pub fn handle_line(&mut self, line: &str, now: Instant) {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                debug!("Ignoring server line {:?}: {}", line, e);
                return;
            }
        };

        match command {
            Command::NoConnecting(reason) => {
                warn!("Server refused connection: {}", reason);
                self.message(TextBuffer::Partyline, format!("*** Server refused: {}", reason));
                self.refused = Some(reason);
            }
            Command::WinList { list, .. } => {
                self.display.winlist(&list);
                self.winlist = list;
            }
            Command::PlayerNum { slot, .. } => {
                let Some(i) = slot_index(slot) else {
                    return;
                };
                info!("Joined as player {}", slot);
                self.me = Some(slot);
                self.players[i] = Some(self.nick.clone());
                self.engine.set_slot(slot);
                let team = self.teams[i].clone();
                self.send(Command::Team { slot, team });
            }
            Command::PlayerJoin { slot, nick } => {
                let Some(i) = slot_index(slot) else {
                    return;
                };
                self.message(TextBuffer::Partyline, format!("*** {} is Now Playing", nick));
                self.players[i] = Some(nick);
                self.teams[i] = None;
                self.engine.set_present(slot, true);
            }
            Command::PlayerLeave { slot } => {
                let Some(i) = slot_index(slot) else {
                    return;
                };
                if let Some(nick) = self.players[i].take() {
                    self.message(TextBuffer::Partyline, format!("*** {} has Left", nick));
                }
                self.teams[i] = None;
                self.engine.set_present(slot, false);
            }
            Command::Team { slot, team } => {
                let Some(i) = slot_index(slot) else {
                    return;
                };
                let nick = self.name(slot);
                let text = match &team {
                    Some(team) => format!("*** {} is Now on Team {}", nick, team),
                    None => format!("*** {} is Now Alone", nick),
                };
                self.message(TextBuffer::Partyline, text);
                self.teams[i] = team;
            }
            Command::Pline { slot, text } => {
                if let Some(name) = self.chat_name(slot) {
                    self.message(TextBuffer::Partyline, format!("<{}> {}", name, text));
                }
            }
            Command::PlineAct { slot, text } => {
                if let Some(name) = self.chat_name(slot) {
                    self.message(TextBuffer::Partyline, format!("* {} {}", name, text));
                }
            }
            Command::NewGame { config, .. } => {
                self.history.attdef.clear();
                self.engine.new_game(config, now);
                self.message(TextBuffer::Partyline, "*** The Game Has Started".to_string());
            }
            Command::InGame => {
                info!("Game in progress, watching until it ends");
                self.engine.spectate();
            }
            Command::Pause { paused, .. } => {
                self.engine.set_paused(paused);
                let text = if paused {
                    "*** The Game Has Been Paused"
                } else {
                    "*** The Game Has Been Unpaused"
                };
                self.message(TextBuffer::Partyline, text.to_string());
                self.message(TextBuffer::Gmsg, text.to_string());
            }
            Command::EndGame => {
                self.engine.end_game();
                self.history.attdef.clear();
                self.message(TextBuffer::Partyline, "*** The Game Has Ended".to_string());
            }
            Command::PlayerWon { slot } => debug!("Player {} won", slot),
            Command::PlayerLost { slot } => debug!("Player {} lost", slot),
            Command::Field { slot, payload } => {
                self.engine.receive_field(slot, &payload);
                if Some(slot) != self.me {
                    if let Some(field) = self.engine.field(slot) {
                        let field = *field;
                        self.display.other_field(slot, &field);
                    }
                }
            }
            Command::Level { slot, level } => self.engine.set_level(slot, level),
            Command::Special { to, attack, from } => {
                let text = self.describe_attack(attack, from, to);
                self.message(TextBuffer::AttDef, text);
                let mine = self.me.and_then(|me| self.team(me));
                let teammate = same_team(self.team(from), mine);
                self.engine.apply_special(attack, from, to, teammate);
            }
            Command::Gmsg(text) => self.message(TextBuffer::Gmsg, text),
            Command::Register { .. } | Command::StartGame { .. } => {
                debug!("Ignoring client-bound command {:?}", line);
            }
        }
        self.sync();
    }

    /// Who a chat line from `slot` is attributed to; slot 0 is the server.
    fn chat_name(&self, slot: u8) -> Option<String> {
        if slot == 0 {
            return Some("Server".to_string());
        }
        self.player(slot).map(str::to_string)
    }

    /// Applies one player action. Returns `false` when the player quits.
    pub fn handle_input(&mut self, input: Input, now: Instant) -> bool {
        match input {
            Input::Quit => return false,
            Input::Partyline(text) => self.partyline_enter(&text),
            Input::Gmsg(text) => self.gmsg_enter(&text),
            Input::Left => {
                self.engine.shift(-1);
            }
            Input::Right => {
                self.engine.shift(1);
            }
            Input::RotateClockwise => {
                self.engine.rotate(Rotation::Clockwise);
            }
            Input::RotateCounterClockwise => {
                self.engine.rotate(Rotation::CounterClockwise);
            }
            Input::SoftDrop => self.engine.soft_drop(now),
            Input::HardDrop => self.engine.hard_drop(now),
            Input::DiscardSpecial => {
                self.engine.discard_special();
            }
            Input::UseSpecial(target) => {
                if self.player(target).is_some() {
                    self.engine.use_special(target);
                }
            }
        }
        self.sync();
        true
    }

    /// Runs a due fall or spawn.
    pub fn tick(&mut self, now: Instant) {
        self.engine.on_timeout(now);
        self.sync();
    }

    /// Sends partyline text, handling the slash commands the client
    /// understands itself.
    pub fn partyline_enter(&mut self, text: &str) {
        let Some(me) = self.me else {
            return;
        };
        if text.is_empty() {
            return;
        }
        let lower = text.to_ascii_lowercase();

        if lower.starts_with("/me ") {
            let action = &text[4..];
            self.send(Command::PlineAct {
                slot: me,
                text: action.to_string(),
            });
            self.message(TextBuffer::Partyline, format!("* {} {}", self.nick, action));
        } else if lower == "/start" || lower == "/end" {
            self.send(Command::StartGame {
                start: lower == "/start",
                slot: me,
            });
        } else if lower == "/pause" || lower == "/unpause" {
            self.send(Command::Pause {
                paused: lower == "/pause",
                slot: Some(me),
            });
        } else if lower.starts_with("/team") && (text.len() == 5 || text.as_bytes()[5] == b' ') {
            let name = text.get(6..).unwrap_or("");
            let team = (!name.is_empty()).then(|| clamp_name(name));
            let announcement = match &team {
                Some(team) => format!("*** {} is Now on Team {}", self.nick, team),
                None => format!("*** {} is Now Alone", self.nick),
            };
            self.send(Command::Team {
                slot: me,
                team: team.clone(),
            });
            if let Some(i) = slot_index(me) {
                self.teams[i] = team;
            }
            self.message(TextBuffer::Partyline, announcement);
        } else {
            self.send(Command::Pline {
                slot: me,
                text: text.to_string(),
            });
            let mut rest = text.chars().skip(1);
            let server_command = text.starts_with('/') && !matches!(rest.next(), None | Some(' '));
            if !server_command {
                self.message(TextBuffer::Partyline, format!("<{}> {}", self.nick, text));
            }
        }
    }

    /// Sends an in-game message; `/me` turns it into an action.
    pub fn gmsg_enter(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let line = match text.strip_prefix("/me ") {
            Some(action) => format!("* {} {}", self.nick, action),
            None => format!("<{}> {}", self.nick, text),
        };
        self.send(Command::Gmsg(line));
    }
}
