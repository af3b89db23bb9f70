//! The game room state machine.
//!
//! [`Session`] owns every slot, the game flags and the win-list, and turns
//! one received line at a time into queued outbound lines. It never touches
//! a socket: the network layer feeds it lines and connection events and
//! drains [`Session::drain_outbox`] after each one.

use crate::roster::{Player, Roster};
use crate::store::ServerSettings;
use log::{debug, info, warn};
use shared::crypt::decode_registration;
use shared::special::Attack;
use shared::{same_team, Command, ProtocolError, MAX_LEVEL, MAX_PLAYERS};

const TOO_MANY_PLAYERS: &str = "Too many players on server!";
const NICK_IN_USE: &str = "Nickname already exists on server!";

/// One line queued for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub slot: u8,
    pub line: String,
}

/// What the network layer should do with a connection after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Keep,
    Close,
}

pub struct Session {
    roster: Roster,
    settings: ServerSettings,
    playing: bool,
    paused: bool,
    /// Elimination rank per slot for the current game; 0 means still in.
    lost: [u32; MAX_PLAYERS],
    levels: [u32; MAX_PLAYERS],
    outbox: Vec<Outbound>,
    save_requested: bool,
}

fn idx(slot: u8) -> usize {
    slot as usize - 1
}

impl Session {
    pub fn new(settings: ServerSettings) -> Self {
        Self {
            roster: Roster::new(),
            settings,
            playing: false,
            paused: false,
            lost: [0; MAX_PLAYERS],
            levels: [0; MAX_PLAYERS],
            outbox: Vec::new(),
            save_requested: false,
        }
    }

    /// Line sent to a connection turned away because every slot is taken.
    pub fn full_notice() -> String {
        Command::NoConnecting(TOO_MANY_PLAYERS.to_string()).to_string()
    }

    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Elimination rank of a slot in the current game.
    pub fn lost_rank(&self, slot: u8) -> u32 {
        self.valid(slot).then(|| self.lost[idx(slot)]).unwrap_or(0)
    }

    pub fn level(&self, slot: u8) -> u32 {
        self.valid(slot).then(|| self.levels[idx(slot)]).unwrap_or(0)
    }

    fn valid(&self, slot: u8) -> bool {
        (1..=MAX_PLAYERS as u8).contains(&slot)
    }

    /// Takes all queued lines.
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Whether the store should be written; clears the request.
    pub fn take_save_request(&mut self) -> bool {
        std::mem::take(&mut self.save_requested)
    }

    /// Seats a new connection, or returns `None` when the room is full.
    pub fn connect(&mut self, ip: [u8; 4]) -> Option<u8> {
        let slot = self.roster.connect(ip)?;
        self.lost[idx(slot)] = 0;
        self.levels[idx(slot)] = 0;
        Some(slot)
    }

    /// Replaces the settings after a reload. A game in progress keeps the
    /// parameters it was started with.
    pub fn reload(&mut self, settings: ServerSettings) {
        info!("Settings reloaded");
        self.settings = settings;
        self.send_winlist();
    }

    fn send_to(&mut self, slot: u8, command: &Command) {
        self.outbox.push(Outbound {
            slot,
            line: command.to_string(),
        });
    }

    fn broadcast_where(&mut self, command: &Command, include: impl Fn(u8) -> bool) {
        let line = command.to_string();
        let targets: Vec<u8> = self
            .roster
            .players()
            .map(|(slot, _)| slot)
            .filter(|slot| include(*slot))
            .collect();
        for slot in targets {
            self.outbox.push(Outbound {
                slot,
                line: line.clone(),
            });
        }
    }

    fn send_to_all(&mut self, command: &Command) {
        self.broadcast_where(command, |_| true);
    }

    fn send_to_all_but(&mut self, sender: u8, command: &Command) {
        self.broadcast_where(command, |slot| slot != sender);
    }

    fn send_to_all_but_team(&mut self, sender: u8, command: &Command) {
        let teams: Vec<Option<String>> = (1..=MAX_PLAYERS as u8)
            .map(|slot| self.roster.team(slot).map(str::to_string))
            .collect();
        let own = teams[idx(sender)].clone();
        self.broadcast_where(command, |slot| {
            slot != sender && !same_team(own.as_deref(), teams[idx(slot)].as_deref())
        });
    }

    fn send_winlist(&mut self) {
        let command = Command::WinList {
            list: self.settings.winlist.clone(),
            with_games: self.settings.linux_mode,
        };
        self.send_to_all(&command);
    }

    /// Processes one line received on `slot`.
    pub fn handle_line(&mut self, slot: u8, line: &str) -> Disposition {
        let Some(seat) = self.roster.seat(slot) else {
            return Disposition::Close;
        };
        debug!("slot {} <- {}", slot, line);

        if seat.player.is_none() {
            let Some(decoded) = decode_registration(line, seat.ip) else {
                info!("Slot {} sent no usable registration", slot);
                return Disposition::Close;
            };
            return match Command::parse(&decoded) {
                Ok(Command::Register { nick, fast, .. }) => self.register(slot, nick, fast),
                _ => Disposition::Close,
            };
        }

        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(ProtocolError::Empty) => return Disposition::Keep,
            Err(ProtocolError::Unknown(name)) => {
                warn!("Slot {} sent unknown command {:?}, disconnecting", slot, name);
                return Disposition::Close;
            }
            Err(e) => {
                warn!("Dropping malformed line from slot {}: {}", slot, e);
                return Disposition::Keep;
            }
        };

        if let Some(claimed) = command.claimed_slot() {
            if claimed != slot {
                warn!("Slot {} claimed to be slot {}, dropped", slot, claimed);
                return Disposition::Keep;
            }
        }

        match command {
            Command::Register { .. } => {
                debug!("Slot {} is already registered", slot);
            }
            Command::Team { team, .. } => {
                if let Some(player) = self.roster.player_mut(slot) {
                    player.team = team.clone();
                }
                self.send_to_all_but(slot, &Command::Team { slot, team });
            }
            Command::Pline { text, .. } => self.send_to_all_but(slot, &Command::Pline { slot, text }),
            Command::PlineAct { text, .. } => {
                self.send_to_all_but(slot, &Command::PlineAct { slot, text })
            }
            Command::StartGame { start, .. } => self.start_game(slot, start),
            Command::Pause { paused, .. } => self.pause(paused),
            Command::PlayerLost { .. } => {
                if self.playing && self.lost[idx(slot)] == 0 {
                    self.player_loses(slot);
                }
            }
            Command::Field { payload, .. } => {
                self.send_to_all_but(slot, &Command::Field { slot, payload })
            }
            Command::Level { level, .. } => {
                let level = level.min(MAX_LEVEL);
                self.levels[idx(slot)] = level;
                self.send_to_all_but(slot, &Command::Level { slot, level });
            }
            Command::Special { to, attack, from } => self.relay_special(to, attack, from),
            Command::Gmsg(text) => self.send_to_all(&Command::Gmsg(text)),
            other => {
                warn!("Slot {} sent server-only command {}, disconnecting", slot, other);
                return Disposition::Close;
            }
        }
        Disposition::Keep
    }

    fn register(&mut self, slot: u8, nick: String, fast: bool) -> Disposition {
        if self.roster.nick_taken(&nick) {
            info!("Slot {} asked for nickname {} which is in use", slot, nick);
            self.send_to(slot, &Command::NoConnecting(NICK_IN_USE.to_string()));
            return Disposition::Close;
        }
        let player = Player {
            nick: nick.clone(),
            team: None,
            fast,
        };
        if !self.roster.register(slot, player) {
            return Disposition::Close;
        }

        self.send_to(slot, &Command::PlayerNum { slot, fast });
        let winlist = Command::WinList {
            list: self.settings.winlist.clone(),
            with_games: self.settings.linux_mode,
        };
        self.send_to(slot, &winlist);

        let others: Vec<(u8, String, Option<String>)> = self
            .roster
            .players()
            .filter(|(other, _)| *other != slot)
            .map(|(other, p)| (other, p.nick.clone(), p.team.clone()))
            .collect();
        for (other, other_nick, team) in others {
            self.send_to(slot, &Command::PlayerJoin { slot: other, nick: other_nick });
            self.send_to(slot, &Command::Team { slot: other, team });
        }

        if self.playing {
            self.send_to(slot, &Command::InGame);
            self.lost[idx(slot)] = 1;
        }
        self.send_to_all_but(slot, &Command::PlayerJoin { slot, nick });
        Disposition::Keep
    }

    fn start_game(&mut self, slot: u8, start: bool) {
        if self.roster.first_seat() != Some(slot) {
            debug!("Slot {} may not start or stop the game", slot);
            return;
        }
        if start == self.playing {
            return;
        }
        if !start {
            info!("Game stopped by slot {}", slot);
            self.playing = false;
            self.send_to_all(&Command::EndGame);
            return;
        }
        if let Err(table) = self.settings.config.validate() {
            warn!("Refusing to start: {}", table.complaint());
            let text = format!("cannot start game: {}", table.complaint());
            self.send_to_all(&Command::PlineAct { slot: 0, text });
            return;
        }

        info!("Game started by slot {}", slot);
        self.playing = true;
        self.paused = false;
        let players: Vec<(u8, bool)> = self.roster.players().map(|(s, p)| (s, p.fast)).collect();
        for (target, fast) in players {
            let command = Command::NewGame {
                config: self.settings.config.clone(),
                fast,
            };
            self.send_to(target, &command);
        }
        self.lost = [0; MAX_PLAYERS];
    }

    fn pause(&mut self, paused: bool) {
        if !self.playing || paused == self.paused {
            return;
        }
        self.paused = paused;
        self.send_to_all(&Command::Pause { paused, slot: None });
    }

    fn relay_special(&mut self, to: u8, attack: Attack, from: u8) {
        if !self.playing {
            debug!("Special from slot {} dropped outside a game", from);
            return;
        }
        if self.lost[idx(from)] != 0 {
            warn!("Slot {} has lost and may not send specials", from);
            return;
        }
        let target_ok = to == 0
            || (self.valid(to) && self.roster.player(to).is_some() && self.lost[idx(to)] == 0);
        if !target_ok {
            debug!("Special from slot {} to slot {} dropped", from, to);
            return;
        }
        let command = Command::Special { to, attack, from };
        if to == 0 {
            self.send_to_all_but_team(from, &command);
        } else {
            self.send_to_all_but(from, &command);
        }
    }

    fn player_loses(&mut self, slot: u8) {
        if self.roster.player(slot).is_none() {
            return;
        }
        let order = self.lost.iter().copied().max().unwrap_or(0);
        self.lost[idx(slot)] = order + 1;
        debug!("Slot {} eliminated with rank {}", slot, order + 1);
        self.resolve_game();
    }

    /// Ends the game if at most one team is left standing, then scores it.
    fn resolve_game(&mut self) {
        if !self.playing {
            return;
        }
        let mut winner: Option<u8> = None;
        for (slot, _) in self.roster.players() {
            if self.lost[idx(slot)] != 0 {
                continue;
            }
            match winner {
                None => winner = Some(slot),
                Some(w) if same_team(self.roster.team(w), self.roster.team(slot)) => {}
                Some(_) => return,
            }
        }

        self.playing = false;
        self.paused = false;
        self.send_to_all(&Command::EndGame);

        if let Some(winner) = winner {
            info!("Game over, slot {} won", winner);
            self.send_to_all(&Command::PlayerWon { slot: winner });
            self.add_points(winner, 3);

            let second = self.best_ranked(&[winner]);
            if let Some(second) = second {
                self.add_points(second, 2);
                self.lost[idx(second)] = 0;
                if let Some(third) = self.best_ranked(&[winner, second]) {
                    self.add_points(third, 1);
                }
            }
            self.count_games();
        } else {
            info!("Game over with no players left");
        }

        self.settings.winlist.sort();
        self.save_requested = true;
        self.send_winlist();
    }

    /// Registered slot with the highest elimination rank whose team differs
    /// from every slot in `exclude`.
    fn best_ranked(&self, exclude: &[u8]) -> Option<u8> {
        let mut best: Option<(u32, u8)> = None;
        for (slot, player) in self.roster.players() {
            let rank = self.lost[idx(slot)];
            if rank == 0 {
                continue;
            }
            let excluded = exclude.iter().any(|&other| {
                other == slot || same_team(self.roster.team(other), player.team.as_deref())
            });
            if excluded {
                continue;
            }
            if best.map_or(true, |(r, _)| rank > r) {
                best = Some((rank, slot));
            }
        }
        best.map(|(_, slot)| slot)
    }

    fn add_points(&mut self, slot: u8, points: u32) {
        let Some(player) = self.roster.player(slot) else {
            return;
        };
        let (name, team) = player.winlist_key();
        let name = name.to_string();
        self.settings.winlist.add_points(&name, team, points);
    }

    /// One game per team, or per player without a team.
    fn count_games(&mut self) {
        let mut counted: Vec<(String, bool)> = Vec::new();
        for (_, player) in self.roster.players() {
            let (name, team) = player.winlist_key();
            let seen = counted
                .iter()
                .any(|(n, t)| *t && team && shared::names_match(n, name));
            if !seen {
                counted.push((name.to_string(), team));
            }
        }
        for (name, team) in counted {
            self.settings.winlist.add_game(&name, team);
        }
    }

    /// Handles a closed connection. A registered player's departure is
    /// announced and, during a game, counts as an elimination.
    pub fn disconnect(&mut self, slot: u8) {
        if self.roster.player(slot).is_some() {
            let mark = self.outbox.len();
            self.send_to_all_but(slot, &Command::PlayerLeave { slot });
            if self.playing && self.lost[idx(slot)] == 0 {
                self.player_loses(slot);
            }
            // The leaver is ranked and scored but gets no more lines.
            let queued = self.outbox.split_off(mark);
            self.outbox.extend(queued.into_iter().filter(|o| o.slot != slot));
        }
        if self.roster.remove(slot).is_none() {
            return;
        }
        self.lost[idx(slot)] = 0;
        self.levels[idx(slot)] = 0;
    }
}
