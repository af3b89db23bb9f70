//! Player slot management for the game room
//!
//! The roster owns the six fixed slots. A slot is taken as soon as a socket
//! is accepted and is released when that socket goes away. Between those
//! points a slot is either waiting for its registration line or holds a
//! named player.

use log::info;
use shared::{names_match, MAX_PLAYERS};

/// A registered player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub nick: String,
    pub team: Option<String>,
    /// Registered with `tetrifaster`.
    pub fast: bool,
}

impl Player {
    /// Win-list key for this player: its team if it has one, else its nick.
    pub fn winlist_key(&self) -> (&str, bool) {
        match &self.team {
            Some(team) => (team.as_str(), true),
            None => (self.nick.as_str(), false),
        }
    }
}

/// One occupied slot.
#[derive(Debug, Clone)]
pub struct Seat {
    /// Address bytes the legacy registration key is derived from.
    pub ip: [u8; 4],
    /// `None` until the registration line has been accepted.
    pub player: Option<Player>,
}

/// Fixed array of slots numbered 1 through 6 on the wire.
#[derive(Debug, Default)]
pub struct Roster {
    seats: [Option<Seat>; MAX_PLAYERS],
}

fn index(slot: u8) -> Option<usize> {
    let i = (slot as usize).checked_sub(1)?;
    (i < MAX_PLAYERS).then_some(i)
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lowest free slot for a new connection, or returns `None`
    /// if every slot is in use.
    pub fn connect(&mut self, ip: [u8; 4]) -> Option<u8> {
        let i = self.seats.iter().position(Option::is_none)?;
        self.seats[i] = Some(Seat { ip, player: None });
        let slot = i as u8 + 1;
        info!("Connection from {}.{}.{}.{} took slot {}", ip[0], ip[1], ip[2], ip[3], slot);
        Some(slot)
    }

    /// Frees a slot, returning what was in it.
    pub fn remove(&mut self, slot: u8) -> Option<Seat> {
        let seat = self.seats.get_mut(index(slot)?)?.take()?;
        match &seat.player {
            Some(player) => info!("Player {} left slot {}", player.nick, slot),
            None => info!("Unregistered connection left slot {}", slot),
        }
        Some(seat)
    }

    pub fn seat(&self, slot: u8) -> Option<&Seat> {
        self.seats.get(index(slot)?)?.as_ref()
    }

    pub fn is_occupied(&self, slot: u8) -> bool {
        self.seat(slot).is_some()
    }

    pub fn player(&self, slot: u8) -> Option<&Player> {
        self.seat(slot)?.player.as_ref()
    }

    pub fn player_mut(&mut self, slot: u8) -> Option<&mut Player> {
        self.seats.get_mut(index(slot)?)?.as_mut()?.player.as_mut()
    }

    /// Marks a connected slot as registered.
    pub fn register(&mut self, slot: u8, player: Player) -> bool {
        let Some(seat) = index(slot).and_then(|i| self.seats[i].as_mut()) else {
            return false;
        };
        info!("Slot {} registered as {}", slot, player.nick);
        seat.player = Some(player);
        true
    }

    /// Registered players in slot order.
    pub fn players(&self) -> impl Iterator<Item = (u8, &Player)> + '_ {
        self.seats.iter().enumerate().filter_map(|(i, seat)| {
            let player = seat.as_ref()?.player.as_ref()?;
            Some((i as u8 + 1, player))
        })
    }

    /// Whether a registered player already uses `nick`, ignoring case.
    pub fn nick_taken(&self, nick: &str) -> bool {
        self.players().any(|(_, p)| names_match(&p.nick, nick))
    }

    /// The lowest occupied slot, registered or not. It holds start/stop
    /// authority.
    pub fn first_seat(&self) -> Option<u8> {
        self.seats.iter().position(Option::is_some).map(|i| i as u8 + 1)
    }

    pub fn team(&self, slot: u8) -> Option<&str> {
        self.player(slot)?.team.as_deref()
    }

    /// Number of occupied slots, registered or not.
    pub fn len(&self) -> usize {
        self.seats.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
