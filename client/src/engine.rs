//! The local player's falling-block engine.
//!
//! [`TetrisEngine`] owns all six fields as this client sees them, the
//! falling piece, the special inventory and the fall/relock timer. Every
//! operation that changes shared state queues the [`Command`]s to send in
//! an outbox the controller drains after each call.
//!
//! The field buffers never contain the falling piece. It is merged in by
//! [`TetrisEngine::display_field`] and written for good only on lock.

use crate::inventory::SpecialInventory;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::config::weighted_index;
use shared::field_codec::{apply_payload, encode_full, encode_update};
use shared::{Attack, Command, Field, GameConfig, Piece, PieceTable, Special};
use shared::{FIELD_HEIGHT, FIELD_WIDTH, MAX_PLAYERS};
use std::time::{Duration, Instant};

pub use shared::MAX_LEVEL;

/// Pause between a lock and the next spawn.
pub const RELOCK_DELAY: Duration = Duration::from_millis(600);
/// Pause between `newgame` and the first piece.
pub const START_DELAY: Duration = Duration::from_millis(1200);
/// Rows cleared from the top of the player's field after a switch.
const SWITCH_CLEAR_ROWS: usize = 6;
const SPAWN_X: i32 = 6;

/// Milliseconds a piece takes to fall one row at `level`.
pub fn level_delay(level: u32) -> u64 {
    let mut delay: u64 = 1000;
    for _ in 1..level.clamp(1, MAX_LEVEL) {
        delay = (delay * 69 + 35) / 70;
    }
    delay
}

/// Client-side play options chosen on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Registered with `tetrifaster`: no relock delay.
    pub fast: bool,
    /// Hard drops lock immediately instead of leaving one row of slide.
    pub noslide: bool,
    /// Windows-client behaviour for bombs, quakes and special awards.
    pub windows: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Playing,
    Spectating,
}

/// The piece currently falling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivePiece {
    pub piece: Piece,
    pub rotation: usize,
    /// Hot spot position in field coordinates.
    pub x: i32,
    pub y: i32,
}

impl ActivePiece {
    fn overlaps(&self, field: &Field) -> bool {
        field.overlaps(self.piece, self.rotation, self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

fn slot_index(slot: u8) -> Option<usize> {
    let i = (slot as usize).checked_sub(1)?;
    (i < MAX_PLAYERS).then_some(i)
}

pub struct TetrisEngine<R: Rng = StdRng> {
    rng: R,
    options: EngineOptions,
    config: GameConfig,
    state: EngineState,
    paused: bool,
    me: u8,
    fields: [Field; MAX_PLAYERS],
    levels: [u32; MAX_PLAYERS],
    present: [bool; MAX_PLAYERS],
    lines: u32,
    last_special: u32,
    inventory: SpecialInventory,
    current: Option<ActivePiece>,
    next_piece: Piece,
    deadline: Option<Instant>,
    outbox: Vec<Command>,
}

impl TetrisEngine<StdRng> {
    pub fn new(options: EngineOptions) -> Self {
        Self::with_rng(options, StdRng::from_entropy())
    }
}

impl<R: Rng> TetrisEngine<R> {
    pub fn with_rng(options: EngineOptions, rng: R) -> Self {
        let config = GameConfig::default();
        Self {
            rng,
            options,
            inventory: SpecialInventory::new(config.capacity()),
            config,
            state: EngineState::Idle,
            paused: false,
            me: 0,
            fields: [Field::new(); MAX_PLAYERS],
            levels: [0; MAX_PLAYERS],
            present: [false; MAX_PLAYERS],
            lines: 0,
            last_special: 0,
            current: None,
            next_piece: Piece::Bar,
            deadline: None,
            outbox: Vec::new(),
        }
    }

    // Accessors

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == EngineState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn slot(&self) -> u8 {
        self.me
    }

    pub fn field(&self, slot: u8) -> Option<&Field> {
        self.fields.get(slot_index(slot)?)
    }

    /// The player's own field.
    pub fn own_field(&self) -> &Field {
        &self.fields[slot_index(self.me).unwrap_or(0)]
    }

    /// The player's field with the falling piece drawn in.
    pub fn display_field(&self) -> Field {
        let mut field = *self.own_field();
        if let Some(p) = self.current {
            field.stamp(p.piece, p.rotation, p.x, p.y, p.piece.color());
        }
        field
    }

    pub fn level(&self, slot: u8) -> u32 {
        slot_index(slot).map_or(0, |i| self.levels[i])
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    pub fn inventory(&self) -> &SpecialInventory {
        &self.inventory
    }

    pub fn current_piece(&self) -> Option<ActivePiece> {
        self.current
    }

    pub fn next_piece(&self) -> Piece {
        self.next_piece
    }

    /// Between a lock and the next spawn.
    pub fn is_waiting(&self) -> bool {
        self.is_playing() && self.current.is_none()
    }

    pub fn drain_outbox(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }

    // Roster bookkeeping

    pub fn set_slot(&mut self, slot: u8) {
        self.me = slot;
        self.set_present(slot, true);
    }

    /// Tracks which slots hold a player, for level averaging.
    pub fn set_present(&mut self, slot: u8, present: bool) {
        if let Some(i) = slot_index(slot) {
            self.present[i] = present;
            if !present {
                self.levels[i] = 0;
                self.fields[i].clear();
            }
        }
    }

    pub fn set_level(&mut self, slot: u8, level: u32) {
        if let Some(i) = slot_index(slot) {
            self.levels[i] = level.min(MAX_LEVEL);
        }
    }

    /// Applies a received `f` payload. Ignored outside a game.
    pub fn receive_field(&mut self, slot: u8, payload: &str) {
        if self.state == EngineState::Idle {
            return;
        }
        let Some(i) = slot_index(slot) else {
            return;
        };
        if let Err(e) = apply_payload(&mut self.fields[i], payload) {
            warn!("Bad field update for slot {}: {}", slot, e);
        }
    }

    // Game lifecycle

    pub fn new_game(&mut self, config: GameConfig, now: Instant) {
        info!("New game starting at level {}", config.initial_level);
        self.inventory.reset(config.capacity());
        self.config = config;
        self.lines = 0;
        self.last_special = 0;
        let initial = self.config.initial_level.min(MAX_LEVEL);
        for (level, present) in self.levels.iter_mut().zip(self.present) {
            *level = if present { initial } else { 0 };
        }
        if let Some(i) = slot_index(self.me) {
            self.fields[i].clear();
            self.levels[i] = initial;
        }
        self.current = None;
        self.next_piece = self.roll_piece();
        self.deadline = Some(now + START_DELAY);
        self.state = EngineState::Playing;
        self.paused = false;
    }

    /// Joined mid-game: show a filled field and watch.
    pub fn spectate(&mut self) {
        let Some(i) = slot_index(self.me) else {
            return;
        };
        self.fields[i].fill_random(&mut self.rng);
        self.send_full_field();
        self.current = None;
        self.deadline = None;
        self.state = EngineState::Spectating;
    }

    pub fn end_game(&mut self) {
        for field in &mut self.fields {
            field.clear();
        }
        self.inventory.clear();
        self.current = None;
        self.deadline = None;
        self.paused = false;
        self.state = EngineState::Idle;
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    // Timer

    /// Time left until the next fall or spawn, if one is pending.
    pub fn timeout(&self, now: Instant) -> Option<Duration> {
        if !self.is_playing() || self.paused {
            return None;
        }
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    pub fn deadline(&self) -> Option<Instant> {
        if !self.is_playing() || self.paused {
            return None;
        }
        self.deadline
    }

    /// Runs the pending fall or spawn if its deadline has passed.
    pub fn on_timeout(&mut self, now: Instant) {
        if self.deadline().is_some_and(|d| d <= now) {
            if self.current.is_some() {
                self.step_down(now);
            } else {
                self.spawn_piece(now);
            }
        }
    }

    fn roll_piece(&mut self) -> Piece {
        let roll = self.rng.gen_range(0..100);
        Piece::ALL[weighted_index(&self.config.piece_freq, roll)]
    }

    /// Level driving the fall speed, averaged over present players when
    /// the game asks for it.
    fn effective_level(&self) -> u32 {
        if !self.config.level_average {
            return self.level(self.me);
        }
        let (sum, count) = self
            .levels
            .iter()
            .zip(self.present)
            .filter(|(_, present)| *present)
            .fold((0u64, 0u64), |(sum, count), (level, _)| {
                (sum + u64::from(*level), count + 1)
            });
        if count == 0 {
            self.level(self.me)
        } else {
            (sum / count).min(u64::from(MAX_LEVEL)) as u32
        }
    }

    fn fall_delay(&self) -> Duration {
        Duration::from_millis(level_delay(self.effective_level()))
    }

    /// Brings in the next piece at the top. A piece that cannot fit even
    /// one column either side of the spawn point ends the game for us.
    pub fn spawn_piece(&mut self, now: Instant) {
        if !self.is_playing() {
            return;
        }
        let Some(me) = slot_index(self.me) else {
            return;
        };
        let piece = self.next_piece;
        self.next_piece = self.roll_piece();
        let pd = PieceTable::get().data(piece, 0);
        let mut active = ActivePiece {
            piece,
            rotation: 0,
            x: SPAWN_X,
            y: pd.hot_y - pd.top,
        };

        let field = &self.fields[me];
        if active.overlaps(field) {
            active.x = SPAWN_X - 1;
            if active.overlaps(field) {
                active.x = SPAWN_X + 1;
            }
        }
        if active.overlaps(field) {
            info!("No room for the next piece, game over");
            self.fields[me].fill_random(&mut self.rng);
            self.send_full_field();
            self.outbox.push(Command::PlayerLost { slot: self.me });
            self.current = None;
            self.deadline = None;
            self.state = EngineState::Spectating;
            return;
        }

        self.current = Some(active);
        self.deadline = Some(now + self.fall_delay());
    }

    /// Moves the piece down one row, or locks it where it is.
    pub fn step_down(&mut self, now: Instant) {
        let Some(mut active) = self.current else {
            return;
        };
        let Some(me) = slot_index(self.me) else {
            return;
        };
        active.y += 1;
        if !active.overlaps(&self.fields[me]) {
            self.current = Some(active);
            self.deadline = Some(now + self.fall_delay());
            return;
        }
        active.y -= 1;
        self.lock(active, now);
    }

    fn lock(&mut self, active: ActivePiece, now: Instant) {
        let Some(me) = slot_index(self.me) else {
            return;
        };
        let old = self.fields[me];
        self.fields[me].stamp(active.piece, active.rotation, active.x, active.y, active.piece.color());
        self.current = None;

        let cleared = self.fields[me].clear_full_lines();
        self.inventory.award(&cleared, self.options.windows, &mut self.rng);
        let completed = cleared.lines as u32;
        self.lines = self.lines.saturating_add(completed);

        if self.config.old_mode && completed > 1 {
            let count = if completed < 4 { completed - 1 } else { 4 };
            self.outbox.push(Command::Special {
                to: 0,
                attack: Attack::AddLines(count as u8),
                from: self.me,
            });
        }

        let lines_per_level = self.config.lines_per_level.max(1);
        let level = (self.lines / lines_per_level)
            .saturating_mul(self.config.level_inc)
            .saturating_add(self.config.initial_level)
            .min(MAX_LEVEL);
        self.levels[me] = level;
        if completed > 0 {
            debug!("Cleared {} lines, level {}", completed, level);
            self.outbox.push(Command::Level { slot: self.me, level });
        }

        if self.config.special_lines > 0 {
            let batches = (self.lines - self.last_special) / self.config.special_lines;
            self.last_special += batches * self.config.special_lines;
            let count = batches
                .saturating_mul(self.config.special_count)
                .min((FIELD_WIDTH * FIELD_HEIGHT) as u32) as usize;
            if count > 0 {
                let freq = self.config.special_freq;
                self.fields[me].place_random_specials(&mut self.rng, count, &freq);
            }
        }

        self.send_field_update(&old);
        let relock = if self.options.fast {
            Duration::ZERO
        } else {
            RELOCK_DELAY
        };
        self.deadline = Some(now + relock);
    }

    // Player input

    fn can_steer(&self) -> bool {
        self.is_playing() && !self.paused && self.current.is_some()
    }

    pub fn rotate(&mut self, direction: Rotation) -> bool {
        if !self.can_steer() {
            return false;
        }
        let Some(mut active) = self.current else {
            return false;
        };
        let pd = PieceTable::get().data(active.piece, active.rotation);
        let x0 = active.x - pd.hot_x;
        let y0 = active.y - pd.hot_y;
        if x0 + pd.left < 0 || x0 + pd.right >= FIELD_WIDTH as i32 || y0 + pd.bottom >= FIELD_HEIGHT as i32 {
            return false;
        }
        active.rotation = match direction {
            Rotation::Clockwise => (active.rotation + 1) % 4,
            Rotation::CounterClockwise => (active.rotation + 3) % 4,
        };
        if active.overlaps(self.own_field()) {
            return false;
        }
        self.current = Some(active);
        true
    }

    /// Shifts the piece one column; `dx` is -1 or 1.
    pub fn shift(&mut self, dx: i32) -> bool {
        if !self.can_steer() {
            return false;
        }
        let Some(mut active) = self.current else {
            return false;
        };
        let pd = PieceTable::get().data(active.piece, active.rotation);
        let x0 = active.x - pd.hot_x;
        let room = if dx < 0 {
            x0 + pd.left > 0
        } else {
            x0 + pd.right < FIELD_WIDTH as i32 - 1
        };
        if !room {
            return false;
        }
        active.x += dx.signum();
        if active.overlaps(self.own_field()) {
            return false;
        }
        self.current = Some(active);
        true
    }

    pub fn soft_drop(&mut self, now: Instant) {
        if self.can_steer() {
            self.step_down(now);
        }
    }

    /// Drops the piece as far as it goes. With slide allowed it stops one
    /// row short and falls the last row on the next step; a piece already
    /// resting stays put.
    pub fn hard_drop(&mut self, now: Instant) {
        if !self.can_steer() {
            return;
        }
        let Some(mut active) = self.current else {
            return;
        };
        let field = self.own_field();
        let mut resting = active.y;
        while !field.overlaps(active.piece, active.rotation, active.x, resting + 1) {
            resting += 1;
        }
        if resting == active.y {
            return;
        }
        active.y = if self.options.noslide { resting } else { resting - 1 };
        self.current = Some(active);
        self.step_down(now);
    }

    /// Sends the front special at `target` and, when it affects us, applies
    /// it here too. Returns the special used.
    pub fn use_special(&mut self, target: u8) -> Option<Special> {
        if !self.is_playing() || self.paused || slot_index(target).is_none() {
            return None;
        }
        let special = self.inventory.front()?;
        let attack = Attack::Special(special);
        self.outbox.push(Command::Special {
            to: target,
            attack,
            from: self.me,
        });
        self.apply_special(attack, self.me, target, false);
        self.inventory.pop_front();
        Some(special)
    }

    pub fn discard_special(&mut self) -> Option<Special> {
        if !self.is_playing() || self.paused {
            return None;
        }
        self.inventory.pop_front()
    }

    /// Applies a special or line attack addressed to `to` (0 means every
    /// opponent). Only our own field changes, except for a switch, which
    /// swaps the two fields involved. `teammate` marks an attacker on our
    /// team, whose line attacks do nothing.
    pub fn apply_special(&mut self, attack: Attack, from: u8, to: u8, teammate: bool) {
        if !self.is_playing() {
            return;
        }
        let Some(me) = slot_index(self.me) else {
            return;
        };
        let is_switch = attack == Attack::Special(Special::Switch);
        if to != 0 && to != self.me && !(from == self.me && is_switch) {
            return;
        }

        let old = self.fields[me];
        if is_switch {
            if let (Some(a), Some(b)) = (slot_index(from), slot_index(to)) {
                self.fields.swap(a, b);
                if a == me || b == me {
                    self.fields[me].clear_top_rows(SWITCH_CLEAR_ROWS);
                }
            }
        } else {
            strike(&mut self.fields[me], attack, teammate, self.options.windows, &mut self.rng);
        }

        self.send_field_update(&old);

        if let Some(mut active) = self.current {
            while active.overlaps(&self.fields[me]) {
                active.y -= 1;
            }
            self.current = Some(active);
        }
    }

    fn send_field_update(&mut self, old: &Field) {
        let payload = encode_update(self.own_field(), Some(old));
        self.outbox.push(Command::Field {
            slot: self.me,
            payload,
        });
    }

    fn send_full_field(&mut self) {
        let payload = encode_full(self.own_field());
        self.outbox.push(Command::Field {
            slot: self.me,
            payload,
        });
    }
}

/// Applies every attack except a switch to one field.
fn strike<R: Rng>(field: &mut Field, attack: Attack, teammate: bool, windows: bool, rng: &mut R) {
    match attack {
        Attack::AddLines(count) => {
            if !teammate {
                for _ in 0..count {
                    field.add_garbage_line(rng, 1);
                }
            }
        }
        Attack::Special(Special::AddLine) => field.add_garbage_line(rng, 3),
        Attack::Special(Special::ClearSpecials) => field.randomize_specials(rng),
        Attack::Special(Special::ClearLine) => field.remove_bottom_line(),
        Attack::Special(Special::Gravity) => {
            field.apply_gravity();
            field.clear_full_lines();
        }
        Attack::Special(Special::Nuke) => field.clear(),
        Attack::Special(Special::Bomb) => {
            field.detonate_bombs(rng, windows);
            field.clear_full_lines();
        }
        Attack::Special(Special::Quake) => field.quake(rng, windows),
        Attack::Special(Special::RandomClear) => field.clear_random_block(rng),
        Attack::Special(Special::Switch) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::field::EMPTY;

    fn engine() -> TetrisEngine {
        let mut engine = TetrisEngine::with_rng(EngineOptions::default(), StdRng::seed_from_u64(42));
        engine.set_slot(1);
        engine
    }

    fn config_with_pieces(piece: Piece) -> GameConfig {
        let mut config = GameConfig::default();
        config.piece_freq = [0; 7];
        config.piece_freq[piece.index()] = 100;
        config
    }

    /// Starts a game and spawns the first piece.
    fn started(config: GameConfig) -> (TetrisEngine, Instant) {
        let mut engine = engine();
        let now = Instant::now();
        engine.new_game(config, now);
        let now = now + START_DELAY;
        engine.on_timeout(now);
        assert!(engine.current_piece().is_some());
        (engine, now)
    }

    fn fill_row_except(field: &mut Field, y: usize, gap: std::ops::Range<usize>) {
        for x in 0..FIELD_WIDTH {
            if !gap.contains(&x) {
                field.set(x, y, 1);
            }
        }
    }

    #[test]
    fn test_level_delay_curve() {
        assert_eq!(level_delay(1), 1000);
        assert_eq!(level_delay(2), 986);
        assert_eq!(level_delay(0), 1000);
        let mut previous = level_delay(1);
        for level in 2..=MAX_LEVEL {
            let delay = level_delay(level);
            assert!(delay <= previous);
            assert!(delay > 0);
            previous = delay;
        }
    }

    #[test]
    fn test_new_game_waits_before_first_piece() {
        let mut engine = engine();
        let now = Instant::now();
        engine.new_game(GameConfig::default(), now);
        assert!(engine.is_playing());
        assert!(engine.is_waiting());
        assert_eq!(engine.timeout(now), Some(START_DELAY));
        engine.on_timeout(now + Duration::from_millis(10));
        assert!(engine.current_piece().is_none());
    }

    #[test]
    fn test_spawn_is_centered_at_top() {
        for piece in Piece::ALL {
            let (engine, _) = started(config_with_pieces(piece));
            let active = engine.current_piece().unwrap();
            let pd = PieceTable::get().data(piece, 0);
            assert_eq!(active.piece, piece);
            assert_eq!(active.x, SPAWN_X);
            assert_eq!(active.y - pd.hot_y + pd.top, 0);
        }
    }

    #[test]
    fn test_spawn_nudges_sideways() {
        let mut engine = engine();
        let now = Instant::now();
        engine.new_game(config_with_pieces(Piece::Square), now);
        let pd = PieceTable::get().data(Piece::Square, 0);
        let probe = ActivePiece {
            piece: Piece::Square,
            rotation: 0,
            x: SPAWN_X,
            y: pd.hot_y - pd.top,
        };
        // Block the rightmost cell of the square at its spawn position.
        let (bx, by) = pd
            .cells_at(probe.x, probe.y)
            .max_by_key(|(x, _)| *x)
            .unwrap();
        engine.fields[0].set(bx as usize, by as usize, 3);

        engine.on_timeout(now + START_DELAY);
        let active = engine.current_piece().unwrap();
        assert_eq!(active.x, SPAWN_X - 1);
    }

    #[test]
    fn test_blocked_spawn_loses() {
        let mut engine = engine();
        let now = Instant::now();
        engine.new_game(GameConfig::default(), now);
        for y in 0..4 {
            fill_row_except(&mut engine.fields[0], y, 0..0);
        }
        engine.on_timeout(now + START_DELAY);

        assert_eq!(engine.state(), EngineState::Spectating);
        assert!(engine.own_field().cells().all(|c| (1..=5).contains(&c)));
        let out = engine.drain_outbox();
        assert!(matches!(&out[0], Command::Field { slot: 1, payload } if payload.len() == 264));
        assert_eq!(out[1], Command::PlayerLost { slot: 1 });
    }

    #[test]
    fn test_step_down_then_lock() {
        let (mut engine, mut now) = started(config_with_pieces(Piece::Square));
        let mut steps = 0;
        while engine.current_piece().is_some() {
            engine.step_down(now);
            now += Duration::from_millis(1);
            steps += 1;
            assert!(steps < 40);
        }
        assert_eq!(engine.own_field().block_count(), 4);
        let bottom = engine.own_field().row(FIELD_HEIGHT - 1);
        assert_eq!(bottom.iter().filter(|c| **c != EMPTY).count(), 2);
        let out = engine.drain_outbox();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Command::Field { slot: 1, .. }));
        assert_eq!(engine.timeout(now), Some(RELOCK_DELAY - Duration::from_millis(1)));
    }

    #[test]
    fn test_fast_mode_relocks_immediately() {
        let mut engine = TetrisEngine::with_rng(
            EngineOptions {
                fast: true,
                ..EngineOptions::default()
            },
            StdRng::seed_from_u64(3),
        );
        engine.set_slot(2);
        let now = Instant::now();
        engine.new_game(GameConfig::default(), now);
        engine.on_timeout(now + START_DELAY);
        let now = now + START_DELAY;
        engine.hard_drop(now);
        engine.step_down(now);
        assert!(engine.is_waiting());
        assert_eq!(engine.timeout(now), Some(Duration::ZERO));
    }

    #[test]
    fn test_line_clear_awards_level_and_specials() {
        let mut config = config_with_pieces(Piece::Bar);
        config.old_mode = true;
        let (mut engine, now) = started(config);
        let bottom = FIELD_HEIGHT - 1;
        // Leave a vertical gap the upright bar can fill.
        for y in bottom - 3..=bottom {
            fill_row_except(&mut engine.fields[0], y, 6..7);
        }
        engine.fields[0].set(0, bottom, Special::Nuke.tile());

        let mut active = engine.current_piece().unwrap();
        active.rotation = 1;
        let pd = PieceTable::get().data(Piece::Bar, 1);
        active.x = 6 + pd.hot_x - pd.left;
        active.y = pd.hot_y - pd.top;
        engine.current = Some(active);
        engine.hard_drop(now);
        engine.step_down(now);

        assert!(engine.is_waiting());
        assert_eq!(engine.lines(), 4);
        // initial 1 + (4 / 2) * 1
        assert_eq!(engine.level(1), 3);
        assert_eq!(engine.inventory().iter().collect::<Vec<_>>(), vec![Special::Nuke; 4]);

        let out = engine.drain_outbox();
        assert_eq!(
            out[0],
            Command::Special {
                to: 0,
                attack: Attack::AddLines(4),
                from: 1
            }
        );
        assert_eq!(out[1], Command::Level { slot: 1, level: 3 });
        assert!(matches!(out[2], Command::Field { slot: 1, .. }));
        assert!(engine.own_field().is_empty());
    }

    #[test]
    fn test_rotation_and_shift_respect_walls() {
        let (mut engine, _) = started(config_with_pieces(Piece::T));
        let mut moved = 0;
        while engine.shift(-1) {
            moved += 1;
            assert!(moved < FIELD_WIDTH);
        }
        let active = engine.current_piece().unwrap();
        let pd = PieceTable::get().data(Piece::T, active.rotation);
        assert_eq!(active.x - pd.hot_x + pd.left, 0);
        while engine.shift(1) {}
        let active = engine.current_piece().unwrap();
        let pd = PieceTable::get().data(Piece::T, active.rotation);
        assert_eq!(active.x - pd.hot_x + pd.right, FIELD_WIDTH as i32 - 1);

        let before = engine.current_piece().unwrap().rotation;
        if engine.rotate(Rotation::CounterClockwise) {
            assert_eq!(engine.current_piece().unwrap().rotation, (before + 3) % 4);
        }
    }

    #[test]
    fn test_rotation_blocked_by_blocks() {
        let (mut engine, _) = started(config_with_pieces(Piece::Bar));
        let active = engine.current_piece().unwrap();
        // Below the hot spot: free for the flat bar, in the way of the upright one.
        engine.fields[0].set(active.x as usize, (active.y + 2) as usize, 2);
        assert!(!engine.rotate(Rotation::Clockwise));
        assert!(!engine.rotate(Rotation::CounterClockwise));
        assert_eq!(engine.current_piece().unwrap().rotation, 0);
    }

    #[test]
    fn test_hard_drop_slide_and_noslide() {
        let (mut engine, now) = started(config_with_pieces(Piece::Square));
        engine.hard_drop(now);
        // One row of slide left: still falling.
        assert!(engine.current_piece().is_some());
        engine.hard_drop(now);
        assert!(engine.current_piece().is_some());
        engine.step_down(now);
        assert!(engine.is_waiting());

        let mut engine = TetrisEngine::with_rng(
            EngineOptions {
                noslide: true,
                ..EngineOptions::default()
            },
            StdRng::seed_from_u64(5),
        );
        engine.set_slot(1);
        let start = Instant::now();
        engine.new_game(config_with_pieces(Piece::Square), start);
        engine.on_timeout(start + START_DELAY);
        engine.hard_drop(start + START_DELAY);
        assert!(engine.is_waiting());
        assert_eq!(engine.own_field().block_count(), 4);
    }

    #[test]
    fn test_input_ignored_while_paused() {
        let (mut engine, now) = started(config_with_pieces(Piece::S));
        engine.set_paused(true);
        let before = engine.current_piece();
        assert!(!engine.shift(1));
        engine.hard_drop(now);
        assert_eq!(engine.current_piece(), before);
        assert_eq!(engine.timeout(now), None);
    }

    #[test]
    fn test_line_attack_from_teammate_is_ignored() {
        let (mut engine, _) = started(GameConfig::default());
        engine.apply_special(Attack::AddLines(2), 3, 0, true);
        assert!(engine.own_field().is_empty());
        engine.apply_special(Attack::AddLines(2), 3, 0, false);
        assert_eq!(engine.own_field().block_count(), 2 * (FIELD_WIDTH - 1));
        let out = engine.drain_outbox();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_special_for_someone_else_is_ignored() {
        let (mut engine, _) = started(GameConfig::default());
        engine.apply_special(Attack::Special(Special::AddLine), 2, 3, false);
        assert!(engine.own_field().is_empty());
        assert!(engine.drain_outbox().is_empty());
    }

    #[test]
    fn test_nuke_and_clear_line() {
        let (mut engine, _) = started(GameConfig::default());
        let bottom = FIELD_HEIGHT - 1;
        engine.fields[0].set(3, bottom, 2);
        engine.fields[0].set(3, bottom - 1, 4);
        engine.apply_special(Attack::Special(Special::ClearLine), 2, 1, false);
        assert_eq!(engine.own_field().get(3, bottom), 4);
        assert_eq!(engine.own_field().block_count(), 1);
        engine.apply_special(Attack::Special(Special::Nuke), 2, 1, false);
        assert!(engine.own_field().is_empty());
    }

    #[test]
    fn test_switch_swaps_fields_and_clears_top() {
        let (mut engine, _) = started(GameConfig::default());
        engine.set_present(2, true);
        for y in 0..FIELD_HEIGHT {
            engine.fields[1].set(0, y, 5);
        }
        engine.fields[0].set(11, FIELD_HEIGHT - 1, 1);
        engine.inventory.push_back(Special::Switch);
        assert_eq!(engine.use_special(2), Some(Special::Switch));

        let mine = engine.own_field();
        assert_eq!(mine.get(0, 0), EMPTY);
        assert_eq!(mine.get(0, SWITCH_CLEAR_ROWS), 5);
        assert_eq!(mine.block_count(), FIELD_HEIGHT - SWITCH_CLEAR_ROWS);
        assert_eq!(engine.field(2).unwrap().get(11, FIELD_HEIGHT - 1), 1);

        let out = engine.drain_outbox();
        assert_eq!(
            out[0],
            Command::Special {
                to: 2,
                attack: Attack::Special(Special::Switch),
                from: 1
            }
        );
        assert!(matches!(out[1], Command::Field { slot: 1, .. }));
        assert!(engine.inventory().is_empty());
    }

    #[test]
    fn test_special_pushes_falling_piece_up() {
        let (mut engine, _) = started(config_with_pieces(Piece::Square));
        let mut active = engine.current_piece().unwrap();
        active.y = FIELD_HEIGHT as i32 - 3;
        engine.current = Some(active);
        engine.apply_special(Attack::AddLines(4), 2, 0, false);
        let active = engine.current_piece().unwrap();
        assert!(!engine.own_field().overlaps(active.piece, active.rotation, active.x, active.y));
    }

    #[test]
    fn test_use_special_on_other_sends_only() {
        let (mut engine, _) = started(GameConfig::default());
        engine.inventory.push_back(Special::Nuke);
        engine.fields[0].set(0, FIELD_HEIGHT - 1, 1);
        engine.use_special(4);
        assert_eq!(engine.own_field().block_count(), 1);
        let out = engine.drain_outbox();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to_string(), "sb 4 n 1");
        assert_eq!(engine.discard_special(), None);
    }

    #[test]
    fn test_level_average() {
        let mut engine = engine();
        engine.set_present(2, true);
        engine.set_present(3, true);
        let mut config = GameConfig::default();
        config.level_average = true;
        engine.new_game(config, Instant::now());
        engine.set_level(2, 10);
        engine.set_level(3, 20);
        // (1 + 10 + 20) / 3
        assert_eq!(engine.effective_level(), 10);
        engine.config.level_average = false;
        assert_eq!(engine.effective_level(), 1);
    }

    #[test]
    fn test_peer_level_out_of_range() {
        let mut engine = engine();
        engine.set_present(2, true);
        engine.new_game(GameConfig::default(), Instant::now());
        assert!(engine.config().level_average);
        engine.set_level(2, u32::MAX);
        assert_eq!(engine.level(2), MAX_LEVEL);
        // (1 + 100) / 2
        assert_eq!(engine.effective_level(), 50);
        assert_eq!(level_delay(u32::MAX), level_delay(MAX_LEVEL));
    }

    #[test]
    fn test_huge_level_settings_saturate() {
        let mut config = config_with_pieces(Piece::Bar);
        config.initial_level = u32::MAX;
        config.level_inc = u32::MAX;
        config.special_count = u32::MAX;
        let (mut engine, now) = started(config);
        assert_eq!(engine.level(1), MAX_LEVEL);

        let bottom = FIELD_HEIGHT - 1;
        for y in bottom - 3..=bottom {
            fill_row_except(&mut engine.fields[0], y, 6..7);
        }
        let mut active = engine.current_piece().unwrap();
        active.rotation = 1;
        let pd = PieceTable::get().data(Piece::Bar, 1);
        active.x = 6 + pd.hot_x - pd.left;
        active.y = pd.hot_y - pd.top;
        engine.current = Some(active);
        engine.hard_drop(now);
        engine.step_down(now);

        assert_eq!(engine.lines(), 4);
        assert_eq!(engine.level(1), MAX_LEVEL);
    }

    #[test]
    fn test_receive_field_only_during_game() {
        let mut engine = engine();
        engine.receive_field(2, "#");
        assert!(engine.field(2).unwrap().is_empty());
        engine.new_game(GameConfig::default(), Instant::now());
        // Tile 1 at (0, 0).
        engine.receive_field(2, "\"33");
        assert_eq!(engine.field(2).unwrap().get(0, 0), 1);
        engine.receive_field(9, "\"33");
    }

    #[test]
    fn test_end_game_resets() {
        let (mut engine, now) = started(GameConfig::default());
        engine.fields[2].set(0, 0, 1);
        engine.end_game();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.field(3).unwrap().is_empty());
        assert_eq!(engine.timeout(now), None);
    }

    #[test]
    fn test_spectate_sends_full_field() {
        let mut engine = engine();
        engine.spectate();
        assert_eq!(engine.state(), EngineState::Spectating);
        let out = engine.drain_outbox();
        assert_eq!(out.len(), 1);
        let Command::Field { slot, payload } = &out[0] else {
            panic!("expected a field update");
        };
        assert_eq!(*slot, 1);
        assert_eq!(payload.len(), FIELD_WIDTH * FIELD_HEIGHT);
    }
}
