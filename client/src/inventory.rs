//! The queue of special blocks a player has collected.

use rand::Rng;
use shared::config::MAX_SPECIAL_CAPACITY;
use shared::{ClearResult, Special};
use std::collections::VecDeque;

/// Specials waiting to be used, front first. Never holds more than its
/// capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecialInventory {
    queue: VecDeque<Special>,
    capacity: usize,
}

impl SpecialInventory {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity: capacity.min(MAX_SPECIAL_CAPACITY),
        }
    }

    /// Empties the queue and sets a new capacity.
    pub fn reset(&mut self, capacity: usize) {
        self.queue.clear();
        self.capacity = capacity.min(MAX_SPECIAL_CAPACITY);
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    pub fn front(&self) -> Option<Special> {
        self.queue.front().copied()
    }

    pub fn pop_front(&mut self) -> Option<Special> {
        self.queue.pop_front()
    }

    /// Appends a special unless the queue is full.
    pub fn push_back(&mut self, special: Special) -> bool {
        if self.is_full() {
            return false;
        }
        self.queue.push_back(special);
        true
    }

    pub fn push_front(&mut self, special: Special) -> bool {
        if self.is_full() {
            return false;
        }
        self.queue.push_front(special);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = Special> + '_ {
        self.queue.iter().copied()
    }

    /// Credits the specials destroyed by a line clear: every destroyed
    /// block once per cleared line, in kind order, until the queue fills.
    /// With `windows_mode` each one goes to the front half the time.
    pub fn award<R: Rng>(&mut self, cleared: &ClearResult, windows_mode: bool, rng: &mut R) {
        for _ in 0..cleared.lines {
            for (index, count) in cleared.specials.iter().enumerate() {
                let Some(special) = Special::from_index(index) else {
                    continue;
                };
                for _ in 0..*count {
                    if self.is_full() {
                        return;
                    }
                    if windows_mode && rng.gen_bool(0.5) {
                        self.push_front(special);
                    } else {
                        self.push_back(special);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_capacity_is_respected() {
        let mut inv = SpecialInventory::new(2);
        assert!(inv.push_back(Special::Nuke));
        assert!(inv.push_front(Special::Bomb));
        assert!(!inv.push_back(Special::Quake));
        assert_eq!(inv.iter().collect::<Vec<_>>(), vec![Special::Bomb, Special::Nuke]);
    }

    #[test]
    fn test_capacity_is_clamped() {
        let inv = SpecialInventory::new(500);
        assert_eq!(inv.capacity(), MAX_SPECIAL_CAPACITY);
    }

    #[test]
    fn test_award_repeats_per_line_in_kind_order() {
        let mut inv = SpecialInventory::new(18);
        let mut specials = [0u32; 9];
        specials[Special::Bomb.index()] = 1;
        specials[Special::AddLine.index()] = 2;
        let cleared = ClearResult { lines: 2, specials };
        inv.award(&cleared, false, &mut StdRng::seed_from_u64(1));
        assert_eq!(
            inv.iter().collect::<Vec<_>>(),
            vec![
                Special::AddLine,
                Special::AddLine,
                Special::Bomb,
                Special::AddLine,
                Special::AddLine,
                Special::Bomb
            ]
        );
    }

    #[test]
    fn test_award_stops_when_full() {
        let mut inv = SpecialInventory::new(3);
        let mut specials = [0u32; 9];
        specials[Special::Gravity.index()] = 4;
        let cleared = ClearResult { lines: 1, specials };
        inv.award(&cleared, true, &mut StdRng::seed_from_u64(7));
        assert_eq!(inv.len(), 3);
        assert!(inv.iter().all(|s| s == Special::Gravity));
    }

    #[test]
    fn test_pop_and_reset() {
        let mut inv = SpecialInventory::new(4);
        inv.push_back(Special::Switch);
        assert_eq!(inv.pop_front(), Some(Special::Switch));
        assert_eq!(inv.pop_front(), None);
        inv.push_back(Special::Switch);
        inv.reset(1);
        assert!(inv.is_empty());
        assert_eq!(inv.capacity(), 1);
    }
}
