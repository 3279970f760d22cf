//! Most-recently-used history shared by the pattern encoder and decoder.
//!
//! Both sides must apply the exact same sequence of lookups and promotions,
//! so the history is a plain value threaded through each channel's loop.

use std::collections::VecDeque;

pub const RECENT_PITCH_CAPACITY: usize = 8;
pub const RECENT_SHAPE_CAPACITY: usize = 10;

/// A bounded most-recently-used list; the front is the newest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: PartialEq> RecentHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Seed the history; the first seed is the most recent.
    pub fn seeded(capacity: usize, seeds: impl IntoIterator<Item = T>) -> Self {
        let mut history = Self::new(capacity);
        history.items.extend(seeds);
        history.items.truncate(capacity);
        history
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self, item: &T) -> Option<usize> {
        self.items.iter().position(|x| x == item)
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    /// Remove the entry at `index` so it can be promoted again.
    pub fn take(&mut self, index: usize) -> Option<T> {
        self.items.remove(index)
    }

    /// Insert at the front, dropping the oldest entry past capacity.
    pub fn promote(&mut self, item: T) {
        self.items.push_front(item);
        if self.items.len() > self.capacity {
            self.items.pop_back();
        }
    }
}

/// Recent pitches for one channel, seeded by channel kind and octave.
pub fn recent_pitches(is_drum: bool, octave: usize) -> (RecentHistory<i32>, i32) {
    if is_drum {
        (
            RecentHistory::seeded(RECENT_PITCH_CAPACITY, [4, 6, 7, 2, 3, 8, 0, 10]),
            4,
        )
    } else {
        let offset = octave as i32 * 12;
        (
            RecentHistory::seeded(
                RECENT_PITCH_CAPACITY,
                [12, 19, 24, 31, 36, 7, 0].map(|p| p + offset),
            ),
            12 + offset,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promote_evicts_oldest() {
        let mut history = RecentHistory::seeded(3, [1, 2, 3]);
        history.promote(4);
        assert_eq!(history.len(), 3);
        assert_eq!(history.position(&4), Some(0));
        assert!(!history.contains(&3));
    }

    #[test]
    fn test_take_then_promote_moves_to_front() {
        let mut history = RecentHistory::seeded(8, [10, 20, 30]);
        let item = history.take(2).unwrap();
        history.promote(item);
        assert_eq!(history.position(&30), Some(0));
        assert_eq!(history.position(&10), Some(1));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_pitch_seeds_follow_octave() {
        let (pitched, last) = recent_pitches(false, 2);
        assert_eq!(last, 36);
        assert_eq!(pitched.position(&36), Some(0));
        assert_eq!(pitched.len(), 7);

        let (drums, last) = recent_pitches(true, 3);
        assert_eq!(last, 4);
        assert_eq!(drums.len(), 8);
        assert_eq!(drums.position(&10), Some(7));
    }
}
