//! Trade and delivery deduplication.
//!
//! The same trade can be observed more than once: the stream replays events
//! around reconnects, and the REST fallback overlaps with the live channel.
//! [`RecentKeyWindow`] filters repeats so each logical event is acted on at
//! most once, remembering a bounded number of recently seen keys and evicting
//! oldest-first once the window is full.
//!
//! Keys are arbitrary strings (e.g. `"TICKER|trade-id"`); they are hashed with
//! xxHash64 and only the 64-bit hash is stored, which keeps the window compact
//! at any key length.

use std::collections::VecDeque;

use ahash::AHashSet;

/// Bounded window of recently seen keys with oldest-first eviction.
///
/// # Thread safety
///
/// Not thread-safe. Each worker owns its own instance.
pub struct RecentKeyWindow {
    capacity: usize,
    seen: AHashSet<u64>,
    order: VecDeque<u64>,
}

impl RecentKeyWindow {
    /// Create a window remembering up to `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "dedup window capacity must be non-zero");
        Self {
            capacity,
            seen: AHashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    #[inline]
    fn hash_key(key: &str) -> u64 {
        xxhash_rust::xxh64::xxh64(key.as_bytes(), 0)
    }

    /// Record `key` if it has not been seen within the window.
    ///
    /// Returns `true` if the key is new (caller should process the event),
    /// `false` if it was already recorded. When the window is full, the oldest
    /// key is evicted to make room.
    pub fn insert(&mut self, key: &str) -> bool {
        let hash = Self::hash_key(key);
        if self.seen.contains(&hash) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(hash);
        self.order.push_back(hash);
        true
    }

    /// Whether `key` is currently within the window.
    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(&Self::hash_key(key))
    }

    /// Number of keys currently remembered.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no keys are remembered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        self.seen.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_accepted_repeat_rejected() {
        let mut w = RecentKeyWindow::new(16);
        assert!(w.insert("FED-25DEC|t1"));
        assert!(!w.insert("FED-25DEC|t1"));
        assert!(w.insert("FED-25DEC|t2"));
        assert!(!w.insert("FED-25DEC|t1")); // still remembered
    }

    #[test]
    fn same_trade_id_different_market_is_distinct() {
        let mut w = RecentKeyWindow::new(16);
        assert!(w.insert("FED-25DEC|t1"));
        assert!(w.insert("CPI-26JAN|t1"));
    }

    #[test]
    fn oldest_evicted_at_capacity() {
        let mut w = RecentKeyWindow::new(2);
        assert!(w.insert("a"));
        assert!(w.insert("b"));
        assert!(w.insert("c")); // evicts "a"
        assert_eq!(w.len(), 2);
        assert!(!w.contains("a"));
        assert!(w.contains("b"));
        assert!(w.insert("a")); // outside the window again
    }
}
