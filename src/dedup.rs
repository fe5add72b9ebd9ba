//! Bounded LRU deduplication of event ids.
//!
//! Relays deliver at-least-once and the same event usually arrives via
//! several relays, so ingestion runs every id through a membership cache
//! first. The cache is bounded: hits promote to most-recently-used and
//! overflow evicts the least-recently-used id.
//!
//! Construct one per ingestion pipeline and share it by reference; there
//! is deliberately no process-wide instance.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tracing::trace;

/// Default maximum number of remembered event ids.
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

struct LruState {
    capacity: usize,
    /// Monotonic recency stamp source.
    seq: u64,
    /// id → recency stamp.
    entries: HashMap<String, u64>,
    /// recency stamp → id, ordered oldest first.
    order: BTreeMap<u64, String>,
}

/// Thread-safe bounded LRU membership cache for event ids.
///
/// Safe under concurrent calls from multiple relay-listener tasks: for
/// any given id, exactly one caller observes `is_duplicate == false`.
pub struct EventDeduplicator {
    inner: Mutex<LruState>,
}

impl EventDeduplicator {
    /// Creates a deduplicator with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_DEDUP_CAPACITY)
    }

    /// Creates a deduplicator remembering at most `capacity` ids.
    /// A capacity of zero is clamped to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruState {
                capacity: capacity.max(1),
                seq: 0,
                entries: HashMap::new(),
                order: BTreeMap::new(),
            }),
        }
    }

    /// Checks whether `id` has been seen before.
    ///
    /// A hit promotes the id to most-recently-used and returns `true`.
    /// A miss records the id (evicting the least-recently-used entry if
    /// over capacity) and returns `false`.
    pub fn is_duplicate(&self, id: &str) -> bool {
        let mut state = self.inner.lock().expect("dedup lock poisoned");
        state.seq += 1;
        let stamp = state.seq;

        if let Some(old_stamp) = state.entries.insert(id.to_string(), stamp) {
            state.order.remove(&old_stamp);
            state.order.insert(stamp, id.to_string());
            return true;
        }

        state.order.insert(stamp, id.to_string());
        if state.entries.len() > state.capacity {
            if let Some((_, evicted)) = state.order.pop_first() {
                state.entries.remove(&evicted);
                trace!(evicted = %evicted, "dedup cache evicted least-recently-used id");
            }
        }
        false
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("dedup lock poisoned").entries.len()
    }

    /// Returns `true` if no ids are remembered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every remembered id.
    pub fn clear(&self) {
        let mut state = self.inner.lock().expect("dedup lock poisoned");
        state.entries.clear();
        state.order.clear();
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_not_duplicate() {
        let dedup = EventDeduplicator::new();

        assert!(!dedup.is_duplicate("event-1"));
        assert!(dedup.is_duplicate("event-1"));
        assert!(dedup.is_duplicate("event-1"));
    }

    #[test]
    fn distinct_ids_are_independent() {
        let dedup = EventDeduplicator::new();

        assert!(!dedup.is_duplicate("a"));
        assert!(!dedup.is_duplicate("b"));
        assert!(dedup.is_duplicate("a"));
        assert!(dedup.is_duplicate("b"));
    }

    #[test]
    fn evicts_least_recently_used_over_capacity() {
        let dedup = EventDeduplicator::with_capacity(2);

        assert!(!dedup.is_duplicate("a"));
        assert!(!dedup.is_duplicate("b"));
        assert!(!dedup.is_duplicate("c")); // evicts "a"

        assert_eq!(dedup.len(), 2);
        assert!(!dedup.is_duplicate("a")); // forgotten, re-inserted
    }

    #[test]
    fn hit_promotes_to_most_recently_used() {
        let dedup = EventDeduplicator::with_capacity(2);

        assert!(!dedup.is_duplicate("a"));
        assert!(!dedup.is_duplicate("b"));
        assert!(dedup.is_duplicate("a")); // "a" now most recent
        assert!(!dedup.is_duplicate("c")); // evicts "b", not "a"

        assert!(dedup.is_duplicate("a"));
        assert!(!dedup.is_duplicate("b"));
    }

    #[test]
    fn capacity_never_exceeded() {
        let dedup = EventDeduplicator::with_capacity(10);
        for i in 0..100 {
            dedup.is_duplicate(&format!("event-{i}"));
        }
        assert_eq!(dedup.len(), 10);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let dedup = EventDeduplicator::with_capacity(0);
        assert!(!dedup.is_duplicate("a"));
        assert!(dedup.is_duplicate("a"));
        assert_eq!(dedup.len(), 1);
    }

    #[test]
    fn clear_forgets_everything() {
        let dedup = EventDeduplicator::new();
        dedup.is_duplicate("a");
        dedup.is_duplicate("b");

        dedup.clear();
        assert!(dedup.is_empty());
        assert!(!dedup.is_duplicate("a"));
    }

    #[test]
    fn exactly_one_concurrent_caller_sees_new() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let dedup = Arc::new(EventDeduplicator::new());
        let fresh_count = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                let fresh_count = Arc::clone(&fresh_count);
                std::thread::spawn(move || {
                    if !dedup.is_duplicate("contested-id") {
                        fresh_count.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(fresh_count.load(Ordering::SeqCst), 1);
    }
}
