//! Timeout table: timeout id to absolute fire tick
//!
//! A min-heap keyed on fire tick gives earliest-first promotion without
//! scanning; an id-to-deadline map stays authoritative so re-registering an
//! id overwrites its deadline (last write wins) and stale heap entries are
//! skipped lazily.

use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct TimeoutEntry {
    fire_tick: u64,
    id: u32,
}

// Reverse ordering for min-heap (earliest fire tick first)
impl Ord for TimeoutEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_tick
            .cmp(&self.fire_tick)
            .then(other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimeoutEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimeoutEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_tick == other.fire_tick && self.id == other.id
    }
}

impl Eq for TimeoutEntry {}

/// Scheduled timeouts for one execution context
pub struct Timeouts {
    deadlines: FxHashMap<u32, u64>,
    heap: BinaryHeap<TimeoutEntry>,
}

impl Timeouts {
    /// Create an empty timeout table
    pub fn new() -> Self {
        Self {
            deadlines: FxHashMap::default(),
            heap: BinaryHeap::new(),
        }
    }

    /// Record (or overwrite) the absolute fire tick for a timeout id
    pub fn set(&mut self, id: u32, fire_tick: u64) {
        self.deadlines.insert(id, fire_tick);
        self.heap.push(TimeoutEntry { fire_tick, id });
    }

    /// Remove and return an elapsed timeout id, earliest fire tick first
    ///
    /// Returns `None` when no registered timeout has a fire tick <= `now`.
    /// Each id is returned at most once per registration.
    pub fn take_elapsed(&mut self, now: u64) -> Option<u32> {
        while let Some(top) = self.heap.peek() {
            if top.fire_tick > now {
                return None;
            }
            let entry = self.heap.pop().expect("peeked entry vanished");

            // Skip entries superseded by a later set() for the same id
            match self.deadlines.get(&entry.id) {
                Some(&deadline) if deadline == entry.fire_tick => {
                    self.deadlines.remove(&entry.id);
                    return Some(entry.id);
                }
                _ => continue,
            }
        }
        None
    }

    /// Number of pending timeouts
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Whether no timeouts are pending
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Drop all pending timeouts (teardown)
    pub fn clear(&mut self) {
        self.deadlines.clear();
        self.heap.clear();
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::new()
    }
}
