//! Benchmark helpers for the node segment metadata store.

#![warn(missing_docs)]

use nodedb_core::NewSegment;
use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out segments with never-repeating unified ids.
#[derive(Debug)]
pub struct SegmentSequence {
    next: AtomicI64,
}

impl SegmentSequence {
    /// Creates a sequence starting at unified id 1.
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Returns the next segment, keyed by a key of `key_len` bytes.
    pub fn next_segment(&self, key_len: usize) -> NewSegment {
        let unified_id = self.next.fetch_add(1, Ordering::Relaxed);
        let mut key = format!("bench/{unified_id}/");
        while key.len() < key_len {
            key.push('x');
        }
        NewSegment::new(1, key, unified_id, 1, 1)
    }
}

impl Default for SegmentSequence {
    fn default() -> Self {
        Self::new()
    }
}
