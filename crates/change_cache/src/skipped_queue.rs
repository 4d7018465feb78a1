//! `SkippedSequenceQueue`: the flat, strictly-ordered record of sequences the
//! cache has given up waiting for. Ordered by `seq` (and therefore by
//! `time_added`, since pushes only ever append a larger `seq`), so lookup and
//! removal are binary search plus an in-place shift.
//!
//! The queue is bounded in practice by the number of gaps accumulated within
//! a `skipped_seq_max_wait` window (I5 in the design), so the `O(n)` shift on
//! `remove` is an acceptable trade for a simple, allocation-light structure.

use crate::types::{
    Sequence,
    SkippedSequence,
};

#[derive(Debug, Default)]
pub struct SkippedSequenceQueue {
    entries: Vec<SkippedSequence>,
}

impl SkippedSequenceQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Leftmost index `i` with `entries[i].seq >= x`.
    fn search(&self, x: Sequence) -> usize {
        self.entries.partition_point(|s| s.seq < x)
    }

    /// Append `s`, preserving strict ordering. Returns `false` (and does not
    /// mutate the queue) if `s.seq` is not strictly greater than the current
    /// tail's `seq` -- this is the invariant-violation case flagged in the
    /// design; callers should count it as an invariant violation rather than
    /// silently reordering the queue.
    pub fn push(&mut self, s: SkippedSequence) -> bool {
        if let Some(tail) = self.entries.last() {
            if s.seq <= tail.seq {
                return false;
            }
        }
        self.entries.push(s);
        true
    }

    /// Remove the entry for `seq`, if present. Returns `true` on success.
    pub fn remove(&mut self, seq: Sequence) -> bool {
        let idx = self.search(seq);
        if idx < self.entries.len() && self.entries[idx].seq == seq {
            self.entries.remove(idx);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, seq: Sequence) -> bool {
        let idx = self.search(seq);
        idx < self.entries.len() && self.entries[idx].seq == seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SkippedSequence> {
        self.entries.iter()
    }

    /// Split off the strictly-increasing-age prefix of entries older than
    /// `skipped_seq_max_wait`, per the reconciler's "entries are time-ordered,
    /// stop at the first entry younger than the wait window" scan. Returns
    /// the expired prefix without mutating the queue; callers remove
    /// individual entries afterwards via [`Self::remove`] once they know the
    /// outcome (found vs. abandoned) for each one.
    pub fn expired_prefix(&self, now: std::time::Instant, max_wait: std::time::Duration) -> Vec<SkippedSequence> {
        self.entries
            .iter()
            .take_while(|s| now.duration_since(s.time_added) >= max_wait)
            .copied()
            .collect()
    }
}
