//! The channel-cache collaborator boundary. Per-channel log storage is out
//! of the ingestion core's scope, but the core calls into it synchronously
//! while holding the cache lock (`_addToCache`), so the contract at this
//! boundary is load-bearing: implementations of [`ChannelCache`] must not
//! block or attempt to reacquire the change cache's own lock.
//!
//! [`InMemoryChannelCache`] is a reference implementation -- a bounded
//! per-channel log good enough to validate the ingestion core's fan-out
//! behavior and to back the tests in `src/tests/`. A production deployment
//! is expected to swap in a durable, indexed implementation.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::types::{
    LogEntry,
    Sequence,
};

/// A fanned-out entry as recorded by a channel cache: the sequence, revision,
/// removal status, and whether this delivery arrived late (i.e. after the
/// cache had already declared the sequence skipped).
#[derive(Debug, Clone)]
pub struct ChannelLogEntry {
    pub sequence: Sequence,
    pub doc_id: String,
    pub rev_id: String,
    pub is_removal: bool,
    pub skipped: bool,
}

impl ChannelLogEntry {
    pub fn from_log_entry(entry: &LogEntry, is_removal: bool) -> Self {
        Self {
            sequence: entry.sequence,
            doc_id: entry.doc_id.clone(),
            rev_id: entry.rev_id.clone(),
            is_removal,
            skipped: entry.skipped,
        }
    }
}

/// Per-channel bounded log, out of the ingestion core's scope but required
/// at the `_addToCache` boundary. Implementations must be non-blocking: no I/O,
/// no acquiring any lock that could be held by a caller of the change cache.
pub trait ChannelCache: Send + Sync {
    /// Record `entry` in this channel's log. Called once per
    /// `(channel, sequence)` pair -- the core guarantees at-most-once
    /// admission (I3).
    fn add_to_cache(&self, entry: &LogEntry, is_removal: bool);

    /// Periodic maintenance (e.g. trimming entries below a retention
    /// watermark). Invoked by the channel-cache prune housekeeping loop;
    /// may block, since it is never called under the cache lock.
    fn prune_cache(&self);

    /// Return a snapshot of the entries currently retained for this channel,
    /// in admission order.
    fn get_changes(&self) -> Vec<ChannelLogEntry>;
}

/// A simple bounded-by-count in-memory [`ChannelCache`], retaining the most
/// recent `capacity` entries per channel.
pub struct InMemoryChannelCache {
    capacity: usize,
    entries: Mutex<VecDeque<ChannelLogEntry>>,
}

impl InMemoryChannelCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::new()),
        }
    }
}

impl ChannelCache for InMemoryChannelCache {
    fn add_to_cache(&self, entry: &LogEntry, is_removal: bool) {
        let mut entries = self.entries.lock();
        entries.push_back(ChannelLogEntry::from_log_entry(entry, is_removal));
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    fn prune_cache(&self) {
        let mut entries = self.entries.lock();
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    fn get_changes(&self) -> Vec<ChannelLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }
}
