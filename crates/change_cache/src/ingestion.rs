//! The ingestion core: admission, dedup, and classification of a single
//! [`LogEntry`] into exactly one of four outcomes, plus the lock-internal
//! `_addToCache` fan-out to channel caches.

use std::collections::BTreeSet;

use crate::{
    config::CacheOptions,
    metrics,
    skipped_queue::SkippedSequenceQueue,
    state::CacheState,
    types::LogEntry,
};

/// The result of classifying one entry through `processEntry`. Exposed
/// mainly so tests and the reconciler can distinguish outcomes without
/// re-deriving them from side effects.
#[derive(Debug)]
pub enum EntryOutcome {
    /// The cache has `logsDisabled` set; the entry was ignored entirely.
    LogsDisabled,
    /// `entry.sequence` was already admitted; dropped as a duplicate.
    Duplicate,
    /// `entry.sequence <= initialSequence`; dropped silently as replay.
    DroppedBelowInitial,
    /// Admitted directly because it matched the watermark.
    Admitted { changed: BTreeSet<String> },
    /// Buffered in the pending heap, awaiting its predecessors.
    Pending,
    /// A late arrival that successfully un-skipped its sequence.
    LateRecovered { changed: BTreeSet<String> },
    /// A late arrival with no prior skip record (invariant 4 violation on the
    /// upstream side, not ours -- we still admit it best-effort).
    LateUnexpected { changed: BTreeSet<String> },
}

impl EntryOutcome {
    pub fn changed_channels(&self) -> BTreeSet<String> {
        match self {
            EntryOutcome::Admitted { changed }
            | EntryOutcome::LateRecovered { changed }
            | EntryOutcome::LateUnexpected { changed } => changed.clone(),
            _ => BTreeSet::new(),
        }
    }
}

impl CacheState {
    /// `_addToCache(e)`: fan out `entry` to every channel it touches (plus
    /// the star channel, if enabled), advance the watermark if needed, and
    /// clear `entry.channels` to release memory. Returns the set of channel
    /// names the entry was added to.
    pub(crate) fn add_to_cache(&mut self, entry: &mut LogEntry) -> BTreeSet<String> {
        if entry.sequence >= self.next_sequence {
            self.next_sequence = entry.sequence + 1;
        }
        let mut changed = BTreeSet::new();
        if entry.is_placeholder() {
            metrics::log_placeholder_admitted();
            entry.channels.clear();
            return changed;
        }
        for (channel_name, membership) in entry.channels.iter() {
            let is_removal = membership.is_removal();
            let include = match membership {
                crate::types::ChannelMembership::Present => true,
                crate::types::ChannelMembership::Removed(r) => r.seq == entry.sequence,
            };
            if include {
                let cache = self.get_or_create_channel_cache(channel_name);
                cache.add_to_cache(entry, is_removal);
                changed.insert(channel_name.clone());
            }
        }
        if self.enable_star_channel_log {
            let star = self.get_or_create_channel_cache("*");
            star.add_to_cache(entry, false);
            changed.insert("*".to_string());
        }
        entry.channels.clear();
        changed
    }

    /// `processEntry(e)`: the classification state machine. Called while the
    /// caller already holds both the cache write lock and (briefly) the
    /// skipped-sequence lock -- always acquired in that order.
    pub(crate) fn process_entry(
        &mut self,
        mut entry: LogEntry,
        skipped: &mut SkippedSequenceQueue,
        opts: &CacheOptions,
    ) -> EntryOutcome {
        if self.logs_disabled {
            return EntryOutcome::LogsDisabled;
        }
        if entry.sequence <= self.initial_sequence {
            return EntryOutcome::DroppedBelowInitial;
        }
        if self.received.contains(entry.sequence) {
            metrics::log_duplicate_dropped();
            return EntryOutcome::Duplicate;
        }
        // Admission from here on is final: record the sequence as seen
        // regardless of which branch it takes.
        self.received.insert(entry.sequence);

        if entry.sequence == self.next_sequence {
            let changed = self.add_to_cache(&mut entry);
            let mut changed = changed;
            changed.extend(self.drain_pending(skipped, opts));
            return EntryOutcome::Admitted { changed };
        }

        if entry.sequence > self.next_sequence {
            self.pending.push(entry);
            let should_drain = self.pending.len() > opts.pending_seq_max_num
                || self.last_pending_check.elapsed() > opts.pending_seq_max_wait;
            if should_drain {
                self.drain_pending(skipped, opts);
            }
            return EntryOutcome::Pending;
        }

        // initial_sequence < entry.sequence < next_sequence: a late arrival.
        if skipped.remove(entry.sequence) {
            entry.skipped = true;
            metrics::log_late_find_success();
            let changed = self.add_to_cache(&mut entry);
            EntryOutcome::LateRecovered { changed }
        } else {
            tracing::warn!(
                sequence = entry.sequence,
                "unexpected out-of-order sequence with no prior skip record"
            );
            metrics::log_late_find_fail();
            let changed = self.add_to_cache(&mut entry);
            EntryOutcome::LateUnexpected { changed }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Instant,
    };

    use super::*;
    use crate::channel_cache::InMemoryChannelCache;

    fn new_state(initial_sequence: u64) -> CacheState {
        CacheState::new(initial_sequence, true, Arc::new(|_name: &str| {
            Arc::new(InMemoryChannelCache::new(100)) as Arc<dyn crate::channel_cache::ChannelCache>
        }))
    }

    fn entry(seq: u64, doc_id: &str, channel: &str) -> LogEntry {
        let mut e = LogEntry::placeholder(seq, Instant::now());
        e.doc_id = doc_id.to_string();
        e.rev_id = "1-abc".to_string();
        e.channels.insert(channel.to_string(), crate::types::ChannelMembership::Present);
        e
    }

    #[test]
    fn in_order_delivery_advances_watermark_and_fans_out() {
        let mut state = new_state(0);
        let mut skipped = SkippedSequenceQueue::new();
        let opts = CacheOptions::default();

        for seq in [1, 2, 3] {
            let outcome = state.process_entry(entry(seq, &format!("doc{seq}"), "x"), &mut skipped, &opts);
            match outcome {
                EntryOutcome::Admitted { changed } => {
                    assert!(changed.contains("x"));
                    assert!(changed.contains("*"));
                },
                other => panic!("expected Admitted, got {other:?}"),
            }
        }
        assert_eq!(state.next_sequence, 4);
        assert!(skipped.is_empty());
    }

    #[test]
    fn duplicate_is_rejected_on_resubmission() {
        let mut state = new_state(0);
        let mut skipped = SkippedSequenceQueue::new();
        let opts = CacheOptions::default();
        state.process_entry(entry(1, "a", "x"), &mut skipped, &opts);
        let outcome = state.process_entry(entry(1, "a", "x"), &mut skipped, &opts);
        assert!(matches!(outcome, EntryOutcome::Duplicate));
    }

    #[test]
    fn sequence_below_initial_is_dropped_silently() {
        let mut state = new_state(10);
        let mut skipped = SkippedSequenceQueue::new();
        let opts = CacheOptions::default();
        let outcome = state.process_entry(entry(3, "a", "x"), &mut skipped, &opts);
        assert!(matches!(outcome, EntryOutcome::DroppedBelowInitial));
        assert_eq!(state.next_sequence, 11);
    }

    #[test]
    fn reassembles_out_of_order_arrivals() {
        let mut state = new_state(0);
        let mut skipped = SkippedSequenceQueue::new();
        let opts = CacheOptions::default();

        let outcome = state.process_entry(entry(1, "a", "x"), &mut skipped, &opts);
        assert!(matches!(outcome, EntryOutcome::Admitted { .. }));
        let outcome = state.process_entry(entry(3, "c", "x"), &mut skipped, &opts);
        assert!(matches!(outcome, EntryOutcome::Pending));
        assert_eq!(state.next_sequence, 2);

        let outcome = state.process_entry(entry(2, "b", "x"), &mut skipped, &opts);
        assert!(matches!(outcome, EntryOutcome::Admitted { .. }));
        assert_eq!(state.next_sequence, 4);
        assert!(state.pending.is_empty());
    }
}
