//! The pending-drain policy: promotes contiguous pending entries and
//! abandons the watermark's immediate successor once the pending heap has
//! grown too large or too old. This is the core's rate-limiter: the head of
//! the pending heap decides whether we keep waiting or declare a gap.

use std::{
    collections::BTreeSet,
    time::Instant,
};

use crate::{
    config::CacheOptions,
    metrics,
    skipped_queue::SkippedSequenceQueue,
    state::CacheState,
    types::SkippedSequence,
};

impl CacheState {
    /// Drains as much of the pending heap as the current watermark and
    /// `opts` allow, declaring sequences skipped as needed. Returns the set
    /// of channels that received a new entry as a result.
    pub(crate) fn drain_pending(
        &mut self,
        skipped: &mut SkippedSequenceQueue,
        opts: &CacheOptions,
    ) -> BTreeSet<String> {
        self.last_pending_check = Instant::now();
        let mut changed = BTreeSet::new();
        loop {
            let Some(head_seq) = self.pending.head_sequence() else {
                break;
            };
            if head_seq == self.next_sequence {
                let mut head = self.pending.pop().expect("head_sequence just returned Some");
                changed.extend(self.add_to_cache(&mut head));
                continue;
            }
            if head_seq < self.next_sequence {
                // Invariant 4 violation: the head has already been
                // superseded by the watermark. Pop it; it has nothing left
                // to contribute.
                metrics::log_invariant_violation();
                self.pending.pop();
                continue;
            }
            let head_too_old = self
                .pending
                .peek()
                .map(|h| h.time_received.elapsed() >= opts.pending_seq_max_wait)
                .unwrap_or(false);
            if self.pending.len() > opts.pending_seq_max_num || head_too_old {
                let seq = self.next_sequence;
                if !skipped.push(SkippedSequence {
                    seq,
                    time_added: Instant::now(),
                }) {
                    metrics::log_invariant_violation();
                }
                self.next_sequence += 1;
                // The same head will now either match or trigger another
                // round of skipping.
                continue;
            }
            break;
        }
        metrics::log_pending_heap_size_at_drain(self.pending.len());
        // Bound the dedup set's memory even across permanently abandoned
        // gaps that never call `received.insert` (see `ReceivedSequences::
        // compact`'s doc comment). The retention window is generous relative
        // to the pending heap's own bound, so this never fires within the
        // range a real late arrival or reconciler recovery could land in.
        let retention = (opts.pending_seq_max_num as u64).saturating_mul(4).max(1);
        self.received.compact(self.next_sequence.saturating_sub(retention));
        changed
    }
}
