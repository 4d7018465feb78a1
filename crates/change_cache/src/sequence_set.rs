//! The ingestion core's dedup set. Rather than an ever-growing `set<u64>`,
//! this keeps a watermark below which every sequence is known to have been
//! admitted, plus a sparse set of admissions at or above it. The sparse set
//! is pruned every time the watermark can be advanced, so memory is bounded
//! by the number of sequences admitted out of order relative to each other,
//! not by the total number of sequences ever seen.

use std::collections::BTreeSet;

use crate::types::Sequence;

#[derive(Debug)]
pub struct ReceivedSequences {
    /// Every sequence strictly below this watermark has been admitted.
    watermark: Sequence,
    /// Sequences at or above `watermark` that have been admitted but which
    /// haven't yet let the watermark advance past them (because something
    /// below them is still missing).
    admitted_above: BTreeSet<Sequence>,
}

impl ReceivedSequences {
    pub fn new(initial_sequence: Sequence) -> Self {
        Self {
            watermark: initial_sequence + 1,
            admitted_above: BTreeSet::new(),
        }
    }

    pub fn contains(&self, seq: Sequence) -> bool {
        seq < self.watermark || self.admitted_above.contains(&seq)
    }

    /// Record `seq` as admitted. Returns `true` if this is the first time
    /// `seq` has been seen (i.e. it was not a duplicate).
    pub fn insert(&mut self, seq: Sequence) -> bool {
        if self.contains(seq) {
            return false;
        }
        self.admitted_above.insert(seq);
        while self.admitted_above.remove(&self.watermark) {
            self.watermark += 1;
        }
        true
    }

    /// Forgets dedup history below `floor`, regardless of whether the
    /// contiguous run up to `floor` was ever actually observed.
    ///
    /// A permanently abandoned sequence (§4.3) never arrives and therefore
    /// never calls [`Self::insert`], so the ordinary contiguous-prefix
    /// pruning above can never advance the watermark past it -- every later
    /// out-of-order admission would otherwise accumulate in `admitted_above`
    /// for the rest of the cache's lifetime. Since exact-once delivery is an
    /// explicit non-goal (downstream tolerates duplicates), it's acceptable
    /// to eventually forget whether a sufficiently old sequence was admitted:
    /// the rare case of that exact sequence resurfacing after compaction is
    /// treated as a fresh late arrival rather than a duplicate. Callers are
    /// expected to pick `floor` far enough behind the live watermark that
    /// this never fires within the window a real late arrival or reconciler
    /// recovery could plausibly still land in.
    pub fn compact(&mut self, floor: Sequence) {
        if floor > self.watermark {
            self.watermark = floor;
            self.admitted_above = self.admitted_above.split_off(&floor);
        }
    }

    #[cfg(test)]
    pub fn watermark(&self) -> Sequence {
        self.watermark
    }

    #[cfg(test)]
    pub fn sparse_len(&self) -> usize {
        self.admitted_above.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contiguous_inserts_prune_immediately() {
        let mut s = ReceivedSequences::new(0);
        assert!(s.insert(1));
        assert!(s.insert(2));
        assert!(s.insert(3));
        assert_eq!(s.sparse_len(), 0);
        assert_eq!(s.watermark(), 4);
    }

    #[test]
    fn out_of_order_inserts_stay_sparse_until_gap_fills() {
        let mut s = ReceivedSequences::new(0);
        assert!(s.insert(1));
        assert!(s.insert(3));
        assert_eq!(s.sparse_len(), 1);
        assert_eq!(s.watermark(), 2);
        assert!(s.insert(2));
        assert_eq!(s.sparse_len(), 0);
        assert_eq!(s.watermark(), 4);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut s = ReceivedSequences::new(0);
        assert!(s.insert(5));
        assert!(!s.insert(5));
        assert!(s.contains(5));
    }

    #[test]
    fn below_initial_sequence_counts_as_already_admitted() {
        let s = ReceivedSequences::new(10);
        assert!(s.contains(3));
        assert!(s.contains(10));
        assert!(!s.contains(11));
    }

    #[test]
    fn a_permanent_gap_does_not_pin_the_sparse_set_open_forever() {
        // Sequence 2 is never inserted (it was abandoned, not admitted), so
        // the contiguous-prefix pruning in `insert` alone can never advance
        // past it. Without `compact`, every later admission (3..=100) would
        // accumulate in the sparse set for good.
        let mut s = ReceivedSequences::new(0);
        assert!(s.insert(1));
        for seq in 3..=100 {
            assert!(s.insert(seq));
        }
        assert_eq!(s.watermark(), 2);
        assert_eq!(s.sparse_len(), 98);

        s.compact(50);
        assert_eq!(s.watermark(), 50);
        assert_eq!(s.sparse_len(), 51); // 50..=100
        assert!(s.contains(50));
        assert!(s.contains(100));

        // Compacting backward (or to the same floor) is a no-op.
        s.compact(10);
        assert_eq!(s.watermark(), 50);
    }
}
