//! Counters and histograms for the ingestion pipeline, registered against
//! the default `prometheus` registry via a pair of small local macros. This
//! crate is the only consumer of these metrics, so the macros live directly
//! in this module rather than behind a separate wrapper crate.

use std::sync::LazyLock;

use prometheus::{
    register_histogram,
    register_int_counter,
    Histogram,
    IntCounter,
};

macro_rules! counter {
    ($NAME:ident, $METRIC_NAME:literal, $HELP:literal) => {
        static $NAME: LazyLock<IntCounter> =
            LazyLock::new(|| register_int_counter!($METRIC_NAME, $HELP).expect("metric init failed"));
    };
}

macro_rules! histogram {
    ($NAME:ident, $METRIC_NAME:literal, $HELP:literal) => {
        static $NAME: LazyLock<Histogram> =
            LazyLock::new(|| register_histogram!($METRIC_NAME, $HELP).expect("metric init failed"));
    };
}

counter!(
    LATE_FIND_SUCCESS_TOTAL,
    "change_cache_late_find_success_total",
    "Late arrivals that matched a pending skipped sequence"
);
counter!(
    LATE_FIND_FAIL_TOTAL,
    "change_cache_late_find_fail_total",
    "Out-of-order arrivals with no prior skip record"
);
counter!(
    ABANDONED_SEQS_TOTAL,
    "change_cache_abandoned_seqs_total",
    "Skipped sequences that could not be recovered and were abandoned"
);
counter!(
    SKIP_PURGE_VIEW_HIT_TOTAL,
    "change_cache_skip_purge_view_hit_total",
    "Skipped sequences recovered via the reconciler's view query"
);
counter!(
    DUPLICATE_DROPPED_TOTAL,
    "change_cache_duplicate_dropped_total",
    "Entries dropped because their sequence was already admitted"
);
counter!(
    INVARIANT_VIOLATIONS_TOTAL,
    "change_cache_invariant_violations_total",
    "Pending-drain or skipped-queue invariant violations, coerced to a consistent state"
);
counter!(
    PLACEHOLDER_ADMITTED_TOTAL,
    "change_cache_placeholder_admitted_total",
    "Placeholder entries admitted to occupy a wasted or principal sequence"
);
histogram!(
    PENDING_HEAP_SIZE_AT_DRAIN,
    "change_cache_pending_heap_size_at_drain",
    "Size of the pending heap each time the drain policy runs"
);
histogram!(
    SKIPPED_QUEUE_SIZE_AT_RECONCILE,
    "change_cache_skipped_queue_size_at_reconcile",
    "Size of the skipped-sequence queue each time the reconciler runs"
);

pub fn log_late_find_success() {
    LATE_FIND_SUCCESS_TOTAL.inc();
}

pub fn log_late_find_fail() {
    LATE_FIND_FAIL_TOTAL.inc();
}

pub fn log_abandoned_seq() {
    ABANDONED_SEQS_TOTAL.inc();
}

pub fn log_skip_purge_view_hit() {
    SKIP_PURGE_VIEW_HIT_TOTAL.inc();
}

pub fn log_duplicate_dropped() {
    DUPLICATE_DROPPED_TOTAL.inc();
}

pub fn log_invariant_violation() {
    INVARIANT_VIOLATIONS_TOTAL.inc();
}

pub fn log_placeholder_admitted() {
    PLACEHOLDER_ADMITTED_TOTAL.inc();
}

pub fn log_pending_heap_size_at_drain(size: usize) {
    PENDING_HEAP_SIZE_AT_DRAIN.observe(size as f64);
}

pub fn log_skipped_queue_size_at_reconcile(size: usize) {
    SKIPPED_QUEUE_SIZE_AT_RECONCILE.observe(size as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_independently_addressable() {
        let before = LATE_FIND_SUCCESS_TOTAL.get();
        log_late_find_success();
        assert_eq!(LATE_FIND_SUCCESS_TOTAL.get(), before + 1);
    }
}
