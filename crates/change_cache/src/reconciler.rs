//! The skipped-sequence reconciler: periodically asks the durable fallback
//! view about sequences the cache has given up waiting for directly,
//! folding recovered entries back into the ingestion core and permanently
//! abandoning the rest.
//!
//! The candidate list is snapshotted under the skipped-sequence lock and
//! the lock is released before issuing any view queries -- the lock is
//! only re-acquired to remove resolved entries, never held across I/O.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{
        Instant,
        SystemTime,
    },
};

use crate::{
    cache::ChangeCache,
    collaborators::ViewQuery,
    metrics,
    types::{
        ChannelMembership,
        LogEntry,
        Sequence,
    },
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub recovered: usize,
    pub abandoned: usize,
}

fn to_log_entry(found: crate::collaborators::ViewChangeEntry) -> LogEntry {
    let channels = found
        .channels
        .into_iter()
        .map(|(name, removal)| {
            let membership = match removal {
                Some(r) => ChannelMembership::Removed(r),
                None => ChannelMembership::Present,
            };
            (name, membership)
        })
        .collect::<BTreeMap<_, _>>();
    LogEntry {
        sequence: found.sequence,
        doc_id: found.doc_id,
        rev_id: found.rev_id,
        flags: Default::default(),
        channels,
        time_received: Instant::now(),
        time_saved: SystemTime::now(),
        skipped: false,
    }
}

/// Runs a single reconciliation pass. Returns how many sequences were
/// recovered vs. abandoned, for tests and logging.
pub async fn reconcile_once(cache: &ChangeCache, view: &dyn ViewQuery) -> ReconcileReport {
    let candidates = {
        let skipped = cache.skipped.lock();
        metrics::log_skipped_queue_size_at_reconcile(skipped.len());
        skipped.expired_prefix(Instant::now(), cache.options().skipped_seq_max_wait)
    };

    if candidates.is_empty() {
        return ReconcileReport::default();
    }

    let mut recovered_entries = Vec::new();
    let mut abandoned_seqs: Vec<Sequence> = Vec::new();

    for candidate in candidates {
        match view.changes_in_channel_from_view("*", candidate.seq).await {
            Ok(entries) => match entries.into_iter().find(|e| e.sequence == candidate.seq) {
                Some(found) => recovered_entries.push(found),
                None => abandoned_seqs.push(candidate.seq),
            },
            Err(err) => {
                tracing::warn!(seq = candidate.seq, %err, "view query failed during reconciliation, treating as not found");
                abandoned_seqs.push(candidate.seq);
            },
        }
    }

    for seq in &abandoned_seqs {
        let removed = cache.skipped.lock().remove(*seq);
        if removed {
            metrics::log_abandoned_seq();
        }
    }

    let recovered = recovered_entries.len();
    for found in recovered_entries {
        let seq = found.sequence;
        cache.resubmit_recovered(to_log_entry(found));
        metrics::log_skip_purge_view_hit();
        tracing::debug!(seq, "recovered skipped sequence via reconciler view query");
    }

    ReconcileReport {
        recovered,
        abandoned: abandoned_seqs.len(),
    }
}

/// Spawns the reconciler's periodic loop (period = `skipped_seq_max_wait /
/// 2`), running until `cache` is stopped.
pub fn spawn(cache: Arc<ChangeCache>, view: Arc<dyn ViewQuery>) -> tokio::task::JoinHandle<()> {
    let mut stopped = cache.stopped_receiver();
    let period = cache.options().skipped_seq_max_wait / 2;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(std::time::Duration::from_millis(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if *stopped.borrow() {
                        break;
                    }
                    let report = reconcile_once(&cache, view.as_ref()).await;
                    if report.recovered > 0 || report.abandoned > 0 {
                        tracing::info!(recovered = report.recovered, abandoned = report.abandoned, "reconciled skipped sequences");
                    }
                }
                _ = stopped.changed() => {
                    if *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("skipped-sequence reconciler stopped");
    })
}
