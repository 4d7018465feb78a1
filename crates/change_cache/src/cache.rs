//! `ChangeCache`: the façade tying the ingestion core, pending-drain policy,
//! and skipped-sequence queue together behind the surface described in §6 --
//! `Init`, `Stop`, `ClearLogs`, `EnableChannelLogs`, `DocChanged`,
//! `GetChangesInChannel`, `LastSequence`.
//!
//! Async intake (§4.6), the housekeeping loops (§4.5), and the reconciler
//! (§4.3) are built on top of `Arc<ChangeCache>` in `intake.rs`,
//! `housekeeping.rs`, and `reconciler.rs` respectively; this module is just
//! the synchronous core they all drive.

use std::{
    collections::BTreeMap,
    collections::BTreeSet,
    sync::Arc,
    time::Instant,
};

use errors::ErrorMetadata;
use parking_lot::{
    Mutex,
    RwLock,
};
use tokio::sync::watch;

use crate::{
    channel_cache::{
        ChannelCache,
        ChannelLogEntry,
    },
    collaborators::{
        principal_doc_id,
        principal_kind,
        unmarshal_document_sync_data,
        PrincipalParser,
    },
    config::CacheOptions,
    skipped_queue::SkippedSequenceQueue,
    state::{
        CacheState,
        ChannelCacheFactory,
    },
    types::{
        ChannelMembership,
        LogEntry,
        Sequence,
    },
};

pub type OnChangeFn = Arc<dyn Fn(BTreeSet<String>) + Send + Sync>;

pub struct ChangeCache {
    pub(crate) state: RwLock<CacheState>,
    pub(crate) skipped: Mutex<SkippedSequenceQueue>,
    pub(crate) opts: CacheOptions,
    on_change: OnChangeFn,
    principal_parser: Arc<dyn PrincipalParser>,
    stopped_tx: watch::Sender<bool>,
}

impl ChangeCache {
    /// `Init(ctx, lastSequence, onChange, options)`.
    pub fn init(
        last_sequence: Sequence,
        opts: CacheOptions,
        on_change: OnChangeFn,
        principal_parser: Arc<dyn PrincipalParser>,
        channel_cache_factory: Arc<ChannelCacheFactory>,
    ) -> Arc<Self> {
        tracing::info!(last_sequence, "initializing change cache");
        let (stopped_tx, _) = watch::channel(false);
        Arc::new(Self {
            state: RwLock::new(CacheState::new(
                last_sequence,
                opts.enable_star_channel_log,
                channel_cache_factory,
            )),
            skipped: Mutex::new(SkippedSequenceQueue::new()),
            opts,
            on_change,
            principal_parser,
            stopped_tx,
        })
    }

    pub fn options(&self) -> &CacheOptions {
        &self.opts
    }

    pub(crate) fn stopped_receiver(&self) -> watch::Receiver<bool> {
        self.stopped_tx.subscribe()
    }

    /// `Stop()`: sets `stopped` and `logsDisabled`. All periodic loops
    /// observe `stopped` directly via the shared watch channel and exit; the
    /// reconciler / housekeeping module owns joining those tasks.
    pub fn stop(&self) {
        tracing::info!("stopping change cache");
        {
            let mut state = self.state.write();
            state.stopped = true;
            state.logs_disabled = true;
        }
        let _ = self.stopped_tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.state.read().stopped
    }

    /// `ClearLogs()`.
    pub fn clear_logs(&self) {
        self.state.write().clear_logs();
    }

    /// `EnableChannelLogs(enable)`.
    pub fn enable_channel_logs(&self, enable: bool) {
        self.state.write().logs_disabled = !enable;
    }

    /// `LastSequence() -> u64`.
    pub fn last_sequence(&self) -> Sequence {
        self.state.read().next_sequence.saturating_sub(1)
    }

    /// `GetChangesInChannel(name, opts) -> ([]LogEntry, error)`.
    pub fn get_changes_in_channel(&self, name: &str) -> anyhow::Result<Vec<ChannelLogEntry>> {
        let state = self.state.read();
        if state.stopped {
            return Err(anyhow::anyhow!("change cache is stopped").context(
                ErrorMetadata::overloaded("ChangeCacheStopped", "the change cache has been stopped"),
            ));
        }
        Ok(state
            .channel_caches
            .get(name)
            .map(|c| c.get_changes())
            .unwrap_or_default())
    }

    /// `ProcessDoc(docID, rawDoc)` (§4.1). Parses the raw upstream mutation
    /// and submits one or more entries to the ingestion core: a placeholder
    /// per `unusedSequences` entry, then the real entry, then (for principal
    /// keys) a single principal placeholder instead. `onChange` is invoked,
    /// outside the cache lock, with whatever channels changed as a result.
    pub fn process_doc(&self, doc_id: &str, raw: &[u8]) {
        if let Some(is_user) = principal_kind(doc_id) {
            match self.principal_parser.unmarshal_principal(doc_id, raw, is_user) {
                Ok(principal) => {
                    let synthetic_id = principal_doc_id(&principal);
                    tracing::debug!(synthetic_id, sequence = principal.sequence, "admitting principal placeholder");
                    let placeholder = LogEntry::placeholder(principal.sequence, Instant::now());
                    self.submit_and_notify(vec![placeholder]);
                },
                Err(err) => {
                    tracing::warn!(doc_id, %err, "failed to parse principal document");
                },
            }
            return;
        }

        let data = match unmarshal_document_sync_data(raw) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(doc_id, %err, "failed to parse document sync metadata");
                return;
            },
        };
        if !data.has_valid_sync_data() {
            tracing::warn!(doc_id, "document is missing required sync metadata");
            return;
        }

        let initial_sequence = self.state.read().initial_sequence;
        if data.sequence <= initial_sequence {
            return;
        }

        let mut entries = Vec::with_capacity(data.unused_sequences.len() + 1);
        for seq in &data.unused_sequences {
            entries.push(LogEntry::placeholder(*seq, Instant::now()));
        }

        let mut channels = BTreeMap::new();
        for (name, removal) in &data.channels {
            let membership = match removal {
                Some(r) => ChannelMembership::Removed(*r),
                None => ChannelMembership::Present,
            };
            channels.insert(name.clone(), membership);
        }
        entries.push(LogEntry {
            sequence: data.sequence,
            doc_id: doc_id.to_string(),
            rev_id: data.current_rev.clone(),
            flags: data.flags,
            channels,
            time_received: Instant::now(),
            time_saved: data.time_saved,
            skipped: false,
        });

        self.submit_and_notify(entries);
    }

    /// Re-enters a recovered entry from the reconciler (§4.3). Shares the
    /// same admission path as `process_doc`'s real entries, so a recovered
    /// sequence still goes through the ordinary duplicate/late-arrival
    /// classification.
    pub(crate) fn resubmit_recovered(&self, entry: LogEntry) {
        self.submit_and_notify(vec![entry]);
    }

    fn submit_and_notify(&self, entries: Vec<LogEntry>) {
        let mut changed = BTreeSet::new();
        {
            let mut state = self.state.write();
            let mut skipped = self.skipped.lock();
            for entry in entries {
                let outcome = state.process_entry(entry, &mut skipped, &self.opts);
                changed.extend(outcome.changed_channels());
            }
        }
        if !changed.is_empty() {
            (self.on_change)(changed);
        }
    }

    /// `now - lastPendingCheck > pendingSeqMaxWait` (§4.5): the pending tick
    /// fires on a `pendingSeqMaxWait / 2` timer, but only actually drains
    /// when a full `pendingSeqMaxWait` has elapsed since the last drain.
    pub(crate) fn should_run_pending_drain_tick(&self) -> bool {
        self.state.read().last_pending_check.elapsed() > self.opts.pending_seq_max_wait
    }

    /// Runs the pending-drain policy once, as the pending-tick housekeeping
    /// loop does (§4.5).
    pub(crate) fn run_pending_drain_tick(&self) {
        let changed = {
            let mut state = self.state.write();
            let mut skipped = self.skipped.lock();
            state.drain_pending(&mut skipped, &self.opts)
        };
        if !changed.is_empty() {
            (self.on_change)(changed);
        }
    }

    /// Runs `pruneCache()` across every known channel cache, as the
    /// channel-cache-prune housekeeping loop does (§4.5).
    pub(crate) fn run_channel_cache_prune(&self) {
        let caches: Vec<Arc<dyn ChannelCache>> = self.state.read().channel_caches.values().cloned().collect();
        for cache in caches {
            cache.prune_cache();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    use super::*;
    use crate::{
        channel_cache::InMemoryChannelCache,
        collaborators::StaticPrincipalParser,
    };

    fn new_cache() -> Arc<ChangeCache> {
        ChangeCache::init(
            0,
            CacheOptions::default(),
            Arc::new(|_changed: BTreeSet<String>| {}),
            Arc::new(StaticPrincipalParser),
            Arc::new(|_name: &str| Arc::new(InMemoryChannelCache::new(100)) as Arc<dyn ChannelCache>),
        )
    }

    #[test]
    fn processes_a_document_and_fans_out_to_its_channel() {
        let cache = new_cache();
        let raw = br#"{"sequence": 1, "current_rev": "1-a", "channels": {"general": null}}"#;
        cache.process_doc("doc1", raw);
        let changes = cache.get_changes_in_channel("general").unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].doc_id, "doc1");
        assert_eq!(cache.last_sequence(), 1);
    }

    #[test]
    fn unused_sequences_admit_placeholders_ahead_of_the_real_entry() {
        let cache = new_cache();
        let raw = br#"{
            "sequence": 3,
            "current_rev": "1-a",
            "channels": {"general": null},
            "unused_sequences": [1, 2]
        }"#;
        cache.process_doc("doc1", raw);
        assert_eq!(cache.last_sequence(), 3);
        let changes = cache.get_changes_in_channel("general").unwrap();
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn principal_documents_occupy_their_sequence_without_a_channel() {
        let cache = new_cache();
        cache.process_doc("_user/alice", br#"{"sequence": 1}"#);
        assert_eq!(cache.last_sequence(), 1);
        assert!(cache.get_changes_in_channel("*").unwrap().is_empty());
    }

    #[test]
    fn malformed_document_is_dropped_without_advancing_watermark() {
        let cache = new_cache();
        cache.process_doc("doc1", b"not json");
        assert_eq!(cache.last_sequence(), 0);
    }

    #[test]
    fn stopped_cache_rejects_reads_and_ignores_writes() {
        let cache = new_cache();
        cache.stop();
        let err = cache.get_changes_in_channel("general").unwrap_err();
        assert!(errors::ErrorMetadataAnyhowExt::is_overloaded(&err));
        cache.process_doc("doc1", br#"{"sequence": 1, "current_rev": "1-a", "channels": {}}"#);
        assert_eq!(cache.last_sequence(), 0);
    }

    #[test]
    fn on_change_fires_once_per_process_doc_with_changed_channels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let cache = ChangeCache::init(
            0,
            CacheOptions::default(),
            Arc::new(move |changed: BTreeSet<String>| {
                assert!(changed.contains("general"));
                calls_clone.fetch_add(1, Ordering::SeqCst);
            }),
            Arc::new(StaticPrincipalParser),
            Arc::new(|_name: &str| Arc::new(InMemoryChannelCache::new(100)) as Arc<dyn ChannelCache>),
        );
        cache.process_doc("doc1", br#"{"sequence": 1, "current_rev": "1-a", "channels": {"general": null}}"#);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
