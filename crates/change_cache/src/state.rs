//! The locked core state shared by the ingestion pipeline, the pending-drain
//! policy, and the reconciler's re-entry path. Everything in [`CacheState`]
//! is protected by the change cache's single `parking_lot::RwLock`; the
//! `impl CacheState` blocks that operate on it live in `ingestion.rs` and
//! `pending_drain.rs`; this module only owns the data and the small amount of
//! bookkeeping (channel-cache lookup) that both of those need.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::Instant,
};

use crate::{
    channel_cache::ChannelCache,
    pending_heap::LogPriorityQueue,
    sequence_set::ReceivedSequences,
    types::Sequence,
};

pub type ChannelCacheFactory = dyn Fn(&str) -> Arc<dyn ChannelCache> + Send + Sync;

pub(crate) struct CacheState {
    pub next_sequence: Sequence,
    pub initial_sequence: Sequence,
    pub received: ReceivedSequences,
    pub pending: LogPriorityQueue,
    pub channel_caches: BTreeMap<String, Arc<dyn ChannelCache>>,
    pub logs_disabled: bool,
    pub stopped: bool,
    pub last_pending_check: Instant,
    pub enable_star_channel_log: bool,
    channel_cache_factory: Arc<ChannelCacheFactory>,
}

impl CacheState {
    pub fn new(
        initial_sequence: Sequence,
        enable_star_channel_log: bool,
        channel_cache_factory: Arc<ChannelCacheFactory>,
    ) -> Self {
        Self {
            next_sequence: initial_sequence + 1,
            initial_sequence,
            received: ReceivedSequences::new(initial_sequence),
            pending: LogPriorityQueue::new(),
            channel_caches: BTreeMap::new(),
            logs_disabled: false,
            stopped: false,
            last_pending_check: Instant::now(),
            enable_star_channel_log,
            channel_cache_factory,
        }
    }

    /// Lazily creates the named channel cache the first time it's
    /// referenced. The lookup and the (possible) creation both happen while
    /// the caller already holds the cache's write lock, so there is no
    /// separate double-checked-locking dance here -- the cache lock itself
    /// is the single point of truth.
    pub fn get_or_create_channel_cache(&mut self, name: &str) -> Arc<dyn ChannelCache> {
        if let Some(existing) = self.channel_caches.get(name) {
            return existing.clone();
        }
        let created = (self.channel_cache_factory)(name);
        self.channel_caches.insert(name.to_string(), created.clone());
        created
    }

    pub fn clear_logs(&mut self) {
        self.channel_caches.clear();
        self.pending = LogPriorityQueue::new();
    }
}
