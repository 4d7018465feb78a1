//! An in-process cache that reassembles a sequence-ordered upstream change
//! feed into per-channel logs, tolerating out-of-order delivery and gaps.
//!
//! The ingestion core ([`ingestion`], [`pending_drain`]) admits entries as
//! they arrive, buffers out-of-order arrivals in a pending min-heap, and
//! declares a gap "skipped" once the heap grows too large or too old rather
//! than stalling the watermark forever. A skipped sequence gets one more
//! chance: the [`reconciler`] periodically asks a durable fallback view
//! ([`collaborators::ViewQuery`]) whether it knows about sequences the cache
//! gave up on directly, folding recovered entries back in and abandoning the
//! rest.
//!
//! [`cache::ChangeCache`] is the façade applications build against; `intake`
//! and `housekeeping` wire it up to an async runtime with bounded
//! concurrency and periodic maintenance. Per-channel storage and the durable
//! fallback view are collaborator traits -- this crate ships in-memory
//! reference implementations good enough for tests, but a real deployment is
//! expected to bring its own.

mod cache;
mod channel_cache;
mod collaborators;
mod config;
mod housekeeping;
mod ingestion;
mod intake;
mod metrics;
mod pending_drain;
mod pending_heap;
mod reconciler;
mod sequence_set;
mod skipped_queue;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use cache::{
    ChangeCache,
    OnChangeFn,
};
pub use channel_cache::{
    ChannelCache,
    ChannelLogEntry,
    InMemoryChannelCache,
};
pub use collaborators::{
    principal_doc_id,
    principal_kind,
    unmarshal_document_sync_data,
    StaticPrincipalParser,
    Principal,
    PrincipalParser,
    ViewChangeEntry,
    ViewQuery,
};
pub use config::CacheOptions;
pub use housekeeping::{
    spawn_channel_cache_prune,
    spawn_pending_tick,
};
pub use ingestion::EntryOutcome;
pub use intake::{
    spawn as spawn_intake,
    IntakeHandle,
};
pub use reconciler::{
    reconcile_once,
    spawn as spawn_reconciler,
    ReconcileReport,
};
pub use state::ChannelCacheFactory;
pub use types::{
    ChangeFlags,
    ChannelMembership,
    DocumentSyncData,
    LogEntry,
    Removal,
    Sequence,
    SkippedSequence,
};
