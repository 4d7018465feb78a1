//! The data model shared by every stage of the ingestion pipeline: the raw
//! per-sequence log entry, the channel membership it carries, and the
//! bookkeeping record kept for a sequence the cache has given up waiting for.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    time::{
        Instant,
        SystemTime,
    },
};

use serde::{
    Deserialize,
    Serialize,
};

pub type Sequence = u64;

/// Bit flags carried on a [`LogEntry`], mirroring the subset of the upstream
/// document's sync metadata flags the cache itself inspects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFlags(u8);

impl ChangeFlags {
    pub const NONE: Self = Self(0);
    pub const DELETED: Self = Self(1 << 0);
    pub const REMOVED: Self = Self(1 << 1);
    pub const CONFLICT: Self = Self(1 << 2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A removal record: the doc left the channel as of `seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
    pub seq: Sequence,
}

/// Per-channel membership for a document at the sequence it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelMembership {
    Present,
    Removed(Removal),
}

impl ChannelMembership {
    pub fn is_removal(self) -> bool {
        matches!(self, ChannelMembership::Removed(_))
    }
}

/// A single change event, in the order the ingestion core accepted it (which
/// may not be the order it was produced upstream).
///
/// An entry with an empty `doc_id` is a placeholder: it occupies a sequence
/// slot (so the watermark can advance past it) without being surfaced to any
/// channel cache.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub sequence: Sequence,
    pub doc_id: String,
    pub rev_id: String,
    pub flags: ChangeFlags,
    pub channels: BTreeMap<String, ChannelMembership>,
    pub time_received: Instant,
    pub time_saved: SystemTime,
    /// Set once this entry is known to have arrived after the cache already
    /// declared its sequence skipped.
    pub skipped: bool,
}

impl LogEntry {
    pub fn placeholder(sequence: Sequence, time_received: Instant) -> Self {
        Self {
            sequence,
            doc_id: String::new(),
            rev_id: String::new(),
            flags: ChangeFlags::NONE,
            channels: BTreeMap::new(),
            time_received,
            time_saved: SystemTime::now(),
            skipped: false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.doc_id.is_empty()
    }
}

/// Ordering for the pending min-heap: purely by `sequence`, so that
/// `BinaryHeap<Reverse<PendingEntry>>` behaves as the min-heap described in
/// the design.
#[derive(Debug)]
pub struct PendingEntry(pub LogEntry);

impl PartialEq for PendingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.0.sequence == other.0.sequence
    }
}
impl Eq for PendingEntry {}
impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.sequence.cmp(&other.0.sequence)
    }
}

/// A sequence the cache has given up waiting for, in the order it was
/// declared skipped (strictly increasing in both `seq` and `time_added`).
#[derive(Debug, Clone, Copy)]
pub struct SkippedSequence {
    pub seq: Sequence,
    pub time_added: Instant,
}

/// The parsed shape of a document's sync metadata, as produced by the
/// `unmarshal_document_sync_data` collaborator. This is the JSON-facing
/// twin of [`LogEntry`]: untyped input in, validated struct out.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentSyncData {
    pub sequence: Sequence,
    #[serde(default)]
    pub current_rev: String,
    #[serde(default)]
    pub flags: ChangeFlags,
    #[serde(default)]
    pub channels: BTreeMap<String, Option<Removal>>,
    #[serde(default)]
    pub unused_sequences: Vec<Sequence>,
    #[serde(default = "SystemTime::now")]
    pub time_saved: SystemTime,
}

impl DocumentSyncData {
    /// A doc is only eligible for ingestion once it carries the required
    /// sync metadata (at minimum, a sequence and current revision).
    pub fn has_valid_sync_data(&self) -> bool {
        self.sequence > 0 && !self.current_rev.is_empty()
    }
}
