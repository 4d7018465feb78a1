//! An in-memory [`ViewQuery`] test double that records every query it
//! receives, so reconciler-driven recovery scenarios can assert on what was
//! actually asked of the durable fallback.

use std::{
    collections::BTreeMap,
    sync::Mutex,
};

use async_trait::async_trait;

use crate::{
    collaborators::{
        ViewChangeEntry,
        ViewQuery,
    },
    types::{
        Removal,
        Sequence,
    },
};

#[derive(Default)]
pub(crate) struct RecordingViewStore {
    entries: Mutex<BTreeMap<Sequence, ViewChangeEntry>>,
    queries: Mutex<Vec<(String, Sequence)>>,
}

impl RecordingViewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the view with a change it should report as known, as though it
    /// had been durably persisted by some other path than the live feed.
    pub fn seed(&self, sequence: Sequence, doc_id: &str, rev_id: &str, channels: &[(&str, Option<Removal>)]) {
        let mut channel_map = BTreeMap::new();
        for (name, removal) in channels {
            channel_map.insert(name.to_string(), *removal);
        }
        self.entries.lock().unwrap().insert(
            sequence,
            ViewChangeEntry {
                sequence,
                doc_id: doc_id.to_string(),
                rev_id: rev_id.to_string(),
                channels: channel_map,
            },
        );
    }

    pub fn queries(&self) -> Vec<(String, Sequence)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ViewQuery for RecordingViewStore {
    async fn changes_in_channel_from_view(
        &self,
        channel: &str,
        since_seq: Sequence,
    ) -> anyhow::Result<Vec<ViewChangeEntry>> {
        self.queries.lock().unwrap().push((channel.to_string(), since_seq));
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(&since_seq)
            .cloned()
            .into_iter()
            .collect())
    }
}
