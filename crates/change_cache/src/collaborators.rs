//! Collaborator contracts consumed by the ingestion core: the durable
//! fallback view used by the reconciler, and the principal/document parsing
//! the core uses to turn a raw upstream mutation into a [`LogEntry`].
//!
//! These are out of the core's scope by design: the core only needs the
//! interface. This module also ships the JSON parsing helpers a real
//! deployment would otherwise hand-roll, since they're pure functions with
//! no collaborator state of their own.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::types::{
    DocumentSyncData,
    Removal,
    Sequence,
};

/// A single change as reported by the durable fallback view. A minimal
/// collaborator only needs to guarantee `sequence`/`doc_id`/`rev_id`, but
/// `channels` is an enrichment this crate asks for: a view backed by a real
/// channel index can report full channel membership, letting a recovered
/// entry fan out exactly as it would have on first arrival rather than only
/// to the star channel.
#[derive(Debug, Clone)]
pub struct ViewChangeEntry {
    pub sequence: Sequence,
    pub doc_id: String,
    pub rev_id: String,
    pub channels: BTreeMap<String, Option<Removal>>,
}

/// The durable fallback lookup the reconciler consults for sequences it has
/// given up waiting for directly from the upstream feed. A non-error
/// response with at least one entry whose sequence matches the query is
/// treated as "found"; anything else (including a transport error) is
/// treated as "not found" and the sequence proceeds to abandonment.
#[async_trait]
pub trait ViewQuery: Send + Sync {
    async fn changes_in_channel_from_view(
        &self,
        channel: &str,
        since_seq: Sequence,
    ) -> anyhow::Result<Vec<ViewChangeEntry>>;
}

/// A parsed principal (user or role) document. Principals carry no channel
/// set but still occupy their sequence slot, via a placeholder `LogEntry`,
/// so downstream watermarks do not stall on them.
#[derive(Debug, Clone)]
pub struct Principal {
    pub name: String,
    pub is_user: bool,
    pub sequence: Sequence,
}

/// Parses the raw bytes of a principal document into a [`Principal`].
pub trait PrincipalParser: Send + Sync {
    fn unmarshal_principal(&self, doc_id: &str, raw: &[u8], is_user: bool) -> anyhow::Result<Principal>;
}

/// The minimal JSON shape a [`PrincipalParser`] needs to read off a principal
/// document: just enough to synthesize its placeholder.
#[derive(Debug, Deserialize)]
struct RawPrincipal {
    sequence: Sequence,
}

/// A [`PrincipalParser`] that trusts the document body to carry its own
/// `sequence` field and derives the principal's name from its key, the way
/// the reference deployment's principal documents are actually shaped.
pub struct StaticPrincipalParser;

impl PrincipalParser for StaticPrincipalParser {
    fn unmarshal_principal(&self, doc_id: &str, raw: &[u8], is_user: bool) -> anyhow::Result<Principal> {
        let parsed: RawPrincipal = serde_json::from_slice(raw)?;
        let name = doc_id
            .strip_prefix(if is_user { "_user/" } else { "_role/" })
            .unwrap_or(doc_id)
            .to_string();
        Ok(Principal {
            name,
            is_user,
            sequence: parsed.sequence,
        })
    }
}

/// Returns `Some(is_user)` if `doc_id` names a principal (user or role) key.
pub fn principal_kind(doc_id: &str) -> Option<bool> {
    if doc_id.starts_with("_user/") {
        Some(true)
    } else if doc_id.starts_with("_role/") {
        Some(false)
    } else {
        None
    }
}

/// Synthesizes the synthetic doc id the core uses for a principal's
/// placeholder entry: `"_user/" + name` or `"_role/" + name`.
pub fn principal_doc_id(principal: &Principal) -> String {
    format!("{}/{}", if principal.is_user { "_user" } else { "_role" }, principal.name)
}

/// Parses a document's sync metadata out of its raw JSON body. A parse
/// failure is reported to the caller, who is responsible for logging a
/// warning and dropping the event rather than propagating the error further.
pub fn unmarshal_document_sync_data(raw: &[u8]) -> anyhow::Result<DocumentSyncData> {
    let data: DocumentSyncData = serde_json::from_slice(raw)?;
    Ok(data)
}
