//! Scenario-level and property-based tests that exercise the ingestion core,
//! pending-drain policy, and reconciler together through the public
//! [`crate::ChangeCache`] surface, rather than one module at a time.

mod scenarios;
mod view_store;

pub(crate) use view_store::RecordingViewStore;
