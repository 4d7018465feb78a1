//! End-to-end scenarios exercising the change cache's public surface.

use std::{
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

use crate::{
    cache::ChangeCache,
    channel_cache::{
        ChannelCache,
        InMemoryChannelCache,
    },
    collaborators::StaticPrincipalParser,
    config::CacheOptions,
    reconciler::reconcile_once,
    tests::RecordingViewStore,
};

fn new_cache(opts: CacheOptions) -> (Arc<ChangeCache>, Arc<AtomicUsize>) {
    let notify_count = Arc::new(AtomicUsize::new(0));
    let counted = notify_count.clone();
    let cache = ChangeCache::init(
        0,
        opts,
        Arc::new(move |_changed| {
            counted.fetch_add(1, Ordering::SeqCst);
        }),
        Arc::new(StaticPrincipalParser),
        Arc::new(|_: &str| Arc::new(InMemoryChannelCache::new(100)) as Arc<dyn ChannelCache>),
    );
    (cache, notify_count)
}

fn doc(seq: u64, channel: &str) -> Vec<u8> {
    format!(
        r#"{{"sequence": {seq}, "current_rev": "1-a", "channels": {{"{channel}": null}}}}"#
    )
    .into_bytes()
}

#[test]
fn scenario_in_order_delivery() {
    let (cache, notify_count) = new_cache(CacheOptions::default());
    for seq in 1..=5 {
        cache.process_doc(&format!("doc{seq}"), &doc(seq, "general"));
    }
    assert_eq!(cache.last_sequence(), 5);
    assert_eq!(cache.get_changes_in_channel("general").unwrap().len(), 5);
    assert_eq!(notify_count.load(Ordering::SeqCst), 5);
}

#[test]
fn scenario_pending_reassembly_admits_in_submission_independent_order() {
    let (cache, _) = new_cache(CacheOptions::default());
    cache.process_doc("doc3", &doc(3, "general"));
    cache.process_doc("doc1", &doc(1, "general"));
    cache.process_doc("doc2", &doc(2, "general"));

    assert_eq!(cache.last_sequence(), 3);
    let changes = cache.get_changes_in_channel("general").unwrap();
    assert_eq!(changes.iter().map(|c| c.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn scenario_pending_overflow_by_age_declares_a_gap_and_keeps_going() {
    let (cache, _) = new_cache(CacheOptions {
        pending_seq_max_wait: Duration::from_millis(40),
        ..CacheOptions::default()
    });
    cache.process_doc("doc1", &doc(1, "general"));
    cache.process_doc("doc3", &doc(3, "general"));
    assert_eq!(cache.last_sequence(), 1);

    std::thread::sleep(Duration::from_millis(80));
    cache.run_pending_drain_tick();

    assert_eq!(cache.last_sequence(), 3);
    let changes = cache.get_changes_in_channel("general").unwrap();
    assert_eq!(changes.iter().map(|c| c.sequence).collect::<Vec<_>>(), vec![1, 3]);
}

#[test]
fn scenario_late_arrival_recovers_a_previously_skipped_sequence() {
    let (cache, _) = new_cache(CacheOptions {
        pending_seq_max_wait: Duration::from_millis(40),
        ..CacheOptions::default()
    });
    cache.process_doc("doc1", &doc(1, "general"));
    cache.process_doc("doc3", &doc(3, "general"));
    std::thread::sleep(Duration::from_millis(80));
    cache.run_pending_drain_tick();
    assert_eq!(cache.last_sequence(), 3);

    // Sequence 2 finally shows up, after having been declared skipped.
    cache.process_doc("doc2", &doc(2, "general"));

    let changes = cache.get_changes_in_channel("general").unwrap();
    assert_eq!(changes.iter().map(|c| c.sequence).collect::<Vec<_>>(), vec![1, 3, 2]);
    assert!(changes.iter().find(|c| c.sequence == 2).unwrap().skipped);
}

#[tokio::test]
async fn scenario_abandonment_when_the_view_never_learns_about_a_gap() {
    let cache = ChangeCache::init(
        0,
        CacheOptions {
            pending_seq_max_wait: Duration::from_millis(30),
            skipped_seq_max_wait: Duration::from_millis(30),
            ..CacheOptions::default()
        },
        Arc::new(|_| {}),
        Arc::new(StaticPrincipalParser),
        Arc::new(|_: &str| Arc::new(InMemoryChannelCache::new(100)) as Arc<dyn ChannelCache>),
    );
    cache.process_doc("doc1", &doc(1, "general"));
    cache.process_doc("doc3", &doc(3, "general"));
    tokio::time::sleep(Duration::from_millis(60)).await;
    cache.run_pending_drain_tick();
    assert_eq!(cache.last_sequence(), 3);

    let view = RecordingViewStore::new();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let report = reconcile_once(&cache, &view).await;
    assert_eq!(report.abandoned, 1);
    assert_eq!(view.queries(), vec![("*".to_string(), 2)]);

    // Sequence 2 can now never come back: even a late arrival is admitted
    // best-effort without being treated as a recovery.
    cache.process_doc("doc2-late", &doc(2, "general"));
    let changes = cache.get_changes_in_channel("general").unwrap();
    assert!(changes.iter().any(|c| c.sequence == 2 && !c.skipped));
}

#[tokio::test]
async fn scenario_reconciler_recovers_a_gap_the_view_knows_about() {
    let cache = ChangeCache::init(
        0,
        CacheOptions {
            pending_seq_max_wait: Duration::from_millis(30),
            skipped_seq_max_wait: Duration::from_millis(30),
            ..CacheOptions::default()
        },
        Arc::new(|_| {}),
        Arc::new(StaticPrincipalParser),
        Arc::new(|_: &str| Arc::new(InMemoryChannelCache::new(100)) as Arc<dyn ChannelCache>),
    );
    cache.process_doc("doc1", &doc(1, "general"));
    cache.process_doc("doc3", &doc(3, "general"));
    tokio::time::sleep(Duration::from_millis(60)).await;
    cache.run_pending_drain_tick();
    assert_eq!(cache.last_sequence(), 3);

    let view = RecordingViewStore::new();
    view.seed(2, "doc2", "1-a", &[("general", None)]);
    tokio::time::sleep(Duration::from_millis(60)).await;
    let report = reconcile_once(&cache, &view).await;
    assert_eq!(report.recovered, 1);
    assert_eq!(report.abandoned, 0);

    let changes = cache.get_changes_in_channel("general").unwrap();
    assert_eq!(changes.iter().map(|c| c.sequence).collect::<Vec<_>>(), vec![1, 3, 2]);
    assert!(changes.iter().find(|c| c.sequence == 2).unwrap().skipped);
}
