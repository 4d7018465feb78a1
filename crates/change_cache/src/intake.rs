//! Bounded async intake: a single dispatcher task drains a bounded `mpsc`
//! channel and hands each raw mutation to a semaphore-gated worker pool, so
//! a burst of upstream changes cannot spawn unbounded concurrent
//! `process_doc` calls. The queue is sized `3 * max_processes` so a brief
//! stall in workers doesn't immediately apply backpressure to the feed.

use std::sync::Arc;

use tokio::sync::{
    mpsc,
    Semaphore,
};

use crate::cache::ChangeCache;

struct RawChange {
    doc_id: String,
    raw: Vec<u8>,
}

/// A handle for submitting raw upstream mutations into the bounded intake
/// queue. Cloning is cheap; every clone feeds the same dispatcher.
#[derive(Clone)]
pub struct IntakeHandle {
    tx: mpsc::Sender<RawChange>,
}

impl IntakeHandle {
    /// `DocChanged(docID, rawDoc)`. Blocks (asynchronously) only once the
    /// bounded queue is full, applying backpressure to the caller rather than
    /// growing memory without bound.
    pub async fn doc_changed(&self, doc_id: impl Into<String>, raw: Vec<u8>) -> anyhow::Result<()> {
        self.tx
            .send(RawChange {
                doc_id: doc_id.into(),
                raw,
            })
            .await
            .map_err(|_| anyhow::anyhow!("change cache intake has shut down"))
    }

    /// Non-blocking variant for callers that would rather drop an event than
    /// wait: returns `Ok(false)` if the queue is currently full.
    pub fn try_doc_changed(&self, doc_id: impl Into<String>, raw: Vec<u8>) -> anyhow::Result<bool> {
        match self.tx.try_send(RawChange {
            doc_id: doc_id.into(),
            raw,
        }) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(anyhow::anyhow!("change cache intake has shut down")),
        }
    }
}

/// Spawns the dispatcher task and returns a handle for submitting changes.
/// The dispatcher exits once every `IntakeHandle` clone has been dropped and
/// the queue has drained, or once `cache` is stopped.
pub fn spawn(cache: Arc<ChangeCache>) -> IntakeHandle {
    let queue_size = cache.options().max_processes.max(1);
    let (tx, mut rx) = mpsc::channel::<RawChange>(3 * queue_size);
    let permits = Arc::new(Semaphore::new(queue_size));
    let mut stopped = cache.stopped_receiver();

    tokio::spawn(async move {
        loop {
            let change = tokio::select! {
                biased;
                _ = stopped.changed() => {
                    if *stopped.borrow() {
                        break;
                    }
                    continue;
                }
                received = rx.recv() => match received {
                    Some(change) => change,
                    None => break,
                },
            };
            if cache.is_stopped() {
                continue;
            }
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let cache = cache.clone();
            tokio::spawn(async move {
                let _permit = permit;
                cache.process_doc(&change.doc_id, &change.raw);
            });
        }
        tracing::info!("change cache intake dispatcher stopped");
    });

    IntakeHandle { tx }
}
