//! Periodic housekeeping loops: the pending-drain tick and the channel-cache
//! prune. Both observe the change cache's shared `stopped` watch channel
//! directly and exit as soon as it flips, rather than relying on the next
//! tick to notice.

use std::{
    sync::Arc,
    time::Duration,
};

use crate::cache::ChangeCache;

const CHANNEL_CACHE_PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Wakes on a fixed tick (`pending_seq_max_wait / 2`, per §4.5) but only
/// actually runs `drain_pending` once `pending_seq_max_wait` has elapsed
/// since the last drain, so a wholly-idle cache never leaves a pending entry
/// un-drained for longer than the policy window that would declare it
/// skipped if it had a successor, without draining twice as often as that
/// window requires.
pub fn spawn_pending_tick(cache: Arc<ChangeCache>) -> tokio::task::JoinHandle<()> {
    let mut stopped = cache.stopped_receiver();
    let period = (cache.options().pending_seq_max_wait / 2).max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if *stopped.borrow() {
                        break;
                    }
                    if cache.should_run_pending_drain_tick() {
                        cache.run_pending_drain_tick();
                    }
                }
                _ = stopped.changed() => {
                    if *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("pending-drain housekeeping loop stopped");
    })
}

/// Runs `pruneCache()` across every channel cache on a fixed 5-minute tick.
pub fn spawn_channel_cache_prune(cache: Arc<ChangeCache>) -> tokio::task::JoinHandle<()> {
    let mut stopped = cache.stopped_receiver();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHANNEL_CACHE_PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if *stopped.borrow() {
                        break;
                    }
                    cache.run_channel_cache_prune();
                }
                _ = stopped.changed() => {
                    if *stopped.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("channel-cache-prune housekeeping loop stopped");
    })
}
