//! Aging and garbage collection of stale routes.
//!
//! One sweep pass advances entries through the invalid -> flushed
//! state machine based on wall-clock time: a remotely-learned route
//! that has gone quiet past the invalid timer is soft-expired to
//! metric infinity, and an unreachable route past the flush timer is
//! removed from the table entirely.

use super::store::RouteStore;
use crate::types::{RouteOrigin, RouteTimers, METRIC_INFINITY};
use tracing::debug;

/// Counters from one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Entries soft-expired to metric infinity this pass.
    pub expired: usize,
    /// Entries deleted from the store this pass.
    pub flushed: usize,
}

enum Disposition {
    Keep,
    Expire,
    Flush,
}

/// Walks the store once, expiring and flushing entries as their timers
/// elapse. Deletions are subtracted from the size counter.
pub(super) fn sweep_expired(
    store: &mut RouteStore,
    size: &mut usize,
    now: i64,
    timers: &RouteTimers,
) -> SweepStats {
    let expiration_time = now - i64::from(timers.invalid);
    let gc_time = now - i64::from(timers.flush);
    let mut stats = SweepStats::default();

    for prefix in store.prefixes() {
        let disposition = match store.lookup(&prefix) {
            // Remote route gone quiet past the invalid timer but still
            // inside the flush window: mark unreachable, keep it so the
            // withdrawal propagates. Local routes are withdrawn by the
            // reconciler instead, never aged out here.
            Some(entry)
                if entry.last_update < expiration_time
                    && entry.last_update > gc_time
                    && entry.metric < METRIC_INFINITY
                    && entry.origin == RouteOrigin::Remote =>
            {
                Disposition::Expire
            }
            // Unreachable route past the flush timer: delete outright,
            // whichever origin it had.
            Some(entry) if entry.last_update < gc_time && entry.metric >= METRIC_INFINITY => {
                Disposition::Flush
            }
            Some(_) => Disposition::Keep,
            None => Disposition::Keep,
        };

        match disposition {
            Disposition::Keep => {}
            Disposition::Expire => {
                if let Some(entry) = store.lookup_mut(&prefix) {
                    entry.metric = METRIC_INFINITY;
                    stats.expired += 1;
                    debug!(route = %entry, now, "route expired, metric set to infinity");
                }
            }
            Disposition::Flush => {
                if let Some(entry) = store.remove(&prefix) {
                    *size = size.saturating_sub(1);
                    stats.flushed += 1;
                    debug!(route = %entry, now, "route flushed from rib");
                }
            }
        }
    }

    stats
}
