//! Reconciliation of locally-originated routes against the kernel.
//!
//! The daemon periodically dumps the kernel's local interface routes
//! and drives each through the merge path; afterwards, any local entry
//! the dump did not refresh is no longer present on the host and gets
//! marked withdrawn. The sweeper flushes it later.

use super::merge;
use super::store::RouteStore;
use crate::types::{RouteEntry, RouteOrigin, RoutePrefix, METRIC_INFINITY};
use tracing::debug;

/// Merges one kernel dump batch taken at `poll_time`, then withdraws
/// local entries the batch no longer contains. Returns the number of
/// entries withdrawn.
pub(super) fn reconcile_local(
    store: &mut RouteStore,
    size: &mut usize,
    poll_time: i64,
    batch: &[RoutePrefix],
) -> usize {
    for prefix in batch {
        let candidate = RouteEntry::local(*prefix, poll_time);
        // Installs new local routes, refreshes existing ones to the
        // poll timestamp. Outcomes are not forwarded anywhere: the
        // kernel is already authoritative for its own routes.
        merge::apply_candidate(store, size, candidate);
    }

    let mut withdrawn = 0;
    for prefix in store.prefixes() {
        if let Some(entry) = store.lookup_mut(&prefix) {
            if entry.origin == RouteOrigin::Local
                && entry.last_update != poll_time
                && entry.metric == 0
            {
                entry.metric = METRIC_INFINITY;
                withdrawn += 1;
                debug!(route = %entry, "local route gone from kernel, withdrawn");
            }
        }
    }
    withdrawn
}
