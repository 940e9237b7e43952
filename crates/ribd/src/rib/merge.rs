//! The distance-vector merge/decision algorithm.
//!
//! Reconciles an incoming candidate route against the existing best
//! route for its prefix. This is a simplified Bellman-Ford relaxation
//! where the current advertiser wins metric ties: a route sticks with
//! the neighbor already credited for it, and only that neighbor's
//! withdrawal is honored.

use super::store::RouteStore;
use crate::types::{RouteEntry, METRIC_INFINITY};
use tracing::debug;

/// Outcome of merging one candidate into the RIB.
///
/// The payload is the entry as stored, ready for the kernel driver:
/// `InstallNew`/`Replace` carry the route to program, `Invalidate`
/// carries the now-withdrawn route to delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    NoAction,
    InstallNew(RouteEntry),
    Replace(RouteEntry),
    Invalidate(RouteEntry),
}

impl MergeOutcome {
    /// The payload entry, if this outcome carries one.
    pub fn entry(&self) -> Option<&RouteEntry> {
        match self {
            MergeOutcome::NoAction => None,
            MergeOutcome::InstallNew(e) | MergeOutcome::Replace(e) | MergeOutcome::Invalidate(e) => {
                Some(e)
            }
        }
    }
}

/// Applies one candidate to the store and reports the decision.
///
/// Total over well-formed input: out-of-range metrics are clamped to
/// infinity, and no prefix/metric/neighbor combination errors out. The
/// size counter only increments here, and only on `InstallNew`.
pub(super) fn apply_candidate(
    store: &mut RouteStore,
    size: &mut usize,
    mut candidate: RouteEntry,
) -> MergeOutcome {
    if store.is_null() {
        return MergeOutcome::NoAction;
    }

    if candidate.metric > METRIC_INFINITY {
        candidate.metric = METRIC_INFINITY;
    }

    if candidate.metric < METRIC_INFINITY {
        merge_reachable(store, size, candidate)
    } else {
        merge_withdrawal(store, candidate)
    }
}

fn merge_reachable(store: &mut RouteStore, size: &mut usize, candidate: RouteEntry) -> MergeOutcome {
    let Some(existing) = store.lookup(&candidate.prefix) else {
        debug!(route = %candidate, "new route, installing");
        store.insert(candidate.clone());
        *size += 1;
        return MergeOutcome::InstallNew(candidate);
    };
    let (incumbent_metric, incumbent_next_hop) = (existing.metric, existing.next_hop);

    if candidate.metric > incumbent_metric {
        debug!(route = %candidate, "worse metric, not installing");
        MergeOutcome::NoAction
    } else if candidate.metric == incumbent_metric {
        if candidate.next_hop == incumbent_next_hop {
            // Same advertiser, same cost: refresh the entry's age only.
            debug!(route = %candidate, "same neighbor, same metric, refreshing");
            if let Some(entry) = store.lookup_mut(&candidate.prefix) {
                entry.last_update = candidate.last_update;
            }
        } else {
            // Incumbent wins the tie; route stability over fairness.
            debug!(route = %candidate, "different neighbor, same metric, not installing");
        }
        MergeOutcome::NoAction
    } else {
        // Better metric. A currently-unreachable incumbent only exists
        // to propagate withdrawal, so the kernel needs a fresh install
        // rather than a replace.
        let was_unreachable = incumbent_metric >= METRIC_INFINITY;
        store.replace_in_place(&candidate.prefix, candidate.clone());
        if was_unreachable {
            debug!(route = %candidate, "better route over withdrawn entry, installing");
            *size += 1;
            MergeOutcome::InstallNew(candidate)
        } else {
            debug!(route = %candidate, "better route, replacing");
            MergeOutcome::Replace(candidate)
        }
    }
}

fn merge_withdrawal(store: &mut RouteStore, candidate: RouteEntry) -> MergeOutcome {
    match store.lookup(&candidate.prefix) {
        Some(existing) if existing.next_hop == candidate.next_hop => {
            // The credited neighbor withdrew the route. Keep the entry
            // at metric infinity so the withdrawal propagates; the
            // sweeper flushes it later.
            store.replace_in_place(&candidate.prefix, candidate.clone());
            debug!(route = %candidate, "route invalidated");
            MergeOutcome::Invalidate(candidate)
        }
        _ => {
            // Withdrawal from a neighbor not credited with the route,
            // or for a prefix we never had. Ignored.
            debug!(route = %candidate, "no match for unreachable-metric candidate, ignored");
            MergeOutcome::NoAction
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RouteOrigin, RoutePrefix};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    const NEIGH_A: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);
    const NEIGH_B: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

    fn prefix() -> RoutePrefix {
        RoutePrefix::new(
            Ipv4Addr::new(10, 0, 0, 0),
            Ipv4Addr::new(255, 255, 255, 0),
        )
    }

    fn candidate(next_hop: Ipv4Addr, metric: u32, at: i64) -> RouteEntry {
        RouteEntry::remote(prefix(), next_hop, metric, 0, at)
    }

    fn merge(store: &mut RouteStore, size: &mut usize, c: RouteEntry) -> MergeOutcome {
        apply_candidate(store, size, c)
    }

    #[test]
    fn test_first_sighting_installs() {
        let mut store = RouteStore::in_memory();
        let mut size = 0;
        let c = candidate(NEIGH_A, 2, 100);

        let outcome = merge(&mut store, &mut size, c.clone());

        assert_eq!(outcome, MergeOutcome::InstallNew(c.clone()));
        assert_eq!(store.lookup(&prefix()), Some(&c));
        assert_eq!(size, 1);
    }

    #[test]
    fn test_unreachable_candidate_on_empty_store_is_ignored() {
        let mut store = RouteStore::in_memory();
        let mut size = 0;

        let outcome = merge(&mut store, &mut size, candidate(NEIGH_A, 16, 100));

        assert_eq!(outcome, MergeOutcome::NoAction);
        assert!(store.is_empty());
        assert_eq!(size, 0);
    }

    #[test]
    fn test_worse_metric_is_ignored() {
        let mut store = RouteStore::in_memory();
        let mut size = 0;
        merge(&mut store, &mut size, candidate(NEIGH_A, 2, 100));

        let outcome = merge(&mut store, &mut size, candidate(NEIGH_B, 5, 101));

        assert_eq!(outcome, MergeOutcome::NoAction);
        assert_eq!(store.lookup(&prefix()).unwrap().metric, 2);
        assert_eq!(store.lookup(&prefix()).unwrap().next_hop, NEIGH_A);
    }

    #[test]
    fn test_same_metric_same_neighbor_refreshes_timestamp() {
        let mut store = RouteStore::in_memory();
        let mut size = 0;
        merge(&mut store, &mut size, candidate(NEIGH_A, 2, 100));

        let outcome = merge(&mut store, &mut size, candidate(NEIGH_A, 2, 150));

        assert_eq!(outcome, MergeOutcome::NoAction);
        let stored = store.lookup(&prefix()).unwrap();
        assert_eq!(stored.last_update, 150);
        assert_eq!(stored.metric, 2);
        assert_eq!(size, 1);
    }

    #[test]
    fn test_same_metric_different_neighbor_keeps_incumbent() {
        let mut store = RouteStore::in_memory();
        let mut size = 0;
        merge(&mut store, &mut size, candidate(NEIGH_A, 2, 100));

        let outcome = merge(&mut store, &mut size, candidate(NEIGH_B, 2, 150));

        assert_eq!(outcome, MergeOutcome::NoAction);
        let stored = store.lookup(&prefix()).unwrap();
        assert_eq!(stored.next_hop, NEIGH_A);
        // Incumbent is not even refreshed by the losing tie.
        assert_eq!(stored.last_update, 100);
    }

    #[test]
    fn test_better_metric_replaces() {
        let mut store = RouteStore::in_memory();
        let mut size = 0;
        merge(&mut store, &mut size, candidate(NEIGH_A, 5, 100));

        let better = candidate(NEIGH_B, 2, 101);
        let outcome = merge(&mut store, &mut size, better.clone());

        assert_eq!(outcome, MergeOutcome::Replace(better.clone()));
        assert_eq!(store.lookup(&prefix()), Some(&better));
        assert_eq!(size, 1);
    }

    #[test]
    fn test_better_metric_over_withdrawn_entry_is_fresh_install() {
        let mut store = RouteStore::in_memory();
        let mut size = 0;
        merge(&mut store, &mut size, candidate(NEIGH_A, 5, 100));
        merge(&mut store, &mut size, candidate(NEIGH_A, 16, 101));

        let revived = candidate(NEIGH_B, 3, 102);
        let outcome = merge(&mut store, &mut size, revived.clone());

        assert_eq!(outcome, MergeOutcome::InstallNew(revived.clone()));
        assert_eq!(store.lookup(&prefix()), Some(&revived));
    }

    #[test]
    fn test_withdrawal_from_credited_neighbor_invalidates() {
        let mut store = RouteStore::in_memory();
        let mut size = 0;
        merge(&mut store, &mut size, candidate(NEIGH_A, 2, 100));

        let withdrawal = candidate(NEIGH_A, 16, 103);
        let outcome = merge(&mut store, &mut size, withdrawal.clone());

        assert_eq!(outcome, MergeOutcome::Invalidate(withdrawal));
        let stored = store.lookup(&prefix()).unwrap();
        assert_eq!(stored.metric, METRIC_INFINITY);
        assert_eq!(stored.last_update, 103);
        // The entry is retained to propagate the withdrawal.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_withdrawal_from_other_neighbor_is_ignored() {
        let mut store = RouteStore::in_memory();
        let mut size = 0;
        merge(&mut store, &mut size, candidate(NEIGH_A, 2, 100));

        let outcome = merge(&mut store, &mut size, candidate(NEIGH_B, 16, 103));

        assert_eq!(outcome, MergeOutcome::NoAction);
        let stored = store.lookup(&prefix()).unwrap();
        assert_eq!(stored.metric, 2);
        assert_eq!(stored.next_hop, NEIGH_A);
    }

    #[test]
    fn test_out_of_range_metric_clamps_to_infinity() {
        let mut store = RouteStore::in_memory();
        let mut size = 0;
        merge(&mut store, &mut size, candidate(NEIGH_A, 2, 100));

        // Clamped to 16 and treated as a withdrawal from A.
        let mut oversized = candidate(NEIGH_A, 2, 103);
        oversized.metric = 250;
        let outcome = merge(&mut store, &mut size, oversized);

        assert!(matches!(outcome, MergeOutcome::Invalidate(_)));
        assert_eq!(store.lookup(&prefix()).unwrap().metric, METRIC_INFINITY);
    }

    #[test]
    fn test_null_store_never_acts() {
        let mut store = RouteStore::null();
        let mut size = 0;

        let outcome = merge(&mut store, &mut size, candidate(NEIGH_A, 2, 100));

        assert_eq!(outcome, MergeOutcome::NoAction);
        assert_eq!(size, 0);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_local_candidate_loses_tie_against_remote_zero_metric() {
        // A remote metric-0 incumbent keeps the slot against the local
        // poller's metric-0 candidate; the next-hops differ.
        let mut store = RouteStore::in_memory();
        let mut size = 0;
        merge(&mut store, &mut size, candidate(NEIGH_A, 0, 100));

        let local = RouteEntry::local(prefix(), 200);
        let outcome = merge(&mut store, &mut size, local);

        assert_eq!(outcome, MergeOutcome::NoAction);
        assert_eq!(store.lookup(&prefix()).unwrap().origin, RouteOrigin::Remote);
    }
}
