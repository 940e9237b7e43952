//! The Routing Information Base engine.
//!
//! `Rib` owns the route store, the installed-route counter and the
//! prefix filter behind one coarse lock. Each operation takes the
//! lock for its full duration
//! and never holds it across blocking I/O; kernel syscalls and network
//! sends happen outside, on copied-out data.

mod merge;
mod reconciler;
mod store;
mod sweeper;

pub use merge::MergeOutcome;
pub use store::RouteStore;
pub use sweeper::SweepStats;

use crate::filter::{FilterResult, RouteFilter};
use crate::types::{RouteEntry, RoutePrefix, RouteTimers};
use parking_lot::Mutex;
use tracing::debug;

struct RibInner {
    store: RouteStore,
    /// Kernel-facing install counter: incremented on INSTALL_NEW only,
    /// decremented when the sweeper flushes an entry.
    size: usize,
    filter: RouteFilter,
}

/// The RIB engine.
pub struct Rib {
    timers: RouteTimers,
    inner: Mutex<RibInner>,
}

impl Rib {
    pub fn new(store: RouteStore, timers: RouteTimers, filter: RouteFilter) -> Self {
        Self {
            timers,
            inner: Mutex::new(RibInner {
                store,
                size: 0,
                filter,
            }),
        }
    }

    /// Engine with an in-memory store, default timers and no filter.
    pub fn in_memory() -> Self {
        Self::new(
            RouteStore::in_memory(),
            RouteTimers::default(),
            RouteFilter::disabled(),
        )
    }

    pub fn timers(&self) -> RouteTimers {
        self.timers
    }

    /// Reconciles one candidate route against the table.
    pub fn merge(&self, candidate: RouteEntry) -> MergeOutcome {
        let mut inner = self.inner.lock();
        let RibInner { store, size, .. } = &mut *inner;
        merge::apply_candidate(store, size, candidate)
    }

    /// Runs one aging pass at `now`.
    pub fn sweep(&self, now: i64) -> SweepStats {
        let mut inner = self.inner.lock();
        let RibInner { store, size, .. } = &mut *inner;
        sweeper::sweep_expired(store, size, now, &self.timers)
    }

    /// Merges a kernel local-route dump taken at `poll_time` and
    /// withdraws local entries the dump no longer contains. Returns
    /// the number withdrawn.
    pub fn reconcile_local(&self, poll_time: i64, batch: &[RoutePrefix]) -> usize {
        let mut inner = self.inner.lock();
        let RibInner { store, size, .. } = &mut *inner;
        reconciler::reconcile_local(store, size, poll_time, batch)
    }

    /// Copies out up to `max_batch` entries, ordered by prefix, for the
    /// snapshot responder. Read-only: timestamps are not touched.
    pub fn serialize(&self, max_batch: usize) -> Vec<RouteEntry> {
        self.serialize_page(0, max_batch)
    }

    /// One page of the prefix-ordered copy-out, starting `offset`
    /// entries in. An empty page means the table is drained. Callers
    /// paging through a table that changes between pages may see an
    /// entry twice or not at all; the next snapshot catches up.
    pub fn serialize_page(&self, offset: usize, max_batch: usize) -> Vec<RouteEntry> {
        let inner = self.inner.lock();
        let mut entries: Vec<RouteEntry> = inner.store.iter().cloned().collect();
        entries.sort_by_key(|e| e.prefix);
        entries.into_iter().skip(offset).take(max_batch).collect()
    }

    /// Runs a prefix through the configured allow/deny filter.
    pub fn filter_allows(&self, prefix: &RoutePrefix) -> bool {
        let inner = self.inner.lock();
        inner.filter.check(prefix) == FilterResult::Allow
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.inner.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of the install counter.
    pub fn installed_count(&self) -> usize {
        self.inner.lock().size
    }

    /// Logs the whole table at debug level.
    pub fn dump(&self) {
        let inner = self.inner.lock();
        debug!(
            entries = inner.store.len(),
            installed = inner.size,
            "start rib dump"
        );
        for entry in inner.store.iter() {
            debug!(route = %entry, "rib dump");
        }
        debug!("end rib dump");
    }
}
