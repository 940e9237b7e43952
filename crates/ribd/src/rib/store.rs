//! Route entry storage.
//!
//! The store holds the current best-known entry per destination prefix.
//! Two backing variants exist: `InMemory` (the real table) and `Null`,
//! a no-op stub kept for the disabled/dry-run configuration.

use crate::types::{RouteEntry, RoutePrefix};
use std::collections::HashMap;

/// Best-route-only container keyed by destination prefix.
#[derive(Debug)]
pub enum RouteStore {
    /// Discards everything; lookups always miss.
    Null,
    InMemory(HashMap<RoutePrefix, RouteEntry>),
}

impl RouteStore {
    pub fn in_memory() -> Self {
        RouteStore::InMemory(HashMap::new())
    }

    pub fn null() -> Self {
        RouteStore::Null
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RouteStore::Null)
    }

    pub fn lookup(&self, prefix: &RoutePrefix) -> Option<&RouteEntry> {
        match self {
            RouteStore::Null => None,
            RouteStore::InMemory(map) => map.get(prefix),
        }
    }

    pub fn lookup_mut(&mut self, prefix: &RoutePrefix) -> Option<&mut RouteEntry> {
        match self {
            RouteStore::Null => None,
            RouteStore::InMemory(map) => map.get_mut(prefix),
        }
    }

    pub fn insert(&mut self, entry: RouteEntry) {
        match self {
            RouteStore::Null => {}
            RouteStore::InMemory(map) => {
                map.insert(entry.prefix, entry);
            }
        }
    }

    /// Overwrites the entry stored under `prefix`. The prefix keys the
    /// slot; the replacement carries the same prefix by construction.
    pub fn replace_in_place(&mut self, prefix: &RoutePrefix, entry: RouteEntry) {
        match self {
            RouteStore::Null => {}
            RouteStore::InMemory(map) => {
                if let Some(slot) = map.get_mut(prefix) {
                    *slot = entry;
                }
            }
        }
    }

    pub fn remove(&mut self, prefix: &RoutePrefix) -> Option<RouteEntry> {
        match self {
            RouteStore::Null => None,
            RouteStore::InMemory(map) => map.remove(prefix),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RouteStore::Null => 0,
            RouteStore::InMemory(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the stored prefixes, taken at the start of a pass.
    ///
    /// Sweep and reconcile passes iterate over this snapshot so the
    /// current entry may be removed mid-pass; entries inserted during a
    /// pass are not visited until the next one.
    pub fn prefixes(&self) -> Vec<RoutePrefix> {
        match self {
            RouteStore::Null => Vec::new(),
            RouteStore::InMemory(map) => map.keys().copied().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        match self {
            RouteStore::Null => None.into_iter().flatten(),
            RouteStore::InMemory(map) => Some(map.values()).into_iter().flatten(),
        }
    }
}
