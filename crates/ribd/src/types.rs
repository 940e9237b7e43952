//! Core route types shared across the daemon.

use crate::error::{Result, RibdError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Metric value denoting an unreachable route ("infinity" in hop counts).
pub const METRIC_INFINITY: u32 = 16;

/// Default protocol timer values, in seconds.
pub const DEFAULT_UPDATE_SECS: u16 = 5;
pub const DEFAULT_INVALID_SECS: u16 = 180;
pub const DEFAULT_HOLDDOWN_SECS: u16 = 180;
pub const DEFAULT_FLUSH_SECS: u16 = 200;

/// An IPv4 destination prefix: network address plus raw netmask.
///
/// The mask is carried as a full dotted mask rather than a CIDR length
/// because route identity is an exact (address, mask) match throughout
/// the engine and the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutePrefix {
    pub addr: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl RoutePrefix {
    pub fn new(addr: Ipv4Addr, mask: Ipv4Addr) -> Self {
        Self { addr, mask }
    }

    /// Builds a prefix from raw numeric address and mask values, as
    /// handed over by the protocol decoder.
    pub fn from_raw(addr: u32, mask: u32) -> Self {
        Self {
            addr: Ipv4Addr::from(addr),
            mask: Ipv4Addr::from(mask),
        }
    }

    /// Number of set bits in the netmask.
    pub fn prefix_len(&self) -> u8 {
        u32::from(self.mask).count_ones() as u8
    }
}

impl fmt::Display for RoutePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len())
    }
}

/// Where a route was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteOrigin {
    /// Sourced from the host's own interfaces via the kernel dump.
    Local,
    /// Learned from a neighbor over the network.
    Remote,
}

impl fmt::Display for RouteOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteOrigin::Local => write!(f, "LOC"),
            RouteOrigin::Remote => write!(f, "REM"),
        }
    }
}

/// A single best-route entry in the RIB.
///
/// At most one entry exists per distinct prefix; the store is a
/// best-route-only table, not a per-neighbor one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub prefix: RoutePrefix,
    /// Advertising neighbor; always 0.0.0.0 for Local origin.
    pub next_hop: Ipv4Addr,
    /// Hop-count cost, clamped to 0..=16.
    pub metric: u32,
    pub origin: RouteOrigin,
    /// Unix timestamp of the last refresh.
    pub last_update: i64,
    /// Opaque pass-through value, not interpreted by the engine.
    pub tag: u16,
}

impl RouteEntry {
    /// Builds a remotely-learned candidate. Metrics above infinity are
    /// clamped rather than rejected.
    pub fn remote(
        prefix: RoutePrefix,
        next_hop: Ipv4Addr,
        metric: u32,
        tag: u16,
        last_update: i64,
    ) -> Self {
        Self {
            prefix,
            next_hop,
            metric: metric.min(METRIC_INFINITY),
            origin: RouteOrigin::Remote,
            last_update,
            tag,
        }
    }

    /// Builds a locally-originated candidate as synthesized from a
    /// kernel route dump: zero next-hop, metric 0.
    pub fn local(prefix: RoutePrefix, last_update: i64) -> Self {
        Self {
            prefix,
            next_hop: Ipv4Addr::UNSPECIFIED,
            metric: 0,
            origin: RouteOrigin::Local,
            last_update,
            tag: 0,
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.metric >= METRIC_INFINITY
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} via {} metric {:02} origin {} tag {} updated {}",
            self.prefix, self.next_hop, self.metric, self.origin, self.tag, self.last_update
        )
    }
}

/// Protocol timers governing refresh, invalidation and garbage
/// collection of routes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RouteTimers {
    /// Rate at which the advertiser requests table dumps.
    pub update: u16,
    /// Interval after which a silent route is marked unreachable.
    pub invalid: u16,
    /// Holddown interval; parsed and carried but not yet enforced.
    pub holddown: u16,
    /// Interval after which an unreachable route is removed entirely.
    pub flush: u16,
}

impl RouteTimers {
    pub fn new(update: u16, invalid: u16, holddown: u16, flush: u16) -> Result<Self> {
        if update == 0 {
            return Err(RibdError::Config("update timer must be non-zero".into()));
        }
        if flush <= invalid {
            return Err(RibdError::Config(format!(
                "flush timer ({flush}s) must exceed invalid timer ({invalid}s)"
            )));
        }
        Ok(Self {
            update,
            invalid,
            holddown,
            flush,
        })
    }
}

impl Default for RouteTimers {
    fn default() -> Self {
        Self {
            update: DEFAULT_UPDATE_SECS,
            invalid: DEFAULT_INVALID_SECS,
            holddown: DEFAULT_HOLDDOWN_SECS,
            flush: DEFAULT_FLUSH_SECS,
        }
    }
}
