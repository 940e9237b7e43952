//! Distance-vector RIB engine.
//!
//! ribd keeps an authoritative routing information base for a
//! distance-vector protocol: candidates learned from neighbors are
//! merged under the protocol's tie-break rules, aged out on the
//! invalid and flush timers, and reconciled against the kernel's own
//! interface routes. Every accepted change is mirrored into the host
//! routing table over rtnetlink, and a Unix datagram socket serves
//! table snapshots to the advertiser process.

pub mod config;
pub mod daemon;
pub mod driver;
pub mod error;
pub mod filter;
pub mod kernel;
pub mod rib;
pub mod ribctl;
pub mod types;

pub use config::{Cli, ConfigFile, Settings};
pub use daemon::{RibDaemon, MAX_CANDIDATES_PER_TICK};
pub use driver::KernelDriver;
pub use error::{Result, RibdError};
pub use filter::{FilterMode, FilterResult, RouteFilter};
pub use kernel::{KernelRouteSync, MemoryKernel};
pub use rib::{MergeOutcome, Rib, RouteStore, SweepStats};
pub use ribctl::{CtlMessage, SnapshotResponder};
pub use types::{RouteEntry, RouteOrigin, RoutePrefix, RouteTimers, METRIC_INFINITY};
