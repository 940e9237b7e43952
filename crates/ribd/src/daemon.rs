//! Main daemon loop.
//!
//! One tick per second: drain a bounded batch of route candidates from
//! the protocol decoder, merge each into the RIB and mirror the
//! outcome to the kernel, then run local-route reconciliation (when
//! the update timer has elapsed) followed by the aging sweep.
//! Reconciliation always runs before the sweep so a live local route
//! freshened in this tick cannot expire in the same tick.

use crate::driver::KernelDriver;
use crate::kernel::KernelRouteSync;
use crate::rib::Rib;
use crate::types::RouteEntry;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Candidates consumed per tick; the rest stay queued for the next one.
pub const MAX_CANDIDATES_PER_TICK: usize = 15;

/// Queued candidates beyond this are backpressured onto the decoder.
pub const CANDIDATE_QUEUE_DEPTH: usize = 64;

const TICK: Duration = Duration::from_secs(1);

/// Full-table debug dump cadence, in ticks.
const DUMP_EVERY_TICKS: u64 = 5;

pub struct RibDaemon {
    rib: Arc<Rib>,
    driver: KernelDriver,
    kernel: Arc<dyn KernelRouteSync>,
    candidates: mpsc::Receiver<RouteEntry>,
    shutdown: Arc<AtomicBool>,
    last_poll: i64,
    ticks: u64,
}

impl RibDaemon {
    /// Builds the daemon and hands back the candidate queue the
    /// protocol decoder feeds.
    pub fn new(
        rib: Arc<Rib>,
        kernel: Arc<dyn KernelRouteSync>,
        shutdown: Arc<AtomicBool>,
    ) -> (Self, mpsc::Sender<RouteEntry>) {
        let (tx, rx) = mpsc::channel(CANDIDATE_QUEUE_DEPTH);
        let daemon = Self {
            rib,
            driver: KernelDriver::new(Arc::clone(&kernel)),
            kernel,
            candidates: rx,
            shutdown,
            last_poll: 0,
            ticks: 0,
        };
        (daemon, tx)
    }

    /// Runs ticks until the shutdown flag is raised.
    pub async fn run(&mut self) {
        info!("rib engine started");
        while !self.shutdown.load(Ordering::Relaxed) {
            self.tick().await;
        }
        info!(routes = self.rib.len(), "rib engine stopped");
    }

    /// One engine pass: bounded candidate drain, then reconcile, then sweep.
    pub async fn tick(&mut self) {
        let deadline = Instant::now() + TICK;
        self.drain_candidates(deadline).await;

        let now = Utc::now().timestamp();
        if now - self.last_poll >= i64::from(self.rib.timers().update) {
            self.reconcile(now).await;
            self.last_poll = now;
        }

        let stats = self.rib.sweep(now);
        if stats.expired > 0 || stats.flushed > 0 {
            info!(
                expired = stats.expired,
                flushed = stats.flushed,
                "aging sweep"
            );
        }

        self.ticks += 1;
        if self.ticks % DUMP_EVERY_TICKS == 0 {
            self.rib.dump();
        }
    }

    async fn drain_candidates(&mut self, deadline: Instant) {
        let mut taken = 0;
        while taken < MAX_CANDIDATES_PER_TICK {
            match timeout_at(deadline, self.candidates.recv()).await {
                Ok(Some(candidate)) => {
                    taken += 1;
                    self.admit(candidate).await;
                }
                Ok(None) => {
                    // Decoder went away; idle out the rest of the tick.
                    tokio::time::sleep_until(deadline).await;
                    return;
                }
                Err(_) => return,
            }
        }
        tokio::time::sleep_until(deadline).await;
    }

    /// Filters and merges one candidate, mirroring the outcome to the
    /// kernel. Kernel failures are logged, never fatal: the table stays
    /// authoritative and the next merge retries the programming.
    async fn admit(&self, candidate: RouteEntry) {
        if !self.rib.filter_allows(&candidate.prefix) {
            debug!(route = %candidate, "candidate dropped by filter");
            return;
        }
        let outcome = self.rib.merge(candidate);
        if let Err(e) = self.driver.apply(&outcome).await {
            warn!(error = %e, "kernel route programming failed");
        }
    }

    /// Pulls the kernel's interface routes and reconciles the local
    /// entries in the table against them.
    async fn reconcile(&self, poll_time: i64) {
        match self.kernel.dump_local_routes().await {
            Ok(batch) => {
                let withdrawn = self.rib.reconcile_local(poll_time, &batch);
                debug!(
                    local = batch.len(),
                    withdrawn, "local routes reconciled"
                );
            }
            Err(e) => warn!(error = %e, "local route dump failed"),
        }
    }
}
