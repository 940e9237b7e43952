//! Forwards merge outcomes to the kernel collaborator.
//!
//! Only remotely-learned routes touch the kernel: for its own
//! interface routes the kernel is already authoritative. Kernel
//! failures are surfaced but never roll back the RIB's decision; the
//! periodic reconcile/sweep passes heal any divergence.

use crate::error::Result;
use crate::kernel::KernelRouteSync;
use crate::rib::MergeOutcome;
use crate::types::RouteOrigin;
use std::sync::Arc;
use tracing::debug;

/// Thin wiring between the merge path and the kernel.
pub struct KernelDriver {
    kernel: Arc<dyn KernelRouteSync>,
}

impl KernelDriver {
    pub fn new(kernel: Arc<dyn KernelRouteSync>) -> Self {
        Self { kernel }
    }

    /// Applies one merge outcome to the kernel table.
    pub async fn apply(&self, outcome: &MergeOutcome) -> Result<()> {
        let Some(entry) = outcome.entry() else {
            return Ok(());
        };
        if entry.origin == RouteOrigin::Local {
            debug!(route = %entry, "local-origin outcome, kernel untouched");
            return Ok(());
        }

        match outcome {
            MergeOutcome::InstallNew(entry) => self.kernel.install(entry).await,
            MergeOutcome::Replace(entry) => self.kernel.replace(entry).await,
            MergeOutcome::Invalidate(entry) => self.kernel.delete(entry).await,
            MergeOutcome::NoAction => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{KernelOp, MemoryKernel};
    use crate::types::{RouteEntry, RoutePrefix};
    use pretty_assertions::assert_eq;
    use std::net::Ipv4Addr;

    fn prefix() -> RoutePrefix {
        RoutePrefix::new(
            Ipv4Addr::new(10, 0, 0, 0),
            Ipv4Addr::new(255, 255, 255, 0),
        )
    }

    fn remote_entry(metric: u32) -> RouteEntry {
        RouteEntry::remote(prefix(), Ipv4Addr::new(192, 168, 1, 1), metric, 0, 100)
    }

    #[tokio::test]
    async fn test_remote_outcomes_map_to_kernel_calls() {
        let kernel = Arc::new(MemoryKernel::new());
        let driver = KernelDriver::new(kernel.clone());

        driver
            .apply(&MergeOutcome::InstallNew(remote_entry(2)))
            .await
            .unwrap();
        driver
            .apply(&MergeOutcome::Replace(remote_entry(1)))
            .await
            .unwrap();
        driver
            .apply(&MergeOutcome::Invalidate(remote_entry(16)))
            .await
            .unwrap();

        assert_eq!(
            kernel.ops(),
            vec![
                KernelOp::Install(prefix()),
                KernelOp::Replace(prefix()),
                KernelOp::Delete(prefix()),
            ]
        );
    }

    #[tokio::test]
    async fn test_local_outcomes_never_touch_the_kernel() {
        let kernel = Arc::new(MemoryKernel::new());
        let driver = KernelDriver::new(kernel.clone());
        let local = RouteEntry::local(prefix(), 100);

        driver
            .apply(&MergeOutcome::InstallNew(local.clone()))
            .await
            .unwrap();
        driver
            .apply(&MergeOutcome::Replace(local))
            .await
            .unwrap();

        assert!(kernel.ops().is_empty());
    }

    #[tokio::test]
    async fn test_no_action_is_a_no_op() {
        let kernel = Arc::new(MemoryKernel::new());
        let driver = KernelDriver::new(kernel.clone());

        driver.apply(&MergeOutcome::NoAction).await.unwrap();

        assert!(kernel.ops().is_empty());
    }
}
