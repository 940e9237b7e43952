//! ribd entry point.
//!
//! Wires the RIB engine together: resolves configuration, loads the
//! route filter, opens the kernel collaborator and the control socket,
//! then runs the engine loop until SIGINT.

use anyhow::Context;
use clap::Parser;
use ribd::kernel::KernelRouteSync;
use ribd::{
    Cli, ConfigFile, FilterMode, Rib, RibDaemon, RouteFilter, RouteStore, Settings,
    SnapshotResponder,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let file = match &cli.config {
        Some(path) => ConfigFile::load_or_default(path)?,
        None => ConfigFile::default(),
    };
    let settings = Settings::resolve(&cli, &file)?;

    info!("starting ribd");
    info!(interface = %settings.interface, passive = settings.passive, "protocol settings");
    info!(
        update = settings.timers.update,
        invalid = settings.timers.invalid,
        holddown = settings.timers.holddown,
        flush = settings.timers.flush,
        "route timers (seconds)"
    );

    let filter = match (&settings.filter_mode, &settings.filter_file) {
        (FilterMode::Disabled, _) => RouteFilter::disabled(),
        (mode, Some(path)) => {
            let filter = RouteFilter::load_from_file(*mode, path)
                .with_context(|| format!("loading filter file {}", path.display()))?;
            info!(mode = %mode, rules = filter.len(), "route filter loaded");
            filter.dump();
            filter
        }
        // Settings::resolve rejects this combination.
        (mode, None) => anyhow::bail!("filter mode {mode} requires a filter file"),
    };

    let store = if settings.null_store {
        warn!("null store selected, no routes will be retained");
        RouteStore::null()
    } else {
        RouteStore::in_memory()
    };
    let rib = Arc::new(Rib::new(store, settings.timers, filter));

    let kernel = open_kernel(&settings.interface)?;
    let shutdown = setup_signal_handler();

    let (mut daemon, candidates) = RibDaemon::new(Arc::clone(&rib), kernel, shutdown);

    let responder =
        SnapshotResponder::bind(rib, &settings.ctl_socket, settings.passive, candidates)?;
    tokio::spawn(async move {
        if let Err(e) = responder.run().await {
            error!(error = %e, "control socket failed");
        }
    });

    daemon.run().await;

    info!("ribd exiting");
    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .init();
}

#[cfg(target_os = "linux")]
fn open_kernel(interface: &str) -> anyhow::Result<Arc<dyn KernelRouteSync>> {
    let netlink = ribd::kernel::NetlinkRouteSync::new(interface)
        .with_context(|| format!("opening rtnetlink socket on {interface}"))?;
    Ok(Arc::new(netlink))
}

#[cfg(not(target_os = "linux"))]
fn open_kernel(_interface: &str) -> anyhow::Result<Arc<dyn KernelRouteSync>> {
    warn!("no rtnetlink on this platform, using in-memory kernel table");
    Ok(Arc::new(ribd::MemoryKernel::new()))
}

fn setup_signal_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received SIGINT, shutting down");
                flag.store(true, Ordering::Relaxed);
            }
            Err(e) => error!(error = %e, "failed to listen for ctrl-c"),
        }
    });
    shutdown
}
