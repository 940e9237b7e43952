//! Daemon configuration.
//!
//! Settings come from three layers: built-in defaults, an optional
//! JSON config file, and command-line flags. Later layers win.

use crate::error::{Result, RibdError};
use crate::filter::FilterMode;
use crate::types::{
    RouteTimers, DEFAULT_FLUSH_SECS, DEFAULT_HOLDDOWN_SECS, DEFAULT_INVALID_SECS,
    DEFAULT_UPDATE_SECS,
};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const DEFAULT_CTL_SOCKET: &str = "/run/ribd.sock";

/// RIB routing daemon
#[derive(Parser, Debug)]
#[command(name = "ribd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Interface to run the routing protocol on
    #[arg(short = 'i', long)]
    pub interface: String,

    /// Listen and reconcile only, never advertise the table
    #[arg(short = 'p', long)]
    pub passive: bool,

    /// Route filter mode
    #[arg(short = 'm', long, value_enum, default_value = "disabled")]
    pub filter_mode: FilterModeArg,

    /// Route filter file ("<addr> <mask>" per line)
    #[arg(short = 'f', long)]
    pub filter_file: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Unix socket path for snapshot requests
    #[arg(long)]
    pub ctl_socket: Option<PathBuf>,

    /// Keep no routes at all (protocol plumbing only)
    #[arg(long)]
    pub null_store: bool,

    /// Seconds between local route reconciliation passes
    #[arg(long)]
    pub update_timer: Option<u16>,

    /// Seconds of silence before a route is marked unreachable
    #[arg(long)]
    pub invalid_timer: Option<u16>,

    /// Seconds an unreachable route is suppressed from re-learning
    #[arg(long)]
    pub holddown_timer: Option<u16>,

    /// Seconds of silence before an unreachable route is deleted
    #[arg(long)]
    pub flush_timer: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterModeArg {
    Disabled,
    Whitelist,
    Blacklist,
}

impl From<FilterModeArg> for FilterMode {
    fn from(arg: FilterModeArg) -> Self {
        match arg {
            FilterModeArg::Disabled => FilterMode::Disabled,
            FilterModeArg::Whitelist => FilterMode::Whitelist,
            FilterModeArg::Blacklist => FilterMode::Blacklist,
        }
    }
}

/// On-disk configuration, all fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub timers: TimerConfig,
    pub ctl_socket: Option<PathBuf>,
    pub filter_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimerConfig {
    pub update: Option<u16>,
    pub invalid: Option<u16>,
    pub holddown: Option<u16>,
    pub flush: Option<u16>,
}

impl ConfigFile {
    /// Loads the file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                RibdError::Config(format!(
                    "failed to parse config file {}: {e}",
                    path.display()
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(RibdError::Io(e)),
        }
    }
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub interface: String,
    pub passive: bool,
    pub null_store: bool,
    pub timers: RouteTimers,
    pub filter_mode: FilterMode,
    pub filter_file: Option<PathBuf>,
    pub ctl_socket: PathBuf,
}

impl Settings {
    /// Merges command-line flags over the config file over defaults.
    pub fn resolve(cli: &Cli, file: &ConfigFile) -> Result<Self> {
        let timers = RouteTimers::new(
            cli.update_timer
                .or(file.timers.update)
                .unwrap_or(DEFAULT_UPDATE_SECS),
            cli.invalid_timer
                .or(file.timers.invalid)
                .unwrap_or(DEFAULT_INVALID_SECS),
            cli.holddown_timer
                .or(file.timers.holddown)
                .unwrap_or(DEFAULT_HOLDDOWN_SECS),
            cli.flush_timer
                .or(file.timers.flush)
                .unwrap_or(DEFAULT_FLUSH_SECS),
        )?;

        if cli.interface.is_empty() {
            return Err(RibdError::Config("interface name cannot be empty".into()));
        }

        let filter_mode = FilterMode::from(cli.filter_mode);
        let filter_file = cli.filter_file.clone().or_else(|| file.filter_file.clone());
        if filter_mode != FilterMode::Disabled && filter_file.is_none() {
            return Err(RibdError::Config(format!(
                "filter mode {filter_mode} requires a filter file"
            )));
        }

        Ok(Self {
            interface: cli.interface.clone(),
            passive: cli.passive,
            null_store: cli.null_store,
            timers,
            filter_mode,
            filter_file,
            ctl_socket: cli
                .ctl_socket
                .clone()
                .or_else(|| file.ctl_socket.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CTL_SOCKET)),
        })
    }
}
