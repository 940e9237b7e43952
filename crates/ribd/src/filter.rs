//! Prefix allow/deny filter.
//!
//! An exact-match ACL over (address, mask) pairs, run in either
//! whitelist or blacklist mode. No longest-prefix logic: a rule only
//! matches a route whose address and mask both equal the rule's.
//! Consulted before admitting a remote candidate into the engine and
//! before emitting entries over the snapshot protocol.

use crate::error::{Result, RibdError};
use crate::types::RoutePrefix;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Filter operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// No filtering; everything is allowed.
    Disabled,
    /// Only listed prefixes are allowed.
    Whitelist,
    /// Listed prefixes are denied, everything else allowed.
    Blacklist,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::Disabled => write!(f, "disabled"),
            FilterMode::Whitelist => write!(f, "whitelist"),
            FilterMode::Blacklist => write!(f, "blacklist"),
        }
    }
}

/// Verdict for a single route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    Allow,
    Deny,
}

/// Exact-match prefix filter list.
#[derive(Debug, Clone)]
pub struct RouteFilter {
    mode: FilterMode,
    rules: Vec<RoutePrefix>,
}

impl RouteFilter {
    pub fn new(mode: FilterMode) -> Self {
        Self {
            mode,
            rules: Vec::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(FilterMode::Disabled)
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Appends one rule to the list.
    pub fn append(&mut self, prefix: RoutePrefix) {
        self.rules.push(prefix);
    }

    /// Runs a route through the filter.
    pub fn check(&self, prefix: &RoutePrefix) -> FilterResult {
        let matched = self.rules.iter().any(|rule| rule == prefix);
        match self.mode {
            FilterMode::Disabled => FilterResult::Allow,
            FilterMode::Whitelist => {
                if matched {
                    FilterResult::Allow
                } else {
                    FilterResult::Deny
                }
            }
            FilterMode::Blacklist => {
                if matched {
                    FilterResult::Deny
                } else {
                    FilterResult::Allow
                }
            }
        }
    }

    /// Loads a rules file: one `<address> <mask>` pair per line, blank
    /// lines skipped.
    pub fn load_from_file(mode: FilterMode, path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut filter = Self::new(mode);

        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(addr), Some(mask)) = (fields.next(), fields.next()) else {
                return Err(RibdError::Filter(format!(
                    "{}:{}: expected '<address> <mask>'",
                    path.display(),
                    lineno + 1
                )));
            };
            if fields.next().is_some() {
                return Err(RibdError::Filter(format!(
                    "{}:{}: trailing fields after mask",
                    path.display(),
                    lineno + 1
                )));
            }
            let prefix = RoutePrefix::new(addr.parse()?, mask.parse()?);
            filter.append(prefix);
        }

        debug!(
            mode = %filter.mode,
            rules = filter.len(),
            file = %path.display(),
            "loaded filter rules"
        );
        Ok(filter)
    }

    /// Logs the rule list at debug level.
    pub fn dump(&self) {
        debug!(mode = %self.mode, "dumping filter list");
        for rule in &self.rules {
            debug!(rule = %rule, "filter rule");
        }
    }
}
