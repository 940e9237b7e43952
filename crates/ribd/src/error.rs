//! Error types for ribd.

use thiserror::Error;

/// Errors that can occur in the daemon.
///
/// The RIB decision functions themselves are total over well-formed
/// input and never produce these; errors come from the edges: I/O,
/// netlink, configuration and the control protocol.
#[derive(Debug, Error)]
pub enum RibdError {
    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Netlink socket error
    #[error("netlink error: {0}")]
    Netlink(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Filter rules file could not be parsed
    #[error("filter rule error: {0}")]
    Filter(String),

    /// Malformed rib control protocol frame
    #[error("rib control protocol error: {0}")]
    Ctl(String),

    /// Invalid address literal
    #[error("invalid address: {0}")]
    Addr(#[from] std::net::AddrParseError),
}

/// Result type alias for ribd operations
pub type Result<T> = std::result::Result<T, RibdError>;
