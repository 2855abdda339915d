use crate::types::NodeId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchdogError>;

/// Errors surfaced by the watchdog. Startup errors (`ConfigInvalid`,
/// `BindFailed`) are fatal; everything else is published on the runtime
/// error channel and never causes a state transition.
#[derive(Error, Debug)]
pub enum WatchdogError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("failed to bind UDP listener on {addr}: {source}")]
    BindFailed {
        addr: String,
        source: std::io::Error,
    },

    #[error("malformed datagram of {len} bytes: {data:02x?}")]
    MalformedDatagram { len: usize, data: Vec<u8> },

    #[error("failed to send datagram to {addr}: {reason}")]
    SendFailed { addr: String, reason: String },

    #[error("unknown peer {0}")]
    UnknownPeer(NodeId),

    #[error("suppressed traffic for blacklisted peer {0}")]
    Blacklisted(NodeId),

    #[error("failed to launch gated process `{command}`: {source}")]
    ProcessLaunchFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("failed to reap gated process: {0}")]
    ProcessReapFailed(std::io::Error),
}

impl WatchdogError {
    /// Blacklist suppressions are expected while a partition is being
    /// simulated, so the logger demotes them below the real failures.
    pub fn is_informational(&self) -> bool {
        matches!(self, WatchdogError::Blacklisted(_))
    }
}
