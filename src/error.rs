// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Error taxonomy shared by every SHRM component.

use thiserror::Error;

use crate::fifo::FifoError;
use crate::l2::Channel;
use crate::state::{BootState, ChannelState};

/// Errors surfaced by the SHRM protocol engine.
#[derive(Debug, Error)]
pub enum ShrmError {
    /// Boot state is `UNKNOWN` or the modem reset status bit is asserted.
    #[error("modem is in reset")]
    ModemInReset,
    /// The host access port read back as not live before a doorbell.
    #[error("host access port is down")]
    HostAccessPortDown,
    /// The transmit ring has no room for the datagram.
    #[error("transmit fifo full on {channel} channel")]
    FifoFull { channel: Channel },
    /// A stuck-modem timer expired before the matching acknowledgement.
    #[error("modem stopped acknowledging on {channel} channel")]
    StuckModem { channel: Channel },
    /// The L2 header does not belong to any transmit channel.
    #[error("unsupported L2 header {0:#04x}")]
    UnsupportedHeader(u8),
    /// The payload does not fit in a single frame.
    #[error("message of {len} bytes exceeds the {max} byte frame limit")]
    MessageTooLarge { len: usize, max: usize },
    /// The protocol has been torn down.
    #[error("protocol is not running")]
    NotRunning,
    /// A bounded work queue rejected a submission.
    #[error("work queue {0} is full")]
    QueueFull(&'static str),
    /// A worker thread could not be started.
    #[error("failed to spawn worker {name}: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
    /// A boot state transition was requested that the state machine forbids.
    #[error("illegal boot transition from {from:?} on {event}")]
    IllegalBootTransition { from: BootState, event: &'static str },
    /// A channel state transition was requested that the state machine forbids.
    #[error("illegal {channel} channel transition from {from:?} on {event}")]
    IllegalChannelTransition {
        channel: Channel,
        from: ChannelState,
        event: &'static str,
    },
    /// A shared ring rejected the operation.
    #[error("shared fifo: {0}")]
    Fifo(#[from] FifoError),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors produced while loading [`crate::config::ShrmConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, ShrmError>;
