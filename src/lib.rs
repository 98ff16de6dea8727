// CLASSIFICATION: COMMUNITY
// Filename: lib.rs v0.1
// Date Modified: 2026-10-16
// Author: Lukas Bower

//! SHRM: the shared-memory protocol between the application processor and
//! the cellular modem.
//!
//! The engine negotiates a boot handshake, keeps the modem awake exactly as
//! long as traffic is in flight, moves datagrams over two doorbell-driven
//! ring pairs (common and audio) and resets the modem when it stops
//! answering. Start it with [`Shrm::init`], feed it interrupts through
//! [`Interrupts::raise`] and send with [`Shrm::write_msg`].

/// Construction-time configuration.
pub mod config;

/// Delivery of received datagrams to clients.
pub mod dispatch;

pub mod error;

/// Shared-memory rings and frame codec.
pub mod fifo;

/// L2 message classes and channel routing.
pub mod l2;

/// Hardware boundary: doorbells, interrupts, modem power and reset.
pub mod port;

/// Simulated modem for host builds and tests.
pub mod sim;

pub mod state;

/// Status broadcast for user space.
pub mod status;

pub mod timer;

/// Worker threads behind the interrupt bottom halves.
pub mod workqueue;

mod boot;
mod channel;
mod monitor;
mod protocol;
mod wake;

pub use channel::Direction;
pub use config::{ResetWritePolicy, ShrmConfig};
pub use dispatch::MessageSink;
pub use error::{ConfigError, Result, ShrmError};
pub use fifo::BootInfo;
pub use l2::{Channel, L2Header, L2Message, MessageClass};
pub use monitor::{ChannelPointers, DiagnosticSnapshot, ResetReason, ShrmStats};
pub use port::{GopBits, Irq, ModemPort};
pub use protocol::{Interrupts, Shrm, ShrmDevice};
pub use state::{BootState, ChannelState};
pub use status::{ModemStatus, StatusRequest};
pub use timer::{Clock, ManualClock, MonotonicClock, TimerKind};

/// Install `env_logger` as the `log` backend. Safe to call more than once.
#[cfg(all(feature = "std-logger", not(target_os = "none")))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .try_init();
}
