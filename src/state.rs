// CLASSIFICATION: COMMUNITY
// Filename: state.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Boot and channel state machines.
//!
//! Each family keeps its legal transitions in a single `on` function so the
//! rest of the engine never pokes a state field directly.

use crate::error::{Result, ShrmError};
use crate::l2::Channel;

/// Protocol boot state, one per device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BootState {
    Init,
    InfoSync,
    Done,
    /// Entered when a reset starts; left only through [`BootEvent::ResetComplete`].
    Unknown,
}

/// Inputs that move [`BootState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootEvent {
    /// The modem's boot-info request was answered.
    InfoRequestAnswered,
    /// The modem consumed our boot-info response.
    InfoResponseAcked,
    ResetBegin,
    ResetComplete,
}

impl BootEvent {
    fn label(self) -> &'static str {
        match self {
            BootEvent::InfoRequestAnswered => "info-request-answered",
            BootEvent::InfoResponseAcked => "info-response-acked",
            BootEvent::ResetBegin => "reset-begin",
            BootEvent::ResetComplete => "reset-complete",
        }
    }
}

impl BootState {
    /// Next state for `event`, or `None` when the transition is illegal.
    pub fn on(self, event: BootEvent) -> Option<BootState> {
        use BootEvent::*;
        use BootState::*;
        match (self, event) {
            (Init, InfoRequestAnswered) => Some(InfoSync),
            (InfoSync, InfoResponseAcked) => Some(Done),
            (_, ResetBegin) => Some(Unknown),
            (Unknown, ResetComplete) => Some(Init),
            _ => None,
        }
    }

    /// Like [`BootState::on`] but reports illegal transitions as errors.
    pub fn apply(self, event: BootEvent) -> Result<BootState> {
        self.on(event).ok_or(ShrmError::IllegalBootTransition {
            from: self,
            event: event.label(),
        })
    }

    pub fn is_done(self) -> bool {
        self == BootState::Done
    }
}

/// Per-direction channel state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Sleep,
    Idle,
    /// Data is waiting to be signalled to the peer.
    PtrFree,
    /// A doorbell or read notification is outstanding.
    PtrBusy,
}

/// Inputs that move [`ChannelState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A producer queued data behind whatever is already moving.
    DataQueued,
    /// Data is waiting and must be signalled again (peer data on RX,
    /// leftover data after an acknowledgement on TX).
    Pending,
    /// Our doorbell or read notification reached the peer.
    Signalled,
    /// Nothing left to move in this direction.
    Drained,
    /// The quiescence timer found the whole link idle.
    Quiesce,
    Reset,
}

impl ChannelEvent {
    fn label(self) -> &'static str {
        match self {
            ChannelEvent::DataQueued => "data-queued",
            ChannelEvent::Pending => "pending",
            ChannelEvent::Signalled => "signalled",
            ChannelEvent::Drained => "drained",
            ChannelEvent::Quiesce => "quiesce",
            ChannelEvent::Reset => "reset",
        }
    }
}

impl ChannelState {
    /// Next state for `event`, or `None` when the transition is illegal.
    pub fn on(self, event: ChannelEvent) -> Option<ChannelState> {
        use ChannelEvent::*;
        use ChannelState::*;
        match (self, event) {
            (Sleep | Idle, DataQueued) => Some(PtrFree),
            // Already moving data; the outstanding signal covers the new data.
            (PtrFree | PtrBusy, DataQueued) => Some(self),
            (_, Pending) => Some(PtrFree),
            (_, Signalled) => Some(PtrBusy),
            (_, Drained) => Some(Idle),
            (Sleep | Idle, Quiesce) => Some(Sleep),
            (PtrFree | PtrBusy, Quiesce) => None,
            (_, Reset) => Some(Sleep),
        }
    }

    pub fn apply(self, channel: Channel, event: ChannelEvent) -> Result<ChannelState> {
        self.on(event).ok_or(ShrmError::IllegalChannelTransition {
            channel,
            from: self,
            event: event.label(),
        })
    }

    /// True when the direction may be put to sleep.
    pub fn is_quiescent(self) -> bool {
        matches!(self, ChannelState::Idle | ChannelState::Sleep)
    }
}
