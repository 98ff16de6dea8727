// CLASSIFICATION: COMMUNITY
// Filename: boot.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Boot handshake with the modem.
//!
//! The modem opens every boot cycle with a boot-info request on the common
//! channel. We echo its config and version back in a boot-info response;
//! once the modem acknowledges that response the link is online.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{error, info, warn};

use crate::channel::ChannelLink;
use crate::error::Result;
use crate::l2::Channel;
use crate::protocol::ShrmContext;
use crate::state::{BootEvent, BootState, ChannelEvent};
use crate::status::ModemStatus;

const HISTORY_LEN: usize = 64;

/// Boot state plus a short record of the states it passed through.
pub struct BootCell {
    inner: Mutex<BootTrace>,
}

struct BootTrace {
    state: BootState,
    history: VecDeque<BootState>,
}

impl Default for BootCell {
    fn default() -> Self {
        Self {
            inner: Mutex::new(BootTrace {
                state: BootState::Init,
                history: VecDeque::from([BootState::Init]),
            }),
        }
    }
}

impl BootCell {
    fn guard(&self) -> MutexGuard<'_, BootTrace> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> BootState {
        self.guard().state
    }

    /// Apply `event` atomically and return the new state.
    pub fn transition(&self, event: BootEvent) -> Result<BootState> {
        let mut trace = self.guard();
        let from = trace.state;
        let to = from.apply(event)?;
        trace.state = to;
        if to != from {
            if trace.history.len() == HISTORY_LEN {
                trace.history.pop_front();
            }
            trace.history.push_back(to);
            info!(target: "shrm::boot", "boot state {from:?} -> {to:?}");
        }
        Ok(to)
    }

    /// States entered so far, oldest first, bounded to the last few cycles.
    pub fn history(&self) -> Vec<BootState> {
        self.guard().history.iter().copied().collect()
    }
}

impl ShrmContext {
    pub(crate) fn boot_state(&self) -> BootState {
        self.boot.get()
    }

    /// True while a reset is running or the modem holds its reset line.
    pub(crate) fn modem_in_reset(&self) -> bool {
        self.boot.get() == BootState::Unknown || self.port.modem_reset_asserted()
    }

    /// Reset every ring and every local pointer copy.
    pub(crate) fn fifo_init(&self) {
        let mut common = self.link(Channel::Common);
        let mut audio = self.link(Channel::Audio);
        self.region.reset();
        for link in [&mut *common, &mut *audio] {
            link.writer.reset();
            link.reader.reset();
        }
        info!(target: "shrm::boot", "shared fifos initialised");
    }

    /// Message-pending on the common channel before the link is online.
    ///
    /// Returns `true` when a boot-info response was queued and the doorbell
    /// must be rung.
    pub(crate) fn boot_msg_pending(&self, link: &mut ChannelLink, boot: BootState) -> bool {
        link.reader.refresh();
        match boot {
            BootState::Init => {
                let info = match link.reader.read_boot_info_req() {
                    Ok(info) => info,
                    Err(err) => {
                        error!(target: "shrm::boot", "bad boot info request: {err}");
                        link.reader.discard();
                        link.reader.publish();
                        return false;
                    }
                };
                info!(
                    target: "shrm::boot",
                    "modem boot info: config {:#04x} version {}",
                    info.config,
                    info.version
                );
                self.send_read_notification(link);
                if let Err(err) = link.writer.write_boot_info_resp(info) {
                    error!(target: "shrm::boot", "cannot write boot info response: {err}");
                    return false;
                }
                link.set_tx(ChannelEvent::DataQueued);
                if let Err(err) = self.boot.transition(BootEvent::InfoRequestAnswered) {
                    warn!(target: "shrm::boot", "{err}");
                    return false;
                }
                true
            }
            BootState::InfoSync => {
                // The modem repeats its request until it sees our response.
                link.reader.discard();
                self.send_read_notification(link);
                false
            }
            other => {
                warn!(target: "shrm::boot", "boot message in state {other:?} ignored");
                false
            }
        }
    }

    /// Read notification on the common channel while in `InfoSync`.
    ///
    /// Returns `true` when the link just came online.
    pub(crate) fn boot_read_ack(&self, link: &mut ChannelLink) -> bool {
        match self.boot.transition(BootEvent::InfoResponseAcked) {
            Ok(_) => {
                link.set_tx(ChannelEvent::Drained);
                true
            }
            Err(err) => {
                warn!(target: "shrm::boot", "{err}");
                false
            }
        }
    }

    /// Tell clients and subscribers the link is up. Runs with no lock held.
    pub(crate) fn announce_online(&self) {
        self.monitor.clear_silent_reset();
        self.dispatcher.sink().modem_online();
        self.status.publish(ModemStatus::Online);
        info!(target: "shrm::boot", "modem online");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_records_each_new_state() {
        let cell = BootCell::default();
        cell.transition(BootEvent::InfoRequestAnswered).unwrap();
        cell.transition(BootEvent::InfoResponseAcked).unwrap();
        cell.transition(BootEvent::ResetBegin).unwrap();
        cell.transition(BootEvent::ResetComplete).unwrap();
        assert_eq!(
            cell.history(),
            vec![
                BootState::Init,
                BootState::InfoSync,
                BootState::Done,
                BootState::Unknown,
                BootState::Init
            ]
        );
    }

    #[test]
    fn illegal_event_leaves_state_alone() {
        let cell = BootCell::default();
        assert!(cell.transition(BootEvent::InfoResponseAcked).is_err());
        assert_eq!(cell.get(), BootState::Init);
        assert_eq!(cell.history().len(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let cell = BootCell::default();
        for _ in 0..100 {
            cell.transition(BootEvent::ResetBegin).unwrap();
            cell.transition(BootEvent::ResetComplete).unwrap();
        }
        assert_eq!(cell.history().len(), HISTORY_LEN);
    }
}
