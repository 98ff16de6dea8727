// CLASSIFICATION: COMMUNITY
// Filename: wake.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Wake/sleep coordination with the modem.
//!
//! The AP keeps the modem (and the shared bus) requested for as long as the
//! wake count is non-zero. The count goes up once for every modem wake
//! request and every doorbell we ring, and down once for every completed
//! sleep handshake and every read notification from the modem.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, trace, warn};

use crate::l2::Channel;
use crate::port::{GopBits, ModemPort};
use crate::protocol::ShrmContext;
use crate::state::{BootState, ChannelEvent, ChannelState};
use crate::timer::TimerKind;

/// Work handled by the realtime `shrm-wake` worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WakeWork {
    /// The modem asked the AP to wake.
    CaWakeReq,
    /// Everything went quiet; drop the modem request.
    AcSleepReq,
}

/// Work handled by the `shrm-ca` worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CaWork {
    /// The modem is going to sleep.
    CaSleepReq,
}

/// Reference count plus per-channel doorbell flags.
#[derive(Default)]
pub struct WakeCoordinator {
    count: Mutex<u32>,
    /// Serialises modem request/release; `true` while requested.
    ac_state: Mutex<bool>,
    msg_pending: [AtomicBool; 2],
    fifo_ready: AtomicBool,
}

impl WakeCoordinator {
    fn count_guard(&self) -> MutexGuard<'_, u32> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take one reference and return the new count.
    pub fn acquire(&self) -> u32 {
        let mut count = self.count_guard();
        *count += 1;
        trace!(target: "shrm::wake", "wake count up to {}", *count);
        *count
    }

    /// Drop one reference and return the new count. Never goes below zero.
    pub fn release(&self) -> u32 {
        let mut count = self.count_guard();
        if *count == 0 {
            warn!(target: "shrm::wake", "wake count release with no reference held");
            return 0;
        }
        *count -= 1;
        trace!(target: "shrm::wake", "wake count down to {}", *count);
        *count
    }

    pub fn count(&self) -> u32 {
        *self.count_guard()
    }

    pub fn set_pending(&self, channel: Channel, pending: bool) {
        self.msg_pending[channel.index()].store(pending, Ordering::Release);
    }

    /// True while a doorbell on `channel` waits for its read notification.
    pub fn pending(&self, channel: Channel) -> bool {
        self.msg_pending[channel.index()].load(Ordering::Acquire)
    }

    /// Claim the one FIFO initialisation of a boot cycle.
    fn claim_fifo_init(&self) -> bool {
        !self.fifo_ready.swap(true, Ordering::AcqRel)
    }

    /// Ask the port to keep the modem up. May block.
    pub fn request_modem(&self, port: &dyn ModemPort) {
        let mut requested = self.ac_state.lock().unwrap_or_else(PoisonError::into_inner);
        port.request_modem();
        *requested = true;
    }

    /// Release the modem if nothing holds a reference. Returns whether it did.
    pub fn release_modem_if_idle(&self, port: &dyn ModemPort) -> bool {
        let mut requested = self.ac_state.lock().unwrap_or_else(PoisonError::into_inner);
        if self.count() != 0 || !*requested {
            return false;
        }
        port.release_modem();
        *requested = false;
        true
    }

    /// Forget every reference and flag. Only the reset sequence calls this.
    pub fn reset(&self) {
        *self.count_guard() = 0;
        for flag in &self.msg_pending {
            flag.store(false, Ordering::Release);
        }
        self.fifo_ready.store(false, Ordering::Release);
    }
}

impl ShrmContext {
    /// Top half of the modem wake interrupt.
    pub(crate) fn ca_wake_irq(&self) {
        self.wake.acquire();
        self.port.block_suspend(true);
        if let Err(err) = self.queues.wake.queue(WakeWork::CaWakeReq) {
            error!(target: "shrm::irq", "dropping modem wake request: {err}");
            self.wake.release();
            self.port.block_suspend(false);
        }
    }

    /// Top half of the modem sleep interrupt.
    pub(crate) fn ca_sleep_irq(&self) {
        if let Err(err) = self.queues.ca.queue(CaWork::CaSleepReq) {
            error!(target: "shrm::irq", "dropping modem sleep request: {err}");
        }
    }

    pub(crate) fn run_wake_work(&self, work: WakeWork) {
        match work {
            WakeWork::CaWakeReq => self.ca_wake_req(),
            WakeWork::AcSleepReq => self.ac_sleep_req(),
        }
    }

    pub(crate) fn run_ca_work(&self, work: CaWork) {
        match work {
            CaWork::CaSleepReq => self.ca_sleep_req(),
        }
    }

    fn ca_wake_req(&self) {
        if self.boot_state() == BootState::Init && self.wake.claim_fifo_init() {
            self.fifo_init();
        }
        self.wake.request_modem(self.port.as_ref());
        if self.modem_in_reset() {
            debug!(target: "shrm::wake", "modem in reset, wake ack withheld");
            return;
        }
        if !self.port.host_access_port_live() {
            self.host_port_down("wake acknowledgement");
            return;
        }
        self.port.gop_set(GopBits::CA_WAKE_ACK);
        debug!(target: "shrm::wake", "wake acknowledged, count {}", self.wake.count());
    }

    fn ca_sleep_req(&self) {
        for channel in Channel::ALL {
            self.link(channel).set_rx(ChannelEvent::Drained);
        }
        if !self.port.host_access_port_live() {
            self.host_port_down("sleep acknowledgement");
            return;
        }
        self.port.gop_clear(GopBits::CA_WAKE_ACK);
        self.port.block_suspend(false);
        self.timers.arm(TimerKind::IdleCheck, self.config.sleep_coalesce_delay());
        let count = self.wake.release();
        debug!(target: "shrm::wake", "modem sleep acknowledged, count {count}");
    }

    fn ac_sleep_req(&self) {
        if self.wake.release_modem_if_idle(self.port.as_ref()) {
            info!(target: "shrm::wake", "link idle, modem released");
        } else {
            debug!(target: "shrm::wake", "sleep request skipped, count {}", self.wake.count());
        }
    }

    /// Publish queued data on `channel` and ring its doorbell.
    pub(crate) fn send_doorbell(&self, channel: Channel) {
        if self.modem_in_reset() {
            debug!(target: "shrm::wake", "modem in reset, {channel} doorbell skipped");
            return;
        }
        {
            let mut link = self.link(channel);
            // An earlier doorbell already published everything queued.
            if !link.writer.has_unpublished() && link.tx != ChannelState::PtrFree {
                debug!(target: "shrm::wake", "{channel} doorbell already rung, skipped");
                return;
            }
            link.writer.publish();
            if link.tx == ChannelState::PtrFree {
                link.set_tx(ChannelEvent::Signalled);
            }
        }
        self.wake.acquire();
        self.wake.request_modem(self.port.as_ref());
        let _guard = self.monitor.lock();
        if !self.port.host_access_port_live() {
            self.host_port_down(&format!("{channel} doorbell"));
            return;
        }
        self.port.gop_set(GopBits::ac_msg_pending(channel));
        self.wake.set_pending(channel, true);
        self.timers.arm(TimerKind::ModStuck(channel), self.config.mod_stuck_timeout());
        self.stats.doorbell(channel);
        trace!(target: "shrm::wake", "{channel} doorbell rung");
    }

    /// Quiescence timer: put the link to sleep once all four directions are idle.
    pub(crate) fn idle_check(&self) {
        let _guard = self.monitor.lock();
        let mut common = self.link(Channel::Common);
        let mut audio = self.link(Channel::Audio);
        let quiet = [common.tx, common.rx, audio.tx, audio.rx]
            .iter()
            .all(|state| state.is_quiescent());
        if !quiet {
            trace!(target: "shrm::wake", "idle check: link still busy");
            return;
        }
        for link in [&mut *common, &mut *audio] {
            link.set_tx(ChannelEvent::Quiesce);
            link.set_rx(ChannelEvent::Quiesce);
        }
        drop(audio);
        drop(common);
        if let Err(err) = self.queues.wake.queue(WakeWork::AcSleepReq) {
            warn!(target: "shrm::wake", "idle check could not queue sleep request: {err}");
        }
    }
}
