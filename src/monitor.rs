// CLASSIFICATION: COMMUNITY
// Filename: monitor.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Fault and liveness monitoring.
//!
//! Stuck-modem and FIFO-full timers escalate into a reset through a
//! single-flight gate, so concurrent triggers collapse into one recovery.
//! The recovery itself is a [`FaultRecoveryStrategy`] chosen once from the
//! configuration.

use core::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};

use crate::config::ShrmConfig;
use crate::error::ShrmError;
use crate::l2::Channel;
use crate::protocol::ShrmContext;
use crate::state::{BootEvent, BootState, ChannelEvent, ChannelState};
use crate::status::ModemStatus;
use crate::timer::TimerKind;

/// Why a reset was requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetReason {
    StuckModem(Channel),
    FifoFull,
    HostAccessPortDown,
    /// The modem raised its reset request interrupt.
    ModemRequested,
    /// A client asked through [`crate::StatusRequest::UserReset`].
    User,
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetReason::StuckModem(channel) => write!(f, "modem stuck on {channel} channel"),
            ResetReason::FifoFull => f.write_str("transmit fifo stayed full"),
            ResetReason::HostAccessPortDown => f.write_str("host access port down"),
            ResetReason::ModemRequested => f.write_str("modem requested reset"),
            ResetReason::User => f.write_str("user requested reset"),
        }
    }
}

/// Work handled by the `shrm-recovery` worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RecoveryWork {
    Reset(ResetReason),
    DumpDiagnostics,
}

/// How the engine recovers from a dead modem.
pub(crate) trait FaultRecoveryStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn recover(&self, ctx: &ShrmContext, reason: ResetReason);
}

/// Restart the modem and rerun the boot handshake.
pub(crate) struct SilentReset;

impl FaultRecoveryStrategy for SilentReset {
    fn name(&self) -> &'static str {
        "silent-reset"
    }

    fn recover(&self, ctx: &ShrmContext, reason: ResetReason) {
        ctx.modem_reset_sequence(reason);
    }
}

/// Reset the whole system.
///
/// Expects [`crate::ModemPort::system_reset`] not to return. If it does, the
/// engine stays in `Unknown` with the reset still pending until it is
/// torn down and initialised again.
pub(crate) struct SystemReset;

impl FaultRecoveryStrategy for SystemReset {
    fn name(&self) -> &'static str {
        "system-reset"
    }

    fn recover(&self, ctx: &ShrmContext, reason: ResetReason) {
        ctx.timers.cancel_all();
        error!(target: "shrm::monitor", "silent reset disabled, resetting system: {reason}");
        ctx.port.system_reset();
        ctx.stats.reset();
    }
}

pub(crate) fn strategy_for(config: &ShrmConfig) -> Box<dyn FaultRecoveryStrategy> {
    if config.silent_reset {
        Box::new(SilentReset)
    } else {
        Box::new(SystemReset)
    }
}

type CrashCallback = Arc<dyn Fn() + Send + Sync>;

/// Flags and bookkeeping behind the stuck-timer lock.
#[derive(Default)]
pub struct FaultMonitor {
    lock: Mutex<()>,
    mod_stuck: AtomicBool,
    fifo_full: AtomicBool,
    reset_pending: AtomicBool,
    silent_reset: AtomicBool,
    fail_count: AtomicU32,
    last_diagnostic: Mutex<Option<DiagnosticSnapshot>>,
    crash_callback: Mutex<Option<CrashCallback>>,
}

impl FaultMonitor {
    /// Stuck-timer bookkeeping lock. Taken before any channel lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the FIFO-full flag, returning whether it was set.
    pub(crate) fn take_fifo_full(&self) -> bool {
        self.fifo_full.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn clear_silent_reset(&self) {
        self.silent_reset.store(false, Ordering::Release);
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_pending.load(Ordering::Acquire)
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count.load(Ordering::Relaxed)
    }

    pub(crate) fn set_crash_callback(&self, callback: CrashCallback) {
        *self
            .crash_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    fn crash_callback(&self) -> Option<CrashCallback> {
        self.crash_callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_diagnostic(&self) -> Option<DiagnosticSnapshot> {
        self.last_diagnostic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Ring pointers of one channel, both directions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelPointers {
    pub tx_local_write: u32,
    pub tx_shared_write: u32,
    pub tx_shared_read: u32,
    pub rx_local_read: u32,
    pub rx_local_write: u32,
    pub rx_shared_write: u32,
    pub rx_shared_read: u32,
}

/// Engine state captured when a reset is escalated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticSnapshot {
    pub boot: BootState,
    pub tx: [ChannelState; 2],
    pub rx: [ChannelState; 2],
    pub wake_count: u32,
    pub msg_pending: [bool; 2],
    pub mod_stuck: bool,
    pub fifo_full: bool,
    pub silent_reset: bool,
    pub fail_count: u32,
    pub pointers: [ChannelPointers; 2],
}

impl fmt::Display for DiagnosticSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "boot {:?} wake_count {} mod_stuck {} fifo_full {} silent_reset {} failures {}",
            self.boot, self.wake_count, self.mod_stuck, self.fifo_full, self.silent_reset, self.fail_count
        )?;
        for channel in Channel::ALL {
            let i = channel.index();
            let p = &self.pointers[i];
            writeln!(
                f,
                "{channel}: tx {:?} rx {:?} pending {} | tx w{}/{} r{} | rx r{}/{} w{}/{}",
                self.tx[i],
                self.rx[i],
                self.msg_pending[i],
                p.tx_local_write,
                p.tx_shared_write,
                p.tx_shared_read,
                p.rx_local_read,
                p.rx_shared_read,
                p.rx_local_write,
                p.rx_shared_write
            )?;
        }
        Ok(())
    }
}

/// Counter snapshot returned by [`crate::Shrm::stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShrmStats {
    pub doorbells: [u64; 2],
    pub read_notifications: [u64; 2],
    pub rx_messages: [u64; 2],
    pub tx_messages: [u64; 2],
    pub resets: u64,
    pub collapsed_resets: u64,
    pub dropped_work: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    doorbells: [AtomicU64; 2],
    read_notifications: [AtomicU64; 2],
    rx_messages: [AtomicU64; 2],
    tx_messages: [AtomicU64; 2],
    resets: AtomicU64,
    collapsed_resets: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn pair(counters: &[AtomicU64; 2]) -> [u64; 2] {
    [
        counters[0].load(Ordering::Relaxed),
        counters[1].load(Ordering::Relaxed),
    ]
}

impl Counters {
    pub(crate) fn doorbell(&self, channel: Channel) {
        bump(&self.doorbells[channel.index()]);
    }

    pub(crate) fn read_notification(&self, channel: Channel) {
        bump(&self.read_notifications[channel.index()]);
    }

    pub(crate) fn rx_message(&self, channel: Channel) {
        bump(&self.rx_messages[channel.index()]);
    }

    pub(crate) fn tx_message(&self, channel: Channel) {
        bump(&self.tx_messages[channel.index()]);
    }

    pub(crate) fn reset(&self) {
        bump(&self.resets);
    }

    pub(crate) fn collapsed(&self) {
        bump(&self.collapsed_resets);
    }

    pub(crate) fn snapshot(&self, dropped_work: u64) -> ShrmStats {
        ShrmStats {
            doorbells: pair(&self.doorbells),
            read_notifications: pair(&self.read_notifications),
            rx_messages: pair(&self.rx_messages),
            tx_messages: pair(&self.tx_messages),
            resets: self.resets.load(Ordering::Relaxed),
            collapsed_resets: self.collapsed_resets.load(Ordering::Relaxed),
            dropped_work,
        }
    }
}

impl ShrmContext {
    /// Queue a diagnostic dump and a reset unless one is already pending.
    /// Returns `true` when this call started the recovery.
    pub(crate) fn escalate(&self, reason: ResetReason) -> bool {
        if self
            .monitor
            .reset_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(target: "shrm::monitor", "reset already pending, {reason} folded into it");
            self.stats.collapsed();
            return false;
        }
        error!(target: "shrm::monitor", "escalating to {}: {reason}", self.recovery.name());
        if let Err(err) = self.queues.recovery.queue(RecoveryWork::DumpDiagnostics) {
            warn!(target: "shrm::monitor", "diagnostic dump not queued: {err}");
        }
        if let Err(err) = self.queues.recovery.queue(RecoveryWork::Reset(reason)) {
            error!(target: "shrm::monitor", "reset not queued: {err}");
            self.monitor.reset_pending.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// The liveness bit read false just before `what` was signalled.
    pub(crate) fn host_port_down(&self, what: &str) {
        error!(target: "shrm::monitor", "{} before {what}", ShrmError::HostAccessPortDown);
        self.escalate(ResetReason::HostAccessPortDown);
    }

    /// A transmit ring had no room; start the FIFO-full timer once.
    pub(crate) fn note_fifo_full(&self, channel: Channel, needed: u32, free: u32) {
        let _guard = self.monitor.lock();
        if !self.monitor.fifo_full.swap(true, Ordering::AcqRel) {
            warn!(
                target: "shrm::monitor",
                "{channel} fifo full ({needed} words needed, {free} free)"
            );
            self.timers.arm(TimerKind::FifoFull, self.config.fifo_full_timeout());
        }
    }

    pub(crate) fn on_timer(&self, kind: TimerKind) {
        match kind {
            TimerKind::IdleCheck => self.idle_check(),
            TimerKind::ModStuck(channel) => self.stuck_timeout(channel),
            TimerKind::FifoFull => self.fifo_full_timeout(),
        }
    }

    fn stuck_timeout(&self, channel: Channel) {
        let _guard = self.monitor.lock();
        if !self.wake.pending(channel) {
            debug!(target: "shrm::monitor", "stale {channel} stuck timer ignored");
            return;
        }
        if self.monitor.mod_stuck.swap(true, Ordering::AcqRel) {
            return;
        }
        self.monitor.fail_count.fetch_add(1, Ordering::Relaxed);
        error!(target: "shrm::monitor", "{}", ShrmError::StuckModem { channel });
        self.escalate(ResetReason::StuckModem(channel));
    }

    fn fifo_full_timeout(&self) {
        let _guard = self.monitor.lock();
        if !self.monitor.fifo_full.load(Ordering::Acquire) {
            debug!(target: "shrm::monitor", "stale fifo-full timer ignored");
            return;
        }
        self.monitor.fail_count.fetch_add(1, Ordering::Relaxed);
        error!(target: "shrm::monitor", "transmit fifo stayed full");
        self.escalate(ResetReason::FifoFull);
    }

    pub(crate) fn run_recovery_work(&self, work: RecoveryWork) {
        match work {
            RecoveryWork::DumpDiagnostics => self.dump_diagnostics(),
            RecoveryWork::Reset(reason) => {
                if let Err(err) = self.boot.transition(BootEvent::ResetBegin) {
                    warn!(target: "shrm::monitor", "{err}");
                }
                self.status.publish(ModemStatus::Resetting);
                self.recovery.recover(self, reason);
            }
        }
    }

    /// Silent reset: quiesce everything, restart the modem, go back to `Init`.
    pub(crate) fn modem_reset_sequence(&self, reason: ResetReason) {
        info!(target: "shrm::monitor", "silent modem reset: {reason}");
        {
            let _guard = self.monitor.lock();
            self.timers.cancel_all();
            self.monitor.mod_stuck.store(false, Ordering::Release);
            self.monitor.fifo_full.store(false, Ordering::Release);
            for channel in Channel::ALL {
                self.wake.set_pending(channel, false);
            }
        }
        self.set_bottom_halves(false);
        if let Some(callback) = self.monitor.crash_callback() {
            callback();
        }
        self.dispatcher.sink().reset_queues();
        for channel in Channel::ALL {
            let mut link = self.link(channel);
            link.set_tx(ChannelEvent::Reset);
            link.set_rx(ChannelEvent::Reset);
            link.read_notif_outstanding = false;
        }
        self.wake.reset();
        self.monitor.silent_reset.store(true, Ordering::Release);
        self.port.reset_modem();
        self.wake.request_modem(self.port.as_ref());
        if let Err(err) = self.boot.transition(BootEvent::ResetComplete) {
            warn!(target: "shrm::monitor", "{err}");
        }
        self.set_bottom_halves(true);
        self.monitor.reset_pending.store(false, Ordering::Release);
        self.stats.reset();
        info!(target: "shrm::monitor", "modem reset done, waiting for boot handshake");
    }

    pub(crate) fn snapshot(&self) -> DiagnosticSnapshot {
        let boot = self.boot_state();
        let mut tx = [ChannelState::Sleep; 2];
        let mut rx = [ChannelState::Sleep; 2];
        let mut pointers = [ChannelPointers::default(); 2];
        for channel in Channel::ALL {
            let i = channel.index();
            let link = self.link(channel);
            tx[i] = link.tx;
            rx[i] = link.rx;
            pointers[i] = ChannelPointers {
                tx_local_write: link.writer.local_wptr(),
                tx_shared_write: link.writer.ring().shared_write(),
                tx_shared_read: link.writer.ring().shared_read(),
                rx_local_read: link.reader.local_rptr(),
                rx_local_write: link.reader.local_wptr(),
                rx_shared_write: link.reader.ring().shared_write(),
                rx_shared_read: link.reader.ring().shared_read(),
            };
        }
        DiagnosticSnapshot {
            boot,
            tx,
            rx,
            wake_count: self.wake.count(),
            msg_pending: [
                self.wake.pending(Channel::Common),
                self.wake.pending(Channel::Audio),
            ],
            mod_stuck: self.monitor.mod_stuck.load(Ordering::Acquire),
            fifo_full: self.monitor.fifo_full.load(Ordering::Acquire),
            silent_reset: self.monitor.silent_reset.load(Ordering::Acquire),
            fail_count: self.monitor.fail_count(),
            pointers,
        }
    }

    fn dump_diagnostics(&self) {
        let snapshot = self.snapshot();
        error!(target: "shrm::monitor", "shrm state dump:\n{snapshot}");
        *self
            .monitor
            .last_diagnostic
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }
}
