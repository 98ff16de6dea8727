// CLASSIFICATION: COMMUNITY
// Filename: protocol.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Protocol engine lifecycle and the public [`Shrm`] handle.
//!
//! [`ShrmContext`] owns every piece of protocol state. Interrupt top halves,
//! worker threads and the timer thread all hold an `Arc` to it; locks live
//! next to the data they protect.
//!
//! Lock order, outermost first: stuck-timer lock, common channel, audio
//! channel, boot state. The wake count, timer table and work queue senders
//! are leaves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use crate::boot::BootCell;
use crate::channel::{ChannelLink, Direction, RxWork};
use crate::config::ShrmConfig;
use crate::dispatch::{Dispatcher, MessageSink};
use crate::error::{Result, ShrmError};
use crate::fifo::ShmRegion;
use crate::l2::{Channel, L2Header};
use crate::monitor::{
    strategy_for, Counters, DiagnosticSnapshot, FaultMonitor, FaultRecoveryStrategy, RecoveryWork,
    ResetReason, ShrmStats,
};
use crate::port::{GopBits, Irq, ModemPort};
use crate::state::{BootState, ChannelState};
use crate::status::{ModemStatus, StatusBus, StatusRequest};
use crate::timer::{Clock, MonotonicClock, TimerKind, TimerService};
use crate::wake::{CaWork, WakeCoordinator, WakeWork};
use crate::workqueue::{WorkQueue, WorkReceiver, WorkTracker, WorkerPriority};

/// Hardware handed to [`Shrm::init`]: the modem port and the shared region.
#[derive(Clone)]
pub struct ShrmDevice {
    pub port: Arc<dyn ModemPort>,
    pub region: Arc<ShmRegion>,
}

pub(crate) struct Queues {
    pub(crate) wake: WorkQueue<WakeWork>,
    pub(crate) chan_wr: WorkQueue<Channel>,
    pub(crate) rx: WorkQueue<RxWork>,
    pub(crate) ca: WorkQueue<CaWork>,
    pub(crate) recovery: WorkQueue<RecoveryWork>,
}

struct Receivers {
    wake: WorkReceiver<WakeWork>,
    chan_wr: WorkReceiver<Channel>,
    rx: WorkReceiver<RxWork>,
    ca: WorkReceiver<CaWork>,
    recovery: WorkReceiver<RecoveryWork>,
}

impl Queues {
    fn new(depth: usize, tracker: &Arc<WorkTracker>) -> (Self, Receivers) {
        let (wake, wake_rx) = WorkQueue::new("shrm-wake", depth, Arc::clone(tracker));
        let (chan_wr, chan_wr_rx) = WorkQueue::new("shrm-chan-wr", depth, Arc::clone(tracker));
        let (rx, rx_rx) = WorkQueue::new("shrm-rx", depth, Arc::clone(tracker));
        let (ca, ca_rx) = WorkQueue::new("shrm-ca", depth, Arc::clone(tracker));
        let (recovery, recovery_rx) = WorkQueue::new("shrm-recovery", depth, Arc::clone(tracker));
        let queues = Self {
            wake,
            chan_wr,
            rx,
            ca,
            recovery,
        };
        let receivers = Receivers {
            wake: wake_rx,
            chan_wr: chan_wr_rx,
            rx: rx_rx,
            ca: ca_rx,
            recovery: recovery_rx,
        };
        (queues, receivers)
    }

    fn dropped(&self) -> u64 {
        self.wake.dropped()
            + self.chan_wr.dropped()
            + self.rx.dropped()
            + self.ca.dropped()
            + self.recovery.dropped()
    }

    fn shutdown(&self) {
        self.wake.shutdown();
        self.chan_wr.shutdown();
        self.rx.shutdown();
        self.ca.shutdown();
        self.recovery.shutdown();
    }
}

/// All protocol state for one modem link.
pub(crate) struct ShrmContext {
    pub(crate) config: ShrmConfig,
    pub(crate) port: Arc<dyn ModemPort>,
    pub(crate) region: Arc<ShmRegion>,
    pub(crate) boot: BootCell,
    links: [Mutex<ChannelLink>; 2],
    pub(crate) wake: WakeCoordinator,
    pub(crate) monitor: FaultMonitor,
    pub(crate) recovery: Box<dyn FaultRecoveryStrategy>,
    pub(crate) timers: TimerService,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) status: StatusBus,
    pub(crate) queues: Queues,
    pub(crate) stats: Counters,
    tracker: Arc<WorkTracker>,
    bottom_halves: AtomicBool,
    running: AtomicBool,
}

impl ShrmContext {
    pub(crate) fn link(&self, channel: Channel) -> MutexGuard<'_, ChannelLink> {
        self.links[channel.index()]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn bottom_halves_enabled(&self) -> bool {
        self.bottom_halves.load(Ordering::Acquire)
    }

    pub(crate) fn set_bottom_halves(&self, enabled: bool) {
        self.bottom_halves.store(enabled, Ordering::Release);
    }

    /// Interrupt top half: acknowledge the source and defer the rest.
    pub(crate) fn top_half(&self, irq: Irq) {
        trace!(target: "shrm::irq", "{irq:?}");
        match irq {
            Irq::CaWake => self.ca_wake_irq(),
            Irq::CaSleep => self.ca_sleep_irq(),
            Irq::CaMsgPending(channel) => {
                self.rx_irq(GopBits::ca_msg_pending(channel), RxWork::MsgPending(channel))
            }
            Irq::AcReadNotification(channel) => {
                self.rx_irq(GopBits::ac_read_notification(channel), RxWork::ReadAck(channel))
            }
            Irq::ModemResetRequest => {
                info!(target: "shrm::irq", "modem requested a reset");
                self.escalate(ResetReason::ModemRequested);
            }
        }
    }

    fn rx_irq(&self, source: GopBits, work: RxWork) {
        self.port.gop_clear(source);
        if !self.bottom_halves_enabled() {
            debug!(target: "shrm::irq", "{work:?} ignored while reset runs");
            return;
        }
        if self.modem_in_reset() {
            debug!(target: "shrm::irq", "{work:?} ignored, modem in reset");
            return;
        }
        if let Err(err) = self.queues.rx.queue(work) {
            warn!(target: "shrm::irq", "{work:?} dropped: {err}");
        }
    }

    /// Run every expired timer. Returns how many fired.
    pub(crate) fn fire_due_timers(&self) -> usize {
        self.tracker.begin();
        let due = self.timers.take_due();
        for kind in &due {
            self.on_timer(*kind);
        }
        self.tracker.end();
        due.len()
    }
}

/// Cloneable handle the platform uses to deliver interrupts.
#[derive(Clone)]
pub struct Interrupts {
    ctx: Arc<ShrmContext>,
}

impl Interrupts {
    /// Run the top half for `irq`. Never blocks on protocol work.
    pub fn raise(&self, irq: Irq) {
        self.ctx.top_half(irq);
    }
}

/// A running SHRM protocol instance.
///
/// Dropping the handle tears the engine down. Do not drop it, or call
/// [`Shrm::deinit`], from inside a [`MessageSink`] callback.
pub struct Shrm {
    ctx: Arc<ShrmContext>,
    timer_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Shrm {
    /// Start the engine with a wall clock and the default timer thread.
    pub fn init(device: ShrmDevice, sink: Arc<dyn MessageSink>, config: ShrmConfig) -> Result<Self> {
        Self::init_with_clock(device, sink, config, Arc::new(MonotonicClock::default()))
    }

    /// Start the engine against `clock`. Under a clock that does not drive a
    /// timer thread, expiry only happens through [`Shrm::fire_due_timers`].
    pub fn init_with_clock(
        device: ShrmDevice,
        sink: Arc<dyn MessageSink>,
        config: ShrmConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let tracker = Arc::new(WorkTracker::default());
        let (queues, receivers) = Queues::new(config.work_queue_depth, &tracker);
        let links = [
            Mutex::new(ChannelLink::new(Channel::Common, &device.region)),
            Mutex::new(ChannelLink::new(Channel::Audio, &device.region)),
        ];
        let drives_timer_thread = clock.drives_timer_thread();
        let ctx = Arc::new(ShrmContext {
            recovery: strategy_for(&config),
            config,
            port: device.port,
            region: device.region,
            boot: BootCell::default(),
            links,
            wake: WakeCoordinator::default(),
            monitor: FaultMonitor::default(),
            timers: TimerService::new(clock),
            dispatcher: Dispatcher::new(sink),
            status: StatusBus::default(),
            queues,
            stats: Counters::default(),
            tracker,
            bottom_halves: AtomicBool::new(true),
            running: AtomicBool::new(true),
        });

        let shrm = Self {
            ctx,
            timer_thread: Mutex::new(None),
        };
        if let Err(err) = shrm.start_threads(receivers, drives_timer_thread) {
            error!(target: "shrm::workqueue", "startup failed: {err}");
            shrm.deinit();
            return Err(err);
        }
        info!(
            target: "shrm::boot",
            "shrm protocol up ({} recovery)",
            shrm.ctx.recovery.name()
        );
        Ok(shrm)
    }

    fn start_threads(&self, receivers: Receivers, drives_timer_thread: bool) -> Result<()> {
        let realtime = match self.ctx.config.realtime_priority {
            0 => WorkerPriority::Normal,
            level => WorkerPriority::Realtime(level),
        };
        let ctx = &self.ctx;

        let c = Arc::clone(ctx);
        ctx.queues
            .wake
            .attach(receivers.wake.spawn(realtime, move |work| c.run_wake_work(work))?);
        let c = Arc::clone(ctx);
        ctx.queues
            .chan_wr
            .attach(receivers.chan_wr.spawn(realtime, move |channel| c.send_doorbell(channel))?);
        let c = Arc::clone(ctx);
        ctx.queues
            .rx
            .attach(receivers.rx.spawn(WorkerPriority::Normal, move |work| c.run_rx_work(work))?);
        let c = Arc::clone(ctx);
        ctx.queues
            .ca
            .attach(receivers.ca.spawn(WorkerPriority::Normal, move |work| c.run_ca_work(work))?);
        let c = Arc::clone(ctx);
        ctx.queues.recovery.attach(
            receivers
                .recovery
                .spawn(WorkerPriority::Normal, move |work| c.run_recovery_work(work))?,
        );

        if drives_timer_thread {
            let c = Arc::clone(ctx);
            let handle = thread::Builder::new()
                .name("shrm-timer".into())
                .spawn(move || {
                    c.timers.run(|| {
                        c.fire_due_timers();
                    })
                })
                .map_err(|source| ShrmError::Spawn {
                    name: "shrm-timer",
                    source,
                })?;
            *self
                .timer_thread
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }
        Ok(())
    }

    /// Stop every worker and the timer thread, then publish `Offline`.
    pub fn deinit(&self) {
        if !self.ctx.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.ctx.timers.stop();
        let timer_thread = self
            .timer_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = timer_thread {
            if handle.join().is_err() {
                error!(target: "shrm::timer", "timer thread panicked");
            }
        }
        self.ctx.timers.cancel_all();
        self.ctx.queues.shutdown();
        self.ctx.status.publish(ModemStatus::Offline);
        info!(target: "shrm::boot", "shrm protocol down");
    }

    /// Send one datagram; the channel follows from `header`.
    pub fn write_msg(&self, header: L2Header, payload: &[u8]) -> Result<()> {
        self.ctx.write_msg(header, payload)
    }

    pub fn is_modem_online(&self) -> bool {
        self.ctx.boot_state().is_done()
    }

    pub fn interrupts(&self) -> Interrupts {
        Interrupts {
            ctx: Arc::clone(&self.ctx),
        }
    }

    pub fn subscribe(&self) -> Receiver<ModemStatus> {
        self.ctx.status.subscribe()
    }

    /// Answer a status query or start a user reset.
    pub fn handle_request(&self, request: StatusRequest) -> Option<ModemStatus> {
        match request {
            StatusRequest::QueryState => Some(if self.is_modem_online() {
                ModemStatus::Online
            } else {
                ModemStatus::Offline
            }),
            StatusRequest::UserReset => {
                info!(target: "shrm::monitor", "user reset requested");
                self.ctx.escalate(ResetReason::User);
                None
            }
        }
    }

    /// Run `callback` at the start of every silent reset.
    pub fn register_crash_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.ctx.monitor.set_crash_callback(Arc::new(callback));
    }

    /// Wait until no interrupt or timer work is queued or running.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.ctx.tracker.wait_idle(timeout)
    }

    /// Fire every timer whose deadline has passed.
    pub fn fire_due_timers(&self) -> usize {
        self.ctx.fire_due_timers()
    }

    pub fn stats(&self) -> ShrmStats {
        self.ctx.stats.snapshot(self.ctx.queues.dropped())
    }

    pub fn last_diagnostic(&self) -> Option<DiagnosticSnapshot> {
        self.ctx.monitor.last_diagnostic()
    }

    /// Capture the current engine state without logging it.
    pub fn diagnostic(&self) -> DiagnosticSnapshot {
        self.ctx.snapshot()
    }

    pub fn boot_state(&self) -> BootState {
        self.ctx.boot_state()
    }

    /// Boot states entered so far, oldest first.
    pub fn boot_history(&self) -> Vec<BootState> {
        self.ctx.boot.history()
    }

    pub fn channel_state(&self, channel: Channel, direction: Direction) -> ChannelState {
        self.ctx.link(channel).state(direction)
    }

    pub fn wake_count(&self) -> u32 {
        self.ctx.wake.count()
    }

    pub fn timer_armed(&self, kind: TimerKind) -> bool {
        self.ctx.timers.is_armed(kind)
    }

    /// True between an escalation and the end of the reset it queued.
    pub fn reset_pending(&self) -> bool {
        self.ctx.monitor.reset_pending()
    }

    pub fn config(&self) -> &ShrmConfig {
        &self.ctx.config
    }
}

impl Drop for Shrm {
    fn drop(&mut self) {
        self.deinit();
    }
}
