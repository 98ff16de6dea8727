// CLASSIFICATION: COMMUNITY
// Filename: shrm_wake.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

#[path = "shrm_support.rs"]
mod support;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use shrm::sim::SimModem;
use shrm::{Channel, ChannelState, Direction, GopBits, Irq, L2Header, ModemPort};
use support::{test_config, Harness, FLUSH};

const PAST_COALESCE: Duration = Duration::from_millis(30);

#[test]
fn modem_wake_is_acknowledged_and_blocks_suspend() {
    let h = Harness::new();
    h.raise(Irq::CaWake);
    assert!(h.sim.gop().contains(GopBits::CA_WAKE_ACK));
    assert!(h.sim.suspend_blocked());
    assert!(h.sim.is_requested());
    assert_eq!(h.shrm.wake_count(), 1);
}

#[test]
fn modem_sleep_releases_the_link_once_idle() {
    let h = Harness::new();
    h.boot();
    assert_eq!(h.shrm.wake_count(), 1);

    h.raise(Irq::CaSleep);
    assert_eq!(h.shrm.wake_count(), 0);
    assert!(!h.sim.gop().contains(GopBits::CA_WAKE_ACK));
    assert!(!h.sim.suspend_blocked());
    assert!(h.shrm.timer_armed(shrm::TimerKind::IdleCheck));
    assert_eq!(h.sim.releases(), 0);

    h.advance(PAST_COALESCE);
    for channel in Channel::ALL {
        for direction in [Direction::Tx, Direction::Rx] {
            assert_eq!(h.shrm.channel_state(channel, direction), ChannelState::Sleep);
        }
    }
    assert_eq!(h.sim.releases(), 1);
    assert!(!h.sim.is_requested());
}

#[test]
fn busy_link_is_not_put_to_sleep() {
    let h = Harness::new();
    h.boot();
    h.send(L2Header::ISI, b"in flight");
    h.raise(Irq::CaSleep);
    assert_eq!(h.shrm.wake_count(), 1);

    h.advance(PAST_COALESCE);
    assert_eq!(h.sim.releases(), 0);
    assert_eq!(
        h.shrm.channel_state(Channel::Common, Direction::Tx),
        ChannelState::PtrBusy
    );

    h.modem_ack(Channel::Common);
    assert_eq!(h.shrm.wake_count(), 0);
    h.advance(PAST_COALESCE);
    assert_eq!(h.sim.releases(), 1);
}

#[test]
fn sending_after_sleep_requests_the_modem_again() {
    let h = Harness::new();
    h.boot();
    h.raise(Irq::CaSleep);
    h.advance(PAST_COALESCE);
    assert!(!h.sim.is_requested());
    let requests = h.sim.requests();

    h.send(L2Header::RPC, b"wake up");
    assert!(h.sim.is_requested());
    assert_eq!(h.sim.requests(), requests + 1);
    assert_eq!(h.shrm.wake_count(), 1);
    h.modem_ack(Channel::Common);
    assert_eq!(h.shrm.wake_count(), 0);
}

#[test]
fn wake_is_not_acknowledged_while_modem_is_held_in_reset() {
    let h = Harness::new();
    h.sim.set_reset_asserted(true);
    h.raise(Irq::CaWake);
    assert!(!h.sim.gop().contains(GopBits::CA_WAKE_ACK));
    assert_eq!(h.sim.modem_resets(), 0);
}

#[test]
fn wake_with_host_port_down_resets_the_modem() {
    let h = Harness::new();
    h.sim.set_host_port_live(false);
    h.raise(Irq::CaWake);
    h.sim.set_host_port_live(true);
    assert!(!h.sim.gop().contains(GopBits::CA_WAKE_ACK));
    assert_eq!(h.sim.modem_resets(), 1);
    assert_eq!(h.shrm.wake_count(), 0);
}

/// Port whose modem request blocks while the gate is shut.
struct GatedPort {
    sim: Arc<SimModem>,
    open: Mutex<bool>,
    opened: Condvar,
    waiting: AtomicBool,
}

impl GatedPort {
    fn new(sim: &Arc<SimModem>) -> Arc<Self> {
        Arc::new(Self {
            sim: Arc::clone(sim),
            open: Mutex::new(true),
            opened: Condvar::new(),
            waiting: AtomicBool::new(false),
        })
    }

    fn set_open(&self, open: bool) {
        *self.open.lock().unwrap() = open;
        self.opened.notify_all();
    }
}

impl ModemPort for GatedPort {
    fn gop_set(&self, bits: GopBits) {
        self.sim.gop_set(bits);
    }

    fn gop_clear(&self, bits: GopBits) {
        self.sim.gop_clear(bits);
    }

    fn host_access_port_live(&self) -> bool {
        self.sim.host_access_port_live()
    }

    fn modem_reset_asserted(&self) -> bool {
        self.sim.modem_reset_asserted()
    }

    fn request_modem(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            self.waiting.store(true, Ordering::SeqCst);
            open = self.opened.wait(open).unwrap();
        }
        self.waiting.store(false, Ordering::SeqCst);
        drop(open);
        self.sim.request_modem();
    }

    fn release_modem(&self) {
        self.sim.release_modem();
    }

    fn block_suspend(&self, held: bool) {
        self.sim.block_suspend(held);
    }

    fn reset_modem(&self) {
        self.sim.reset_modem();
    }

    fn system_reset(&self) {
        self.sim.system_reset();
    }
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + FLUSH;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

fn header_for(channel: Channel) -> L2Header {
    match channel {
        Channel::Common => L2Header::ISI,
        Channel::Audio => L2Header::AUDIO,
    }
}

/// Queue a doorbell on `channel` behind a `blocker` doorbell stuck in the
/// modem request, and acknowledge the previous datagram meanwhile so the
/// read notification queues a resend of the same data.
fn read_ack_while_doorbell_is_queued(channel: Channel, blocker: Channel) {
    let mut gate = None;
    let h = Harness::with_port(test_config(), |sim| {
        let port = GatedPort::new(sim);
        gate = Some(Arc::clone(&port));
        port as Arc<dyn ModemPort>
    });
    let gate = gate.unwrap();
    h.boot();

    h.send(header_for(channel), b"first");
    assert_eq!(h.sim.receive(channel).len(), 1);
    assert_eq!(h.shrm.wake_count(), 2);

    gate.set_open(false);
    h.shrm.write_msg(header_for(blocker), b"blocker").unwrap();
    wait_until("blocked modem request", || gate.waiting.load(Ordering::SeqCst));
    assert_eq!(h.shrm.wake_count(), 3);

    let rung = h.sim.doorbells(channel);
    h.shrm.write_msg(header_for(channel), b"second").unwrap();
    h.irq.raise(Irq::AcReadNotification(channel));
    wait_until("read notification", || h.shrm.wake_count() == 2);

    gate.set_open(true);
    h.flush();
    assert_eq!(h.sim.doorbells(channel), rung + 1);
    assert_eq!(h.shrm.wake_count(), 3);

    let got = h.modem_ack(channel);
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].payload, b"second");
    assert_eq!(h.modem_ack(blocker).len(), 1);
    // Only the modem wake from boot is still held.
    assert_eq!(h.shrm.wake_count(), 1);
}

#[test]
fn common_resend_after_queued_doorbell_rings_once() {
    read_ack_while_doorbell_is_queued(Channel::Common, Channel::Audio);
}

#[test]
fn audio_resend_after_queued_doorbell_rings_once() {
    read_ack_while_doorbell_is_queued(Channel::Audio, Channel::Common);
}
