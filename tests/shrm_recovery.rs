// CLASSIFICATION: COMMUNITY
// Filename: shrm_recovery.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

#[path = "shrm_support.rs"]
mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shrm::{
    BootState, Channel, ChannelState, Direction, Irq, L2Header, ModemStatus, ShrmConfig, ShrmError,
    StatusRequest, TimerKind,
};
use support::{test_config, Harness, FLUSH};

const PAST_STUCK: Duration = Duration::from_millis(6_001);

fn assert_quiet_after_reset(h: &Harness) {
    assert_eq!(h.shrm.boot_state(), BootState::Init);
    for channel in Channel::ALL {
        for direction in [Direction::Tx, Direction::Rx] {
            assert_eq!(h.shrm.channel_state(channel, direction), ChannelState::Sleep);
        }
    }
    for kind in TimerKind::ALL {
        assert!(!h.shrm.timer_armed(kind), "{kind:?} left armed");
    }
    assert_eq!(h.shrm.wake_count(), 0);
    assert!(!h.shrm.reset_pending());
}

#[test]
fn stuck_modem_triggers_exactly_one_reset() {
    let h = Harness::new();
    h.boot();
    let status = h.shrm.subscribe();
    h.send(L2Header::ISI, b"hello");

    h.advance(Duration::from_millis(5_000));
    assert_eq!(h.sim.modem_resets(), 0);
    h.advance(Duration::from_millis(1_001));

    assert_eq!(h.sim.modem_resets(), 1);
    assert_eq!(h.shrm.stats().resets, 1);
    assert_quiet_after_reset(&h);
    assert_eq!(h.sink.queue_resets.load(Ordering::SeqCst), 1);
    assert_eq!(status.try_iter().collect::<Vec<_>>(), vec![ModemStatus::Resetting]);

    let dump = h.shrm.last_diagnostic().expect("diagnostic dump");
    assert!(dump.mod_stuck);
    assert_eq!(dump.boot, BootState::Done);
    assert_eq!(dump.tx[Channel::Common.index()], ChannelState::PtrBusy);
    assert!(dump.msg_pending[Channel::Common.index()]);
}

#[test]
fn both_channels_stuck_collapse_into_one_reset() {
    let h = Harness::new();
    h.boot();
    h.send(L2Header::ISI, b"common");
    h.send(L2Header::AUDIO, b"audio");
    assert_eq!(h.advance(PAST_STUCK), 3);
    assert_eq!(h.sim.modem_resets(), 1);
    assert_quiet_after_reset(&h);
}

#[test]
fn triggers_during_a_running_reset_are_folded_in() {
    let h = Harness::new();
    h.boot();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered_tx = Mutex::new(entered_tx);
    let release_rx = Mutex::new(release_rx);
    h.shrm.register_crash_callback(move || {
        let _ = entered_tx.lock().unwrap().send(());
        let _ = release_rx.lock().unwrap().recv_timeout(FLUSH);
    });

    h.send(L2Header::ISI, b"stuck");
    h.clock.advance(PAST_STUCK);
    h.shrm.fire_due_timers();
    entered_rx.recv_timeout(FLUSH).expect("reset started");

    assert!(h.shrm.reset_pending());
    assert_eq!(h.shrm.handle_request(StatusRequest::UserReset), None);
    h.irq.raise(Irq::ModemResetRequest);
    release_tx.send(()).unwrap();
    h.flush();

    assert_eq!(h.sim.modem_resets(), 1);
    assert_eq!(h.shrm.stats().collapsed_resets, 2);
    assert_quiet_after_reset(&h);
}

#[test]
fn link_recovers_after_reset() {
    let h = Harness::new();
    h.boot();
    h.send(L2Header::ISI, b"lost");
    h.advance(PAST_STUCK);
    assert_quiet_after_reset(&h);
    assert!(!h.shrm.is_modem_online());

    h.boot();
    assert_eq!(h.sink.online.load(Ordering::SeqCst), 2);
    h.send(L2Header::RPC, b"again");
    let got = h.modem_ack(Channel::Common);
    assert_eq!(got[0].payload, b"again".to_vec());
    assert_eq!(
        h.shrm.boot_history(),
        vec![
            BootState::Init,
            BootState::InfoSync,
            BootState::Done,
            BootState::Unknown,
            BootState::Init,
            BootState::InfoSync,
            BootState::Done,
        ]
    );
}

#[test]
fn fifo_full_is_transient_when_modem_catches_up() {
    let h = Harness::with_config(ShrmConfig {
        common_fifo_words: 16,
        ..test_config()
    });
    h.boot();
    let payload = [7u8; 40];
    h.send(L2Header::ISI, &payload);
    let doorbells = h.sim.doorbells(Channel::Common);

    let err = h.shrm.write_msg(L2Header::ISI, &payload).unwrap_err();
    assert!(matches!(err, ShrmError::FifoFull { channel: Channel::Common }));
    h.flush();
    assert_eq!(h.sim.doorbells(Channel::Common), doorbells);
    assert!(h.shrm.timer_armed(TimerKind::FifoFull));

    h.modem_ack(Channel::Common);
    assert!(!h.shrm.timer_armed(TimerKind::FifoFull));
    h.advance(Duration::from_secs(2));
    assert_eq!(h.sim.modem_resets(), 0);
    h.send(L2Header::ISI, &payload);
}

#[test]
fn fifo_full_that_persists_resets_the_modem() {
    let h = Harness::with_config(ShrmConfig {
        common_fifo_words: 16,
        ..test_config()
    });
    h.boot();
    let payload = [7u8; 40];
    h.send(L2Header::ISI, &payload);
    assert!(h.shrm.write_msg(L2Header::ISI, &payload).is_err());
    assert!(h.shrm.write_msg(L2Header::ISI, &payload).is_err());

    h.advance(Duration::from_millis(1_001));
    assert_eq!(h.sim.modem_resets(), 1);
    assert_quiet_after_reset(&h);
}

#[test]
fn payload_larger_than_the_ring_is_rejected_without_a_reset() {
    let h = Harness::new();
    h.boot();
    let err = h.shrm.write_msg(L2Header::AUDIO, &[1u8; 1024]).unwrap_err();
    assert!(matches!(err, ShrmError::MessageTooLarge { len: 1024, max: 248 }));
    assert!(!h.shrm.timer_armed(TimerKind::FifoFull));

    h.advance(Duration::from_millis(1_001));
    assert_eq!(h.sim.modem_resets(), 0);
    h.send(L2Header::AUDIO, &[1u8; 248]);
    assert_eq!(h.modem_ack(Channel::Audio).len(), 1);
}

#[test]
fn host_port_down_escalates_instead_of_ringing() {
    let h = Harness::new();
    h.boot();
    h.sim.set_host_port_live(false);
    h.shrm.write_msg(L2Header::ISI, b"x").unwrap();
    h.flush();
    h.sim.set_host_port_live(true);
    assert_eq!(h.sim.doorbells(Channel::Common), 1);
    assert_eq!(h.sim.modem_resets(), 1);
    assert_quiet_after_reset(&h);
}

#[test]
fn modem_reset_request_runs_the_silent_reset() {
    let h = Harness::new();
    h.boot();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    h.shrm.register_crash_callback(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    h.raise(Irq::ModemResetRequest);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.sim.modem_resets(), 1);
    assert!(h.sim.is_requested());
    assert_quiet_after_reset(&h);
}

#[test]
fn user_reset_request_is_honoured() {
    let h = Harness::new();
    h.boot();
    h.shrm.handle_request(StatusRequest::UserReset);
    h.flush();
    assert_eq!(h.sim.modem_resets(), 1);
    assert_eq!(
        h.shrm.handle_request(StatusRequest::QueryState),
        Some(ModemStatus::Offline)
    );
}

#[test]
fn without_silent_reset_the_system_is_reset() {
    let h = Harness::with_config(ShrmConfig {
        silent_reset: false,
        ..test_config()
    });
    h.boot();
    h.send(L2Header::ISI, b"hello");
    h.advance(PAST_STUCK);
    assert_eq!(h.sim.system_resets(), 1);
    assert_eq!(h.sim.modem_resets(), 0);
    assert_eq!(h.shrm.boot_state(), BootState::Unknown);
    // Nothing is accepted until the system comes back.
    h.shrm.write_msg(L2Header::ISI, b"dropped").unwrap();
    h.flush();
    assert_eq!(h.sim.doorbells(Channel::Common), 2);

    // The reset stays pending, so later triggers are folded into it.
    let collapsed = h.shrm.stats().collapsed_resets;
    h.raise(Irq::ModemResetRequest);
    assert_eq!(h.shrm.stats().collapsed_resets, collapsed + 1);
    assert_eq!(h.sim.system_resets(), 1);
    assert_eq!(h.shrm.boot_state(), BootState::Unknown);
}

#[test]
fn interrupts_during_reset_state_are_ignored() {
    let h = Harness::new();
    h.boot();
    h.sim.set_reset_asserted(true);
    h.sim.send(Channel::Common, L2Header::ISI, b"x").unwrap();
    h.raise(Irq::CaMsgPending(Channel::Common));
    assert!(h.sink.common.lock().unwrap().is_empty());
    h.sim.set_reset_asserted(false);
    h.raise(Irq::CaMsgPending(Channel::Common));
    assert_eq!(h.sink.common.lock().unwrap().len(), 1);
}
