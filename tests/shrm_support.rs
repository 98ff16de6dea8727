// CLASSIFICATION: COMMUNITY
// Filename: shrm_support.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shrm::sim::SimModem;
use shrm::{
    BootInfo, BootState, Channel, Interrupts, Irq, L2Header, L2Message, ManualClock, MessageClass,
    MessageSink, ModemPort, Shrm, ShrmConfig, ShrmDevice,
};

pub const FLUSH: Duration = Duration::from_secs(5);

pub const BOOT_INFO: BootInfo = BootInfo {
    config: 3,
    version: 1,
};

#[derive(Default)]
pub struct RecordingSink {
    pub common: Mutex<Vec<(MessageClass, L2Message)>>,
    pub audio: Mutex<Vec<L2Message>>,
    pub online: AtomicUsize,
    pub queue_resets: AtomicUsize,
    pub idle: Mutex<Vec<Channel>>,
}

impl MessageSink for RecordingSink {
    fn common_rx(&self, class: MessageClass, msg: L2Message) {
        self.common.lock().unwrap().push((class, msg));
    }

    fn audio_rx(&self, msg: L2Message) {
        self.audio.lock().unwrap().push(msg);
    }

    fn reset_queues(&self) {
        self.queue_resets.fetch_add(1, Ordering::SeqCst);
    }

    fn modem_online(&self) {
        self.online.fetch_add(1, Ordering::SeqCst);
    }

    fn tx_idle(&self, channel: Channel) {
        self.idle.lock().unwrap().push(channel);
    }
}

/// Small rings, no realtime workers.
pub fn test_config() -> ShrmConfig {
    ShrmConfig {
        common_fifo_words: 256,
        audio_fifo_words: 64,
        realtime_priority: 0,
        work_queue_depth: 32,
        ..ShrmConfig::default()
    }
}

pub struct Harness {
    pub clock: ManualClock,
    pub sim: Arc<SimModem>,
    pub sink: Arc<RecordingSink>,
    pub shrm: Shrm,
    pub irq: Interrupts,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ShrmConfig) -> Self {
        Self::with_port(config, |sim| Arc::clone(sim) as Arc<dyn ModemPort>)
    }

    /// Like [`Harness::with_config`], with the modem port wrapped by `port`.
    pub fn with_port(
        config: ShrmConfig,
        port: impl FnOnce(&Arc<SimModem>) -> Arc<dyn ModemPort>,
    ) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let clock = ManualClock::new();
        let sim = SimModem::new(&config);
        let sink = Arc::new(RecordingSink::default());
        let device = ShrmDevice {
            port: port(&sim),
            region: Arc::clone(sim.region()),
        };
        let shrm = Shrm::init_with_clock(device, sink.clone(), config, Arc::new(clock.clone()))
            .expect("shrm init");
        let irq = shrm.interrupts();
        Self {
            clock,
            sim,
            sink,
            shrm,
            irq,
        }
    }

    /// Raise `irq` and wait for every bottom half it caused.
    pub fn raise(&self, irq: Irq) {
        self.irq.raise(irq);
        self.flush();
    }

    pub fn flush(&self) {
        assert!(self.shrm.flush(FLUSH), "engine did not go idle");
    }

    /// Move the clock, fire due timers and wait for the fallout.
    pub fn advance(&self, by: Duration) -> usize {
        self.clock.advance(by);
        let fired = self.shrm.fire_due_timers();
        self.flush();
        fired
    }

    /// Run the whole boot handshake from `Init` to `Done`.
    pub fn boot(&self) {
        assert_eq!(self.shrm.boot_state(), BootState::Init);
        self.raise(Irq::CaWake);
        self.sim.write_boot_info_req(BOOT_INFO).unwrap();
        self.raise(Irq::CaMsgPending(Channel::Common));
        assert_eq!(self.shrm.boot_state(), BootState::InfoSync);
        assert_eq!(self.sim.read_boot_info_resp().unwrap(), BOOT_INFO);
        self.raise(Irq::AcReadNotification(Channel::Common));
        assert_eq!(self.shrm.boot_state(), BootState::Done);
    }

    /// Send from the AP and wait for the doorbell work.
    pub fn send(&self, header: L2Header, payload: &[u8]) {
        self.shrm.write_msg(header, payload).unwrap();
        self.flush();
    }

    /// Let the modem drain `channel` and acknowledge it.
    pub fn modem_ack(&self, channel: Channel) -> Vec<L2Message> {
        let got = self.sim.receive(channel);
        self.raise(Irq::AcReadNotification(channel));
        got
    }
}
