// CLASSIFICATION: COMMUNITY
// Filename: sim.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Host-side modem stand-in.
//!
//! [`SimModem`] implements [`ModemPort`] by recording doorbell traffic and
//! plays the modem end of the shared rings. It never raises interrupts on
//! its own; tests decide when the modem reacts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ShrmConfig;
use crate::fifo::{BootInfo, FifoError, FifoReader, FifoWriter, ShmRegion};
use crate::l2::{Channel, L2Header, L2Message};
use crate::port::{GopBits, ModemPort};
use crate::protocol::ShrmDevice;

struct SimState {
    gop: GopBits,
    sets: Vec<GopBits>,
    clears: Vec<GopBits>,
    requested: bool,
    requests: u32,
    releases: u32,
    modem_resets: u32,
    system_resets: u32,
    suspend_blocked: bool,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            gop: GopBits::empty(),
            sets: Vec::new(),
            clears: Vec::new(),
            requested: false,
            requests: 0,
            releases: 0,
            modem_resets: 0,
            system_resets: 0,
            suspend_blocked: false,
        }
    }
}

/// Simulated modem and GOP register block.
pub struct SimModem {
    region: Arc<ShmRegion>,
    state: Mutex<SimState>,
    host_port_live: AtomicBool,
    reset_asserted: AtomicBool,
}

impl SimModem {
    pub fn new(config: &ShrmConfig) -> Arc<Self> {
        Arc::new(Self {
            region: Arc::new(ShmRegion::new(
                config.common_fifo_words,
                config.audio_fifo_words,
            )),
            state: Mutex::new(SimState::default()),
            host_port_live: AtomicBool::new(true),
            reset_asserted: AtomicBool::new(false),
        })
    }

    /// Device description to pass to [`crate::Shrm::init`].
    pub fn device(self: &Arc<Self>) -> ShrmDevice {
        ShrmDevice {
            port: Arc::clone(self) as Arc<dyn ModemPort>,
            region: Arc::clone(&self.region),
        }
    }

    pub fn region(&self) -> &Arc<ShmRegion> {
        &self.region
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_host_port_live(&self, live: bool) {
        self.host_port_live.store(live, Ordering::Release);
    }

    pub fn set_reset_asserted(&self, asserted: bool) {
        self.reset_asserted.store(asserted, Ordering::Release);
    }

    /// Current doorbell register value.
    pub fn gop(&self) -> GopBits {
        self.state().gop
    }

    /// How many `gop_set` calls included `bits`.
    pub fn set_count(&self, bits: GopBits) -> usize {
        self.state().sets.iter().filter(|set| set.contains(bits)).count()
    }

    /// How many `gop_clear` calls included `bits`.
    pub fn clear_count(&self, bits: GopBits) -> usize {
        self.state()
            .clears
            .iter()
            .filter(|clear| clear.contains(bits))
            .count()
    }

    /// Message-pending doorbells rung towards the modem on `channel`.
    pub fn doorbells(&self, channel: Channel) -> usize {
        self.set_count(GopBits::ac_msg_pending(channel))
    }

    /// Read notifications sent to the modem on `channel`.
    pub fn read_notifications(&self, channel: Channel) -> usize {
        self.set_count(GopBits::ca_read_notification(channel))
    }

    pub fn is_requested(&self) -> bool {
        self.state().requested
    }

    pub fn requests(&self) -> u32 {
        self.state().requests
    }

    pub fn releases(&self) -> u32 {
        self.state().releases
    }

    pub fn modem_resets(&self) -> u32 {
        self.state().modem_resets
    }

    pub fn system_resets(&self) -> u32 {
        self.state().system_resets
    }

    pub fn suspend_blocked(&self) -> bool {
        self.state().suspend_blocked
    }

    /// Modem side: publish a boot-info request on the common ring.
    pub fn write_boot_info_req(&self, info: BootInfo) -> Result<(), FifoError> {
        let mut writer = FifoWriter::resume(self.region.rx(Channel::Common));
        writer.write_boot_info_req(info)?;
        writer.publish();
        Ok(())
    }

    /// Modem side: publish one datagram towards the AP.
    pub fn send(&self, channel: Channel, header: L2Header, payload: &[u8]) -> Result<(), FifoError> {
        let mut writer = FifoWriter::resume(self.region.rx(channel));
        writer.write_msg(header, payload)?;
        writer.publish();
        Ok(())
    }

    /// Modem side: consume the AP's boot-info response.
    pub fn read_boot_info_resp(&self) -> Result<BootInfo, FifoError> {
        let mut reader = FifoReader::resume(self.region.tx(Channel::Common));
        let info = reader.read_boot_info_resp()?;
        reader.publish();
        Ok(info)
    }

    /// Modem side: drain every datagram the AP published on `channel`.
    pub fn receive(&self, channel: Channel) -> Vec<L2Message> {
        let mut reader = FifoReader::resume(self.region.tx(channel));
        let mut out = Vec::new();
        while let Ok(msg) = reader.read_one() {
            out.push(msg);
        }
        reader.publish();
        out
    }
}

impl ModemPort for SimModem {
    fn gop_set(&self, bits: GopBits) {
        let mut state = self.state();
        state.gop.insert(bits);
        state.sets.push(bits);
    }

    fn gop_clear(&self, bits: GopBits) {
        let mut state = self.state();
        state.gop.remove(bits);
        state.clears.push(bits);
    }

    fn host_access_port_live(&self) -> bool {
        self.host_port_live.load(Ordering::Acquire)
    }

    fn modem_reset_asserted(&self) -> bool {
        self.reset_asserted.load(Ordering::Acquire)
    }

    fn request_modem(&self) {
        let mut state = self.state();
        state.requested = true;
        state.requests += 1;
    }

    fn release_modem(&self) {
        let mut state = self.state();
        state.requested = false;
        state.releases += 1;
    }

    fn block_suspend(&self, held: bool) {
        self.state().suspend_blocked = held;
    }

    fn reset_modem(&self) {
        let mut state = self.state();
        state.modem_resets += 1;
        state.gop = GopBits::empty();
    }

    fn system_reset(&self) {
        self.state().system_resets += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ShrmConfig {
        ShrmConfig {
            common_fifo_words: 64,
            audio_fifo_words: 32,
            ..ShrmConfig::default()
        }
    }

    #[test]
    fn modem_messages_land_on_the_ap_receive_ring() {
        let sim = SimModem::new(&small());
        sim.send(Channel::Audio, L2Header::AUDIO, b"pcm").unwrap();
        let mut reader = FifoReader::new(sim.region().rx(Channel::Audio));
        reader.refresh();
        assert_eq!(reader.read_one().unwrap().payload, b"pcm".to_vec());
    }

    #[test]
    fn gop_register_tracks_set_and_clear() {
        let sim = SimModem::new(&small());
        sim.gop_set(GopBits::CA_WAKE_ACK);
        assert!(sim.gop().contains(GopBits::CA_WAKE_ACK));
        sim.gop_clear(GopBits::CA_WAKE_ACK);
        assert!(sim.gop().is_empty());
        assert_eq!(sim.set_count(GopBits::CA_WAKE_ACK), 1);
        assert_eq!(sim.clear_count(GopBits::CA_WAKE_ACK), 1);
    }
}
