// CLASSIFICATION: COMMUNITY
// Filename: port.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Hardware boundary between the protocol engine and the modem.
//!
//! On the U8500 this is the GOP doorbell register block, two PRCMU
//! readback bits and the modem access/reset controls. Host builds plug in
//! [`crate::sim::SimModem`] instead.

use bitflags::bitflags;

use crate::l2::Channel;

bitflags! {
    /// Doorbell bits of the GOP register.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct GopBits: u32 {
        const AUDIO_AC_READ_NOTIFICATION = 1 << 0;
        const AUDIO_CA_MSG_PENDING = 1 << 1;
        const COMMON_AC_READ_NOTIFICATION = 1 << 2;
        const COMMON_CA_MSG_PENDING = 1 << 3;
        const CA_WAKE_REQ = 1 << 7;
        const AUDIO_CA_READ_NOTIFICATION = 1 << 23;
        const AUDIO_AC_MSG_PENDING = 1 << 24;
        const COMMON_CA_READ_NOTIFICATION = 1 << 25;
        const COMMON_AC_MSG_PENDING = 1 << 26;
        const CA_WAKE_ACK = 1 << 27;
    }
}

impl GopBits {
    /// Our "message pending" doorbell towards the modem.
    pub fn ac_msg_pending(channel: Channel) -> Self {
        match channel {
            Channel::Common => GopBits::COMMON_AC_MSG_PENDING,
            Channel::Audio => GopBits::AUDIO_AC_MSG_PENDING,
        }
    }

    /// Our "read notification" doorbell towards the modem.
    pub fn ca_read_notification(channel: Channel) -> Self {
        match channel {
            Channel::Common => GopBits::COMMON_CA_READ_NOTIFICATION,
            Channel::Audio => GopBits::AUDIO_CA_READ_NOTIFICATION,
        }
    }

    /// Incoming "modem has data" interrupt source.
    pub fn ca_msg_pending(channel: Channel) -> Self {
        match channel {
            Channel::Common => GopBits::COMMON_CA_MSG_PENDING,
            Channel::Audio => GopBits::AUDIO_CA_MSG_PENDING,
        }
    }

    /// Incoming "modem read our data" interrupt source.
    pub fn ac_read_notification(channel: Channel) -> Self {
        match channel {
            Channel::Common => GopBits::COMMON_AC_READ_NOTIFICATION,
            Channel::Audio => GopBits::AUDIO_AC_READ_NOTIFICATION,
        }
    }
}

/// Interrupt lines feeding the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Irq {
    /// Modem wants the AP awake.
    CaWake,
    /// Modem is going to sleep.
    CaSleep,
    /// Modem published data on a channel.
    CaMsgPending(Channel),
    /// Modem consumed data we published on a channel.
    AcReadNotification(Channel),
    /// Modem asked for a software reset.
    ModemResetRequest,
}

/// Access to the modem hardware.
///
/// Implementations must be callable from any worker thread. Only
/// `request_modem` may block.
pub trait ModemPort: Send + Sync {
    /// Set doorbell bits (GOP set register).
    fn gop_set(&self, bits: GopBits);

    /// Clear doorbell bits (GOP clear register).
    fn gop_clear(&self, bits: GopBits);

    /// Host access port readback; must be live before any doorbell.
    fn host_access_port_live(&self) -> bool;

    /// Modem reset status readback.
    fn modem_reset_asserted(&self) -> bool;

    /// Keep the modem and shared bus powered.
    fn request_modem(&self);

    /// Drop the request taken by [`ModemPort::request_modem`].
    fn release_modem(&self);

    /// Hold or release the system suspend blocker.
    fn block_suspend(&self, _held: bool) {}

    /// Restart the modem without touching the AP.
    fn reset_modem(&self);

    /// Reset the whole system. Last resort when silent reset is unavailable.
    fn system_reset(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doorbell_bits_match_register_layout() {
        assert_eq!(GopBits::COMMON_AC_MSG_PENDING.bits(), 1 << 26);
        assert_eq!(GopBits::CA_WAKE_ACK.bits(), 1 << 27);
        assert_eq!(GopBits::ac_msg_pending(Channel::Audio).bits(), 1 << 24);
        assert_eq!(GopBits::ca_msg_pending(Channel::Common).bits(), 1 << 3);
    }
}
