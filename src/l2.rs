// CLASSIFICATION: COMMUNITY
// Filename: l2.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! L2 message classes and the channel each one travels on.

use core::fmt;

/// Logical transport channel between the AP and the modem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Common,
    Audio,
}

impl Channel {
    /// Both channels in index order.
    pub const ALL: [Channel; 2] = [Channel::Common, Channel::Audio];

    /// Stable array index for per-channel tables.
    pub const fn index(self) -> usize {
        match self {
            Channel::Common => 0,
            Channel::Audio => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Common => f.write_str("common"),
            Channel::Audio => f.write_str("audio"),
        }
    }
}

/// One-byte message class tag carried at the head of every datagram.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct L2Header(pub u8);

impl L2Header {
    pub const ISI: L2Header = L2Header(0x00);
    pub const RPC: L2Header = L2Header(0x01);
    pub const AUDIO: L2Header = L2Header(0x02);
    pub const SECURITY: L2Header = L2Header(0x03);
    pub const AUDIO_LOOPBACK: L2Header = L2Header(0x80);
    pub const COMMON_LOOPBACK: L2Header = L2Header(0xC0);
    pub const CIQ: L2Header = L2Header(0xC3);
    pub const RTC_CALIBRATION: L2Header = L2Header(0xC8);
    pub const IPC_CTRL: L2Header = L2Header(0xDC);
    pub const IPC_DATA: L2Header = L2Header(0xDD);
    pub const SYSCLK3: L2Header = L2Header(0xE6);

    /// Message class this header denotes.
    pub fn class(self) -> MessageClass {
        match self {
            L2Header::ISI => MessageClass::Isi,
            L2Header::RPC => MessageClass::Rpc,
            L2Header::AUDIO => MessageClass::Audio,
            L2Header::SECURITY => MessageClass::Security,
            L2Header::AUDIO_LOOPBACK => MessageClass::AudioLoopback,
            L2Header::COMMON_LOOPBACK => MessageClass::CommonLoopback,
            L2Header::CIQ => MessageClass::Ciq,
            L2Header::RTC_CALIBRATION => MessageClass::RtcCalibration,
            L2Header::IPC_CTRL => MessageClass::IpcCtrl,
            L2Header::IPC_DATA => MessageClass::IpcData,
            L2Header::SYSCLK3 => MessageClass::Sysclk3,
            L2Header(other) => MessageClass::Unknown(other),
        }
    }

    /// Transmit channel for this header, `None` when the class cannot be sent.
    pub fn tx_channel(self) -> Option<Channel> {
        self.class().channel()
    }
}

impl From<u8> for L2Header {
    fn from(raw: u8) -> Self {
        L2Header(raw)
    }
}

impl fmt::Display for L2Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Closed set of message classes understood by the dispatch layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageClass {
    Isi,
    Rpc,
    Audio,
    Security,
    AudioLoopback,
    CommonLoopback,
    Ciq,
    RtcCalibration,
    IpcCtrl,
    IpcData,
    Sysclk3,
    Unknown(u8),
}

impl MessageClass {
    /// Channel the class is carried on.
    pub fn channel(self) -> Option<Channel> {
        match self {
            MessageClass::Audio | MessageClass::AudioLoopback => Some(Channel::Audio),
            MessageClass::Unknown(_) => None,
            _ => Some(Channel::Common),
        }
    }
}

/// Datagram drained from a receive ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct L2Message {
    pub l2_header: L2Header,
    pub payload: Vec<u8>,
}

impl L2Message {
    pub fn new(l2_header: L2Header, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            l2_header,
            payload: payload.into(),
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> u32 {
        self.payload.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
