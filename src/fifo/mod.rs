// CLASSIFICATION: COMMUNITY
// Filename: mod.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Shared-memory FIFO primitives.
//!
//! Frames are sequences of little-endian 32-bit words. Word 0 holds the L1
//! type in bits 31..28:
//!
//! * boot-info request / response: `config` in bits 23..16 and `version`
//!   in bits 15..0, no payload;
//! * normal message: L2 header in bits 27..20, payload length in bytes in
//!   bits 19..0, followed by the payload padded to whole words.
//!
//! [`FifoWriter`] and [`FifoReader`] keep local pointer copies and only
//! publish them once a frame has been fully written or consumed.

pub mod ring;

use std::sync::Arc;

use thiserror::Error;

use crate::l2::{L2Header, L2Message};
pub use ring::{SharedRing, ShmRegion};

const L1_SHIFT: u32 = 28;
const L1_BOOT_INFO_REQ: u32 = 1;
const L1_BOOT_INFO_RESP: u32 = 2;
const L1_NORMAL: u32 = 3;
const L2_SHIFT: u32 = 20;
const LEN_MASK: u32 = (1 << L2_SHIFT) - 1;

/// Largest payload a single frame can describe.
pub const MAX_PAYLOAD: usize = LEN_MASK as usize;

/// Negotiated protocol parameters exchanged during boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootInfo {
    pub config: u8,
    pub version: u16,
}

impl BootInfo {
    fn encode(self, l1: u32) -> u32 {
        (l1 << L1_SHIFT) | (u32::from(self.config) << 16) | u32::from(self.version)
    }

    fn decode(word: u32) -> Self {
        Self {
            config: ((word >> 16) & 0xff) as u8,
            version: (word & 0xffff) as u16,
        }
    }
}

/// FIFO primitive failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FifoError {
    #[error("ring full: need {needed} words, {free} free")]
    Full { needed: u32, free: u32 },
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("nothing to read")]
    Empty,
    #[error("unexpected frame word {word:#010x}")]
    Malformed { word: u32 },
}

fn payload_words(len: usize) -> u32 {
    len.div_ceil(4) as u32
}

/// Producer end of a ring.
pub struct FifoWriter {
    ring: Arc<SharedRing>,
    local_wptr: u32,
}

impl FifoWriter {
    pub fn new(ring: Arc<SharedRing>) -> Self {
        Self { ring, local_wptr: 0 }
    }

    /// Pick up at the write pointer already published on `ring`.
    pub fn resume(ring: Arc<SharedRing>) -> Self {
        let local_wptr = ring.shared_write();
        Self { ring, local_wptr }
    }

    pub fn ring(&self) -> &SharedRing {
        &self.ring
    }

    pub fn local_wptr(&self) -> u32 {
        self.local_wptr
    }

    /// Words the peer has not consumed yet, published or not.
    pub fn unread_words(&self) -> u32 {
        self.ring.used(self.local_wptr, self.ring.shared_read())
    }

    /// True when a frame of `frame_words` just written is the only unread one.
    pub fn is_only_unread(&self, frame_words: u32) -> bool {
        self.unread_words() == frame_words
    }

    /// True when written frames have not been published to the peer yet.
    pub fn has_unpublished(&self) -> bool {
        self.local_wptr != self.ring.shared_write()
    }

    /// Make every fully written frame visible to the peer.
    pub fn publish(&mut self) {
        self.ring.publish_write(self.local_wptr);
    }

    pub fn reset(&mut self) {
        self.local_wptr = 0;
    }

    /// Largest payload a single frame can carry on this ring.
    pub fn max_payload(&self) -> usize {
        // One slot stays empty and one word holds the frame header.
        let words = self.ring.size().saturating_sub(2) as usize;
        (words * 4).min(MAX_PAYLOAD)
    }

    fn reserve(&self, needed: u32) -> Result<(), FifoError> {
        let free = self.ring.free(self.local_wptr, self.ring.shared_read());
        if needed > free {
            return Err(FifoError::Full { needed, free });
        }
        Ok(())
    }

    fn push(&mut self, word: u32) {
        self.ring.store_word(self.local_wptr, word);
        self.local_wptr = (self.local_wptr + 1) % self.ring.size();
    }

    /// Append a normal frame. Returns the number of words it occupies.
    pub fn write_msg(&mut self, header: L2Header, payload: &[u8]) -> Result<u32, FifoError> {
        let max = self.max_payload();
        if payload.len() > max {
            return Err(FifoError::TooLarge {
                len: payload.len(),
                max,
            });
        }
        let words = 1 + payload_words(payload.len());
        self.reserve(words)?;
        self.push((L1_NORMAL << L1_SHIFT) | (u32::from(header.0) << L2_SHIFT) | payload.len() as u32);
        for chunk in payload.chunks(4) {
            let mut bytes = [0u8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            self.push(u32::from_le_bytes(bytes));
        }
        Ok(words)
    }

    pub fn write_boot_info_req(&mut self, info: BootInfo) -> Result<(), FifoError> {
        self.reserve(1)?;
        self.push(info.encode(L1_BOOT_INFO_REQ));
        Ok(())
    }

    pub fn write_boot_info_resp(&mut self, info: BootInfo) -> Result<(), FifoError> {
        self.reserve(1)?;
        self.push(info.encode(L1_BOOT_INFO_RESP));
        Ok(())
    }
}

/// Consumer end of a ring.
pub struct FifoReader {
    ring: Arc<SharedRing>,
    local_rptr: u32,
    local_wptr: u32,
}

impl FifoReader {
    pub fn new(ring: Arc<SharedRing>) -> Self {
        Self {
            ring,
            local_rptr: 0,
            local_wptr: 0,
        }
    }

    /// Pick up at the pointers already published on `ring`.
    pub fn resume(ring: Arc<SharedRing>) -> Self {
        let local_rptr = ring.shared_read();
        let local_wptr = ring.shared_write();
        Self {
            ring,
            local_rptr,
            local_wptr,
        }
    }

    pub fn ring(&self) -> &SharedRing {
        &self.ring
    }

    pub fn local_rptr(&self) -> u32 {
        self.local_rptr
    }

    pub fn local_wptr(&self) -> u32 {
        self.local_wptr
    }

    /// Pick up the peer's published write pointer.
    pub fn refresh(&mut self) {
        self.local_wptr = self.ring.shared_write();
    }

    pub fn has_unread(&self) -> bool {
        self.local_rptr != self.local_wptr
    }

    /// True when consumed frames have not been published back to the peer.
    pub fn has_unpublished(&self) -> bool {
        self.local_rptr != self.ring.shared_read()
    }

    pub fn publish(&mut self) {
        self.ring.publish_read(self.local_rptr);
    }

    pub fn reset(&mut self) {
        self.local_rptr = 0;
        self.local_wptr = 0;
    }

    fn peek(&self) -> Result<u32, FifoError> {
        if !self.has_unread() {
            return Err(FifoError::Empty);
        }
        Ok(self.ring.load_word(self.local_rptr))
    }

    fn advance(&mut self, words: u32) {
        self.local_rptr = (self.local_rptr + words) % self.ring.size();
    }

    /// Skip everything the peer has published so far.
    pub fn discard(&mut self) {
        self.local_rptr = self.local_wptr;
    }

    /// Consume one normal frame. The local pointer never passes the
    /// refreshed peer write pointer.
    pub fn read_one(&mut self) -> Result<L2Message, FifoError> {
        let word = self.peek()?;
        if word >> L1_SHIFT != L1_NORMAL {
            return Err(FifoError::Malformed { word });
        }
        let len = (word & LEN_MASK) as usize;
        let words = 1 + payload_words(len);
        if self.ring.used(self.local_wptr, self.local_rptr) < words {
            return Err(FifoError::Malformed { word });
        }
        let mut payload = Vec::with_capacity(len);
        for i in 1..words {
            let bytes = self.ring.load_word(self.local_rptr + i).to_le_bytes();
            let take = (len - payload.len()).min(4);
            payload.extend_from_slice(&bytes[..take]);
        }
        self.advance(words);
        let header = L2Header(((word >> L2_SHIFT) & 0xff) as u8);
        Ok(L2Message::new(header, payload))
    }

    pub fn read_boot_info_req(&mut self) -> Result<BootInfo, FifoError> {
        self.read_boot(L1_BOOT_INFO_REQ)
    }

    pub fn read_boot_info_resp(&mut self) -> Result<BootInfo, FifoError> {
        self.read_boot(L1_BOOT_INFO_RESP)
    }

    fn read_boot(&mut self, l1: u32) -> Result<BootInfo, FifoError> {
        let word = self.peek()?;
        if word >> L1_SHIFT != l1 {
            return Err(FifoError::Malformed { word });
        }
        self.advance(1);
        Ok(BootInfo::decode(word))
    }
}
