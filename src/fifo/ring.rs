// CLASSIFICATION: COMMUNITY
// Filename: ring.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Word rings living in the region shared with the modem.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::l2::Channel;

/// Circular buffer of 32-bit words plus its published pointers.
///
/// The writer owns `write`, the reader owns `read`. Pointers are word
/// indices in `0..size`.
pub struct SharedRing {
    words: Box<[AtomicU32]>,
    write: AtomicU32,
    read: AtomicU32,
}

impl SharedRing {
    pub fn new(size_words: u32) -> Self {
        let words = (0..size_words).map(|_| AtomicU32::new(0)).collect();
        Self {
            words,
            write: AtomicU32::new(0),
            read: AtomicU32::new(0),
        }
    }

    pub fn size(&self) -> u32 {
        self.words.len() as u32
    }

    pub fn load_word(&self, index: u32) -> u32 {
        self.words[(index % self.size()) as usize].load(Ordering::Relaxed)
    }

    pub fn store_word(&self, index: u32, value: u32) {
        self.words[(index % self.size()) as usize].store(value, Ordering::Relaxed);
    }

    /// Write pointer last published by the producer.
    pub fn shared_write(&self) -> u32 {
        self.write.load(Ordering::Acquire)
    }

    pub fn publish_write(&self, index: u32) {
        self.write.store(index % self.size(), Ordering::Release);
    }

    /// Read pointer last published by the consumer.
    pub fn shared_read(&self) -> u32 {
        self.read.load(Ordering::Acquire)
    }

    pub fn publish_read(&self, index: u32) {
        self.read.store(index % self.size(), Ordering::Release);
    }

    /// Words between `read` and `write`.
    pub fn used(&self, write: u32, read: u32) -> u32 {
        let size = self.size();
        (write + size - read) % size
    }

    /// Words a producer at `write` may still fill; one slot stays empty.
    pub fn free(&self, write: u32, read: u32) -> u32 {
        self.size() - 1 - self.used(write, read)
    }

    pub fn reset(&self) {
        self.write.store(0, Ordering::Release);
        self.read.store(0, Ordering::Release);
    }
}

/// The four rings shared between the AP and the modem.
pub struct ShmRegion {
    ac_common: Arc<SharedRing>,
    ac_audio: Arc<SharedRing>,
    ca_common: Arc<SharedRing>,
    ca_audio: Arc<SharedRing>,
}

impl ShmRegion {
    pub fn new(common_words: u32, audio_words: u32) -> Self {
        Self {
            ac_common: Arc::new(SharedRing::new(common_words)),
            ac_audio: Arc::new(SharedRing::new(audio_words)),
            ca_common: Arc::new(SharedRing::new(common_words)),
            ca_audio: Arc::new(SharedRing::new(audio_words)),
        }
    }

    /// AP to modem ring for `channel`.
    pub fn tx(&self, channel: Channel) -> Arc<SharedRing> {
        match channel {
            Channel::Common => Arc::clone(&self.ac_common),
            Channel::Audio => Arc::clone(&self.ac_audio),
        }
    }

    /// Modem to AP ring for `channel`.
    pub fn rx(&self, channel: Channel) -> Arc<SharedRing> {
        match channel {
            Channel::Common => Arc::clone(&self.ca_common),
            Channel::Audio => Arc::clone(&self.ca_audio),
        }
    }

    pub fn reset(&self) {
        for ring in [&self.ac_common, &self.ac_audio, &self.ca_common, &self.ca_audio] {
            ring.reset();
        }
    }
}
