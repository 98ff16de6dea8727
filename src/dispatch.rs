// CLASSIFICATION: COMMUNITY
// Filename: dispatch.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Delivery of received datagrams to the client layer.

use std::sync::Arc;

use log::debug;

use crate::l2::{Channel, L2Message, MessageClass};

/// Client capability handed to [`crate::Shrm::init`].
///
/// Methods run on the engine's worker threads and must not block for long.
pub trait MessageSink: Send + Sync {
    /// A datagram arrived on the common channel.
    fn common_rx(&self, class: MessageClass, msg: L2Message);

    /// A datagram arrived on the audio channel.
    fn audio_rx(&self, msg: L2Message);

    /// Drop everything queued towards the modem; a reset is in progress.
    fn reset_queues(&self) {}

    /// The boot handshake completed.
    fn modem_online(&self) {}

    /// The modem caught up with everything sent on `channel`.
    fn tx_idle(&self, _channel: Channel) {}
}

/// Routes drained datagrams to the registered [`MessageSink`].
#[derive(Clone)]
pub struct Dispatcher {
    sink: Arc<dyn MessageSink>,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<dyn MessageSink> {
        &self.sink
    }

    pub fn dispatch(&self, channel: Channel, msg: L2Message) {
        match channel {
            Channel::Common => {
                let class = msg.l2_header.class();
                if let MessageClass::Unknown(raw) = class {
                    debug!(target: "shrm::channel", "forwarding unknown class {raw:#04x} to common sink");
                }
                self.sink.common_rx(class, msg);
            }
            Channel::Audio => self.sink.audio_rx(msg),
        }
    }
}
