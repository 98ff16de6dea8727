// CLASSIFICATION: COMMUNITY
// Filename: channel.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Per-channel transport between the local rings and the dispatch layer.

use log::{debug, error, trace, warn};

use crate::config::ResetWritePolicy;
use crate::error::{Result, ShrmError};
use crate::fifo::{FifoError, FifoReader, FifoWriter, ShmRegion, MAX_PAYLOAD};
use crate::l2::{Channel, L2Header};
use crate::port::GopBits;
use crate::protocol::ShrmContext;
use crate::state::{BootState, ChannelEvent, ChannelState};
use crate::timer::TimerKind;

/// Direction of a channel, from the AP's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Tx,
    Rx,
}

/// Bottom halves run on the `shrm-rx` worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RxWork {
    MsgPending(Channel),
    ReadAck(Channel),
}

/// Everything one channel's lock protects.
pub struct ChannelLink {
    pub(crate) channel: Channel,
    pub(crate) writer: FifoWriter,
    pub(crate) reader: FifoReader,
    pub(crate) tx: ChannelState,
    pub(crate) rx: ChannelState,
    pub(crate) read_notif_outstanding: bool,
}

impl ChannelLink {
    pub(crate) fn new(channel: Channel, region: &ShmRegion) -> Self {
        Self {
            channel,
            writer: FifoWriter::new(region.tx(channel)),
            reader: FifoReader::new(region.rx(channel)),
            tx: ChannelState::Sleep,
            rx: ChannelState::Sleep,
            read_notif_outstanding: false,
        }
    }

    pub(crate) fn state(&self, direction: Direction) -> ChannelState {
        match direction {
            Direction::Tx => self.tx,
            Direction::Rx => self.rx,
        }
    }

    pub(crate) fn set_tx(&mut self, event: ChannelEvent) {
        match self.tx.apply(self.channel, event) {
            Ok(next) => {
                trace!(target: "shrm::channel", "{} tx {:?} -> {next:?}", self.channel, self.tx);
                self.tx = next;
            }
            Err(err) => warn!(target: "shrm::channel", "{err}"),
        }
    }

    pub(crate) fn set_rx(&mut self, event: ChannelEvent) {
        match self.rx.apply(self.channel, event) {
            Ok(next) => {
                trace!(target: "shrm::channel", "{} rx {:?} -> {next:?}", self.channel, self.rx);
                self.rx = next;
            }
            Err(err) => warn!(target: "shrm::channel", "{err}"),
        }
    }
}

impl ShrmContext {
    /// Transmit entry point used by [`crate::Shrm::write_msg`].
    pub(crate) fn write_msg(&self, header: L2Header, payload: &[u8]) -> Result<()> {
        if !self.is_running() {
            return Err(ShrmError::NotRunning);
        }
        let channel = header
            .tx_channel()
            .ok_or(ShrmError::UnsupportedHeader(header.0))?;
        if payload.len() > MAX_PAYLOAD {
            return Err(ShrmError::MessageTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        if self.modem_in_reset() || !self.boot_state().is_done() {
            return match self.config.reset_write_policy {
                ResetWritePolicy::DropAndReportSuccess => {
                    warn!(target: "shrm::channel", "modem not online, {header} message dropped");
                    Ok(())
                }
                ResetWritePolicy::Reject => Err(ShrmError::ModemInReset),
            };
        }
        self.enqueue_and_maybe_notify(channel, header, payload)
    }

    /// Write one datagram and ring the doorbell if it is the only unread one.
    pub(crate) fn enqueue_and_maybe_notify(
        &self,
        channel: Channel,
        header: L2Header,
        payload: &[u8],
    ) -> Result<()> {
        let only_unread = {
            let mut link = self.link(channel);
            match link.writer.write_msg(header, payload) {
                Ok(words) => {
                    link.set_tx(ChannelEvent::DataQueued);
                    link.writer.is_only_unread(words)
                }
                Err(FifoError::Full { needed, free }) => {
                    drop(link);
                    self.note_fifo_full(channel, needed, free);
                    return Err(ShrmError::FifoFull { channel });
                }
                Err(FifoError::TooLarge { len, max }) => {
                    return Err(ShrmError::MessageTooLarge { len, max })
                }
                Err(err) => return Err(err.into()),
            }
        };
        self.stats.tx_message(channel);
        if only_unread {
            self.queue_doorbell(channel);
        }
        Ok(())
    }

    pub(crate) fn queue_doorbell(&self, channel: Channel) {
        if let Err(err) = self.queues.chan_wr.queue(channel) {
            error!(target: "shrm::channel", "cannot queue {channel} doorbell: {err}");
        }
    }

    /// Tell the modem we consumed its data. No-op when nothing new was seen
    /// or a notification for the current batch already went out.
    pub(crate) fn send_read_notification(&self, link: &mut ChannelLink) -> bool {
        if link.read_notif_outstanding {
            return false;
        }
        if !link.reader.has_unread() && !link.reader.has_unpublished() {
            return false;
        }
        link.reader.publish();
        if !self.port.host_access_port_live() {
            self.host_port_down(&format!("{} read notification", link.channel));
            return false;
        }
        self.port.gop_set(GopBits::ca_read_notification(link.channel));
        link.read_notif_outstanding = true;
        link.set_rx(ChannelEvent::Signalled);
        self.stats.read_notification(link.channel);
        true
    }

    pub(crate) fn run_rx_work(&self, work: RxWork) {
        if !self.bottom_halves_enabled() {
            debug!(target: "shrm::channel", "{work:?} dropped while reset runs");
            return;
        }
        match work {
            RxWork::MsgPending(channel) => self.on_message_pending(channel),
            RxWork::ReadAck(channel) => self.on_read_ack(channel),
        }
    }

    /// The modem published data on `channel`.
    pub(crate) fn on_message_pending(&self, channel: Channel) {
        if self.modem_in_reset() {
            debug!(target: "shrm::channel", "modem in reset, {channel} message pending ignored");
            return;
        }
        let boot = self.boot_state();
        let mut delivered = Vec::new();
        let mut ring_doorbell = false;
        {
            let mut link = self.link(channel);
            if boot.is_done() {
                link.reader.refresh();
                if link.reader.has_unread() {
                    link.set_rx(ChannelEvent::Pending);
                }
                self.send_read_notification(&mut link);
                while link.reader.has_unread() {
                    match link.reader.read_one() {
                        Ok(msg) => {
                            link.reader.publish();
                            delivered.push(msg);
                        }
                        Err(err) => {
                            error!(target: "shrm::channel", "{channel} rx ring: {err}, skipping");
                            link.reader.discard();
                            link.reader.publish();
                        }
                    }
                }
            } else if channel == Channel::Common {
                ring_doorbell = self.boot_msg_pending(&mut link, boot);
            } else {
                warn!(target: "shrm::channel", "audio data before boot completed ({boot:?})");
            }
            if !link.reader.has_unread() {
                link.set_rx(ChannelEvent::Drained);
                link.read_notif_outstanding = false;
            }
        }
        if ring_doorbell {
            self.queue_doorbell(channel);
        }
        for msg in delivered {
            self.stats.rx_message(channel);
            self.dispatcher.dispatch(channel, msg);
        }
    }

    /// The modem consumed data we published on `channel`.
    pub(crate) fn on_read_ack(&self, channel: Channel) {
        let in_reset = self.modem_in_reset();
        {
            let _guard = self.monitor.lock();
            self.timers.cancel(TimerKind::ModStuck(channel));
            self.wake.set_pending(channel, false);
            if !in_reset && self.monitor.take_fifo_full() {
                self.timers.cancel(TimerKind::FifoFull);
                debug!(target: "shrm::channel", "fifo-full condition cleared by {channel} read notification");
            }
        }
        if in_reset {
            debug!(target: "shrm::channel", "modem in reset, {channel} read notification ignored");
            return;
        }

        let boot = self.boot_state();
        let mut online = false;
        let mut resend = false;
        let mut drained = false;
        {
            let mut link = self.link(channel);
            match boot {
                BootState::InfoSync if channel == Channel::Common => {
                    online = self.boot_read_ack(&mut link);
                }
                BootState::Done => {
                    if link.writer.has_unpublished() {
                        link.set_tx(ChannelEvent::Pending);
                        resend = true;
                    } else {
                        link.set_tx(ChannelEvent::Drained);
                        drained = true;
                    }
                }
                other => {
                    // Nothing of ours was signalled, so no wake reference is owed.
                    error!(target: "shrm::channel", "{channel} read notification in boot state {other:?}");
                    return;
                }
            }
        }
        if online {
            self.announce_online();
        }
        if resend {
            self.queue_doorbell(channel);
        }
        if drained {
            self.dispatcher.sink().tx_idle(channel);
        }
        self.timers.arm(TimerKind::IdleCheck, self.config.idle_check_delay());
        self.wake.release();
    }
}
