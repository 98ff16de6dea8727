// CLASSIFICATION: COMMUNITY
// Filename: status.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Modem status broadcast and the query/reset request pair.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use log::debug;

/// Events seen by status subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModemStatus {
    Resetting,
    Online,
    Offline,
}

/// Requests accepted by [`crate::Shrm::handle_request`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusRequest {
    /// Reply with the current state, `Online` or `Offline`.
    QueryState,
    /// Ask for a modem reset.
    UserReset,
}

/// Fan-out of [`ModemStatus`] events.
#[derive(Default)]
pub struct StatusBus {
    subscribers: Mutex<Vec<Sender<ModemStatus>>>,
}

impl StatusBus {
    pub fn subscribe(&self) -> Receiver<ModemStatus> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `status` to every live subscriber, forgetting closed ones.
    pub fn publish(&self, status: ModemStatus) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(status).is_ok());
        debug!(
            target: "shrm::boot",
            "status {status:?} sent to {} subscriber(s)",
            subscribers.len()
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
