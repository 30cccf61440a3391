//! Notification queues
//!
//! Contracts emit notifications while they run; the engine buffers them per
//! transaction and dispatches the whole block's queues once, strictly after
//! the outer commit succeeded. A rolled-back block sends nothing.

use serde::{Deserialize, Serialize};

use crate::types::KeyId;

/// One notification addressed to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: KeyId,
    pub ecosystem_id: i64,
    pub topic: String,
    pub body: Vec<u8>,
}

/// Delivery seam. The transport (websocket hub, message bus) lives outside
/// the engine.
pub trait NotificationTransport: Send + Sync {
    fn deliver(&self, notification: &Notification);
}

/// Per-transaction notification buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationQueue {
    entries: Vec<Notification>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, notification: Notification) {
        self.entries.push(notification);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deliver every buffered notification, in emission order.
    pub fn send(&self, transport: &dyn NotificationTransport) {
        for entry in &self.entries {
            transport.deliver(entry);
        }
    }
}
