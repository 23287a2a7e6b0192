//! In-memory store of pending deliveries.

use chrono::{DateTime, Utc};
use log::info;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A message waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledMessage {
    /// Opaque transport-level recipient id.
    pub recipient: String,
    /// Message body.
    pub content: String,
    /// When the message becomes due. Only ever moves forward: a failed
    /// attempt reschedules it later, never earlier.
    pub send_at: DateTime<Utc>,
    /// Failed delivery attempts so far. Monotonically non-decreasing.
    pub retry_count: u32,
}

impl ScheduledMessage {
    pub fn new(
        recipient: impl Into<String>,
        content: impl Into<String>,
        send_at: DateTime<Utc>,
    ) -> Self {
        ScheduledMessage {
            recipient: recipient.into(),
            content: content.into(),
            send_at,
            retry_count: 0,
        }
    }

    /// A message is due once its send time is at or before `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.send_at <= now
    }
}

/// Set of pending deliveries, shared between the enqueue path and the sweep.
///
/// Two mutation paths only: [`MessageStore::enqueue`] appends, and
/// [`MessageStore::snapshot_and_replace`] swaps out the swept messages once
/// per sweep. The lock is never held across an await, so `enqueue` never
/// blocks behind an in-flight delivery.
#[derive(Default)]
pub struct MessageStore {
    messages: Mutex<Vec<ScheduledMessage>>,
}

impl MessageStore {
    pub fn new() -> Self {
        MessageStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ScheduledMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a message unconditionally. No validation, no deduplication:
    /// duplicate recipient/content/time entries are independent messages.
    pub fn enqueue(&self, message: ScheduledMessage) {
        info!(
            "Scheduled message to {} at {}",
            message.recipient, message.send_at
        );
        self.lock().push(message);
    }

    /// Copies the current contents for a sweep.
    pub fn snapshot(&self) -> Vec<ScheduledMessage> {
        self.lock().clone()
    }

    /// Replaces the `snapshot_len` messages a sweep saw with `kept`.
    ///
    /// `enqueue` only appends, and this is the only other mutation path, so
    /// the snapshot is always a stable prefix of the current contents;
    /// messages enqueued while the sweep ran sit after it and are preserved
    /// for the next sweep.
    pub fn snapshot_and_replace(&self, snapshot_len: usize, kept: Vec<ScheduledMessage>) {
        let mut messages = self.lock();
        let split_at = snapshot_len.min(messages.len());
        let enqueued_mid_sweep = messages.split_off(split_at);
        *messages = kept;
        messages.extend(enqueued_mid_sweep);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
