//! Periodic delivery sweep with bounded retries.

use crate::features::scheduler::store::{MessageStore, ScheduledMessage};
use crate::transport::ChatTransport;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Retry policy applied to failed delivery attempts.
#[derive(Debug, Clone, Copy)]
pub struct SweepPolicy {
    /// Attempts allowed per message before it is dropped.
    pub max_retries: u32,
    /// Fixed delay added to a message's send time after a failed attempt.
    /// Outages are short relative to the sweep period, so no exponential
    /// growth.
    pub retry_backoff: Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        SweepPolicy {
            max_retries: 3,
            retry_backoff: Duration::from_secs(30),
        }
    }
}

/// Drives periodic delivery of due messages.
///
/// The sweep is the only component that sends through the transport and the
/// only one that mutates the store after enqueue. Messages due while the
/// gateway is down are held unchanged; connectivity loss never burns retry
/// budget.
pub struct DeliverySweeper {
    store: Arc<MessageStore>,
    transport: Arc<dyn ChatTransport>,
    policy: SweepPolicy,
}

impl DeliverySweeper {
    pub fn new(
        store: Arc<MessageStore>,
        transport: Arc<dyn ChatTransport>,
        policy: SweepPolicy,
    ) -> Self {
        DeliverySweeper {
            store,
            transport,
            policy,
        }
    }

    /// Background task: sweep once per `interval` until the process exits.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);

        info!(
            "Delivery sweeper started (interval: {}s, max retries: {})",
            interval.as_secs(),
            self.policy.max_retries
        );

        loop {
            ticker.tick().await;
            self.sweep(Utc::now()).await;
        }
    }

    /// One pass over the store: attempt every due message, keep the rest.
    ///
    /// `now` is read once and used as the due cutoff for the whole pass, so
    /// messages are not re-evaluated against a moving clock mid-sweep.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let pending = self.store.snapshot();
        if pending.is_empty() {
            return;
        }

        debug!("Sweeping {} pending message(s)", pending.len());

        let snapshot_len = pending.len();
        let mut kept = Vec::with_capacity(snapshot_len);

        for msg in pending {
            if !msg.is_due(now) {
                kept.push(msg);
                continue;
            }

            if !self.transport.is_connected() {
                // Deferred, not failed: held as-is until connectivity returns,
                // without counting against the retry ceiling.
                warn!(
                    "Transport not connected - deferring delivery to {}",
                    msg.recipient
                );
                kept.push(msg);
                continue;
            }

            info!("Attempting to send scheduled message to {}", msg.recipient);

            match self.transport.send(&msg.recipient, &msg.content).await {
                Ok(()) => {
                    info!("Successfully sent message to {}", msg.recipient);
                }
                Err(e) if msg.retry_count < self.policy.max_retries => {
                    error!(
                        "Failed to send message to {} (attempt {}/{}): {e:#}",
                        msg.recipient,
                        msg.retry_count + 1,
                        self.policy.max_retries
                    );
                    kept.push(ScheduledMessage {
                        send_at: next_attempt(now, self.policy.retry_backoff),
                        retry_count: msg.retry_count + 1,
                        ..msg
                    });
                }
                Err(_) => {
                    // Terminal: no caller is waiting, so the log line is the
                    // only signal this message was lost.
                    error!(
                        "Permanently failed to send message to {} after {} attempts",
                        msg.recipient, self.policy.max_retries
                    );
                }
            }
        }

        self.store.snapshot_and_replace(snapshot_len, kept);
    }
}

/// Send time for the next retry, saturating on absurd backoff configs
/// instead of overflowing.
fn next_attempt(now: DateTime<Utc>, backoff: Duration) -> DateTime<Utc> {
    i64::try_from(backoff.as_secs())
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Duration as TimeDelta;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Test double for the chat transport: scripted connectivity and send
    /// outcome, records every delivery attempt.
    #[derive(Default)]
    struct FakeTransport {
        connected: AtomicBool,
        fail_sends: AtomicBool,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeTransport {
        fn connected() -> Self {
            let transport = FakeTransport::default();
            transport.connected.store(true, Ordering::SeqCst);
            transport
        }

        fn failing() -> Self {
            let transport = FakeTransport::connected();
            transport.fail_sends.store(true, Ordering::SeqCst);
            transport
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatTransport for FakeTransport {
        async fn send(&self, recipient: &str, content: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), content.to_string()));
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(anyhow!("send rejected"));
            }
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    fn sweeper(
        store: &Arc<MessageStore>,
        transport: &Arc<FakeTransport>,
    ) -> DeliverySweeper {
        DeliverySweeper::new(store.clone(), transport.clone(), SweepPolicy::default())
    }

    #[tokio::test]
    async fn due_message_is_sent_and_removed() {
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::connected());
        let now = Utc::now();

        store.enqueue(ScheduledMessage::new("555", "hi", now - TimeDelta::seconds(1)));
        sweeper(&store, &transport).sweep(now).await;

        assert!(store.is_empty());
        assert_eq!(transport.sent(), vec![("555".to_string(), "hi".to_string())]);
    }

    #[tokio::test]
    async fn not_due_message_survives_unchanged() {
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::connected());
        let now = Utc::now();

        let msg = ScheduledMessage::new("555", "later", now + TimeDelta::seconds(3600));
        store.enqueue(msg.clone());

        let swp = sweeper(&store, &transport);
        for _ in 0..5 {
            swp.sweep(now).await;
        }

        assert_eq!(store.snapshot(), vec![msg]);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn due_message_while_disconnected_is_deferred_without_retry_cost() {
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::default());
        let now = Utc::now();

        let msg = ScheduledMessage::new("555", "hi", now - TimeDelta::seconds(1));
        store.enqueue(msg.clone());

        let swp = sweeper(&store, &transport);
        // Never expires while disconnected, however many sweeps pass
        for _ in 0..10 {
            swp.sweep(now).await;
        }

        assert_eq!(store.snapshot(), vec![msg]);
        assert_eq!(store.snapshot()[0].retry_count, 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn failed_send_is_rescheduled_with_backoff() {
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::failing());
        let now = Utc::now();

        store.enqueue(ScheduledMessage::new("555", "hi", now - TimeDelta::seconds(1)));
        sweeper(&store, &transport).sweep(now).await;

        let kept = store.snapshot();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].retry_count, 1);
        assert_eq!(kept[0].send_at, now + TimeDelta::seconds(30));
        assert_eq!(kept[0].recipient, "555");
        assert_eq!(kept[0].content, "hi");
    }

    #[tokio::test]
    async fn exhausted_retries_drop_the_message() {
        // Retry budget already spent, so the next failure is terminal
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::failing());
        let now = Utc::now();

        let mut msg = ScheduledMessage::new("555", "hi", now - TimeDelta::seconds(1));
        msg.retry_count = 3;
        store.enqueue(msg);

        sweeper(&store, &transport).sweep(now).await;

        assert!(store.is_empty());
        // The terminal attempt was still made
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn persistent_failure_gives_up_after_max_retries() {
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::failing());
        let swp = sweeper(&store, &transport);

        let start = Utc::now();
        store.enqueue(ScheduledMessage::new("555", "hi", start));

        // Each sweep runs 31s after the previous one so the backoff has
        // always elapsed: initial attempt + 3 retries, then the drop.
        let mut now = start;
        for _ in 0..4 {
            swp.sweep(now).await;
            now += TimeDelta::seconds(31);
        }

        assert!(store.is_empty());
        assert_eq!(transport.sent().len(), 4);
    }

    #[tokio::test]
    async fn backoff_keeps_message_out_of_next_sweep() {
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::failing());
        let now = Utc::now();

        store.enqueue(ScheduledMessage::new("555", "hi", now));
        let swp = sweeper(&store, &transport);

        swp.sweep(now).await;
        // 10s later the rescheduled message is not yet due
        swp.sweep(now + TimeDelta::seconds(10)).await;

        assert_eq!(store.len(), 1);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn sweep_partitions_mixed_queue() {
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::connected());
        let now = Utc::now();

        let future = ScheduledMessage::new("1", "a", now + TimeDelta::seconds(60));
        store.enqueue(ScheduledMessage::new("2", "b", now - TimeDelta::seconds(5)));
        store.enqueue(future.clone());
        store.enqueue(ScheduledMessage::new("3", "c", now));

        sweeper(&store, &transport).sweep(now).await;

        // Both due messages went out, the future one is untouched
        assert_eq!(store.snapshot(), vec![future]);
        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.contains(&("2".to_string(), "b".to_string())));
        assert!(sent.contains(&("3".to_string(), "c".to_string())));
    }

    #[tokio::test]
    async fn sweep_with_nothing_due_is_idempotent() {
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::connected());
        let now = Utc::now();

        store.enqueue(ScheduledMessage::new("1", "a", now + TimeDelta::seconds(10)));
        store.enqueue(ScheduledMessage::new("2", "b", now + TimeDelta::seconds(20)));
        let before = store.snapshot();

        let swp = sweeper(&store, &transport);
        swp.sweep(now).await;
        swp.sweep(now).await;

        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn custom_policy_is_honored() {
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::failing());
        let now = Utc::now();

        store.enqueue(ScheduledMessage::new("555", "hi", now));
        let swp = DeliverySweeper::new(
            store.clone(),
            transport.clone(),
            SweepPolicy {
                max_retries: 1,
                retry_backoff: Duration::from_secs(5),
            },
        );

        swp.sweep(now).await;
        let kept = store.snapshot();
        assert_eq!(kept[0].retry_count, 1);
        assert_eq!(kept[0].send_at, now + TimeDelta::seconds(5));

        // Second failure exhausts the single retry
        swp.sweep(now + TimeDelta::seconds(6)).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn oversized_backoff_saturates_instead_of_panicking() {
        let store = Arc::new(MessageStore::new());
        let transport = Arc::new(FakeTransport::failing());
        let now = Utc::now();

        store.enqueue(ScheduledMessage::new("555", "hi", now));
        let swp = DeliverySweeper::new(
            store.clone(),
            transport.clone(),
            SweepPolicy {
                max_retries: 3,
                retry_backoff: Duration::from_secs(u64::MAX),
            },
        );

        swp.sweep(now).await;

        let kept = store.snapshot();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].retry_count, 1);
        // Pushed arbitrarily far out, but still a valid timestamp
        assert!(kept[0].send_at > now);
    }
}
