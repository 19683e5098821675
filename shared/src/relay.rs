use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{DeliveryError, StoreError};
use crate::models::StoredMessage;
use crate::ports::{Delivery, MessageLog, MessagePublisher};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// What one relay tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
    pub dropped: usize,
    /// Age of the oldest row still unprocessed after the tick, across the
    /// whole log.
    pub oldest_pending_age: Option<Duration>,
}

/// Polls a message log and hands every unprocessed row to a [`Delivery`].
///
/// Rows whose delivery fails transiently stay unprocessed and are retried on
/// the next tick, without limit. A row delivered but not marked processed is
/// delivered again, so consumers must be idempotent.
pub struct Relay<L, D> {
    name: String,
    log: L,
    delivery: D,
    interval: Duration,
    batch_size: i64,
}

impl<L, D> Relay<L, D>
where
    L: MessageLog + 'static,
    D: Delivery + 'static,
{
    pub fn new(name: impl Into<String>, log: L, delivery: D) -> Self {
        Self {
            name: name.into(),
            log,
            delivery,
            interval: DEFAULT_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn tick(&self) -> Result<TickReport, StoreError> {
        let rows = self.log.list_unprocessed(self.batch_size).await?;
        let mut report = TickReport {
            fetched: rows.len(),
            ..Default::default()
        };
        if rows.is_empty() {
            return Ok(report);
        }
        let mut oldest_pending: Option<&StoredMessage> = None;

        for row in &rows {
            match self.delivery.deliver(row).await {
                Ok(()) => {
                    report.delivered += 1;
                    debug!(relay = %self.name, message_id = %row.id, order_id = %row.order_id, "message delivered");
                }
                Err(DeliveryError::Rejected(reason)) => {
                    report.dropped += 1;
                    error!(
                        relay = %self.name,
                        message_id = %row.id,
                        order_id = %row.order_id,
                        payload = %row.payload,
                        "dropping message: {}", reason
                    );
                }
                Err(DeliveryError::Transient(e)) => {
                    report.failed += 1;
                    oldest_pending.get_or_insert(row);
                    warn!(relay = %self.name, message_id = %row.id, order_id = %row.order_id, "delivery failed, will retry: {:#}", e);
                    continue;
                }
            }

            if let Err(e) = self.log.mark_processed(row.id).await {
                // The row is delivered again on the next tick.
                oldest_pending.get_or_insert(row);
                error!(relay = %self.name, message_id = %row.id, "failed to mark message processed: {}", e);
            }
        }

        let oldest = match self.log.oldest_unprocessed().await {
            Ok(oldest) => oldest,
            Err(e) => {
                warn!(relay = %self.name, "failed to read backlog age: {}", e);
                oldest_pending.map(|row| row.created_at)
            }
        };
        report.oldest_pending_age =
            oldest.and_then(|created_at| (Utc::now() - created_at).to_std().ok());

        info!(
            relay = %self.name,
            fetched = report.fetched,
            delivered = report.delivered,
            failed = report.failed,
            dropped = report.dropped,
            oldest_pending_ms = report.oldest_pending_age.map(|d| d.as_millis() as u64),
            "relay tick finished"
        );

        Ok(report)
    }

    /// Ticks on the configured interval until `shutdown` is cancelled. A tick
    /// already in progress runs to completion.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(relay = %self.name, interval_ms = self.interval.as_millis() as u64, "relay started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            if let Err(e) = self.tick().await {
                error!(relay = %self.name, "error reading unprocessed messages: {}", e);
            }
        }

        info!(relay = %self.name, "relay stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

/// Delivers outbox rows by publishing their payload under a routing key,
/// keyed by order id.
pub struct Publish<P> {
    publisher: P,
    routing_key: String,
}

impl<P: MessagePublisher> Publish<P> {
    pub fn new(publisher: P, routing_key: impl Into<String>) -> Self {
        Self {
            publisher,
            routing_key: routing_key.into(),
        }
    }
}

#[async_trait]
impl<P: MessagePublisher> Delivery for Publish<P> {
    async fn deliver(&self, message: &StoredMessage) -> Result<(), DeliveryError> {
        let key = message.order_id.to_string();
        self.publisher
            .publish(&self.routing_key, &key, message.payload.as_bytes())
            .await
            .map_err(DeliveryError::Transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryChannel, InMemoryMessageLog};
    use crate::models::NewMessage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    /// Fails the first `failures` publishes, then forwards to the channel.
    struct FlakyPublisher {
        channel: InMemoryChannel,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl MessagePublisher for FlakyPublisher {
        async fn publish(&self, routing_key: &str, key: &str, payload: &[u8]) -> anyhow::Result<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("broker unreachable");
            }
            self.channel.publish(routing_key, key, payload).await
        }
    }

    struct RejectEverything;

    #[async_trait]
    impl Delivery for RejectEverything {
        async fn deliver(&self, _message: &StoredMessage) -> Result<(), DeliveryError> {
            Err(DeliveryError::Rejected("malformed".into()))
        }
    }

    #[derive(Default)]
    struct CountingDelivery(Arc<AtomicUsize>);

    #[async_trait]
    impl Delivery for CountingDelivery {
        async fn deliver(&self, _message: &StoredMessage) -> Result<(), DeliveryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn seeded_log(count: usize) -> InMemoryMessageLog {
        let log = InMemoryMessageLog::new();
        for i in 0..count {
            log.append(NewMessage::new(Uuid::new_v4(), format!("payload-{}", i)))
                .await
                .unwrap();
        }
        log
    }

    #[tokio::test]
    async fn tick_with_nothing_to_do() {
        let relay = Relay::new("test", InMemoryMessageLog::new(), CountingDelivery::default());
        let report = relay.tick().await.unwrap();
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn tick_publishes_in_insertion_order_and_marks_processed() {
        let log = seeded_log(3).await;
        let channel = InMemoryChannel::new();
        let mut rx = channel.subscribe("payment.request").unwrap();
        let relay = Relay::new("outbox", log.clone(), Publish::new(channel, "payment.request"));

        let report = relay.tick().await.unwrap();
        assert_eq!(report.delivered, 3);
        assert_eq!(report.oldest_pending_age, None);
        assert_eq!(log.unprocessed_count().await, 0);

        for i in 0..3 {
            assert_eq!(rx.recv().await.unwrap(), format!("payload-{}", i).into_bytes());
        }
    }

    #[tokio::test]
    async fn failed_publish_is_retried_next_tick() {
        let log = seeded_log(2).await;
        let channel = InMemoryChannel::new();
        let mut rx = channel.subscribe("payment.response").unwrap();
        let publisher = FlakyPublisher {
            channel,
            failures: AtomicUsize::new(1),
        };
        let relay = Relay::new("outbox", log.clone(), Publish::new(publisher, "payment.response"));

        let first = relay.tick().await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.delivered, 1);
        assert!(first.oldest_pending_age.is_some());
        assert_eq!(log.unprocessed_count().await, 1);

        let second = relay.tick().await.unwrap();
        assert_eq!(second.fetched, 1);
        assert_eq!(second.delivered, 1);
        assert_eq!(log.unprocessed_count().await, 0);

        assert_eq!(rx.recv().await.unwrap(), b"payload-1".to_vec());
        assert_eq!(rx.recv().await.unwrap(), b"payload-0".to_vec());
    }

    #[tokio::test]
    async fn rejected_rows_are_dropped() {
        let log = seeded_log(1).await;
        let relay = Relay::new("inbox", log.clone(), RejectEverything);

        let report = relay.tick().await.unwrap();
        assert_eq!(report.dropped, 1);
        assert_eq!(log.unprocessed_count().await, 0);
    }

    #[tokio::test]
    async fn batch_size_bounds_one_tick() {
        let log = seeded_log(5).await;
        let delivered = Arc::new(AtomicUsize::new(0));
        let relay = Relay::new("outbox", log.clone(), CountingDelivery(delivered.clone()))
            .with_batch_size(2);

        let first = relay.tick().await.unwrap();
        assert_eq!(first.fetched, 2);
        assert_eq!(first.delivered, 2);
        assert!(first.oldest_pending_age.is_some(), "rows beyond the batch are still pending");
        assert_eq!(log.unprocessed_count().await, 3);
        relay.tick().await.unwrap();
        relay.tick().await.unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 5);
        assert_eq!(log.unprocessed_count().await, 0);
    }

    #[tokio::test]
    async fn run_drains_log_and_stops_on_shutdown() {
        let log = seeded_log(2).await;
        let delivered = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let handle = Relay::new("outbox", log.clone(), CountingDelivery(delivered.clone()))
            .with_interval(Duration::from_millis(5))
            .spawn(shutdown.clone());

        for _ in 0..200 {
            if log.unprocessed_count().await == 0 {
                break;
            }
            time::sleep(Duration::from_millis(5)).await;
        }
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
        assert_eq!(log.unprocessed_count().await, 0);
    }
}
