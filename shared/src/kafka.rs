//! rdkafka implementation of the message channel.
//!
//! Exchange and routing key map to the topic `<exchange>.<routing key>`; a
//! durable queue maps to a consumer group. Offsets are committed by hand,
//! only after the handler made the message's effect durable.

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::Message;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::consumer::handle_until_done;
use crate::events::Topology;
use crate::ports::{MessageHandler, MessagePublisher};
use crate::retry::StartupRetry;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub fn producer(brokers: &str) -> anyhow::Result<FutureProducer> {
    let producer = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", "5000")
        .set("acks", "all")
        .create()?;
    Ok(producer)
}

/// Creates a consumer in the queue's group, subscribed to one destination.
pub fn subscribe(brokers: &str, queue: &str, destination: &str) -> anyhow::Result<StreamConsumer> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("group.id", queue)
        .set("bootstrap.servers", brokers)
        .set("enable.partition.eof", "false")
        .set("session.timeout.ms", "6000")
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()?;
    consumer.subscribe(&[destination])?;
    info!(queue, destination, "subscribed");
    Ok(consumer)
}

/// Creates both destinations of the topology. Topics that already exist are
/// fine; anything else (including an unreachable broker) is retried per
/// `retry`.
pub async fn declare_topology(
    brokers: &str,
    topology: &Topology,
    retry: &StartupRetry,
) -> anyhow::Result<()> {
    let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .create()?;
    let destinations = [topology.request_destination(), topology.response_destination()];

    retry
        .run("broker", || async {
            let topics: Vec<NewTopic> = destinations
                .iter()
                .map(|name| NewTopic::new(name, 1, TopicReplication::Fixed(1)))
                .collect();
            let options = AdminOptions::new().operation_timeout(Some(SEND_TIMEOUT));
            let results = admin
                .create_topics(topics.iter(), &options)
                .await
                .context("creating topics")?;

            for result in results {
                match result {
                    Ok(topic) => info!(topic = %topic, "topic created"),
                    Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                        debug!(topic = %topic, "topic already exists")
                    }
                    Err((topic, code)) => anyhow::bail!("failed to create topic {}: {}", topic, code),
                }
            }
            Ok(())
        })
        .await
}

#[derive(Clone)]
pub struct KafkaPublisher {
    producer: FutureProducer,
    topology: Topology,
}

impl KafkaPublisher {
    pub fn new(producer: FutureProducer, topology: Topology) -> Self {
        Self { producer, topology }
    }
}

#[async_trait]
impl MessagePublisher for KafkaPublisher {
    async fn publish(&self, routing_key: &str, key: &str, payload: &[u8]) -> anyhow::Result<()> {
        let topic = self.topology.destination(routing_key);
        let record = FutureRecord::to(&topic).payload(payload).key(key);

        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| anyhow::anyhow!("failed to publish to {}: {}", topic, e))?;
        Ok(())
    }
}

/// Feeds every received message to `handler` and commits its offset once it
/// is handled. Stops on `shutdown` without committing the message in flight.
pub async fn consume<H>(
    consumer: StreamConsumer,
    handler: H,
    retry_delay: Duration,
    shutdown: CancellationToken,
) where
    H: MessageHandler,
{
    let mut messages = consumer.stream();

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = messages.next() => next,
        };
        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                error!("error receiving message: {}", e);
                continue;
            }
            None => break,
        };

        let payload = message.payload().unwrap_or_default();
        let handled = handle_until_done(&handler, payload, retry_delay, &shutdown).await;
        if !handled.should_ack() {
            break;
        }
        debug!(topic = message.topic(), offset = message.offset(), ?handled, "message handled");
        if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
            warn!(offset = message.offset(), "error committing message: {}", e);
        }
    }

    info!("consumer stopped");
}
