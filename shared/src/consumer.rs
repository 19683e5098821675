use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::models::NewMessage;
use crate::ports::{MessageHandler, MessageLog};

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// What happened to a received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Effect is durable; acknowledge.
    Done,
    /// Rejected for good; acknowledge so it is not redelivered forever.
    Skipped,
    /// Shutdown arrived first; do not acknowledge so it is redelivered.
    Interrupted,
}

impl Handled {
    pub fn should_ack(&self) -> bool {
        !matches!(self, Handled::Interrupted)
    }
}

/// Retries transient failures with a fixed delay until the message is handled,
/// rejected, or `shutdown` is cancelled.
pub async fn handle_until_done<H>(
    handler: &H,
    payload: &[u8],
    retry_delay: Duration,
    shutdown: &CancellationToken,
) -> Handled
where
    H: MessageHandler + ?Sized,
{
    let mut attempt: u32 = 0;
    loop {
        if shutdown.is_cancelled() {
            return Handled::Interrupted;
        }
        attempt += 1;
        match handler.handle(payload).await {
            Ok(()) => return Handled::Done,
            Err(DeliveryError::Rejected(reason)) => {
                error!(payload = %String::from_utf8_lossy(payload), "skipping message: {}", reason);
                return Handled::Skipped;
            }
            Err(DeliveryError::Transient(e)) => {
                warn!(attempt, "failed to handle message, retrying: {:#}", e);
            }
        }
        tokio::select! {
            _ = shutdown.cancelled() => return Handled::Interrupted,
            _ = time::sleep(retry_delay) => {}
        }
    }
}

/// Consumes a queue of the in-memory channel until it closes or `shutdown`
/// is cancelled.
pub async fn consume_queue<H>(
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
    handler: H,
    retry_delay: Duration,
    shutdown: CancellationToken,
) where
    H: MessageHandler,
{
    loop {
        let payload = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = queue.recv() => match next {
                Some(payload) => payload,
                None => break,
            },
        };
        if !handle_until_done(&handler, &payload, retry_delay, &shutdown).await.should_ack() {
            break;
        }
    }
    info!("consumer stopped");
}

#[derive(Deserialize)]
struct Correlation {
    order_id: Uuid,
}

/// Durably records incoming payment requests in the inbox before anything
/// acts on them.
#[derive(Clone)]
pub struct InboxWriter<L> {
    inbox: L,
}

impl<L: MessageLog> InboxWriter<L> {
    pub fn new(inbox: L) -> Self {
        Self { inbox }
    }
}

#[async_trait]
impl<L: MessageLog> MessageHandler for InboxWriter<L> {
    async fn handle(&self, payload: &[u8]) -> Result<(), DeliveryError> {
        let correlation: Correlation = serde_json::from_slice(payload)
            .map_err(|e| DeliveryError::Rejected(format!("payload has no order id: {}", e)))?;
        let payload = String::from_utf8(payload.to_vec())
            .map_err(|e| DeliveryError::Rejected(format!("payload is not utf-8: {}", e)))?;

        self.inbox
            .append(NewMessage::new(correlation.order_id, payload))
            .await?;
        debug!(order_id = %correlation.order_id, "payment request stored in inbox");
        Ok(())
    }
}
