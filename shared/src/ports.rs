//! Seams between the saga logic and the durable/transport infrastructure.
//!
//! Every store is cheap to clone: clones share the same underlying pool or
//! in-memory state.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{DeliveryError, StoreError};
use crate::models::{Account, NewMessage, Order, OrderStatus, PaymentRecord, StoredMessage};

pub type StoreResult<T> = Result<T, StoreError>;

/// An outbox or inbox table owned by one service.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Inserts an unprocessed row.
    async fn append(&self, message: NewMessage) -> StoreResult<()>;

    /// Unprocessed rows, oldest first, at most `limit`.
    async fn list_unprocessed(&self, limit: i64) -> StoreResult<Vec<StoredMessage>>;

    /// Sets `processed`; already-processed or unknown ids are not an error.
    async fn mark_processed(&self, id: Uuid) -> StoreResult<()>;

    /// Creation time of the oldest unprocessed row across the whole table.
    async fn oldest_unprocessed(&self) -> StoreResult<Option<DateTime<Utc>>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order and its outbox row as one atomic unit.
    async fn insert_with_outbox(&self, order: &Order, message: NewMessage) -> StoreResult<()>;

    /// Compare-and-set on the status. Returns false when the order is not in
    /// `from` (or does not exist).
    async fn transition(&self, order_id: Uuid, from: OrderStatus, to: OrderStatus)
        -> StoreResult<bool>;

    async fn find(&self, order_id: Uuid) -> StoreResult<Option<Order>>;

    async fn list_by_user(&self, user_id: &str) -> StoreResult<Vec<Order>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx;

    /// Opens a local transaction on the ledger database.
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Fails with [`StoreError::Conflict`] when the user already has an account.
    async fn create_account(&self, account: &Account) -> StoreResult<()>;

    async fn find_account(&self, user_id: &str) -> StoreResult<Option<Account>>;

    /// Unconditional atomic credit. `None` when the account does not exist.
    async fn credit(&self, user_id: &str, amount: &BigDecimal) -> StoreResult<Option<Account>>;
}

/// One open ledger transaction. Dropping it without `commit` discards every
/// write made through it.
#[async_trait]
pub trait LedgerTx: Send + 'static {
    async fn payment_record(&mut self, order_id: Uuid) -> StoreResult<Option<PaymentRecord>>;

    /// Reads the account and holds an exclusive lock on it until the
    /// transaction ends.
    async fn lock_account(&mut self, user_id: &str) -> StoreResult<Option<Account>>;

    async fn set_balance(&mut self, account_id: Uuid, balance: &BigDecimal) -> StoreResult<()>;

    /// Fails with [`StoreError::Conflict`] when the order already has a record.
    async fn record_payment(&mut self, record: &PaymentRecord) -> StoreResult<()>;

    async fn append_outbox(&mut self, message: NewMessage) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

/// Publish side of the message channel.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, routing_key: &str, key: &str, payload: &[u8]) -> anyhow::Result<()>;
}

/// Hands one relayed row to whatever acts on it.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, message: &StoredMessage) -> Result<(), DeliveryError>;
}

/// Handles one payload received from the message channel.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<(), DeliveryError>;
}
