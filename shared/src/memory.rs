//! In-memory adapters for every port.
//!
//! They keep the same atomicity the Postgres adapters provide, which makes
//! them suitable for tests and for running both services in one process.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Account, NewMessage, Order, OrderStatus, PaymentRecord, StoredMessage};
use crate::ports::{LedgerStore, LedgerTx, MessageLog, MessagePublisher, OrderStore, StoreResult};

/// Outbox or inbox table kept in insertion order.
#[derive(Default, Clone)]
pub struct InMemoryMessageLog {
    rows: Arc<RwLock<Vec<StoredMessage>>>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row, processed or not, in insertion order.
    pub async fn all(&self) -> Vec<StoredMessage> {
        self.rows.read().await.clone()
    }

    pub async fn unprocessed_count(&self) -> usize {
        self.rows.read().await.iter().filter(|m| !m.processed).count()
    }

    async fn push(&self, message: NewMessage) {
        self.rows.write().await.push(StoredMessage::from_new(message));
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn append(&self, message: NewMessage) -> StoreResult<()> {
        self.push(message).await;
        Ok(())
    }

    async fn list_unprocessed(&self, limit: i64) -> StoreResult<Vec<StoredMessage>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|m| !m.processed)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: Uuid) -> StoreResult<()> {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.iter_mut().find(|m| m.id == id) {
            row.processed = true;
        }
        Ok(())
    }

    async fn oldest_unprocessed(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let rows = self.rows.read().await;
        Ok(rows.iter().filter(|m| !m.processed).map(|m| m.created_at).min())
    }
}

#[derive(Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<Vec<Order>>>,
    outbox: InMemoryMessageLog,
}

impl InMemoryOrderStore {
    pub fn new(outbox: InMemoryMessageLog) -> Self {
        Self {
            orders: Arc::default(),
            outbox,
        }
    }

    pub fn outbox(&self) -> &InMemoryMessageLog {
        &self.outbox
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_with_outbox(&self, order: &Order, message: NewMessage) -> StoreResult<()> {
        let mut orders = self.orders.write().await;
        if orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }
        // Both writes happen under the orders lock, so no reader sees one without the other.
        self.outbox.push(message).await;
        orders.push(order.clone());
        Ok(())
    }

    async fn transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> StoreResult<bool> {
        let mut orders = self.orders.write().await;
        match orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) if order.status == from => {
                order.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn list_by_user(&self, user_id: &str) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.iter().filter(|o| o.user_id == user_id).cloned().collect())
    }
}

#[derive(Debug, Default, Clone)]
struct LedgerState {
    accounts: HashMap<String, Account>,
    payments: HashMap<Uuid, PaymentRecord>,
}

/// Accounts plus the payment records and outbox of the payment service.
///
/// A transaction holds the whole ledger lock, which is stricter than the
/// per-row lock Postgres takes but gives the same serialization per account.
#[derive(Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    outbox: InMemoryMessageLog,
}

impl InMemoryLedger {
    pub fn new(outbox: InMemoryMessageLog) -> Self {
        Self {
            state: Arc::default(),
            outbox,
        }
    }

    pub fn outbox(&self) -> &InMemoryMessageLog {
        &self.outbox
    }

    pub async fn payment_count(&self) -> usize {
        self.state.lock().await.payments.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    type Tx = InMemoryLedgerTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryLedgerTx {
            guard,
            staged,
            pending_outbox: Vec::new(),
            outbox: self.outbox.clone(),
        })
    }

    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&account.user_id) {
            return Err(StoreError::Conflict(format!(
                "account for user {} already exists",
                account.user_id
            )));
        }
        state.accounts.insert(account.user_id.clone(), account.clone());
        Ok(())
    }

    async fn find_account(&self, user_id: &str) -> StoreResult<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(user_id).cloned())
    }

    async fn credit(&self, user_id: &str, amount: &BigDecimal) -> StoreResult<Option<Account>> {
        let mut state = self.state.lock().await;
        Ok(state.accounts.get_mut(user_id).map(|account| {
            account.balance = &account.balance + amount;
            account.clone()
        }))
    }
}

pub struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
    pending_outbox: Vec<NewMessage>,
    outbox: InMemoryMessageLog,
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn payment_record(&mut self, order_id: Uuid) -> StoreResult<Option<PaymentRecord>> {
        Ok(self.staged.payments.get(&order_id).cloned())
    }

    async fn lock_account(&mut self, user_id: &str) -> StoreResult<Option<Account>> {
        Ok(self.staged.accounts.get(user_id).cloned())
    }

    async fn set_balance(&mut self, account_id: Uuid, balance: &BigDecimal) -> StoreResult<()> {
        let account = self
            .staged
            .accounts
            .values_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| StoreError::backend(format!("account {} vanished", account_id)))?;
        account.balance = balance.clone();
        Ok(())
    }

    async fn record_payment(&mut self, record: &PaymentRecord) -> StoreResult<()> {
        if self.staged.payments.contains_key(&record.order_id) {
            return Err(StoreError::Conflict(format!(
                "payment for order {} already recorded",
                record.order_id
            )));
        }
        self.staged.payments.insert(record.order_id, record.clone());
        Ok(())
    }

    async fn append_outbox(&mut self, message: NewMessage) -> StoreResult<()> {
        self.pending_outbox.push(message);
        Ok(())
    }

    async fn commit(mut self) -> StoreResult<()> {
        *self.guard = std::mem::take(&mut self.staged);
        for message in self.pending_outbox.drain(..) {
            self.outbox.push(message).await;
        }
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

/// Topic-routed channel: each routing key is bound to one durable queue that
/// buffers messages until its consumer takes them.
#[derive(Default, Clone)]
pub struct InMemoryChannel {
    queues: Arc<std::sync::Mutex<HashMap<String, Queue>>>,
}

struct Queue {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the consuming end of the queue bound to `routing_key`. Each queue
    /// has a single consumer; a second call returns `None`.
    pub fn subscribe(&self, routing_key: &str) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(routing_key.to_string())
            .or_insert_with(Queue::new)
            .rx
            .take()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryChannel {
    async fn publish(&self, routing_key: &str, _key: &str, payload: &[u8]) -> anyhow::Result<()> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues
            .entry(routing_key.to_string())
            .or_insert_with(Queue::new)
            .tx
            .send(payload.to_vec())
            .map_err(|_| anyhow::anyhow!("queue for {} is closed", routing_key))
    }
}
