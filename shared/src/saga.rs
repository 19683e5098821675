//! Payment side of the order/payment saga.
//!
//! One payment request becomes, inside a single ledger transaction:
//! a locked balance check, an optional debit, a `processed_payments` record
//! for the order and a payment-result outbox row. Business failures
//! (invalid amount, missing account, insufficient funds) are committed like
//! successes so the order side always receives a result.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use tracing::{info, warn};

use crate::error::{DeliveryError, StoreError};
use crate::events::{
    PaymentRequested, PaymentResult, MSG_ACCOUNT_NOT_FOUND, MSG_AMOUNT_NOT_POSITIVE,
    MSG_AMOUNT_OUT_OF_RANGE, MSG_INSUFFICIENT_FUNDS,
};
use crate::models::{checked_amount, is_positive, NewMessage, PaymentRecord, StoredMessage};
use crate::ports::{Delivery, LedgerStore, LedgerTx, StoreResult};

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentOutcome {
    /// Decided now; the result is committed to the outbox.
    Decided(PaymentResult),
    /// The order was decided by an earlier delivery; nothing was written.
    Duplicate(PaymentRecord),
}

impl PaymentOutcome {
    pub fn success(&self) -> bool {
        match self {
            PaymentOutcome::Decided(result) => result.success,
            PaymentOutcome::Duplicate(record) => record.success,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PaymentOutcome::Decided(result) => &result.message,
            PaymentOutcome::Duplicate(record) => &record.message,
        }
    }
}

#[derive(Clone)]
pub struct PaymentSaga<L> {
    ledger: L,
}

impl<L: LedgerStore> PaymentSaga<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub async fn process(&self, request: &PaymentRequested) -> StoreResult<PaymentOutcome> {
        info!(
            order_id = %request.order_id,
            user_id = %request.user_id,
            "processing payment"
        );
        let mut tx = self.ledger.begin().await?;

        match Self::settle(&mut tx, request).await {
            Ok(PaymentOutcome::Decided(result)) => {
                tx.commit().await?;
                info!(
                    order_id = %result.order_id,
                    success = result.success,
                    message = %result.message,
                    "payment decided"
                );
                Ok(PaymentOutcome::Decided(result))
            }
            Ok(PaymentOutcome::Duplicate(record)) => {
                tx.rollback().await?;
                info!(
                    order_id = %record.order_id,
                    success = record.success,
                    "payment request already handled, skipping"
                );
                Ok(PaymentOutcome::Duplicate(record))
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(order_id = %request.order_id, "rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn settle(tx: &mut L::Tx, request: &PaymentRequested) -> StoreResult<PaymentOutcome> {
        if let Some(record) = tx.payment_record(request.order_id).await? {
            return Ok(PaymentOutcome::Duplicate(record));
        }

        let result = match checked_amount(&request.amount) {
            Some(amount) => Self::debit(tx, request, amount).await?,
            None => PaymentResult::rejected(request.order_id, MSG_AMOUNT_OUT_OF_RANGE),
        };

        tx.record_payment(&PaymentRecord {
            order_id: request.order_id,
            user_id: request.user_id.clone(),
            amount: result.amount.clone().unwrap_or_default(),
            success: result.success,
            message: result.message.clone(),
            processed_at: Utc::now(),
        })
        .await?;

        let payload = serde_json::to_string(&result).map_err(|e| StoreError::Backend(e.into()))?;
        tx.append_outbox(NewMessage::new(request.order_id, payload))
            .await?;

        Ok(PaymentOutcome::Decided(result))
    }

    async fn debit(
        tx: &mut L::Tx,
        request: &PaymentRequested,
        amount: BigDecimal,
    ) -> StoreResult<PaymentResult> {
        let order_id = request.order_id;
        if !is_positive(&amount) {
            return Ok(PaymentResult::failed(order_id, amount, MSG_AMOUNT_NOT_POSITIVE));
        }

        let Some(account) = tx.lock_account(&request.user_id).await? else {
            return Ok(PaymentResult::failed(order_id, amount, MSG_ACCOUNT_NOT_FOUND));
        };

        if account.balance < amount {
            info!(
                order_id = %order_id,
                balance = %account.balance,
                amount = %amount,
                "insufficient funds"
            );
            return Ok(PaymentResult::failed(order_id, amount, MSG_INSUFFICIENT_FUNDS));
        }

        let balance = &account.balance - &amount;
        tx.set_balance(account.id, &balance).await?;
        info!(order_id = %order_id, account_id = %account.id, balance = %balance, "account debited");

        Ok(PaymentResult::succeeded(order_id, amount))
    }
}

/// Consumes inbox rows.
#[async_trait]
impl<L: LedgerStore> Delivery for PaymentSaga<L> {
    async fn deliver(&self, message: &StoredMessage) -> Result<(), DeliveryError> {
        let request: PaymentRequested = serde_json::from_str(&message.payload)
            .map_err(|e| DeliveryError::Rejected(format!("invalid payment request: {}", e)))?;
        self.process(&request).await?;
        Ok(())
    }
}
