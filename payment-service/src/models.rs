use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::{Account, PaymentRecord};
use uuid::Uuid;

use crate::schema::{accounts, processed_payments};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = accounts)]
pub struct AccountRow {
    pub id: Uuid,
    pub user_id: String,
    pub balance: BigDecimal,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            user_id: row.user_id,
            balance: row.balance,
        }
    }
}

impl From<&Account> for AccountRow {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            user_id: account.user_id.clone(),
            balance: account.balance.clone(),
        }
    }
}

/// The idempotency marker of one order's payment.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = processed_payments)]
pub struct ProcessedPaymentRow {
    pub order_id: Uuid,
    pub user_id: String,
    pub amount: BigDecimal,
    pub success: bool,
    pub message: String,
    pub processed_at: DateTime<Utc>,
}

impl From<ProcessedPaymentRow> for PaymentRecord {
    fn from(row: ProcessedPaymentRow) -> Self {
        PaymentRecord {
            order_id: row.order_id,
            user_id: row.user_id,
            amount: row.amount,
            success: row.success,
            message: row.message,
            processed_at: row.processed_at,
        }
    }
}

impl From<&PaymentRecord> for ProcessedPaymentRow {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            order_id: record.order_id,
            user_id: record.user_id.clone(),
            amount: record.amount.clone(),
            success: record.success,
            message: record.message.clone(),
            processed_at: record.processed_at,
        }
    }
}
