use async_trait::async_trait;
use bigdecimal::BigDecimal;
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::PooledConnection;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, RunQueryDsl, TransactionManager};
use shared::pg::{checkout, DbPool};
use shared::{Account, LedgerStore, LedgerTx, NewMessage, PaymentRecord, StoreError, StoreResult};
use uuid::Uuid;

use crate::messages::PgOutbox;
use crate::models::{AccountRow, ProcessedPaymentRow};
use crate::schema::{accounts, processed_payments};

#[derive(Clone)]
pub struct PgLedger {
    pool: DbPool,
}

impl PgLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    type Tx = PgLedgerTx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        let mut conn = self.pool.get_owned().await.map_err(StoreError::backend)?;
        AnsiTransactionManager::begin_transaction(&mut *conn).await?;
        Ok(PgLedgerTx { conn })
    }

    async fn create_account(&self, account: &Account) -> StoreResult<()> {
        let mut conn = checkout(&self.pool).await?;
        diesel::insert_into(accounts::table)
            .values(AccountRow::from(account))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn find_account(&self, user_id: &str) -> StoreResult<Option<Account>> {
        let mut conn = checkout(&self.pool).await?;
        let row = accounts::table
            .filter(accounts::user_id.eq(user_id))
            .select(AccountRow::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Account::from))
    }

    async fn credit(&self, user_id: &str, amount: &BigDecimal) -> StoreResult<Option<Account>> {
        let mut conn = checkout(&self.pool).await?;
        let row = diesel::update(accounts::table.filter(accounts::user_id.eq(user_id)))
            .set(accounts::balance.eq(accounts::balance + amount.clone()))
            .returning(AccountRow::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Account::from))
    }
}

/// A ledger transaction pinned to one pooled connection.
///
/// If it is dropped without `commit` or `rollback` the connection goes back
/// to the pool still inside a transaction; the pool treats it as broken and
/// closes it, which makes Postgres roll the transaction back.
pub struct PgLedgerTx {
    conn: PooledConnection<'static, AsyncPgConnection>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn payment_record(&mut self, order_id: Uuid) -> StoreResult<Option<PaymentRecord>> {
        let row = processed_payments::table
            .find(order_id)
            .select(ProcessedPaymentRow::as_select())
            .first(&mut *self.conn)
            .await
            .optional()?;
        Ok(row.map(PaymentRecord::from))
    }

    async fn lock_account(&mut self, user_id: &str) -> StoreResult<Option<Account>> {
        let row = accounts::table
            .filter(accounts::user_id.eq(user_id))
            .select(AccountRow::as_select())
            .for_update()
            .first(&mut *self.conn)
            .await
            .optional()?;
        Ok(row.map(Account::from))
    }

    async fn set_balance(&mut self, account_id: Uuid, balance: &BigDecimal) -> StoreResult<()> {
        diesel::update(accounts::table.find(account_id))
            .set(accounts::balance.eq(balance))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn record_payment(&mut self, record: &PaymentRecord) -> StoreResult<()> {
        diesel::insert_into(processed_payments::table)
            .values(ProcessedPaymentRow::from(record))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn append_outbox(&mut self, message: NewMessage) -> StoreResult<()> {
        PgOutbox::insert(&mut self.conn, &message).await
    }

    async fn commit(mut self) -> StoreResult<()> {
        AnsiTransactionManager::commit_transaction(&mut *self.conn).await?;
        Ok(())
    }

    async fn rollback(mut self) -> StoreResult<()> {
        AnsiTransactionManager::rollback_transaction(&mut *self.conn).await?;
        Ok(())
    }
}
