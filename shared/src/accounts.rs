use bigdecimal::BigDecimal;
use tracing::info;

use crate::error::AccountError;
use crate::events::{MSG_AMOUNT_NOT_POSITIVE, MSG_AMOUNT_OUT_OF_RANGE};
use crate::models::{checked_amount, is_positive, Account};
use crate::ports::LedgerStore;

/// Synchronous account operations of the payment service.
#[derive(Clone)]
pub struct AccountService<L> {
    ledger: L,
}

impl<L: LedgerStore> AccountService<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub async fn create(&self, user_id: &str) -> Result<Account, AccountError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AccountError::Validation("user id is required".to_string()));
        }
        let account = Account::new(user_id);
        self.ledger.create_account(&account).await?;
        info!(user_id = %account.user_id, account_id = %account.id, "account created");
        Ok(account)
    }

    pub async fn get(&self, user_id: &str) -> Result<Account, AccountError> {
        self.ledger
            .find_account(user_id)
            .await?
            .ok_or(AccountError::NotFound)
    }

    pub async fn deposit(&self, user_id: &str, amount: &BigDecimal) -> Result<Account, AccountError> {
        let amount = checked_amount(amount)
            .ok_or_else(|| AccountError::Validation(MSG_AMOUNT_OUT_OF_RANGE.to_string()))?;
        if !is_positive(&amount) {
            return Err(AccountError::Validation(MSG_AMOUNT_NOT_POSITIVE.to_string()));
        }
        let account = self
            .ledger
            .credit(user_id, &amount)
            .await?
            .ok_or(AccountError::NotFound)?;
        info!(user_id = %user_id, amount = %amount, balance = %account.balance, "deposit applied");
        Ok(account)
    }
}
