use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DeliveryError, OrderError};
use crate::events::{
    PaymentRequested, PaymentResult, MSG_AMOUNT_NOT_POSITIVE, MSG_AMOUNT_OUT_OF_RANGE,
};
use crate::models::{checked_amount, is_positive, NewMessage, Order, OrderStatus};
use crate::ports::{MessageHandler, OrderStore};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub user_id: String,
    pub amount: BigDecimal,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Transitioned(OrderStatus),
    /// The order had already left NEW; the result was a redelivery.
    AlreadyTerminal(OrderStatus),
}

/// Order lifecycle: NEW on creation, PAID or CANCELLED once the payment
/// result arrives.
#[derive(Clone)]
pub struct OrderStateMachine<S> {
    store: S,
}

impl<S: OrderStore> OrderStateMachine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates the order in NEW together with its payment request outbox row.
    pub async fn create(&self, request: CreateOrder) -> Result<Order, OrderError> {
        let user_id = request.user_id.trim();
        if user_id.is_empty() {
            return Err(OrderError::Validation("user id is required".to_string()));
        }
        let amount = checked_amount(&request.amount)
            .ok_or_else(|| OrderError::Validation(MSG_AMOUNT_OUT_OF_RANGE.to_string()))?;
        if !is_positive(&amount) {
            return Err(OrderError::Validation(MSG_AMOUNT_NOT_POSITIVE.to_string()));
        }

        let order = Order {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            amount,
            description: request.description,
            status: OrderStatus::New,
            created_at: Utc::now(),
        };
        let event = PaymentRequested {
            order_id: order.id,
            user_id: order.user_id.clone(),
            amount: order.amount.clone(),
            description: Some(order.description.clone()),
        };
        let message = NewMessage::new(order.id, serde_json::to_string(&event)?);

        self.store.insert_with_outbox(&order, message).await?;
        info!(order_id = %order.id, user_id = %order.user_id, amount = %order.amount, "order created");

        Ok(order)
    }

    /// Applies a payment result. Results for orders that already left NEW are
    /// accepted without changing anything.
    pub async fn resolve(&self, result: &PaymentResult) -> Result<Resolution, OrderError> {
        let target = OrderStatus::from_payment(result.success);

        if self
            .store
            .transition(result.order_id, OrderStatus::New, target)
            .await?
        {
            info!(order_id = %result.order_id, status = %target, "order resolved");
            return Ok(Resolution::Transitioned(target));
        }

        match self.store.find(result.order_id).await? {
            Some(order) => {
                if order.status != target {
                    warn!(
                        order_id = %order.id,
                        status = %order.status,
                        announced = %target,
                        "conflicting payment result ignored"
                    );
                } else {
                    info!(order_id = %order.id, status = %order.status, "duplicate payment result ignored");
                }
                Ok(Resolution::AlreadyTerminal(order.status))
            }
            None => Err(OrderError::NotFound(result.order_id)),
        }
    }

    pub async fn get(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.store
            .find(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<Order>, OrderError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(OrderError::Validation("user id is required".to_string()));
        }
        let mut orders = self.store.list_by_user(user_id).await?;
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

/// Consumer of the payment response queue.
#[async_trait]
impl<S: OrderStore> MessageHandler for OrderStateMachine<S> {
    async fn handle(&self, payload: &[u8]) -> Result<(), DeliveryError> {
        let result: PaymentResult = serde_json::from_slice(payload)
            .map_err(|e| DeliveryError::Rejected(format!("invalid payment result: {}", e)))?;

        match self.resolve(&result).await {
            Ok(_) => Ok(()),
            Err(OrderError::NotFound(id)) => {
                Err(DeliveryError::Rejected(format!("payment result for unknown order {}", id)))
            }
            Err(e) => Err(DeliveryError::Transient(e.into())),
        }
    }
}
