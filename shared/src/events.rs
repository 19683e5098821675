use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const EXCHANGE: &str = "payments";
pub const PAYMENT_REQUEST_KEY: &str = "payment.request";
pub const PAYMENT_RESPONSE_KEY: &str = "payment.response";
pub const PAYMENT_REQUEST_QUEUE: &str = "payment-requests";
pub const PAYMENT_RESPONSE_QUEUE: &str = "payment-responses";

pub const MSG_AMOUNT_NOT_POSITIVE: &str = "amount must be positive";
pub const MSG_AMOUNT_OUT_OF_RANGE: &str = "amount out of range";
pub const MSG_ACCOUNT_NOT_FOUND: &str = "account not found";
pub const MSG_INSUFFICIENT_FUNDS: &str = "insufficient funds";
pub const MSG_PAYMENT_PROCESSED: &str = "payment processed successfully";

/// Emitted by the order side, consumed by the payment saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequested {
    pub order_id: Uuid,
    pub user_id: String,
    pub amount: BigDecimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Emitted by the payment saga, consumed by the order state machine.
///
/// Only `order_id` and `success` are required on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub order_id: Uuid,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl PaymentResult {
    pub fn succeeded(order_id: Uuid, amount: BigDecimal) -> Self {
        Self {
            order_id,
            success: true,
            amount: Some(amount),
            message: MSG_PAYMENT_PROCESSED.to_string(),
        }
    }

    pub fn failed(order_id: Uuid, amount: BigDecimal, message: &str) -> Self {
        Self {
            order_id,
            success: false,
            amount: Some(amount),
            message: message.to_string(),
        }
    }

    /// A failure whose amount cannot be echoed back as a stored value.
    pub fn rejected(order_id: Uuid, message: &str) -> Self {
        Self {
            order_id,
            success: false,
            amount: None,
            message: message.to_string(),
        }
    }
}

/// Logical routing of the two saga events: one exchange, a routing key per
/// direction, each bound to its own durable queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub request_key: String,
    pub response_key: String,
    pub request_queue: String,
    pub response_queue: String,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            exchange: EXCHANGE.to_string(),
            request_key: PAYMENT_REQUEST_KEY.to_string(),
            response_key: PAYMENT_RESPONSE_KEY.to_string(),
            request_queue: PAYMENT_REQUEST_QUEUE.to_string(),
            response_queue: PAYMENT_RESPONSE_QUEUE.to_string(),
        }
    }
}

impl Topology {
    /// Broker-level destination for a routing key: `<exchange>.<routing key>`.
    pub fn destination(&self, routing_key: &str) -> String {
        format!("{}.{}", self.exchange, routing_key)
    }

    pub fn request_destination(&self) -> String {
        self.destination(&self.request_key)
    }

    pub fn response_destination(&self) -> String {
        self.destination(&self.response_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn payment_request_accepts_numeric_amount() {
        let order_id = Uuid::new_v4();
        let json = format!(
            r#"{{"order_id":"{}","user_id":"u1","amount":50,"description":"book"}}"#,
            order_id
        );
        let request: PaymentRequested = serde_json::from_str(&json).unwrap();
        assert_eq!(request.order_id, order_id);
        assert_eq!(request.amount, BigDecimal::from(50));
        assert_eq!(request.description.as_deref(), Some("book"));
    }

    #[test]
    fn payment_result_needs_only_order_and_success() {
        let order_id = Uuid::new_v4();
        let json = format!(r#"{{"order_id":"{}","success":true}}"#, order_id);
        let result: PaymentResult = serde_json::from_str(&json).unwrap();
        assert!(result.success);
        assert!(result.amount.is_none());
        assert!(result.message.is_empty());
    }

    #[test]
    fn payment_result_round_trips_amount() {
        let amount = BigDecimal::from_str("50.00").unwrap();
        let result = PaymentResult::failed(Uuid::new_v4(), amount.clone(), MSG_INSUFFICIENT_FUNDS);
        let decoded: PaymentResult =
            serde_json::from_str(&serde_json::to_string(&result).unwrap()).unwrap();
        assert_eq!(decoded.amount, Some(amount));
        assert_eq!(decoded.message, MSG_INSUFFICIENT_FUNDS);
    }

    #[test]
    fn topology_destinations() {
        let topology = Topology::default();
        assert_eq!(topology.request_destination(), "payments.payment.request");
        assert_eq!(topology.response_destination(), "payments.payment.response");
    }
}
