use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Integer digits that fit a `NUMERIC(12,2)` column.
pub const MAX_INTEGER_DIGITS: i64 = 10;
/// Beyond this many fractional digits rounding gets expensive; such inputs
/// are refused rather than rounded.
pub const MAX_FRACTIONAL_DIGITS: i64 = 32;

fn normalize_amount(amount: &BigDecimal) -> BigDecimal {
    amount.round(2)
}

/// Inspects only the size of the mantissa and the exponent, so it stays cheap
/// for inputs like `1e100000000` or a long run of digits.
fn fits_column(amount: &BigDecimal) -> bool {
    let (mantissa, scale) = amount.as_bigint_and_exponent();
    // 10^(MAX_INTEGER_DIGITS + MAX_FRACTIONAL_DIGITS) < 2^140
    if scale > MAX_FRACTIONAL_DIGITS || mantissa.bits() > 140 {
        return false;
    }
    (amount.digits() as i64) - scale <= MAX_INTEGER_DIGITS
}

/// Normalizes `amount` to two decimals, or `None` when it is out of the
/// storable range (absolute value of 10^10 or more, before or after rounding).
pub fn checked_amount(amount: &BigDecimal) -> Option<BigDecimal> {
    if !fits_column(amount) {
        return None;
    }
    let rounded = normalize_amount(amount);
    fits_column(&rounded).then_some(rounded)
}

pub fn is_positive(amount: &BigDecimal) -> bool {
    amount > &BigDecimal::zero()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Paid => "PAID",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::New)
    }

    /// Terminal status announced by a payment result.
    pub fn from_payment(success: bool) -> Self {
        if success {
            OrderStatus::Paid
        } else {
            OrderStatus::Cancelled
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "PAID" => Ok(OrderStatus::Paid),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: String,
    pub amount: BigDecimal,
    pub description: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: String,
    pub balance: BigDecimal,
}

impl Account {
    pub fn new(user_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            balance: BigDecimal::zero(),
        }
    }
}

/// A row about to be written to an outbox or inbox table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub id: Uuid,
    pub order_id: Uuid,
    pub payload: String,
}

impl NewMessage {
    pub fn new(order_id: Uuid, payload: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            payload,
        }
    }
}

/// A persisted outbox or inbox row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: Uuid,
    pub order_id: Uuid,
    pub payload: String,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn from_new(message: NewMessage) -> Self {
        Self {
            id: message.id,
            order_id: message.order_id,
            payload: message.payload,
            processed: false,
            created_at: Utc::now(),
        }
    }
}

/// The decision taken for one order's payment, kept so a redelivered
/// request is recognised instead of debited again.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub order_id: Uuid,
    pub user_id: String,
    pub amount: BigDecimal,
    pub success: bool,
    pub message: String,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_outcome_picks_terminal_status() {
        assert_eq!(OrderStatus::from_payment(true), OrderStatus::Paid);
        assert_eq!(OrderStatus::from_payment(false), OrderStatus::Cancelled);
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
    }

    #[test]
    fn order_status_wire_format() {
        assert_eq!(serde_json::to_string(&OrderStatus::Cancelled).unwrap(), "\"CANCELLED\"");
        assert_eq!("PAID".parse::<OrderStatus>().unwrap(), OrderStatus::Paid);
        assert!("paid".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn amounts_are_kept_to_cents() {
        let amount = BigDecimal::from_str("12.3449").unwrap();
        assert_eq!(normalize_amount(&amount), BigDecimal::from_str("12.34").unwrap());
        assert!(is_positive(&BigDecimal::from_str("0.01").unwrap()));
        assert!(!is_positive(&BigDecimal::zero()));
    }

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn checked_amount_keeps_column_range() {
        assert_eq!(checked_amount(&dec("9999999999.99")), Some(dec("9999999999.99")));
        assert_eq!(checked_amount(&dec("-9999999999.99")), Some(dec("-9999999999.99")));
        assert_eq!(checked_amount(&dec("0.001")), Some(dec("0.00")));
        assert_eq!(checked_amount(&dec("10000000000")), None);
        assert_eq!(checked_amount(&dec("10000000000.00")), None);
        assert_eq!(checked_amount(&dec("9999999999.995")), None);
        assert_eq!(checked_amount(&dec("-1e11")), None);
    }

    #[test]
    fn huge_exponents_are_refused_without_expanding() {
        let started = std::time::Instant::now();
        assert_eq!(checked_amount(&dec("1e100000000")), None);
        assert_eq!(checked_amount(&dec("1e-100000000")), None);
        assert_eq!(checked_amount(&dec("0e-100000000")), None);
        assert_eq!(checked_amount(&dec(&"9".repeat(100_000))), None);
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }
}
