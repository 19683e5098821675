use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::{Order, StoreError};
use uuid::Uuid;

use crate::schema::orders;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = orders)]
pub struct OrderRow {
    pub id: Uuid,
    pub user_id: String,
    pub amount: BigDecimal,
    pub description: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderRow {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id.clone(),
            amount: order.amount.clone(),
            description: order.description.clone(),
            status: order.status.as_str().to_string(),
            created_at: order.created_at,
        }
    }
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            description: row.description,
            status: row.status.parse().map_err(StoreError::backend)?,
            created_at: row.created_at,
        })
    }
}
