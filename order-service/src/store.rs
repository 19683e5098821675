use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use shared::pg::{checkout, DbPool};
use shared::{NewMessage, Order, OrderStatus, OrderStore, StoreError, StoreResult};
use uuid::Uuid;

use crate::models::OrderRow;
use crate::outbox::PgOutbox;
use crate::schema::orders;

#[derive(Clone)]
pub struct PgOrderStore {
    pool: DbPool,
}

impl PgOrderStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_with_outbox(&self, order: &Order, message: NewMessage) -> StoreResult<()> {
        let mut conn = checkout(&self.pool).await?;
        let row = OrderRow::from(order);

        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                diesel::insert_into(orders::table)
                    .values(&row)
                    .execute(conn)
                    .await?;
                PgOutbox::insert(conn, &message).await?;
                Ok(())
            })
        })
        .await
    }

    async fn transition(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> StoreResult<bool> {
        let mut conn = checkout(&self.pool).await?;
        let updated = diesel::update(
            orders::table
                .filter(orders::id.eq(order_id))
                .filter(orders::status.eq(from.as_str())),
        )
        .set(orders::status.eq(to.as_str()))
        .execute(&mut conn)
        .await?;
        Ok(updated == 1)
    }

    async fn find(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let mut conn = checkout(&self.pool).await?;
        orders::table
            .find(order_id)
            .select(OrderRow::as_select())
            .first(&mut conn)
            .await
            .optional()?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_by_user(&self, user_id: &str) -> StoreResult<Vec<Order>> {
        let mut conn = checkout(&self.pool).await?;
        orders::table
            .filter(orders::user_id.eq(user_id))
            .order(orders::created_at.asc())
            .select(OrderRow::as_select())
            .load(&mut conn)
            .await?
            .into_iter()
            .map(Order::try_from)
            .collect()
    }
}
