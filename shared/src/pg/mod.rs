//! Postgres plumbing both services build their stores on: the pool, the
//! message row and the outbox/inbox adapter macro.

use chrono::{DateTime, Utc};
use diesel::Queryable;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::StoredMessage;
use crate::ports::StoreResult;
use crate::retry::StartupRetry;

mod messages;

pub type DbPool = Pool<AsyncPgConnection>;

pub async fn checkout(pool: &DbPool) -> StoreResult<PooledConnection<'_, AsyncPgConnection>> {
    pool.get().await.map_err(StoreError::backend)
}

/// Builds the pool and proves the database is reachable by checking out one
/// connection, retrying per `retry`.
pub async fn connect(database_url: &str, retry: &StartupRetry) -> anyhow::Result<DbPool> {
    let pool = retry
        .run("database", || async {
            let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
            let pool = Pool::builder().build(manager).await?;
            {
                let _conn = pool.get().await?;
            }
            Ok(pool)
        })
        .await?;
    info!("database connection pool ready");
    Ok(pool)
}

/// Row of an outbox or inbox table; both share the same columns.
#[derive(Debug, Clone, Queryable)]
pub struct MessageRow {
    pub id: Uuid,
    pub order_id: Uuid,
    pub payload: String,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        StoredMessage {
            id: row.id,
            order_id: row.order_id,
            payload: row.payload,
            processed: row.processed,
            created_at: row.created_at,
        }
    }
}
