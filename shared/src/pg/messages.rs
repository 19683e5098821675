/// Generates a Postgres [`MessageLog`](crate::ports::MessageLog) for one
/// message table. `<Store>::insert` runs on a caller-supplied connection so
/// the row can join an open transaction.
///
/// The table module must be in scope at the call site and have the columns
/// `id`, `order_id`, `payload`, `processed` and `created_at`. The calling
/// crate needs `diesel`, `diesel-async`, `async-trait`, `chrono` and `uuid`.
///
/// ```ignore
/// use crate::schema::outbox_messages;
/// shared::pg_message_log!(PgOutbox, outbox_messages);
/// ```
#[macro_export]
macro_rules! pg_message_log {
    ($store:ident, $table:ident) => {
        #[derive(Clone)]
        pub struct $store {
            pool: $crate::pg::DbPool,
        }

        impl $store {
            pub fn new(pool: $crate::pg::DbPool) -> Self {
                Self { pool }
            }

            pub async fn insert(
                conn: &mut ::diesel_async::AsyncPgConnection,
                message: &$crate::models::NewMessage,
            ) -> $crate::ports::StoreResult<()> {
                use ::diesel::prelude::*;
                use ::diesel_async::RunQueryDsl;

                ::diesel::insert_into($table::table)
                    .values((
                        $table::id.eq(message.id),
                        $table::order_id.eq(message.order_id),
                        $table::payload.eq(&message.payload),
                    ))
                    .execute(conn)
                    .await?;
                Ok(())
            }
        }

        #[::async_trait::async_trait]
        impl $crate::ports::MessageLog for $store {
            async fn append(
                &self,
                message: $crate::models::NewMessage,
            ) -> $crate::ports::StoreResult<()> {
                let mut conn = $crate::pg::checkout(&self.pool).await?;
                Self::insert(&mut conn, &message).await
            }

            async fn list_unprocessed(
                &self,
                limit: i64,
            ) -> $crate::ports::StoreResult<Vec<$crate::models::StoredMessage>> {
                use ::diesel::prelude::*;
                use ::diesel_async::RunQueryDsl;

                let mut conn = $crate::pg::checkout(&self.pool).await?;
                let rows = $table::table
                    .filter($table::processed.eq(false))
                    .order($table::created_at.asc())
                    .limit(limit)
                    .select((
                        $table::id,
                        $table::order_id,
                        $table::payload,
                        $table::processed,
                        $table::created_at,
                    ))
                    .load::<$crate::pg::MessageRow>(&mut conn)
                    .await?;
                Ok(rows.into_iter().map(Into::into).collect())
            }

            async fn mark_processed(&self, id: ::uuid::Uuid) -> $crate::ports::StoreResult<()> {
                use ::diesel::prelude::*;
                use ::diesel_async::RunQueryDsl;

                let mut conn = $crate::pg::checkout(&self.pool).await?;
                ::diesel::update($table::table.filter($table::id.eq(id)))
                    .set($table::processed.eq(true))
                    .execute(&mut conn)
                    .await?;
                Ok(())
            }

            async fn oldest_unprocessed(
                &self,
            ) -> $crate::ports::StoreResult<Option<::chrono::DateTime<::chrono::Utc>>> {
                use ::diesel::prelude::*;
                use ::diesel_async::RunQueryDsl;

                let mut conn = $crate::pg::checkout(&self.pool).await?;
                let oldest = $table::table
                    .filter($table::processed.eq(false))
                    .select(::diesel::dsl::min($table::created_at))
                    .get_result(&mut conn)
                    .await?;
                Ok(oldest)
            }
        }
    };
}
