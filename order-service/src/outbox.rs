use crate::schema::outbox_messages;

shared::pg_message_log!(PgOutbox, outbox_messages);
