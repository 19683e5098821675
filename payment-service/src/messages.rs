use crate::schema::{inbox_messages, outbox_messages};

shared::pg_message_log!(PgOutbox, outbox_messages);
shared::pg_message_log!(PgInbox, inbox_messages);
