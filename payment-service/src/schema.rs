diesel::table! {
    accounts (id) {
        id -> Uuid,
        user_id -> Varchar,
        balance -> Numeric,
    }
}

diesel::table! {
    inbox_messages (id) {
        id -> Uuid,
        order_id -> Uuid,
        payload -> Text,
        processed -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    outbox_messages (id) {
        id -> Uuid,
        order_id -> Uuid,
        payload -> Text,
        processed -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    processed_payments (order_id) {
        order_id -> Uuid,
        user_id -> Varchar,
        amount -> Numeric,
        success -> Bool,
        message -> Text,
        processed_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    inbox_messages,
    outbox_messages,
    processed_payments,
);
