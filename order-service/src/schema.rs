diesel::table! {
    orders (id) {
        id -> Uuid,
        user_id -> Varchar,
        amount -> Numeric,
        description -> Text,
        status -> Varchar,
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

diesel::allow_tables_to_appear_in_same_query!(
    orders,
    outbox_messages,
);
