//! Diesel table definitions for the outbox.

diesel::table! {
    outbox (id) {
        id -> Text,
        topic -> Text,
        message_type -> Text,
        correlation_id -> Nullable<Text>,
        reply_to -> Nullable<Text>,
        content_type -> Text,
        body_type -> Text,
        payload -> Binary,
    }
}
