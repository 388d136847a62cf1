// Table definitions for the timevault store.
//
// All timestamps are millisecond epoch values stored as 64-bit integers so
// unlock times decades out do not overflow.

diesel::table! {
    items (id) {
        id -> Text,
        kind -> Text,
        ciphertext -> Text,
        original_name -> Nullable<Text>,
        unlock_round -> BigInt,
        unlock_at -> BigInt,
        layer_count -> Integer,
        created_at -> BigInt,
        metadata -> Nullable<Text>,
    }
}

diesel::table! {
    api_tokens (token) {
        token -> Text,
        name -> Text,
        is_active -> Bool,
        created_at -> BigInt,
        last_used_at -> Nullable<BigInt>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(items, api_tokens);
