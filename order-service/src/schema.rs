diesel::table! {
    orders (id) {
        id -> Uuid,
        user_id -> Int8,
        total_amount -> Numeric,
        status -> Varchar,
        payment_status -> Varchar,
        shipping_address -> Text,
        payment_method -> Nullable<Varchar>,
        prescription_url -> Nullable<Text>,
        notes -> Nullable<Text>,
        order_date -> Timestamptz,
        delivery_date -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    order_items (id) {
        id -> Uuid,
        order_id -> Uuid,
        position -> Int4,
        medicine_id -> Int8,
        medicine_name -> Varchar,
        quantity -> Int4,
        price -> Numeric,
    }
}

diesel::joinable!(order_items -> orders (order_id));

diesel::allow_tables_to_appear_in_same_query!(
    orders,
    order_items,
);
