diesel::table! {
    reminders (id) {
        id -> Uuid,
        user_id -> Int8,
        medicine_id -> Int8,
        medicine_name -> Varchar,
        dosage -> Nullable<Varchar>,
        frequency -> Nullable<Varchar>,
        start_date -> Timestamp,
        end_date -> Nullable<Timestamp>,
        is_active -> Bool,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    reminder_times (reminder_id, reminder_time) {
        reminder_id -> Uuid,
        reminder_time -> Time,
    }
}

diesel::joinable!(reminder_times -> reminders (reminder_id));

diesel::allow_tables_to_appear_in_same_query!(
    reminders,
    reminder_times,
);
