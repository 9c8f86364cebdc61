diesel::table! {
    reminders (id) {
        id -> Integer,
        owner -> Text,
        task_text -> Text,
        original_context -> Nullable<Text>,
        due_at -> BigInt,
        notified -> Bool,
        deleted -> Bool,
        deleted_at -> Nullable<BigInt>,
        is_current_version -> Bool,
        version -> Integer,
        original_id -> Nullable<Integer>,
        recurrence_kind -> Nullable<Text>,
        recurrence_interval -> Nullable<Integer>,
        days_of_week -> Nullable<Text>,
        recurrence_end_at -> Nullable<BigInt>,
        last_fired_at -> Nullable<BigInt>,
        created_at -> BigInt,
        modified_at -> BigInt,
    }
}
