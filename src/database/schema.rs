use diesel::{allow_tables_to_appear_in_same_query, joinable, table};

pub mod sql_types {
    #[derive(diesel::query_builder::QueryId, diesel::sql_types::SqlType)]
    #[diesel(postgres_type(name = "appointment_status"))]
    pub struct AppointmentStatus;
}

// Defines database schema for diesel to use
table! {
    users (id) {
        id -> Uuid,
        username -> Varchar,
        email -> Varchar,
        password_hash -> Text,
        created_at -> Timestamp,
    }
}

table! {
    sessions (token) {
        token -> Text,
        user_id -> Uuid,
        created_at -> Timestamp,
        expires_at -> Timestamp,
    }
}

table! {
    services (id) {
        id -> Int4,
        name -> Varchar,
        price -> Numeric,
    }
}

table! {
    use diesel::sql_types::*;
    use super::sql_types::AppointmentStatus;

    appointments (id) {
        id -> Uuid,
        user_id -> Uuid,
        service_id -> Int4,
        appointment_date -> Varchar,
        appointment_time -> Time,
        status -> AppointmentStatus,
        created_at -> Timestamp,
    }
}

table! {
    payments (id) {
        id -> Uuid,
        user_id -> Uuid,
        service_id -> Int4,
        appointment_date -> Varchar,
        appointment_time -> Time,
        order_id -> Nullable<Varchar>,
        payment_id -> Nullable<Varchar>,
        signature -> Nullable<Varchar>,
        amount -> Numeric,
        is_paid -> Bool,
        created_at -> Timestamp,
    }
}

joinable!(sessions -> users (user_id));
joinable!(appointments -> users (user_id));
joinable!(appointments -> services (service_id));
joinable!(payments -> users (user_id));
joinable!(payments -> services (service_id));

allow_tables_to_appear_in_same_query!(users, sessions, services, appointments, payments);
