use bigdecimal::BigDecimal;
use chrono::{NaiveDateTime, NaiveTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::{appointments, payments, services, sessions, users};
use crate::forms::AppointmentRequest;

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

impl User {
    pub fn new(username: String, email: String, password_hash: String) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
        }
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = sessions)]
pub struct NewSession {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = services)]
pub struct Service {
    pub id: i32,
    pub name: String,
    pub price: BigDecimal,
}

#[derive(diesel_derive_enum::DbEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[ExistingTypePath = "crate::database::schema::sql_types::AppointmentStatus"]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize)]
#[diesel(table_name = appointments)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: i32,
    pub appointment_date: String,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = appointments)]
pub struct NewAppointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: i32,
    pub appointment_date: String,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
}

impl Appointment {
    /// Appointments are only written once payment has cleared, so they start confirmed.
    pub fn confirmed(
        user_id: Uuid,
        service_id: i32,
        appointment_date: String,
        appointment_time: NaiveTime,
    ) -> NewAppointment {
        NewAppointment {
            id: Uuid::new_v4(),
            user_id,
            service_id,
            appointment_date,
            appointment_time,
            status: AppointmentStatus::Confirmed,
        }
    }
}

/// An appointment joined with the service it books.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub service: Service,
}

#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize)]
#[diesel(table_name = payments)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: i32,
    pub appointment_date: String,
    pub appointment_time: NaiveTime,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub signature: Option<String>,
    pub amount: BigDecimal,
    pub is_paid: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = payments)]
pub struct NewPayment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub service_id: i32,
    pub appointment_date: String,
    pub appointment_time: NaiveTime,
    pub order_id: Option<String>,
    pub amount: BigDecimal,
    pub is_paid: bool,
}

impl Payment {
    /// An order awaiting checkout for the given booking choice.
    pub fn unpaid(
        id: Uuid,
        user_id: Uuid,
        booking: &AppointmentRequest,
        order_id: String,
        amount: BigDecimal,
    ) -> NewPayment {
        NewPayment {
            id,
            user_id,
            service_id: booking.service_id,
            appointment_date: booking.appointment_date.clone(),
            appointment_time: booking.appointment_time,
            order_id: Some(order_id),
            amount,
            is_paid: false,
        }
    }

    /// Whether the booking submitted at checkout is the one this order was created for.
    pub fn matches(&self, booking: &AppointmentRequest) -> bool {
        self.service_id == booking.service_id
            && self.appointment_date == booking.appointment_date
            && self.appointment_time == booking.appointment_time
    }

    /// The confirmed appointment this payment pays for.
    pub fn appointment(&self) -> NewAppointment {
        Appointment::confirmed(
            self.user_id,
            self.service_id,
            self.appointment_date.clone(),
            self.appointment_time,
        )
    }
}

/// Gateway identifiers recorded once a checkout signature has been verified.
#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}
