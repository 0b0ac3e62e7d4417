use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{collect_field_errors, AppError, FieldErrors, Result};

const REQUIRED: &str = "This field is required.";

/// Bookable slots as `(value, label)`.
pub const TIME_SLOTS: [(&str, &str); 9] = [
    ("09:00:00", "9:00 AM"),
    ("10:00:00", "10:00 AM"),
    ("11:00:00", "11:00 AM"),
    ("12:00:00", "12:00 PM"),
    ("13:00:00", "1:00 PM"),
    ("14:00:00", "2:00 PM"),
    ("15:00:00", "3:00 PM"),
    ("16:00:00", "4:00 PM"),
    ("17:00:00", "5:00 PM"),
];

#[derive(Debug, Clone, Serialize)]
pub struct TimeSlot {
    pub value: &'static str,
    pub label: &'static str,
}

pub fn time_slots() -> Vec<TimeSlot> {
    TIME_SLOTS
        .iter()
        .map(|&(value, label)| TimeSlot { value, label })
        .collect()
}

/// Accepts `"HH:MM:SS"` or `"HH:MM"` as long as it names one of the slots.
pub fn parse_time_slot(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    let time = NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()?;
    TIME_SLOTS
        .iter()
        .filter_map(|(value, _)| NaiveTime::parse_from_str(value, "%H:%M:%S").ok())
        .find(|slot| *slot == time)
}

fn push(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors.entry(field.to_string()).or_default().push(message.into());
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct RegisterForm {
    #[validate(length(
        min = 1,
        max = 150,
        message = "Required. 150 characters or fewer."
    ))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    pub password1: String,
    pub password2: String,
}

impl RegisterForm {
    /// Field checks that don't need the database. Username uniqueness is left to the store.
    pub fn clean(&self) -> Result<()> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => collect_field_errors(&e),
        };

        if !self.username.is_empty()
            && !self
                .username
                .chars()
                .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
        {
            push(
                &mut errors,
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
        if self.email.is_empty() {
            errors.insert("email".to_string(), vec![REQUIRED.to_string()]);
        }

        if self.password1.is_empty() {
            push(&mut errors, "password1", REQUIRED);
        }
        if self.password2.is_empty() {
            push(&mut errors, "password2", REQUIRED);
        } else if self.password1 != self.password2 {
            push(&mut errors, "password2", "The two password fields didn’t match.");
        } else {
            for problem in password_problems(&self.password1, &self.username) {
                push(&mut errors, "password2", problem);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

fn password_problems(password: &str, username: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    if password.chars().count() < 8 {
        problems.push("This password is too short. It must contain at least 8 characters.");
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.");
    }
    let lowered = password.to_lowercase();
    let name = username.to_lowercase();
    if name.chars().count() >= 3 && (lowered.contains(&name) || name.contains(&lowered)) {
        problems.push("The password is too similar to the username.");
    }
    problems
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

impl LoginForm {
    /// `next` if it is a same-site path, else the booking page.
    pub fn redirect_target(&self) -> &str {
        match self.next.as_deref() {
            Some(next) if is_local_path(next) => next,
            _ => "/book",
        }
    }
}

/// Browsers read `//host` and `/\host` as scheme-relative URLs and drop control characters.
fn is_local_path(next: &str) -> bool {
    let mut chars = next.chars();
    chars.next() == Some('/')
        && !matches!(chars.next(), Some('/' | '\\'))
        && !next.chars().any(char::is_control)
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppointmentForm {
    pub service_id: String,
    pub appointment_date: String,
    pub appointment_time: String,
}

/// A validated appointment request. The service id is still unchecked against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentRequest {
    pub service_id: i32,
    pub appointment_date: String,
    pub appointment_time: NaiveTime,
}

impl AppointmentForm {
    pub fn clean(&self) -> Result<AppointmentRequest> {
        let mut errors = FieldErrors::new();

        let service_id = match self.service_id.trim() {
            "" => {
                push(&mut errors, "service_id", REQUIRED);
                None
            }
            raw => match raw.parse::<i32>() {
                Ok(id) => Some(id),
                Err(_) => {
                    push(
                        &mut errors,
                        "service_id",
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                    None
                }
            },
        };

        let appointment_date = self.appointment_date.trim().to_string();
        if appointment_date.is_empty() {
            push(&mut errors, "appointment_date", REQUIRED);
        } else if appointment_date.chars().count() > 20 {
            push(
                &mut errors,
                "appointment_date",
                "Ensure this value has at most 20 characters.",
            );
        }

        let appointment_time = if self.appointment_time.trim().is_empty() {
            push(&mut errors, "appointment_time", REQUIRED);
            None
        } else {
            let slot = parse_time_slot(&self.appointment_time);
            if slot.is_none() {
                push(
                    &mut errors,
                    "appointment_time",
                    format!(
                        "Select a valid choice. {} is not one of the available choices.",
                        self.appointment_time.trim()
                    ),
                );
            }
            slot
        };

        match (service_id, appointment_time) {
            (Some(service_id), Some(appointment_time)) if errors.is_empty() => {
                Ok(AppointmentRequest {
                    service_id,
                    appointment_date,
                    appointment_time,
                })
            }
            _ => Err(AppError::Validation(errors)),
        }
    }
}

/// Checkout callback fields plus the appointment being paid for.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VerifyPaymentForm {
    pub razorpay_payment_id: String,
    pub razorpay_order_id: String,
    pub razorpay_signature: String,
    pub service_id: String,
    pub appointment_date: String,
    pub appointment_time: String,
}

impl VerifyPaymentForm {
    pub fn appointment(&self) -> AppointmentForm {
        AppointmentForm {
            service_id: self.service_id.clone(),
            appointment_date: self.appointment_date.clone(),
            appointment_time: self.appointment_time.clone(),
        }
    }
}
