use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    Form, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::auth::{
    self, expired_session_cookie, new_session_token, session_cookie, session_expiry, AuthUser,
    LOGIN_PATH, SESSION_COOKIE,
};
use crate::database::{
    blocking,
    models::{AppointmentDetails, NewSession, Service, User},
};
use crate::error::{AppError, FieldErrors, Result};
use crate::forms::{time_slots, AppointmentForm, LoginForm, RegisterForm, TimeSlot};
use crate::state::AppState;

const BAD_CREDENTIALS: &str = "Please enter a correct username and password.";
const INVALID_SERVICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";

/// GET /health
#[instrument]
pub async fn health_handler() -> impl IntoResponse {
    "OK"
}

/// POST /register validates the form, stores the user and sends them to the login page.
#[instrument(skip(state, form), fields(username = %form.username))]
pub async fn register_handler(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Redirect> {
    form.clean()?;

    let store = state.store.clone();
    let user = blocking(move || {
        if store.find_user_by_username(&form.username)?.is_some() {
            return Err(AppError::field(
                "username",
                "A user with that username already exists.",
            ));
        }
        let hash = auth::hash_password(&form.password1)?;
        store.create_user(User::new(form.username, form.email, hash))
    })
    .await?;

    info!("Registered user {}", user.id);
    Ok(Redirect::to(LOGIN_PATH))
}

/// POST /login checks the credentials and opens a session.
#[instrument(skip(state, jar, form), fields(username = %form.username))]
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect)> {
    let mut errors = FieldErrors::new();
    if form.username.trim().is_empty() {
        errors.insert("username".into(), vec!["This field is required.".into()]);
    }
    if form.password.is_empty() {
        errors.insert("password".into(), vec!["This field is required.".into()]);
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let store = state.store.clone();
    let ttl_hours = state.session_ttl_hours;
    let (username, password) = (form.username.clone(), form.password.clone());
    let token = blocking(move || {
        let user = store
            .find_user_by_username(&username)?
            .ok_or_else(|| AppError::Auth(BAD_CREDENTIALS.to_string()))?;
        if !auth::verify_password(&user.password_hash, &password)? {
            return Err(AppError::Auth(BAD_CREDENTIALS.to_string()));
        }
        let token = new_session_token();
        store.create_session(NewSession {
            token: token.clone(),
            user_id: user.id,
            expires_at: session_expiry(ttl_hours),
        })?;
        Ok(token)
    })
    .await
    .inspect_err(|e| warn!("Login failed: {e}"))?;

    info!("User logged in");
    Ok((
        jar.add(session_cookie(token)),
        Redirect::to(form.redirect_target()),
    ))
}

/// GET|POST /logout ends the session, if any.
#[instrument(skip(state, jar))]
pub async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        let store = state.store.clone();
        blocking(move || store.delete_session(&token)).await?;
        info!("Session closed");
    }
    Ok((jar.remove(expired_session_cookie()), Redirect::to(LOGIN_PATH)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceQuery {
    pub search: Option<String>,
}

/// GET /services lists bookable services, optionally filtered by name.
#[instrument(skip(state))]
pub async fn list_services_handler(
    State(state): State<AppState>,
    Query(query): Query<ServiceQuery>,
) -> Result<Json<Vec<Service>>> {
    let store = state.store.clone();
    let services = blocking(move || store.list_services(query.search.as_deref())).await?;
    Ok(Json(services))
}

/// GET /appointments returns the caller's bookings, earliest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn my_appointments_handler(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<AppointmentDetails>>> {
    let store = state.store.clone();
    let appointments = blocking(move || store.list_appointments(user.id)).await?;
    Ok(Json(appointments))
}

#[derive(Debug, Serialize)]
pub struct BookingOptions {
    pub services: Vec<Service>,
    pub time_slots: Vec<TimeSlot>,
}

/// GET /book returns what the booking form offers.
#[instrument(skip(state, _user))]
pub async fn book_form_handler(
    _user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<BookingOptions>> {
    let store = state.store.clone();
    let services = blocking(move || store.list_services(None)).await?;
    Ok(Json(BookingOptions {
        services,
        time_slots: time_slots(),
    }))
}

/// POST /book validates the choice and echoes it back for confirmation. Nothing is stored yet.
#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn book_appointment_handler(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Form(form): Form<AppointmentForm>,
) -> Result<Json<Value>> {
    let request = form.clean()?;

    let store = state.store.clone();
    let service_id = request.service_id;
    let service = blocking(move || store.find_service(service_id))
        .await?
        .ok_or_else(|| AppError::field("service_id", INVALID_SERVICE))?;

    info!("Booking summary for service {}", service.id);
    Ok(Json(json!({
        "service": service,
        "appointment_date": request.appointment_date,
        "appointment_time": request.appointment_time.format("%H:%M:%S").to_string(),
    })))
}
