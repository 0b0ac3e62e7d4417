use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod face;
pub mod forms;
pub mod handlers;
pub mod payment;
pub mod payment_handler;
pub mod recommendation_handler;
pub mod state;

use handlers::{
    book_appointment_handler, book_form_handler, health_handler, list_services_handler,
    login_handler, logout_handler, my_appointments_handler, register_handler,
};
use payment_handler::{
    confirm_appointment_handler, confirm_redirect_handler, invalid_verify_request_handler,
    verify_payment_handler,
};
use recommendation_handler::{recommendation_handler, MAX_UPLOAD_BYTES};
pub use state::AppState;

/// HTTP routes of the booking service.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", get(logout_handler).post(logout_handler))
        .route("/services", get(list_services_handler))
        .route("/appointments", get(my_appointments_handler))
        .route(
            "/book",
            get(book_form_handler).post(book_appointment_handler),
        )
        .route(
            "/confirm",
            get(confirm_redirect_handler).post(confirm_appointment_handler),
        )
        .route(
            "/verify_payment",
            get(invalid_verify_request_handler).post(verify_payment_handler),
        )
        .route(
            "/recommendation",
            post(recommendation_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
