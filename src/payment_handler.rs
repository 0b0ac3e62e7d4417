use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Form, Json,
};
use bigdecimal::BigDecimal;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::database::{
    blocking,
    models::{Payment, Service, VerifiedPayment},
    PAYMENT_ALREADY_PROCESSED,
};
use crate::error::{AppError, Result};
use crate::forms::{AppointmentForm, VerifyPaymentForm};
use crate::payment::{to_paise, CheckoutCallback, OrderRequest, CURRENCY};
use crate::state::AppState;

const BOOKING_MISMATCH: &str = "Appointment details do not match the confirmed order.";

/// Everything the browser checkout needs to collect the payment.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub key_id: String,
    pub order_id: String,
    pub amount: BigDecimal,
    pub amount_paise: i64,
    pub currency: String,
    pub service: Service,
    pub appointment_date: String,
    pub appointment_time: String,
}

/// POST /confirm creates a gateway order and an unpaid Payment, then hands back the checkout parameters.
#[instrument(skip(state, user, form), fields(user_id = %user.id))]
pub async fn confirm_appointment_handler(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Form(form): Form<AppointmentForm>,
) -> Result<Json<CheckoutResponse>> {
    let request = form.clean()?;

    let store = state.store.clone();
    let service_id = request.service_id;
    let service = blocking(move || store.find_service(service_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Invalid service selected.".to_string()))?;

    let amount_paise = to_paise(&service.price)?;
    let record_id = Uuid::new_v4();
    let order = state
        .gateway
        .create_order(&OrderRequest::auto_capture(
            amount_paise,
            Some(record_id.to_string()),
        ))
        .await?;

    let store = state.store.clone();
    let new_payment = Payment::unpaid(
        record_id,
        user.id,
        &request,
        order.id.clone(),
        service.price.clone(),
    );
    let payment = blocking(move || store.create_payment(new_payment)).await?;
    info!(
        "Created unpaid payment {} for order {}",
        payment.id, order.id
    );

    Ok(Json(CheckoutResponse {
        key_id: state.gateway.key_id().to_string(),
        order_id: order.id,
        amount: service.price.clone(),
        amount_paise,
        currency: CURRENCY.to_string(),
        service,
        appointment_date: request.appointment_date,
        appointment_time: request.appointment_time.format("%H:%M:%S").to_string(),
    }))
}

/// GET /confirm has nothing to confirm.
#[instrument(skip_all)]
pub async fn confirm_redirect_handler(_user: AuthUser) -> Redirect {
    Redirect::to("/appointments")
}

/// POST /verify_payment checks the checkout signature, marks the payment paid and books the appointment.
#[instrument(skip(state, user, form), fields(user_id = %user.id, order_id = %form.razorpay_order_id))]
pub async fn verify_payment_handler(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Form(form): Form<VerifyPaymentForm>,
) -> Result<Json<Value>> {
    let callback = CheckoutCallback {
        order_id: &form.razorpay_order_id,
        payment_id: &form.razorpay_payment_id,
        signature: &form.razorpay_signature,
    };
    state
        .gateway
        .verify_payment_signature(&callback)
        .inspect_err(|_| warn!("Payment signature mismatch"))?;

    let store = state.store.clone();
    let order_id = form.razorpay_order_id.clone();
    let payment = blocking(move || store.find_payment_by_order(&order_id))
        .await?
        .filter(|p| p.user_id == user.id)
        .ok_or_else(|| AppError::NotFound("Payment matching query does not exist.".to_string()))?;
    if payment.is_paid {
        return Err(AppError::BadRequest(PAYMENT_ALREADY_PROCESSED.to_string()));
    }

    let request = form.appointment().clean()?;
    if !payment.matches(&request) {
        warn!("Checkout booking differs from the confirmed order");
        return Err(AppError::BadRequest(BOOKING_MISMATCH.to_string()));
    }

    let store = state.store.clone();
    let service_id = payment.service_id;
    let service = blocking(move || store.find_service(service_id))
        .await?
        .ok_or_else(|| {
            AppError::BadRequest("Service matching query does not exist.".to_string())
        })?;

    let verified = VerifiedPayment {
        order_id: form.razorpay_order_id.clone(),
        payment_id: form.razorpay_payment_id.clone(),
        signature: form.razorpay_signature.clone(),
    };
    let appointment = payment.appointment();
    let store = state.store.clone();
    let booked = blocking(move || store.complete_payment(verified, appointment))
        .await
        .inspect_err(|e| error!("Failed to record verified payment: {e}"))?;

    info!(
        "Payment {} verified, appointment {} confirmed for service {}",
        payment.id, booked.id, service.id
    );
    Ok(Json(
        json!({ "message": "Payment Successful! Appointment confirmed." }),
    ))
}

/// Any non-POST request to /verify_payment.
#[instrument(skip_all)]
pub async fn invalid_verify_request_handler(_user: AuthUser) -> impl IntoResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Invalid request." })),
    )
}
