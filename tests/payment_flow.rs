mod common;

use axum::http::StatusCode;
use common::{form, get, json_body, location, TestApp, GATEWAY_KEY, GATEWAY_SECRET};
use haircut_booking::{
    database::{
        models::{Appointment, AppointmentStatus, VerifiedPayment},
        Store, PAYMENT_ALREADY_PROCESSED,
    },
    error::AppError,
    payment::sign,
};

const BOOKING: &str = "service_id=2&appointment_date=2026-11-02&appointment_time=10%3A00%3A00";

#[tokio::test]
async fn booking_form_lists_services_and_slots() {
    let app = TestApp::new();
    let cookie = app.login_as("fay");

    let body = json_body(app.send(get("/book", Some(&cookie))).await).await;
    assert_eq!(body["services"].as_array().unwrap().len(), 3);
    assert_eq!(body["time_slots"].as_array().unwrap().len(), 9);
}

#[tokio::test]
async fn book_rejects_unknown_service() {
    let app = TestApp::new();
    let cookie = app.login_as("gus");

    let response = app
        .send(form(
            "POST",
            "/book",
            "service_id=42&appointment_date=2026-11-02&appointment_time=10%3A00%3A00",
            Some(&cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["errors"]["service_id"].is_array());
}

#[tokio::test]
async fn confirm_creates_unpaid_payment() {
    let app = TestApp::new();
    let cookie = app.login_as("hal");

    let response = app.send(form("POST", "/confirm", BOOKING, Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["key_id"], GATEWAY_KEY);
    assert_eq!(body["order_id"], "order_test_1");
    assert_eq!(body["amount_paise"], 12050);
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["appointment_time"], "10:00:00");

    let payments = app.store.payments();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].order_id.as_deref(), Some("order_test_1"));
    assert!(!payments[0].is_paid);
    assert_eq!(payments[0].service_id, 2);
    assert_eq!(payments[0].appointment_date, "2026-11-02");
    assert_eq!(payments[0].appointment_time.to_string(), "10:00:00");
    assert!(app.store.appointments().is_empty());

    let requests = app.gateway.requests.lock().unwrap();
    assert_eq!(requests[0].amount, 12050);
    assert_eq!(requests[0].receipt, Some(payments[0].id.to_string()));
}

#[tokio::test]
async fn verified_payment_books_the_appointment() {
    let app = TestApp::new();
    let cookie = app.login_as("ida");
    app.send(form("POST", "/confirm", BOOKING, Some(&cookie))).await;

    let signature = sign(GATEWAY_SECRET, "order_test_1", "pay_abc").unwrap();
    let body = format!(
        "razorpay_order_id=order_test_1&razorpay_payment_id=pay_abc&razorpay_signature={signature}&{BOOKING}"
    );
    let response = app
        .send(form("POST", "/verify_payment", &body, Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["message"],
        "Payment Successful! Appointment confirmed."
    );

    let payment = &app.store.payments()[0];
    assert!(payment.is_paid);
    assert_eq!(payment.payment_id.as_deref(), Some("pay_abc"));
    assert_eq!(payment.signature.as_deref(), Some(signature.as_str()));

    let appointments = app.store.appointments();
    assert_eq!(appointments.len(), 1);
    assert_eq!(appointments[0].service_id, 2);
    assert_eq!(appointments[0].appointment_date, "2026-11-02");
    assert_eq!(appointments[0].appointment_time.to_string(), "10:00:00");
    assert_eq!(appointments[0].status, AppointmentStatus::Confirmed);

    let listed = json_body(app.send(get("/appointments", Some(&cookie))).await).await;
    assert_eq!(listed[0]["service"]["name"], "Beard Trim");
    assert_eq!(listed[0]["status"], "confirmed");

    // A replayed callback must not book twice.
    let response = app
        .send(form("POST", "/verify_payment", &body, Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.store.appointments().len(), 1);
}

#[tokio::test]
async fn bad_signature_leaves_payment_unpaid() {
    let app = TestApp::new();
    let cookie = app.login_as("jon");
    app.send(form("POST", "/confirm", BOOKING, Some(&cookie))).await;

    let signature = sign("some-other-secret", "order_test_1", "pay_abc").unwrap();
    let body = format!(
        "razorpay_order_id=order_test_1&razorpay_payment_id=pay_abc&razorpay_signature={signature}&{BOOKING}"
    );
    let response = app
        .send(form("POST", "/verify_payment", &body, Some(&cookie)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Payment verification failed.");

    assert!(!app.store.payments()[0].is_paid);
    assert!(app.store.appointments().is_empty());
}

#[tokio::test]
async fn another_users_order_is_not_found() {
    let app = TestApp::new();
    let owner = app.login_as("kim");
    let intruder = app.login_as("lou");
    app.send(form("POST", "/confirm", BOOKING, Some(&owner))).await;

    let signature = sign(GATEWAY_SECRET, "order_test_1", "pay_xyz").unwrap();
    let body = format!(
        "razorpay_order_id=order_test_1&razorpay_payment_id=pay_xyz&razorpay_signature={signature}&{BOOKING}"
    );
    let response = app
        .send(form("POST", "/verify_payment", &body, Some(&intruder)))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!app.store.payments()[0].is_paid);
}

#[tokio::test]
async fn non_post_requests_are_turned_away() {
    let app = TestApp::new();
    let cookie = app.login_as("max");

    let response = app.send(get("/verify_payment", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid request.");

    let response = app.send(get("/confirm", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/appointments");
}

#[tokio::test]
async fn checkout_cannot_swap_the_confirmed_booking() {
    let app = TestApp::new();
    let cookie = app.login_as("ned");
    app.send(form("POST", "/confirm", BOOKING, Some(&cookie))).await;

    let signature = sign(GATEWAY_SECRET, "order_test_1", "pay_abc").unwrap();
    for booking in [
        "service_id=3&appointment_date=2026-11-02&appointment_time=10%3A00%3A00",
        "service_id=2&appointment_date=2027-01-01&appointment_time=10%3A00%3A00",
        "service_id=2&appointment_date=2026-11-02&appointment_time=17%3A00%3A00",
    ] {
        let body = format!(
            "razorpay_order_id=order_test_1&razorpay_payment_id=pay_abc&razorpay_signature={signature}&{booking}"
        );
        let response = app
            .send(form("POST", "/verify_payment", &body, Some(&cookie)))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{booking}");
        assert_eq!(
            json_body(response).await["error"],
            "Appointment details do not match the confirmed order."
        );
    }

    assert!(!app.store.payments()[0].is_paid);
    assert!(app.store.appointments().is_empty());
}

#[tokio::test]
async fn payment_is_claimed_only_once() {
    let app = TestApp::new();
    let cookie = app.login_as("ola");
    app.send(form("POST", "/confirm", BOOKING, Some(&cookie))).await;

    let payment = app.store.payments().remove(0);
    let verified = VerifiedPayment {
        order_id: "order_test_1".into(),
        payment_id: "pay_once".into(),
        signature: sign(GATEWAY_SECRET, "order_test_1", "pay_once").unwrap(),
    };

    let stranger = Appointment::confirmed(
        uuid::Uuid::new_v4(),
        payment.service_id,
        payment.appointment_date.clone(),
        payment.appointment_time,
    );
    assert!(matches!(
        app.store.complete_payment(verified.clone(), stranger),
        Err(AppError::BadRequest(_))
    ));

    let booked = app
        .store
        .complete_payment(verified.clone(), payment.appointment())
        .unwrap();
    assert_eq!(booked.service_id, 2);

    match app.store.complete_payment(verified, payment.appointment()) {
        Err(AppError::BadRequest(message)) => assert_eq!(message, PAYMENT_ALREADY_PROCESSED),
        other => panic!("second claim should fail, got {other:?}"),
    }
    assert_eq!(app.store.appointments().len(), 1);
}
