#![allow(dead_code)]

use std::str::FromStr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::bail;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, Response},
    Router,
};
use bigdecimal::BigDecimal;
use chrono::{NaiveDateTime, Utc};
use haircut_booking::{
    app, auth,
    database::{
        models::{
            Appointment, AppointmentDetails, NewAppointment, NewPayment, NewSession, NewUser,
            Payment, Service, User, VerifiedPayment,
        },
        Store, PAYMENT_ALREADY_PROCESSED,
    },
    error::{AppError, Result},
    face::{FaceAnalyzer, FaceBox, FaceDetector, LandmarkPredictor, Landmarks},
    payment::{self, CheckoutCallback, Order, OrderRequest, PaymentGateway},
    AppState,
};
use image::DynamicImage;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const GATEWAY_SECRET: &str = "test_secret";
pub const GATEWAY_KEY: &str = "rzp_test_key";

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    sessions: Vec<NewSession>,
    services: Vec<Service>,
    payments: Vec<Payment>,
    appointments: Vec<Appointment>,
}

/// Store backed by plain vectors.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn with_services(services: &[(i32, &str, &str)]) -> Self {
        let store = Self::default();
        {
            let mut tables = store.tables.lock().unwrap();
            for (id, name, price) in services {
                tables.services.push(Service {
                    id: *id,
                    name: name.to_string(),
                    price: BigDecimal::from_str(price).unwrap(),
                });
            }
        }
        store
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.tables.lock().unwrap().payments.clone()
    }

    pub fn appointments(&self) -> Vec<Appointment> {
        self.tables.lock().unwrap().appointments.clone()
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

impl Store for MemoryStore {
    fn create_user(&self, user: NewUser) -> Result<User> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(AppError::field(
                "username",
                "A user with that username already exists.",
            ));
        }
        let created = User {
            id: user.id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now(),
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    fn create_session(&self, session: NewSession) -> Result<()> {
        self.tables.lock().unwrap().sessions.push(session);
        Ok(())
    }

    fn find_session_user(&self, token: &str, now: NaiveDateTime) -> Result<Option<User>> {
        let tables = self.tables.lock().unwrap();
        let Some(session) = tables
            .sessions
            .iter()
            .find(|s| s.token == token && s.expires_at > now)
        else {
            return Ok(None);
        };
        Ok(tables.users.iter().find(|u| u.id == session.user_id).cloned())
    }

    fn delete_session(&self, token: &str) -> Result<()> {
        self.tables
            .lock()
            .unwrap()
            .sessions
            .retain(|s| s.token != token);
        Ok(())
    }

    fn list_services(&self, search: Option<&str>) -> Result<Vec<Service>> {
        let tables = self.tables.lock().unwrap();
        let term = search.map(|s| s.trim().to_lowercase()).unwrap_or_default();
        let mut services: Vec<Service> = tables
            .services
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&term))
            .cloned()
            .collect();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(services)
    }

    fn find_service(&self, id: i32) -> Result<Option<Service>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.services.iter().find(|s| s.id == id).cloned())
    }

    fn create_payment(&self, payment: NewPayment) -> Result<Payment> {
        let created = Payment {
            id: payment.id,
            user_id: payment.user_id,
            service_id: payment.service_id,
            appointment_date: payment.appointment_date,
            appointment_time: payment.appointment_time,
            order_id: payment.order_id,
            payment_id: None,
            signature: None,
            amount: payment.amount,
            is_paid: payment.is_paid,
            created_at: now(),
        };
        self.tables.lock().unwrap().payments.push(created.clone());
        Ok(created)
    }

    fn find_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .payments
            .iter()
            .find(|p| p.order_id.as_deref() == Some(order_id))
            .cloned())
    }

    fn complete_payment(
        &self,
        verified: VerifiedPayment,
        appointment: NewAppointment,
    ) -> Result<Appointment> {
        let mut tables = self.tables.lock().unwrap();
        let payment = tables
            .payments
            .iter_mut()
            .find(|p| {
                p.order_id.as_deref() == Some(verified.order_id.as_str())
                    && p.user_id == appointment.user_id
                    && !p.is_paid
            })
            .ok_or_else(|| AppError::BadRequest(PAYMENT_ALREADY_PROCESSED.to_string()))?;
        payment.payment_id = Some(verified.payment_id);
        payment.signature = Some(verified.signature);
        payment.is_paid = true;

        let booked = Appointment {
            id: appointment.id,
            user_id: appointment.user_id,
            service_id: appointment.service_id,
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time,
            status: appointment.status,
            created_at: now(),
        };
        tables.appointments.push(booked.clone());
        Ok(booked)
    }

    fn list_appointments(&self, user_id: Uuid) -> Result<Vec<AppointmentDetails>> {
        let tables = self.tables.lock().unwrap();
        let mut rows: Vec<AppointmentDetails> = tables
            .appointments
            .iter()
            .filter(|a| a.user_id == user_id)
            .filter_map(|a| {
                let service = tables.services.iter().find(|s| s.id == a.service_id)?;
                Some(AppointmentDetails {
                    appointment: a.clone(),
                    service: service.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            (&a.appointment.appointment_date, a.appointment.appointment_time)
                .cmp(&(&b.appointment.appointment_date, b.appointment.appointment_time))
        });
        Ok(rows)
    }
}

/// Hands out sequential order ids and checks signatures with a fixed secret.
#[derive(Default)]
pub struct StubGateway {
    orders: AtomicUsize,
    pub requests: Mutex<Vec<OrderRequest>>,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn key_id(&self) -> &str {
        GATEWAY_KEY
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        Ok(Order {
            id: format!("order_test_{n}"),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: request.receipt.clone(),
            status: Some("created".into()),
        })
    }

    fn verify_payment_signature(&self, callback: &CheckoutCallback<'_>) -> Result<()> {
        payment::verify_signature(GATEWAY_SECRET, callback)
    }
}

pub struct NoFaces;

impl FaceDetector for NoFaces {
    fn detect(&mut self, _image: &DynamicImage) -> anyhow::Result<Vec<FaceBox>> {
        Ok(Vec::new())
    }
}

pub struct NoLandmarks;

impl LandmarkPredictor for NoLandmarks {
    fn predict(&mut self, _image: &DynamicImage, _face: &FaceBox) -> anyhow::Result<Landmarks> {
        bail!("no landmark model in tests")
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<StubGateway>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::with_services(&[
            (1, "Classic Cut", "250.00"),
            (2, "Beard Trim", "120.50"),
            (3, "Hair Colouring", "899.99"),
        ]));
        let gateway = Arc::new(StubGateway::default());
        let state = AppState {
            store: store.clone(),
            gateway: gateway.clone(),
            faces: Arc::new(FaceAnalyzer::new(Box::new(NoFaces), Box::new(NoLandmarks))),
            session_ttl_hours: 24,
        };
        Self {
            router: app(state),
            store,
            gateway,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Registers a user directly in the store and returns a session cookie header value.
    pub fn login_as(&self, username: &str) -> String {
        let hash = auth::hash_password("s3cure-pass-99").unwrap();
        let user = self
            .store
            .create_user(User::new(username.into(), format!("{username}@example.com"), hash))
            .unwrap();
        let token = auth::new_session_token();
        self.store
            .create_session(NewSession {
                token: token.clone(),
                user_id: user.id,
                expires_at: auth::session_expiry(1),
            })
            .unwrap();
        format!("{}={token}", auth::SESSION_COOKIE)
    }
}

pub fn form(method: &str, uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
