use chrono::NaiveDateTime;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppError, Result};

pub mod models;
pub mod schema;

use models::{
    Appointment, AppointmentDetails, NewAppointment, NewPayment, NewSession, NewUser, Payment,
    Service, User, VerifiedPayment,
};
use schema::{appointments, payments, services, sessions, users};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub const PAYMENT_ALREADY_PROCESSED: &str = "Payment has already been processed.";

pub fn create_db_pool(database_url: &str, max_size: u32) -> Result<PgPool> {
    info!("Connecting to database");

    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder().max_size(max_size).build(manager).map_err(|e| {
        error!("Failed to create database connection pool: {}", e);
        AppError::Pool(e)
    })?;

    // Verify connection works
    let _conn = get_conn(&pool)?;

    info!("Successfully connected to database");
    Ok(pool)
}

pub fn get_conn(pool: &PgPool) -> Result<PgPooledConnection> {
    pool.get().map_err(|e| {
        error!("Failed to get database connection from pool: {}", e);
        AppError::Pool(e)
    })
}

pub fn run_migrations(pool: &PgPool) -> Result<()> {
    let mut conn = get_conn(pool)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| AppError::Internal(format!("Migration error: {e}")))?;
    info!("Applied {} pending migrations", applied.len());
    Ok(())
}

/// Runs a synchronous store call on the blocking thread pool.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Blocking task failed: {e}")))?
}

/// Persistence operations used by the HTTP handlers.
pub trait Store: Send + Sync {
    /// Fails with a `username` validation error when the name is taken.
    fn create_user(&self, user: NewUser) -> Result<User>;
    fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    fn create_session(&self, session: NewSession) -> Result<()>;
    /// The session's user, unless the token is unknown or expired at `now`.
    fn find_session_user(&self, token: &str, now: NaiveDateTime) -> Result<Option<User>>;
    fn delete_session(&self, token: &str) -> Result<()>;

    fn list_services(&self, search: Option<&str>) -> Result<Vec<Service>>;
    fn find_service(&self, id: i32) -> Result<Option<Service>>;

    fn create_payment(&self, payment: NewPayment) -> Result<Payment>;
    fn find_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>>;
    /// Marks the order's payment as paid and books the appointment atomically.
    /// Only an unpaid payment owned by the appointment's user is claimed, so a
    /// replayed or concurrent callback fails with `PAYMENT_ALREADY_PROCESSED`.
    fn complete_payment(
        &self,
        verified: VerifiedPayment,
        appointment: NewAppointment,
    ) -> Result<Appointment>;

    /// The user's appointments ordered by date, then time.
    fn list_appointments(&self, user_id: Uuid) -> Result<Vec<AppointmentDetails>>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PgPooledConnection> {
        get_conn(&self.pool)
    }
}

impl Store for PgStore {
    fn create_user(&self, user: NewUser) -> Result<User> {
        let mut conn = self.conn()?;
        diesel::insert_into(users::table)
            .values(&user)
            .returning(User::as_returning())
            .get_result(&mut conn)
            .map_err(|e| match e {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    AppError::field("username", "A user with that username already exists.")
                }
                other => AppError::Database(other),
            })
    }

    fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::username.eq(username))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn create_session(&self, session: NewSession) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(sessions::table)
            .values(&session)
            .execute(&mut conn)?;
        Ok(())
    }

    fn find_session_user(&self, token: &str, now: NaiveDateTime) -> Result<Option<User>> {
        let mut conn = self.conn()?;
        Ok(sessions::table
            .inner_join(users::table)
            .filter(sessions::token.eq(token))
            .filter(sessions::expires_at.gt(now))
            .select(User::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn delete_session(&self, token: &str) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::delete(sessions::table.filter(sessions::token.eq(token))).execute(&mut conn)?;
        Ok(())
    }

    fn list_services(&self, search: Option<&str>) -> Result<Vec<Service>> {
        let mut conn = self.conn()?;
        let mut query = services::table
            .select(Service::as_select())
            .order(services::name.asc())
            .into_boxed();
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            query = query.filter(services::name.ilike(format!("%{term}%")));
        }
        Ok(query.load(&mut conn)?)
    }

    fn find_service(&self, id: i32) -> Result<Option<Service>> {
        let mut conn = self.conn()?;
        Ok(services::table
            .find(id)
            .select(Service::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn create_payment(&self, payment: NewPayment) -> Result<Payment> {
        let mut conn = self.conn()?;
        Ok(diesel::insert_into(payments::table)
            .values(&payment)
            .returning(Payment::as_returning())
            .get_result(&mut conn)?)
    }

    fn find_payment_by_order(&self, order_id: &str) -> Result<Option<Payment>> {
        let mut conn = self.conn()?;
        Ok(payments::table
            .filter(payments::order_id.eq(order_id))
            .select(Payment::as_select())
            .first(&mut conn)
            .optional()?)
    }

    fn complete_payment(
        &self,
        verified: VerifiedPayment,
        appointment: NewAppointment,
    ) -> Result<Appointment> {
        let mut conn = self.conn()?;
        conn.transaction::<_, AppError, _>(|conn| {
            let updated = diesel::update(
                payments::table
                    .filter(payments::order_id.eq(verified.order_id.as_str()))
                    .filter(payments::user_id.eq(appointment.user_id))
                    .filter(payments::is_paid.eq(false)),
            )
            .set((
                payments::payment_id.eq(verified.payment_id.as_str()),
                payments::signature.eq(verified.signature.as_str()),
                payments::is_paid.eq(true),
            ))
            .execute(conn)?;
            if updated == 0 {
                return Err(AppError::BadRequest(PAYMENT_ALREADY_PROCESSED.to_string()));
            }

            let booked = diesel::insert_into(appointments::table)
                .values(&appointment)
                .returning(Appointment::as_returning())
                .get_result(conn)?;
            Ok(booked)
        })
    }

    fn list_appointments(&self, user_id: Uuid) -> Result<Vec<AppointmentDetails>> {
        let mut conn = self.conn()?;
        let rows = appointments::table
            .inner_join(services::table)
            .filter(appointments::user_id.eq(user_id))
            .order((
                appointments::appointment_date.asc(),
                appointments::appointment_time.asc(),
            ))
            .select((Appointment::as_select(), Service::as_select()))
            .load::<(Appointment, Service)>(&mut conn)?;
        Ok(rows
            .into_iter()
            .map(|(appointment, service)| AppointmentDetails {
                appointment,
                service,
            })
            .collect())
    }
}
