use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{normalize_email, password, Session};
use crate::error::AppError;
use crate::models::account::{Admin, Role};
use crate::models::client::Client;
use crate::models::driver::{ApprovalStatus, Driver, DriverStatus, Vehicle};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register_driver))
        .route("/auth/login", post(login))
        .route("/auth/client/register", post(register_client))
        .route("/auth/client/login", post(login_client))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterDriverRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 30))]
    pub phone: String,
    #[validate(length(min = 6, max = 100))]
    pub password: String,
    #[serde(default)]
    pub vehicle: Vehicle,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterClientRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[validate(length(min = 6, max = 100))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Account {
    Admin(Admin),
    Driver(Driver),
    Client(Client),
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub role: Role,
    pub user: Account,
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("invalid credentials".to_string())
}

async fn register_driver(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterDriverRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    if state.staff_email_taken(&email) {
        return Err(AppError::Conflict(format!("email {email} already registered")));
    }

    let now = Utc::now();
    let driver = Driver {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        email,
        phone: payload.phone.trim().to_string(),
        password_hash: password::hash(&payload.password, state.config.bcrypt_cost)?,
        vehicle: payload.vehicle,
        status: DriverStatus::default(),
        approval_status: ApprovalStatus::default(),
        is_active: true,
        commission_rate: state.config.default_commission_rate,
        total_trips: 0,
        total_revenue: Default::default(),
        total_commission: Default::default(),
        email_notifications: true,
        notes: String::new(),
        created_at: now,
        updated_at: now,
    };

    let token = state.tokens.issue(driver.id, Role::Driver, &driver.email)?;
    state.drivers.insert(driver.id, driver.clone());
    info!(driver_id = %driver.id, email = %driver.email, "driver registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            role: Role::Driver,
            user: Account::Driver(driver),
        }),
    ))
}

/// Staff login: admins first, then drivers.
async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.validate()?;
    let email = normalize_email(&payload.email);

    let admin = state
        .admins
        .iter()
        .find(|entry| entry.email == email)
        .map(|entry| entry.value().clone());
    if let Some(admin) = admin {
        if !password::verify(&payload.password, &admin.password_hash) {
            return Err(invalid_credentials());
        }
        let token = state.tokens.issue(admin.id, Role::Admin, &admin.email)?;
        info!(admin_id = %admin.id, "admin logged in");
        return Ok(Json(AuthResponse {
            token,
            role: Role::Admin,
            user: Account::Admin(admin),
        }));
    }

    let driver = state
        .drivers
        .iter()
        .find(|entry| entry.email == email)
        .map(|entry| entry.value().clone())
        .ok_or_else(invalid_credentials)?;

    if !password::verify(&payload.password, &driver.password_hash) {
        return Err(invalid_credentials());
    }
    if !driver.is_active {
        return Err(AppError::Forbidden("account disabled".to_string()));
    }

    let token = state.tokens.issue(driver.id, Role::Driver, &driver.email)?;
    info!(driver_id = %driver.id, "driver logged in");

    Ok(Json(AuthResponse {
        token,
        role: Role::Driver,
        user: Account::Driver(driver),
    }))
}

async fn register_client(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterClientRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    payload.validate()?;

    let email = normalize_email(&payload.email);
    if state.clients.iter().any(|entry| entry.email == email) {
        return Err(AppError::Conflict(format!("email {email} already registered")));
    }

    let client = Client {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        email,
        phone: payload.phone.trim().to_string(),
        password_hash: password::hash(&payload.password, state.config.bcrypt_cost)?,
        created_at: Utc::now(),
    };

    let token = state.tokens.issue(client.id, Role::Client, &client.email)?;
    state.clients.insert(client.id, client.clone());
    info!(client_id = %client.id, "client registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            role: Role::Client,
            user: Account::Client(client),
        }),
    ))
}

async fn login_client(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    payload.validate()?;
    let email = normalize_email(&payload.email);

    let client = state
        .clients
        .iter()
        .find(|entry| entry.email == email)
        .map(|entry| entry.value().clone())
        .ok_or_else(invalid_credentials)?;

    if !password::verify(&payload.password, &client.password_hash) {
        return Err(invalid_credentials());
    }

    let token = state.tokens.issue(client.id, Role::Client, &client.email)?;
    Ok(Json(AuthResponse {
        token,
        role: Role::Client,
        user: Account::Client(client),
    }))
}

async fn me(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Account>, AppError> {
    let missing = || AppError::NotFound("account not found".to_string());

    let account = match session.role {
        Role::Admin => state
            .admins
            .get(&session.subject)
            .map(|entry| Account::Admin(entry.value().clone()))
            .ok_or_else(missing)?,
        Role::Driver => state
            .drivers
            .get(&session.subject)
            .map(|entry| Account::Driver(entry.value().clone()))
            .ok_or_else(missing)?,
        Role::Client => state
            .clients
            .get(&session.subject)
            .map(|entry| Account::Client(entry.value().clone()))
            .ok_or_else(missing)?,
    };

    Ok(Json(account))
}
