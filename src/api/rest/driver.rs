use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api::rest::{expected_version, trip_responses, VersionGuard};
use crate::auth::Session;
use crate::engine::ledger::{self, LedgerStatement};
use crate::engine::lifecycle::{self, Actor};
use crate::engine::matching;
use crate::engine::notifier;
use crate::engine::reporting::{self, DriverStats};
use crate::error::AppError;
use crate::models::account::Role;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::notification::{Notification, Recipient};
use crate::models::trip::TripResponse;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/driver/trips", get(my_trips))
        .route("/driver/stats", get(stats))
        .route("/driver/ledger", get(my_ledger))
        .route("/driver/status", put(update_status))
        .route("/driver/email-notifications", put(update_email_notifications))
        .route("/driver/trips/:id/accept", post(accept_trip))
        .route("/driver/trips/:id/refuse", post(refuse_trip))
        .route("/driver/trips/:id/approach", post(approach_trip))
        .route("/driver/trips/:id/start", post(start_trip))
        .route("/driver/trips/:id/complete", post(complete_trip))
        .route("/driver/trips/:id/cancel", post(cancel_trip))
        .route("/driver/notifications", get(notifications))
        .route("/driver/notifications/:id/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DriverStatus,
}

#[derive(Debug, Deserialize)]
pub struct EmailNotificationsRequest {
    pub enabled: bool,
}

fn current_driver(state: &AppState, session: &Session) -> Result<Driver, AppError> {
    session.require(Role::Driver)?;
    lifecycle::find_driver(state, session.subject)
}

fn driver_id(session: &Session) -> Result<Uuid, AppError> {
    session.require(Role::Driver)?;
    Ok(session.subject)
}

async fn my_trips(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<TripResponse>>, AppError> {
    let driver = current_driver(&state, &session)?;
    Ok(Json(trip_responses(matching::trips_for_driver(&state, &driver))))
}

async fn stats(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<DriverStats>, AppError> {
    let driver_id = driver_id(&session)?;
    Ok(Json(reporting::driver_stats(&state, driver_id, Utc::now())))
}

async fn my_ledger(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<LedgerStatement>, AppError> {
    let driver_id = driver_id(&session)?;
    Ok(Json(ledger::statement(&state, driver_id)?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver_id = driver_id(&session)?;
    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    driver.status = payload.status;
    driver.updated_at = Utc::now();
    info!(driver_id = %driver_id, status = ?payload.status, "driver status changed");

    Ok(Json(driver.clone()))
}

async fn update_email_notifications(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<EmailNotificationsRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver_id = driver_id(&session)?;
    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    driver.email_notifications = payload.enabled;
    driver.updated_at = Utc::now();

    Ok(Json(driver.clone()))
}

async fn accept_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<VersionGuard>>,
) -> Result<Json<TripResponse>, AppError> {
    let driver = current_driver(&state, &session)?;
    let trip = lifecycle::accept(&state, id, &driver, expected_version(body)).await?;
    Ok(Json(trip.into()))
}

async fn refuse_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<VersionGuard>>,
) -> Result<Json<TripResponse>, AppError> {
    let driver_id = driver_id(&session)?;
    let trip = lifecycle::refuse(&state, id, driver_id, expected_version(body))?;
    Ok(Json(trip.into()))
}

async fn approach_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<VersionGuard>>,
) -> Result<Json<TripResponse>, AppError> {
    let driver_id = driver_id(&session)?;
    let trip = lifecycle::approach(&state, id, driver_id, expected_version(body)).await?;
    Ok(Json(trip.into()))
}

async fn start_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<VersionGuard>>,
) -> Result<Json<TripResponse>, AppError> {
    let driver_id = driver_id(&session)?;
    let trip = lifecycle::start(&state, id, driver_id, expected_version(body))?;
    Ok(Json(trip.into()))
}

async fn complete_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<VersionGuard>>,
) -> Result<Json<TripResponse>, AppError> {
    let driver_id = driver_id(&session)?;
    let trip = lifecycle::complete(&state, id, driver_id, expected_version(body)).await?;
    Ok(Json(trip.into()))
}

async fn cancel_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<VersionGuard>>,
) -> Result<Json<TripResponse>, AppError> {
    let driver_id = driver_id(&session)?;
    let trip =
        lifecycle::cancel(&state, id, Actor::Driver(driver_id), expected_version(body)).await?;
    Ok(Json(trip.into()))
}

async fn notifications(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<Notification>>, AppError> {
    let driver_id = driver_id(&session)?;
    Ok(Json(notifier::unread_for(
        &state,
        &Recipient::Driver(driver_id),
    )))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let driver_id = driver_id(&session)?;
    Ok(Json(notifier::mark_read(
        &state,
        id,
        &Recipient::Driver(driver_id),
    )?))
}
