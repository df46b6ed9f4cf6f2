use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post, put};
use axum::Json;
use axum::Router;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::rest::{expected_version, VersionGuard};
use crate::auth::Session;
use crate::engine::ledger::{self, Adjustment, LedgerStatement};
use crate::engine::lifecycle::{self, Actor};
use crate::engine::matching;
use crate::engine::notifier;
use crate::engine::pricing;
use crate::engine::reporting::{self, PlatformStats};
use crate::error::AppError;
use crate::models::account::Role;
use crate::models::client::Client;
use crate::models::driver::{ApprovalStatus, Driver, DriverStatus};
use crate::models::notification::{Notification, Recipient};
use crate::models::trip::{Trip, TripResponse, TripStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/trips", get(list_trips))
        .route("/admin/trips/:id", delete(delete_trip))
        .route("/admin/trips/:id/assign", post(assign_trip))
        .route("/admin/trips/:id/publish", post(publish_trip))
        .route("/admin/trips/:id/unpublish", post(unpublish_trip))
        .route("/admin/trips/:id/ring", post(ring_trip))
        .route("/admin/trips/:id/cancel", post(cancel_trip))
        .route("/admin/trips/:id/commission", put(set_trip_commission))
        .route("/admin/trips/:id/price", put(set_trip_price))
        .route("/admin/drivers", get(list_drivers))
        .route("/admin/drivers/:id", delete(delete_driver))
        .route("/admin/drivers/:id/commission", put(set_driver_commission))
        .route("/admin/drivers/:id/notes", put(set_driver_notes))
        .route("/admin/drivers/:id/approval", put(set_driver_approval))
        .route("/admin/drivers/:id/toggle-active", put(toggle_driver_active))
        .route("/admin/drivers/:id/total-trips", put(set_total_trips))
        .route("/admin/drivers/:id/total-revenue", put(set_total_revenue))
        .route("/admin/drivers/:id/total-commission", put(set_total_commission))
        .route("/admin/drivers/:id/reset-commission", post(reset_commission))
        .route("/admin/drivers/:id/ledger", get(driver_ledger))
        .route("/admin/clients", get(list_clients))
        .route("/admin/clients/:id", delete(delete_client))
        .route("/admin/stats", get(stats))
        .route("/admin/notifications", get(notifications))
        .route("/admin/notifications/:id/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
pub struct TripFilter {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub driver_id: Uuid,
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CommissionRequest {
    pub commission_rate: Decimal,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PriceRequest {
    pub price: Decimal,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub approval_status: ApprovalStatus,
}

#[derive(Debug, Deserialize)]
pub struct TotalRequest<T> {
    pub value: T,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RingResponse {
    pub trip_id: Uuid,
    pub drivers_rung: usize,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub id: Uuid,
    pub deleted: bool,
}

fn admin(session: &Session) -> Result<(), AppError> {
    session.require(Role::Admin)
}

fn with_suggestion(state: &AppState, trip: Trip) -> TripResponse {
    let suggested_price = match (trip.price.is_zero(), trip.pickup.point(), trip.dropoff.point()) {
        (true, Some(pickup), Some(dropoff)) => {
            Some(pricing::quote(&pickup, &dropoff, &state.config.tariff).price)
        }
        _ => None,
    };

    TripResponse {
        suggested_price,
        ..TripResponse::from(trip)
    }
}

/// All trips, newest first, optionally filtered by `?status=`.
async fn list_trips(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(filter): Query<TripFilter>,
) -> Result<Json<Vec<TripResponse>>, AppError> {
    admin(&session)?;
    let status = filter
        .status
        .as_deref()
        .map(str::parse::<TripStatus>)
        .transpose()
        .map_err(AppError::BadRequest)?;

    let mut trips: Vec<Trip> = state
        .trips
        .iter()
        .filter(|entry| status.is_none_or(|status| entry.status == status))
        .map(|entry| entry.value().clone())
        .collect();
    trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(
        trips
            .into_iter()
            .map(|trip| with_suggestion(&state, trip))
            .collect(),
    ))
}

async fn delete_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, AppError> {
    admin(&session)?;
    let trip = lifecycle::delete(&state, id)?;
    Ok(Json(DeletedResponse {
        id: trip.id,
        deleted: true,
    }))
}

async fn assign_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<TripResponse>, AppError> {
    admin(&session)?;
    let trip = matching::assign(
        &state,
        id,
        payload.driver_id,
        payload.commission_rate,
        payload.expected_version,
    )
    .await?;
    Ok(Json(trip.into()))
}

async fn publish_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<VersionGuard>>,
) -> Result<Json<TripResponse>, AppError> {
    admin(&session)?;
    let trip = lifecycle::set_published(&state, id, true, expected_version(body)).await?;
    Ok(Json(trip.into()))
}

async fn unpublish_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<VersionGuard>>,
) -> Result<Json<TripResponse>, AppError> {
    admin(&session)?;
    let trip = lifecycle::set_published(&state, id, false, expected_version(body)).await?;
    Ok(Json(trip.into()))
}

async fn ring_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<RingResponse>, AppError> {
    admin(&session)?;
    let drivers_rung = matching::ring(&state, id).await?;
    Ok(Json(RingResponse {
        trip_id: id,
        drivers_rung,
    }))
}

async fn cancel_trip(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    body: Option<Json<VersionGuard>>,
) -> Result<Json<TripResponse>, AppError> {
    admin(&session)?;
    let trip = lifecycle::cancel(&state, id, Actor::Admin, expected_version(body)).await?;
    Ok(Json(trip.into()))
}

async fn set_trip_commission(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommissionRequest>,
) -> Result<Json<TripResponse>, AppError> {
    admin(&session)?;
    let trip = lifecycle::set_commission(
        &state,
        id,
        payload.commission_rate,
        payload.expected_version,
    )?;
    Ok(Json(trip.into()))
}

async fn set_trip_price(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<PriceRequest>,
) -> Result<Json<TripResponse>, AppError> {
    admin(&session)?;
    let trip = lifecycle::set_price(&state, id, payload.price, payload.expected_version).await?;
    Ok(Json(trip.into()))
}

async fn list_drivers(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<Driver>>, AppError> {
    admin(&session)?;
    let mut drivers: Vec<Driver> = state
        .drivers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    drivers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(drivers))
}

/// Applies `edit` to a driver record under its entry lock.
fn edit_driver<F>(state: &AppState, id: Uuid, edit: F) -> Result<Driver, AppError>
where
    F: FnOnce(&mut Driver),
{
    let mut driver = state
        .drivers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))?;

    edit(&mut driver);
    driver.updated_at = Utc::now();
    Ok(driver.clone())
}

async fn set_driver_commission(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommissionRequest>,
) -> Result<Json<Driver>, AppError> {
    admin(&session)?;
    let rate = lifecycle::validate_rate(payload.commission_rate)?;
    let driver = edit_driver(&state, id, |driver| driver.commission_rate = rate)?;
    info!(driver_id = %id, rate = %rate, "driver default commission changed");
    Ok(Json(driver))
}

async fn set_driver_notes(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<NotesRequest>,
) -> Result<Json<Driver>, AppError> {
    admin(&session)?;
    Ok(Json(edit_driver(&state, id, |driver| {
        driver.notes = payload.notes
    })?))
}

async fn set_driver_approval(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApprovalRequest>,
) -> Result<Json<Driver>, AppError> {
    admin(&session)?;
    let driver = edit_driver(&state, id, |driver| {
        driver.approval_status = payload.approval_status
    })?;
    info!(driver_id = %id, approval = ?payload.approval_status, "driver approval changed");
    Ok(Json(driver))
}

async fn toggle_driver_active(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    admin(&session)?;
    let driver = edit_driver(&state, id, |driver| {
        driver.is_active = !driver.is_active;
        if !driver.is_active {
            driver.status = DriverStatus::Offline;
        }
    })?;
    info!(driver_id = %id, active = driver.is_active, "driver activation toggled");
    Ok(Json(driver))
}

async fn set_total_trips(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<TotalRequest<u64>>,
) -> Result<Json<Driver>, AppError> {
    admin(&session)?;
    Ok(Json(ledger::override_total(
        &state,
        id,
        Adjustment::Trips(payload.value),
        payload.reason,
    )?))
}

async fn set_total_revenue(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<TotalRequest<Decimal>>,
) -> Result<Json<Driver>, AppError> {
    admin(&session)?;
    Ok(Json(ledger::override_total(
        &state,
        id,
        Adjustment::Revenue(payload.value),
        payload.reason,
    )?))
}

async fn set_total_commission(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
    Json(payload): Json<TotalRequest<Decimal>>,
) -> Result<Json<Driver>, AppError> {
    admin(&session)?;
    Ok(Json(ledger::override_total(
        &state,
        id,
        Adjustment::Commission(payload.value),
        payload.reason,
    )?))
}

/// Marks the driver's commission as settled.
async fn reset_commission(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Driver>, AppError> {
    admin(&session)?;
    Ok(Json(ledger::override_total(
        &state,
        id,
        Adjustment::Commission(Decimal::ZERO),
        Some("commission settled".to_string()),
    )?))
}

async fn driver_ledger(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<LedgerStatement>, AppError> {
    admin(&session)?;
    Ok(Json(ledger::statement(&state, id)?))
}

fn has_live_trip(state: &AppState, matches: impl Fn(&Trip) -> bool) -> bool {
    state
        .trips
        .iter()
        .any(|entry| !entry.status.is_terminal() && matches(entry.value()))
}

async fn delete_driver(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, AppError> {
    admin(&session)?;
    // The trip scan runs under the driver's entry lock. Trip locks are never
    // held while a driver lock is taken, so the order cannot deadlock.
    let removed = state
        .drivers
        .remove_if(&id, |_, _| !has_live_trip(&state, |trip| trip.is_bound_to(id)));
    if removed.is_none() {
        return Err(if state.drivers.contains_key(&id) {
            AppError::Conflict(format!("driver {id} still has active trips"))
        } else {
            AppError::NotFound(format!("driver {id} not found"))
        });
    }
    info!(driver_id = %id, "driver deleted");

    Ok(Json(DeletedResponse { id, deleted: true }))
}

async fn list_clients(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<Client>>, AppError> {
    admin(&session)?;
    let mut clients: Vec<Client> = state
        .clients
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    clients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(clients))
}

async fn delete_client(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, AppError> {
    admin(&session)?;
    let email = state
        .clients
        .get(&id)
        .map(|entry| entry.email.clone())
        .ok_or_else(|| AppError::NotFound(format!("client {id} not found")))?;

    let removed = state
        .clients
        .remove_if(&id, |_, _| !has_live_trip(&state, |trip| trip.client_email == email));
    if removed.is_none() {
        return Err(if state.clients.contains_key(&id) {
            AppError::Conflict(format!("client {id} still has active trips"))
        } else {
            AppError::NotFound(format!("client {id} not found"))
        });
    }
    info!(client_id = %id, "client deleted");

    Ok(Json(DeletedResponse { id, deleted: true }))
}

async fn stats(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<PlatformStats>, AppError> {
    admin(&session)?;
    Ok(Json(reporting::platform_stats(&state)))
}

async fn notifications(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<Notification>>, AppError> {
    admin(&session)?;
    Ok(Json(notifier::unread_for(&state, &Recipient::Admin)))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    admin(&session)?;
    Ok(Json(notifier::mark_read(&state, id, &Recipient::Admin)?))
}
