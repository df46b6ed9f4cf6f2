use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::api::rest::trip_responses;
use crate::auth::normalize_email;
use crate::engine::lifecycle::{self, TripDraft};
use crate::engine::pricing::{self, PriceQuote};
use crate::error::AppError;
use crate::geo;
use crate::models::trip::{GeoPoint, Location, Trip, TripResponse, VehicleType};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trips", post(create_trip))
        .route("/trips/calculate-price", get(calculate_price))
        .route("/trips/client/:email", get(trips_by_client))
}

fn one_passenger() -> u32 {
    1
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTripRequest {
    #[validate(length(min = 1, max = 100))]
    pub client_name: String,
    #[validate(length(min = 6, max = 30))]
    pub client_phone: String,
    #[validate(email)]
    pub client_email: String,
    pub pickup: Location,
    pub dropoff: Location,
    #[serde(default)]
    pub pickup_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub vehicle_type: VehicleType,
    #[serde(default = "one_passenger")]
    #[validate(range(min = 1, max = 8))]
    pub passengers: u32,
    #[serde(default)]
    pub luggage_count: u32,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub pickup_lat: Option<f64>,
    pub pickup_lng: Option<f64>,
    pub dropoff_lat: Option<f64>,
    pub dropoff_lng: Option<f64>,
}

async fn create_trip(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<TripResponse>), AppError> {
    payload.validate()?;

    let trip = lifecycle::book(
        &state,
        TripDraft {
            client_name: payload.client_name,
            client_phone: payload.client_phone,
            client_email: payload.client_email,
            pickup: payload.pickup,
            dropoff: payload.dropoff,
            pickup_at: payload.pickup_at,
            vehicle_type: payload.vehicle_type,
            passengers: payload.passengers,
            luggage_count: payload.luggage_count,
            notes: payload.notes,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(trip.into())))
}

fn point(lat: Option<f64>, lng: Option<f64>, which: &str) -> Result<GeoPoint, AppError> {
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Err(AppError::BadRequest(format!(
            "{which}_lat and {which}_lng are required"
        )));
    };

    let point = GeoPoint { lat, lng };
    if !geo::is_valid(&point) {
        return Err(AppError::BadRequest(format!("{which} coordinates out of range")));
    }
    Ok(point)
}

async fn calculate_price(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PriceQuery>,
) -> Result<Json<PriceQuote>, AppError> {
    let pickup = point(query.pickup_lat, query.pickup_lng, "pickup")?;
    let dropoff = point(query.dropoff_lat, query.dropoff_lng, "dropoff")?;

    Ok(Json(pricing::quote(&pickup, &dropoff, &state.config.tariff)))
}

/// Anonymous lookup of a customer's bookings, newest first.
async fn trips_by_client(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Json<Vec<TripResponse>> {
    Json(trip_responses(client_trips(&state, &email)))
}

pub fn client_trips(state: &AppState, email: &str) -> Vec<Trip> {
    let email = normalize_email(email);
    let mut trips: Vec<Trip> = state
        .trips
        .iter()
        .filter(|entry| entry.client_email == email)
        .map(|entry| entry.value().clone())
        .collect();

    trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    trips
}
