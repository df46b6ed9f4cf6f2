pub mod admin;
pub mod auth;
pub mod client;
pub mod driver;
pub mod trips;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::trip::{Trip, TripResponse};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let api = Router::new()
        .route("/", get(service_info))
        .merge(auth::router())
        .merge(trips::router())
        .merge(client::router())
        .merge(driver::router())
        .merge(admin::router())
        .route("/ws", get(ws::ws_handler));

    Router::new()
        .nest("/api", api)
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &str) -> CorsLayer {
    if origins.trim() == "*" {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Optional optimistic-concurrency guard accepted by every trip mutation.
/// An absent body means "no guard".
#[derive(Debug, Default, Deserialize)]
pub struct VersionGuard {
    #[serde(default)]
    pub expected_version: Option<u64>,
}

pub fn expected_version(body: Option<Json<VersionGuard>>) -> Option<u64> {
    body.and_then(|Json(guard)| guard.expected_version)
}

pub fn trip_responses(trips: Vec<Trip>) -> Vec<TripResponse> {
    trips.into_iter().map(TripResponse::from).collect()
}

#[derive(Serialize)]
struct ServiceInfo {
    service: &'static str,
    version: &'static str,
    notification_poll_seconds: u64,
    base_fare: Decimal,
    price_per_km: Decimal,
}

async fn service_info(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "mslk-vtc",
        version: env!("CARGO_PKG_VERSION"),
        notification_poll_seconds: state.config.notification_poll_seconds,
        base_fare: state.config.tariff.base_fare,
        price_per_km: state.config.tariff.price_per_km,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    trips: usize,
    drivers: usize,
    clients: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        trips: state.trips.len(),
        drivers: state.drivers.len(),
        clients: state.clients.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
