use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::rest::trip_responses;
use crate::api::rest::trips::client_trips;
use crate::auth::Session;
use crate::engine::notifier;
use crate::error::AppError;
use crate::models::account::Role;
use crate::models::notification::{Notification, Recipient};
use crate::models::trip::TripResponse;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/client/trips", get(my_trips))
        .route("/client/notifications", get(notifications))
        .route("/client/notifications/:id/read", post(mark_read))
}

fn recipient(session: &Session) -> Result<Recipient, AppError> {
    session.require(Role::Client)?;
    Ok(session.topic())
}

async fn my_trips(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<TripResponse>>, AppError> {
    session.require(Role::Client)?;
    Ok(Json(trip_responses(client_trips(&state, &session.email))))
}

async fn notifications(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<Vec<Notification>>, AppError> {
    let recipient = recipient(&session)?;
    Ok(Json(notifier::unread_for(&state, &recipient)))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let recipient = recipient(&session)?;
    Ok(Json(notifier::mark_read(&state, id, &recipient)?))
}
