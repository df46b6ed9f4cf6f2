use uuid::Uuid;

use crate::error::AppError;
use crate::models::trip::Trip;
use crate::state::AppState;

/// Lifecycle boundary crossed by a trip. The notifier turns each event into
/// notifications for the parties involved.
#[derive(Debug, Clone)]
pub enum TripEvent {
    Created(Trip),
    PriceConfirmed(Trip),
    Assigned(Trip),
    Published(Trip),
    Rung { trip: Trip, drivers: Vec<Uuid> },
    Approaching(Trip),
    Completed(Trip),
    Cancelled { trip: Trip, driver_id: Option<Uuid> },
}

impl TripEvent {
    pub fn label(&self) -> &'static str {
        match self {
            TripEvent::Created(_) => "created",
            TripEvent::PriceConfirmed(_) => "price_confirmed",
            TripEvent::Assigned(_) => "assigned",
            TripEvent::Published(_) => "published",
            TripEvent::Rung { .. } => "rung",
            TripEvent::Approaching(_) => "approaching",
            TripEvent::Completed(_) => "completed",
            TripEvent::Cancelled { .. } => "cancelled",
        }
    }
}

pub async fn enqueue_event(state: &AppState, event: TripEvent) -> Result<(), AppError> {
    state
        .event_tx
        .send(event)
        .await
        .map_err(|err| AppError::Internal(format!("event queue send failed: {err}")))?;

    state.metrics.events_in_queue.inc();
    Ok(())
}

/// Notifications are side effects: a full or closed queue is logged and the
/// triggering request still succeeds.
pub async fn publish(state: &AppState, event: TripEvent) {
    let label = event.label();
    if let Err(err) = enqueue_event(state, event).await {
        tracing::warn!(event = label, error = %err, "dropping trip event");
    }
}
