use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::matching::eligible_drivers;
use crate::engine::queue::TripEvent;
use crate::error::AppError;
use crate::models::notification::{Notification, NotificationKind, Recipient};
use crate::models::trip::Trip;
use crate::state::AppState;

pub async fn run_notification_engine(state: Arc<AppState>, mut event_rx: mpsc::Receiver<TripEvent>) {
    info!("notification engine started");

    while let Some(event) = event_rx.recv().await {
        state.metrics.events_in_queue.dec();

        let label = event.label();
        let notifications = notifications_for(&state, &event);
        debug!(event = label, count = notifications.len(), "trip event processed");

        for notification in notifications {
            deliver(&state, notification);
        }
    }

    warn!("notification engine stopped: event channel closed");
}

fn deliver(state: &AppState, notification: Notification) {
    state
        .metrics
        .notifications_total
        .with_label_values(&[notification.kind.as_str()])
        .inc();

    state
        .notifications
        .insert(notification.id, notification.clone());
    // No subscribers is the normal polling case.
    let _ = state.notification_tx.send(notification);
}

fn route(trip: &Trip) -> String {
    format!("{} -> {}", trip.pickup.address, trip.dropoff.address)
}

fn driver_label(trip: &Trip) -> &str {
    trip.driver_name.as_deref().unwrap_or("your driver")
}

pub fn notifications_for(state: &AppState, event: &TripEvent) -> Vec<Notification> {
    let client = |trip: &Trip| Recipient::Client(trip.client_email.clone());

    match event {
        TripEvent::Created(trip) => vec![Notification::new(
            Recipient::Admin,
            NotificationKind::NewTrip,
            Some(trip.id),
            format!(
                "New booking from {} ({}): {}",
                trip.client_name,
                trip.pickup_at.format("%d/%m/%Y %H:%M"),
                route(trip)
            ),
        )],
        TripEvent::PriceConfirmed(trip) => vec![Notification::new(
            client(trip),
            NotificationKind::PriceConfirmed,
            Some(trip.id),
            format!("Your trip price is confirmed: {} EUR", trip.price),
        )],
        TripEvent::Assigned(trip) => trip
            .driver_id
            .map(|driver_id| {
                vec![Notification::new(
                    Recipient::Driver(driver_id),
                    NotificationKind::TripAssigned,
                    Some(trip.id),
                    format!("New trip assigned to you: {}", route(trip)),
                )]
            })
            .unwrap_or_default(),
        TripEvent::Published(trip) => eligible_drivers(state)
            .into_iter()
            .map(|driver| {
                Notification::new(
                    Recipient::Driver(driver.id),
                    NotificationKind::TripPublished,
                    Some(trip.id),
                    format!("New trip available: {}", route(trip)),
                )
            })
            .collect(),
        TripEvent::Rung { trip, drivers } => drivers
            .iter()
            .map(|driver_id| {
                Notification::new(
                    Recipient::Driver(*driver_id),
                    NotificationKind::Ring,
                    Some(trip.id),
                    format!("Trip waiting for a driver: {}", route(trip)),
                )
            })
            .collect(),
        TripEvent::Approaching(trip) => vec![Notification::new(
            client(trip),
            NotificationKind::DriverApproaching,
            Some(trip.id),
            format!("{} is approaching {}", driver_label(trip), trip.pickup.address),
        )],
        TripEvent::Completed(trip) => {
            let mut out = vec![Notification::new(
                client(trip),
                NotificationKind::PaymentDue,
                Some(trip.id),
                format!("Trip completed. Amount due: {} EUR", trip.price),
            )];
            if let Some(driver_id) = trip.driver_id {
                out.push(Notification::new(
                    Recipient::Driver(driver_id),
                    NotificationKind::CollectPayment,
                    Some(trip.id),
                    format!("Collect {} EUR from {}", trip.price, trip.client_name),
                ));
            }
            out
        }
        TripEvent::Cancelled { trip, driver_id } => {
            let mut out = vec![Notification::new(
                client(trip),
                NotificationKind::TripCancelled,
                Some(trip.id),
                format!("Your trip {} has been cancelled", route(trip)),
            )];
            if let Some(driver_id) = driver_id {
                out.push(Notification::new(
                    Recipient::Driver(*driver_id),
                    NotificationKind::TripCancelled,
                    Some(trip.id),
                    format!("Trip cancelled: {}", route(trip)),
                ));
            }
            out
        }
    }
}

/// Unread notifications for one topic, oldest first. Fetching does not mark
/// them read; recipients acknowledge after processing.
pub fn unread_for(state: &AppState, recipient: &Recipient) -> Vec<Notification> {
    let mut unread: Vec<Notification> = state
        .notifications
        .iter()
        .filter(|entry| !entry.read && &entry.recipient == recipient)
        .map(|entry| entry.value().clone())
        .collect();

    unread.sort_by_key(|notification| notification.created_at);
    unread
}

/// Idempotent acknowledgement. Another recipient's notification reads as
/// not found.
pub fn mark_read(state: &AppState, id: Uuid, recipient: &Recipient) -> Result<Notification, AppError> {
    let mut notification = state
        .notifications
        .get_mut(&id)
        .filter(|entry| &entry.recipient == recipient)
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

    notification.read = true;
    Ok(notification.clone())
}
