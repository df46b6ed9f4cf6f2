use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery topic of a notification: the admin desk, one driver, or one client
/// email (clients may book anonymously, so they are keyed by email).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Admin,
    Driver(Uuid),
    Client(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewTrip,
    PriceConfirmed,
    TripAssigned,
    TripPublished,
    Ring,
    DriverApproaching,
    PaymentDue,
    CollectPayment,
    TripCancelled,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::NewTrip => "new_trip",
            NotificationKind::PriceConfirmed => "price_confirmed",
            NotificationKind::TripAssigned => "trip_assigned",
            NotificationKind::TripPublished => "trip_published",
            NotificationKind::Ring => "ring",
            NotificationKind::DriverApproaching => "driver_approaching",
            NotificationKind::PaymentDue => "payment_due",
            NotificationKind::CollectPayment => "collect_payment",
            NotificationKind::TripCancelled => "trip_cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub trip_id: Option<Uuid>,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        recipient: Recipient,
        kind: NotificationKind,
        trip_id: Option<Uuid>,
        message: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient,
            kind,
            trip_id,
            message,
            read: false,
            created_at: Utc::now(),
        }
    }
}
