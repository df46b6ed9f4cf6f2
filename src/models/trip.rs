use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::pricing::round_money;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// A pickup or dropoff. Coordinates are optional; a missing or 0/0 pair means
/// the address has not been geocoded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub address: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl Location {
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat != 0.0 || lng != 0.0 => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    #[default]
    Berline,
    Van,
    Prestige,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    Pending,
    Assigned,
    Accepted,
    Approaching,
    InProgress,
    Completed,
    Cancelled,
}

impl TripStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TripStatus::Completed | TripStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TripStatus::Pending => "pending",
            TripStatus::Assigned => "assigned",
            TripStatus::Accepted => "accepted",
            TripStatus::Approaching => "approaching",
            TripStatus::InProgress => "in_progress",
            TripStatus::Completed => "completed",
            TripStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TripStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(TripStatus::Pending),
            "assigned" => Ok(TripStatus::Assigned),
            "accepted" => Ok(TripStatus::Accepted),
            "approaching" => Ok(TripStatus::Approaching),
            "in_progress" => Ok(TripStatus::InProgress),
            "completed" => Ok(TripStatus::Completed),
            "cancelled" => Ok(TripStatus::Cancelled),
            other => Err(format!("unknown trip status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub client_name: String,
    pub client_phone: String,
    pub client_email: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub pickup_at: DateTime<Utc>,
    pub vehicle_type: VehicleType,
    pub passengers: u32,
    pub luggage_count: u32,
    pub price: Decimal,
    pub distance_km: f64,
    pub status: TripStatus,
    pub published: bool,
    pub driver_id: Option<Uuid>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub driver_vehicle: Option<String>,
    pub commission_rate: Decimal,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Trip {
    /// Always derived from the current price and rate, never stored.
    pub fn commission_amount(&self) -> Decimal {
        round_money(self.price * self.commission_rate)
    }

    pub fn is_bound_to(&self, driver_id: Uuid) -> bool {
        self.driver_id == Some(driver_id)
    }

    pub fn unbind_driver(&mut self) {
        self.driver_id = None;
        self.driver_name = None;
        self.driver_phone = None;
        self.driver_vehicle = None;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.version += 1;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TripResponse {
    #[serde(flatten)]
    pub trip: Trip,
    pub commission_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_price: Option<Decimal>,
}

impl From<Trip> for TripResponse {
    fn from(trip: Trip) -> Self {
        Self {
            commission_amount: trip.commission_amount(),
            trip,
            suggested_price: None,
        }
    }
}
