use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Vehicle {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub plate: String,
}

impl Vehicle {
    pub fn label(&self) -> String {
        [self.model.as_str(), self.color.as_str(), self.plate.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Available,
    Busy,
    EnRoute,
    #[default]
    Offline,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub vehicle: Vehicle,
    pub status: DriverStatus,
    pub approval_status: ApprovalStatus,
    pub is_active: bool,
    pub commission_rate: Decimal,
    pub total_trips: u64,
    pub total_revenue: Decimal,
    pub total_commission: Decimal,
    pub email_notifications: bool,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// Drivers allowed to see and claim published pending trips.
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.approval_status == ApprovalStatus::Approved
    }
}
