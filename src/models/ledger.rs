use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    TripCompleted,
    AdminAdjustment,
}

impl LedgerEntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerEntryKind::TripCompleted => "trip_completed",
            LedgerEntryKind::AdminAdjustment => "admin_adjustment",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub seq: u64,
    pub driver_id: Uuid,
    pub trip_id: Option<Uuid>,
    pub kind: LedgerEntryKind,
    pub trips_delta: i64,
    pub revenue_delta: Decimal,
    pub commission_delta: Decimal,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Driver totals as produced by replaying ledger entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LedgerTotals {
    pub total_trips: i64,
    pub total_revenue: Decimal,
    pub total_commission: Decimal,
}
