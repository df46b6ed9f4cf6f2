use std::sync::atomic::Ordering;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::pricing::{round_money, MAX_AMOUNT};
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::ledger::{LedgerEntry, LedgerEntryKind, LedgerTotals};
use crate::models::trip::{Trip, TripStatus};
use crate::state::AppState;

/// Target value of an admin override of one of the driver totals.
#[derive(Debug, Clone, Copy)]
pub enum Adjustment {
    Trips(u64),
    Revenue(Decimal),
    Commission(Decimal),
}

impl Adjustment {
    fn label(self) -> &'static str {
        match self {
            Adjustment::Trips(_) => "total_trips",
            Adjustment::Revenue(_) => "total_revenue",
            Adjustment::Commission(_) => "total_commission",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerStatement {
    pub driver_id: Uuid,
    pub entries: Vec<LedgerEntry>,
    pub replayed: LedgerTotals,
    pub materialized: LedgerTotals,
    pub balanced: bool,
}

fn next_seq(state: &AppState) -> u64 {
    state.ledger_seq.fetch_add(1, Ordering::SeqCst) + 1
}

fn materialized(driver: &Driver) -> LedgerTotals {
    LedgerTotals {
        total_trips: driver.total_trips as i64,
        total_revenue: driver.total_revenue,
        total_commission: driver.total_commission,
    }
}

/// Appends `entry` and applies it to the driver's totals. The caller holds the
/// driver's entry lock, so totals and entries move together. Totals that would
/// overflow or go negative leave both the driver and the ledger untouched.
fn apply(state: &AppState, driver: &mut Driver, entry: LedgerEntry) -> Result<(), AppError> {
    let out_of_range = || {
        AppError::Internal(format!(
            "ledger totals out of range for driver {}",
            entry.driver_id
        ))
    };

    let total_trips = i64::try_from(driver.total_trips)
        .ok()
        .and_then(|trips| trips.checked_add(entry.trips_delta))
        .and_then(|trips| u64::try_from(trips).ok())
        .ok_or_else(out_of_range)?;
    let total_revenue = driver
        .total_revenue
        .checked_add(entry.revenue_delta)
        .filter(|total| *total >= Decimal::ZERO)
        .ok_or_else(out_of_range)?;
    let total_commission = driver
        .total_commission
        .checked_add(entry.commission_delta)
        .filter(|total| *total >= Decimal::ZERO)
        .ok_or_else(out_of_range)?;

    driver.total_trips = total_trips;
    driver.total_revenue = total_revenue;
    driver.total_commission = total_commission;
    driver.updated_at = entry.created_at;

    state
        .metrics
        .ledger_entries_total
        .with_label_values(&[entry.kind.as_str()])
        .inc();
    state.ledger.insert(entry.id, entry);
    Ok(())
}

/// Credits a completed trip: one trip, its price, its commission.
pub fn record_completion(state: &AppState, trip: &Trip) -> Result<Driver, AppError> {
    if trip.status != TripStatus::Completed {
        return Err(AppError::Conflict(format!(
            "trip {} is not completed",
            trip.id
        )));
    }
    let driver_id = trip
        .driver_id
        .ok_or_else(|| AppError::Conflict(format!("trip {} has no driver", trip.id)))?;

    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    let commission = trip.commission_amount();
    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        seq: next_seq(state),
        driver_id,
        trip_id: Some(trip.id),
        kind: LedgerEntryKind::TripCompleted,
        trips_delta: 1,
        revenue_delta: trip.price,
        commission_delta: commission,
        reason: format!("trip {} completed", trip.id),
        created_at: Utc::now(),
    };

    apply(state, &mut driver, entry)?;
    info!(
        driver_id = %driver_id,
        trip_id = %trip.id,
        revenue = %trip.price,
        commission = %commission,
        "ledger credited"
    );

    Ok(driver.clone())
}

/// Moves one total to an arbitrary non-negative value, recording the
/// difference as an adjustment entry.
pub fn override_total(
    state: &AppState,
    driver_id: Uuid,
    adjustment: Adjustment,
    reason: Option<String>,
) -> Result<Driver, AppError> {
    let target_trips = match adjustment {
        Adjustment::Trips(value) => Some(i64::try_from(value).map_err(|_| {
            AppError::BadRequest(format!("{} is out of range", adjustment.label()))
        })?),
        Adjustment::Revenue(value) | Adjustment::Commission(value) => {
            if value < Decimal::ZERO {
                return Err(AppError::BadRequest(format!(
                    "{} cannot be negative",
                    adjustment.label()
                )));
            }
            if value > MAX_AMOUNT {
                return Err(AppError::BadRequest(format!(
                    "{} cannot exceed {MAX_AMOUNT}",
                    adjustment.label()
                )));
            }
            None
        }
    };

    let mut driver = state
        .drivers
        .get_mut(&driver_id)
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    let (trips_delta, revenue_delta, commission_delta) = match adjustment {
        Adjustment::Trips(_) => {
            let current = i64::try_from(driver.total_trips).map_err(|_| {
                AppError::Internal(format!("total_trips of driver {driver_id} is out of range"))
            })?;
            (target_trips.unwrap_or(current) - current, Decimal::ZERO, Decimal::ZERO)
        }
        Adjustment::Revenue(value) => (0, round_money(value) - driver.total_revenue, Decimal::ZERO),
        Adjustment::Commission(value) => (0, Decimal::ZERO, round_money(value) - driver.total_commission),
    };

    let entry = LedgerEntry {
        id: Uuid::new_v4(),
        seq: next_seq(state),
        driver_id,
        trip_id: None,
        kind: LedgerEntryKind::AdminAdjustment,
        trips_delta,
        revenue_delta,
        commission_delta,
        reason: reason.unwrap_or_else(|| format!("{} set by admin", adjustment.label())),
        created_at: Utc::now(),
    };

    apply(state, &mut driver, entry)?;
    info!(driver_id = %driver_id, field = adjustment.label(), "driver total overridden");

    Ok(driver.clone())
}

pub fn entries_for(state: &AppState, driver_id: Uuid) -> Vec<LedgerEntry> {
    let mut entries: Vec<LedgerEntry> = state
        .ledger
        .iter()
        .filter(|entry| entry.driver_id == driver_id)
        .map(|entry| entry.value().clone())
        .collect();

    entries.sort_by_key(|entry| entry.seq);
    entries
}

pub fn replay(entries: &[LedgerEntry]) -> LedgerTotals {
    entries
        .iter()
        .fold(LedgerTotals::default(), |mut totals, entry| {
            totals.total_trips += entry.trips_delta;
            totals.total_revenue += entry.revenue_delta;
            totals.total_commission += entry.commission_delta;
            totals
        })
}

/// Entries for one driver with the replayed totals checked against the
/// materialized ones.
pub fn statement(state: &AppState, driver_id: Uuid) -> Result<LedgerStatement, AppError> {
    let driver = state
        .drivers
        .get(&driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

    let entries = entries_for(state, driver_id);
    let replayed = replay(&entries);
    let materialized = materialized(&driver);

    Ok(LedgerStatement {
        driver_id,
        balanced: replayed == materialized,
        entries,
        replayed,
        materialized,
    })
}
