use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::pricing::round_money;
use crate::models::trip::{Trip, TripStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DriverStats {
    pub daily_revenue: Decimal,
    pub weekly_revenue: Decimal,
    pub monthly_revenue: Decimal,
    pub total_trips: usize,
    pub completed_trips: usize,
    pub commission_due: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlatformStats {
    pub total_trips: usize,
    pub completed_trips: usize,
    pub pending_trips: usize,
    pub total_revenue: Decimal,
    pub total_commission: Decimal,
    /// Share of trips that reached a driver, in percent with one decimal.
    pub acceptance_rate: Decimal,
}

struct Periods {
    day: DateTime<Utc>,
    week: DateTime<Utc>,
    month: DateTime<Utc>,
}

fn periods(now: DateTime<Utc>) -> Periods {
    let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
    let week = midnight - Duration::days(now.weekday().num_days_from_monday() as i64);
    let month = now
        .date_naive()
        .with_day(1)
        .unwrap_or_else(|| now.date_naive())
        .and_time(NaiveTime::MIN)
        .and_utc();

    Periods {
        day: midnight,
        week,
        month,
    }
}

fn revenue_since(trips: &[&Trip], since: DateTime<Utc>) -> Decimal {
    trips
        .iter()
        .filter(|trip| trip.completed_at.is_some_and(|at| at >= since))
        .map(|trip| trip.price)
        .sum()
}

pub fn driver_stats(state: &AppState, driver_id: Uuid, now: DateTime<Utc>) -> DriverStats {
    let trips: Vec<Trip> = state
        .trips
        .iter()
        .filter(|entry| entry.is_bound_to(driver_id))
        .map(|entry| entry.value().clone())
        .collect();
    let completed: Vec<&Trip> = trips
        .iter()
        .filter(|trip| trip.status == TripStatus::Completed)
        .collect();
    let periods = periods(now);

    let commission_due: Decimal = completed
        .iter()
        .filter(|trip| trip.completed_at.is_some_and(|at| at >= periods.month))
        .map(|trip| trip.commission_amount())
        .sum();

    DriverStats {
        daily_revenue: round_money(revenue_since(&completed, periods.day)),
        weekly_revenue: round_money(revenue_since(&completed, periods.week)),
        monthly_revenue: round_money(revenue_since(&completed, periods.month)),
        total_trips: trips.len(),
        completed_trips: completed.len(),
        commission_due: round_money(commission_due),
    }
}

pub fn platform_stats(state: &AppState) -> PlatformStats {
    let mut stats = PlatformStats {
        total_trips: 0,
        completed_trips: 0,
        pending_trips: 0,
        total_revenue: Decimal::ZERO,
        total_commission: Decimal::ZERO,
        acceptance_rate: Decimal::ZERO,
    };
    let mut reached_driver = 0usize;

    for entry in state.trips.iter() {
        let trip = entry.value();
        stats.total_trips += 1;
        match trip.status {
            TripStatus::Pending => stats.pending_trips += 1,
            TripStatus::Completed => {
                stats.completed_trips += 1;
                stats.total_revenue += trip.price;
                stats.total_commission += trip.commission_amount();
            }
            _ => {}
        }
        if matches!(
            trip.status,
            TripStatus::Assigned
                | TripStatus::Accepted
                | TripStatus::Approaching
                | TripStatus::InProgress
                | TripStatus::Completed
        ) {
            reached_driver += 1;
        }
    }

    if stats.total_trips > 0 {
        stats.acceptance_rate = (Decimal::from(reached_driver as u64 * 100)
            / Decimal::from(stats.total_trips as u64))
        .round_dp(1);
    }
    stats.total_revenue = round_money(stats.total_revenue);
    stats.total_commission = round_money(stats.total_commission);
    stats
}
