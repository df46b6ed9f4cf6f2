use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::ledger;
use crate::engine::matching;
use crate::engine::pricing;
use crate::engine::queue::{publish, TripEvent};
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus};
use crate::models::trip::{Location, Trip, TripStatus, VehicleType};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripAction {
    Publish,
    Unpublish,
    SetPrice,
    SetCommission,
    Assign,
    Accept,
    Refuse,
    Approach,
    Start,
    Complete,
    Cancel,
    Delete,
}

impl TripAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TripAction::Publish => "publish",
            TripAction::Unpublish => "unpublish",
            TripAction::SetPrice => "set_price",
            TripAction::SetCommission => "set_commission",
            TripAction::Assign => "assign",
            TripAction::Accept => "accept",
            TripAction::Refuse => "refuse",
            TripAction::Approach => "approach",
            TripAction::Start => "start",
            TripAction::Complete => "complete",
            TripAction::Cancel => "cancel",
            TripAction::Delete => "delete",
        }
    }
}

/// Who is acting on a trip. Drivers may only act on trips bound to them,
/// except for claiming a published pending trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    Driver(Uuid),
}

/// The complete transition table. `None` means the action is not allowed
/// from `current`.
pub fn next_status(current: TripStatus, action: TripAction) -> Option<TripStatus> {
    use TripAction as A;
    use TripStatus as S;

    if current.is_terminal() {
        return None;
    }

    match (current, action) {
        (S::Pending, A::Publish | A::Unpublish) => Some(S::Pending),
        (status, A::SetPrice | A::SetCommission) => Some(status),
        (S::Pending | S::Assigned, A::Assign) => Some(S::Assigned),
        (S::Assigned, A::Accept) => Some(S::Accepted),
        (S::Assigned, A::Refuse) => Some(S::Pending),
        (S::Accepted, A::Approach) => Some(S::Approaching),
        (S::Accepted | S::Approaching, A::Start) => Some(S::InProgress),
        (S::InProgress, A::Complete) => Some(S::Completed),
        (_, A::Cancel) => Some(S::Cancelled),
        (status, A::Delete) => Some(status),
        _ => None,
    }
}

pub fn check(trip: &Trip, action: TripAction) -> Result<TripStatus, AppError> {
    next_status(trip.status, action).ok_or_else(|| {
        AppError::Conflict(format!(
            "cannot {} a trip that is {}",
            action.as_str(),
            trip.status.as_str()
        ))
    })
}

fn authorize(trip: &Trip, actor: Actor, action: TripAction) -> Result<(), AppError> {
    let Actor::Driver(driver_id) = actor else {
        return Ok(());
    };

    match trip.driver_id {
        Some(bound) if bound == driver_id => Ok(()),
        Some(_) => Err(AppError::Forbidden(
            "trip assigned to another driver".to_string(),
        )),
        None if action == TripAction::Accept && trip.status == TripStatus::Pending => Ok(()),
        None => Err(AppError::Forbidden("not your trip".to_string())),
    }
}

/// Applies one lifecycle action to a trip atomically.
///
/// The entry stays write-locked for the whole call: the version check, the
/// actor check, `prepare`, and the table lookup all see the same record, and
/// the result is committed only if every step succeeds. `prepare` works on a
/// draft, so a failing step leaves the stored trip untouched.
pub fn mutate_trip<F>(
    state: &AppState,
    trip_id: Uuid,
    action: TripAction,
    actor: Actor,
    expected_version: Option<u64>,
    prepare: F,
) -> Result<Trip, AppError>
where
    F: FnOnce(&mut Trip, DateTime<Utc>) -> Result<(), AppError>,
{
    let result = (|| {
        let mut entry = state
            .trips
            .get_mut(&trip_id)
            .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))?;

        if let Some(expected) = expected_version {
            if entry.version != expected {
                return Err(AppError::Conflict(format!(
                    "trip {trip_id} was modified (version {} != {expected})",
                    entry.version
                )));
            }
        }

        authorize(&entry, actor, action)?;

        let now = Utc::now();
        let mut draft = entry.clone();
        prepare(&mut draft, now)?;
        draft.status = check(&draft, action)?;
        draft.touch(now);

        *entry = draft.clone();
        Ok(draft)
    })();

    state
        .metrics
        .record_transition(action.as_str(), result.is_ok());

    match &result {
        Ok(trip) => info!(
            trip_id = %trip.id,
            action = action.as_str(),
            status = trip.status.as_str(),
            version = trip.version,
            "trip updated"
        ),
        Err(err) => warn!(trip_id = %trip_id, action = action.as_str(), error = %err, "trip action rejected"),
    }

    result
}

pub fn set_driver_status(state: &AppState, driver_id: Uuid, status: DriverStatus) {
    match state.drivers.get_mut(&driver_id) {
        Some(mut driver) => {
            driver.status = status;
            driver.updated_at = Utc::now();
        }
        None => warn!(driver_id = %driver_id, "driver vanished before status update"),
    }
}

/// A driver is engaged on a trip once they accepted it and until it ends.
pub fn is_engaged(status: TripStatus) -> bool {
    matches!(
        status,
        TripStatus::Accepted | TripStatus::Approaching | TripStatus::InProgress
    )
}

/// Puts the driver back to `available` unless another trip still holds them.
pub fn release_driver(state: &AppState, driver_id: Uuid, finished_trip: Uuid) {
    let still_engaged = state.trips.iter().any(|entry| {
        entry.id != finished_trip && entry.is_bound_to(driver_id) && is_engaged(entry.status)
    });
    if still_engaged {
        info!(driver_id = %driver_id, "driver kept busy by another trip");
        return;
    }
    set_driver_status(state, driver_id, DriverStatus::Available);
}

pub fn find_trip(state: &AppState, trip_id: Uuid) -> Result<Trip, AppError> {
    state
        .trips
        .get(&trip_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("trip {trip_id} not found")))
}

pub fn find_driver(state: &AppState, driver_id: Uuid) -> Result<Driver, AppError> {
    state
        .drivers
        .get(&driver_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))
}

pub fn validate_rate(rate: Decimal) -> Result<Decimal, AppError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(AppError::BadRequest(
            "commission_rate must be within [0, 1]".to_string(),
        ));
    }
    Ok(rate)
}

/// Validated booking input.
#[derive(Debug, Clone)]
pub struct TripDraft {
    pub client_name: String,
    pub client_phone: String,
    pub client_email: String,
    pub pickup: Location,
    pub dropoff: Location,
    pub pickup_at: Option<DateTime<Utc>>,
    pub vehicle_type: VehicleType,
    pub passengers: u32,
    pub luggage_count: u32,
    pub notes: String,
}

pub async fn book(state: &AppState, draft: TripDraft) -> Result<Trip, AppError> {
    if draft.pickup.address.trim().is_empty() || draft.dropoff.address.trim().is_empty() {
        return Err(AppError::BadRequest(
            "pickup and dropoff addresses are required".to_string(),
        ));
    }
    if draft.passengers == 0 {
        return Err(AppError::BadRequest("passengers must be >= 1".to_string()));
    }

    let now = Utc::now();
    let pickup_at = match draft.pickup_at {
        Some(at) if at < now - Duration::minutes(state.config.pickup_grace_minutes) => {
            return Err(AppError::BadRequest(
                "pickup time is in the past".to_string(),
            ));
        }
        Some(at) => at,
        None => now,
    };

    let (distance_km, price) = match (draft.pickup.point(), draft.dropoff.point()) {
        (Some(pickup), Some(dropoff)) => {
            let quote = pricing::quote(&pickup, &dropoff, &state.config.tariff);
            let price = if state.config.auto_pricing {
                quote.price
            } else {
                Decimal::ZERO
            };
            (quote.distance_km, price)
        }
        _ => (0.0, Decimal::ZERO),
    };

    let trip = Trip {
        id: Uuid::new_v4(),
        client_name: draft.client_name.trim().to_string(),
        client_phone: draft.client_phone.trim().to_string(),
        client_email: crate::auth::normalize_email(&draft.client_email),
        pickup: draft.pickup,
        dropoff: draft.dropoff,
        pickup_at,
        vehicle_type: draft.vehicle_type,
        passengers: draft.passengers,
        luggage_count: draft.luggage_count,
        price,
        distance_km,
        status: TripStatus::Pending,
        published: false,
        driver_id: None,
        driver_name: None,
        driver_phone: None,
        driver_vehicle: None,
        commission_rate: state.config.default_commission_rate,
        notes: draft.notes,
        created_at: now,
        updated_at: now,
        accepted_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        version: 0,
    };

    state.trips.insert(trip.id, trip.clone());
    state.metrics.trips_created_total.inc();
    info!(trip_id = %trip.id, price = %trip.price, distance_km = trip.distance_km, "trip booked");

    publish(state, TripEvent::Created(trip.clone())).await;
    Ok(trip)
}

pub async fn set_published(
    state: &AppState,
    trip_id: Uuid,
    published: bool,
    expected_version: Option<u64>,
) -> Result<Trip, AppError> {
    let action = if published {
        TripAction::Publish
    } else {
        TripAction::Unpublish
    };
    let mut was_published = false;
    let trip = mutate_trip(state, trip_id, action, Actor::Admin, expected_version, |trip, _| {
        was_published = trip.published;
        trip.published = published;
        Ok(())
    })?;

    if published && !was_published {
        publish(state, TripEvent::Published(trip.clone())).await;
    }
    Ok(trip)
}

pub async fn set_price(
    state: &AppState,
    trip_id: Uuid,
    price: Decimal,
    expected_version: Option<u64>,
) -> Result<Trip, AppError> {
    if price <= Decimal::ZERO {
        return Err(AppError::BadRequest("price must be > 0".to_string()));
    }
    if price > pricing::MAX_AMOUNT {
        return Err(AppError::BadRequest(format!(
            "price cannot exceed {}",
            pricing::MAX_AMOUNT
        )));
    }
    let price = pricing::round_money(price);

    let mut was_unset = false;
    let trip = mutate_trip(
        state,
        trip_id,
        TripAction::SetPrice,
        Actor::Admin,
        expected_version,
        |trip, _| {
            was_unset = trip.price.is_zero();
            trip.price = price;
            Ok(())
        },
    )?;

    if was_unset {
        publish(state, TripEvent::PriceConfirmed(trip.clone())).await;
    }
    Ok(trip)
}

pub fn set_commission(
    state: &AppState,
    trip_id: Uuid,
    rate: Decimal,
    expected_version: Option<u64>,
) -> Result<Trip, AppError> {
    let rate = validate_rate(rate)?;
    mutate_trip(
        state,
        trip_id,
        TripAction::SetCommission,
        Actor::Admin,
        expected_version,
        |trip, _| {
            trip.commission_rate = rate;
            Ok(())
        },
    )
}

/// Driver acceptance. A trip already assigned to the driver moves to
/// `accepted`; a published pending trip is first claimed (assigned to the
/// caller at their default rate) and then accepted, within one critical
/// section, so the first caller wins.
pub async fn accept(
    state: &AppState,
    trip_id: Uuid,
    driver: &Driver,
    expected_version: Option<u64>,
) -> Result<Trip, AppError> {
    let mut claimed = false;
    let trip = mutate_trip(
        state,
        trip_id,
        TripAction::Accept,
        Actor::Driver(driver.id),
        expected_version,
        |trip, now| {
            if trip.status == TripStatus::Pending {
                matching::claim(trip, driver)?;
                claimed = true;
            }
            trip.accepted_at = Some(now);
            Ok(())
        },
    )?;

    if claimed {
        info!(trip_id = %trip.id, driver_id = %driver.id, "published trip claimed");
    }
    set_driver_status(state, driver.id, DriverStatus::Busy);
    Ok(trip)
}

pub fn refuse(
    state: &AppState,
    trip_id: Uuid,
    driver_id: Uuid,
    expected_version: Option<u64>,
) -> Result<Trip, AppError> {
    let trip = mutate_trip(
        state,
        trip_id,
        TripAction::Refuse,
        Actor::Driver(driver_id),
        expected_version,
        |trip, _| {
            trip.unbind_driver();
            trip.accepted_at = None;
            Ok(())
        },
    )?;

    Ok(trip)
}

pub async fn approach(
    state: &AppState,
    trip_id: Uuid,
    driver_id: Uuid,
    expected_version: Option<u64>,
) -> Result<Trip, AppError> {
    let trip = mutate_trip(
        state,
        trip_id,
        TripAction::Approach,
        Actor::Driver(driver_id),
        expected_version,
        |_, _| Ok(()),
    )?;

    publish(state, TripEvent::Approaching(trip.clone())).await;
    Ok(trip)
}

pub fn start(
    state: &AppState,
    trip_id: Uuid,
    driver_id: Uuid,
    expected_version: Option<u64>,
) -> Result<Trip, AppError> {
    let trip = mutate_trip(
        state,
        trip_id,
        TripAction::Start,
        Actor::Driver(driver_id),
        expected_version,
        |trip, now| {
            trip.started_at = Some(now);
            Ok(())
        },
    )?;

    set_driver_status(state, driver_id, DriverStatus::EnRoute);
    Ok(trip)
}

/// Completes the trip, then credits the ledger. The two writes are not
/// atomic together: a ledger failure is logged, the trip stays completed.
pub async fn complete(
    state: &AppState,
    trip_id: Uuid,
    driver_id: Uuid,
    expected_version: Option<u64>,
) -> Result<Trip, AppError> {
    let trip = mutate_trip(
        state,
        trip_id,
        TripAction::Complete,
        Actor::Driver(driver_id),
        expected_version,
        |trip, now| {
            trip.completed_at = Some(now);
            Ok(())
        },
    )?;

    if let Err(err) = ledger::record_completion(state, &trip) {
        warn!(trip_id = %trip.id, error = %err, "ledger credit failed for completed trip");
    }
    release_driver(state, driver_id, trip.id);

    publish(state, TripEvent::Completed(trip.clone())).await;
    Ok(trip)
}

pub async fn cancel(
    state: &AppState,
    trip_id: Uuid,
    actor: Actor,
    expected_version: Option<u64>,
) -> Result<Trip, AppError> {
    let mut bound_driver = None;
    let mut was_engaged = false;
    let trip = mutate_trip(
        state,
        trip_id,
        TripAction::Cancel,
        actor,
        expected_version,
        |trip, now| {
            bound_driver = trip.driver_id;
            was_engaged = is_engaged(trip.status);
            trip.cancelled_at = Some(now);
            Ok(())
        },
    )?;

    if let Some(driver_id) = bound_driver.filter(|_| was_engaged) {
        release_driver(state, driver_id, trip.id);
    }

    publish(
        state,
        TripEvent::Cancelled {
            trip: trip.clone(),
            driver_id: bound_driver,
        },
    )
    .await;
    Ok(trip)
}

/// Permanently removes a non-terminal trip.
pub fn delete(state: &AppState, trip_id: Uuid) -> Result<Trip, AppError> {
    let removed = state
        .trips
        .remove_if(&trip_id, |_, trip| next_status(trip.status, TripAction::Delete).is_some());

    let result = match removed {
        Some((_, trip)) => Ok(trip),
        None => match state.trips.get(&trip_id) {
            Some(trip) => Err(AppError::Conflict(format!(
                "cannot delete a trip that is {}",
                trip.status.as_str()
            ))),
            None => Err(AppError::NotFound(format!("trip {trip_id} not found"))),
        },
    };

    state
        .metrics
        .record_transition(TripAction::Delete.as_str(), result.is_ok());

    let trip = result?;
    if let Some(driver_id) = trip.driver_id.filter(|_| is_engaged(trip.status)) {
        release_driver(state, driver_id, trip.id);
    }
    info!(trip_id = %trip.id, "trip deleted");
    Ok(trip)
}
