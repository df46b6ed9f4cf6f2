use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::engine::lifecycle::{self, check, find_driver, mutate_trip, validate_rate, Actor, TripAction};
use crate::engine::queue::{publish, TripEvent};
use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::trip::{Trip, TripStatus};
use crate::state::AppState;

/// Binds `driver` to the trip at `rate`, moving it to `assigned`.
pub fn bind_driver(trip: &mut Trip, driver: &Driver, rate: Decimal) -> Result<(), AppError> {
    trip.status = check(trip, TripAction::Assign)?;
    trip.driver_id = Some(driver.id);
    trip.driver_name = Some(driver.name.clone());
    trip.driver_phone = Some(driver.phone.clone());
    trip.driver_vehicle = Some(driver.vehicle.label());
    trip.commission_rate = rate;
    Ok(())
}

/// Self-assignment of a published pending trip at the driver's default rate.
pub fn claim(trip: &mut Trip, driver: &Driver) -> Result<(), AppError> {
    if !trip.published {
        return Err(AppError::Conflict("trip is not published".to_string()));
    }
    if !driver.is_eligible() {
        return Err(AppError::Forbidden(
            "driver is not approved to claim trips".to_string(),
        ));
    }
    bind_driver(trip, driver, driver.commission_rate)
}

/// Admin dispatch: assigns a pending trip or reassigns an assigned one. The
/// rate falls back to the driver's default when none is given.
pub async fn assign(
    state: &AppState,
    trip_id: Uuid,
    driver_id: Uuid,
    commission_rate: Option<Decimal>,
    expected_version: Option<u64>,
) -> Result<Trip, AppError> {
    let driver = find_driver(state, driver_id)?;
    if !driver.is_active {
        return Err(AppError::Conflict(format!("driver {driver_id} is inactive")));
    }
    let rate = validate_rate(commission_rate.unwrap_or(driver.commission_rate))?;

    let mut previous = None;
    let trip = mutate_trip(
        state,
        trip_id,
        TripAction::Assign,
        Actor::Admin,
        expected_version,
        |trip, _| {
            previous = trip.driver_id;
            bind_driver(trip, &driver, rate)
        },
    )?;

    if let Some(previous) = previous.filter(|id| *id != driver.id) {
        info!(trip_id = %trip.id, from = %previous, to = %driver.id, "trip reassigned");
    }

    publish(state, TripEvent::Assigned(trip.clone())).await;
    Ok(trip)
}

pub fn is_visible_to(driver: &Driver, trip: &Trip) -> bool {
    trip.is_bound_to(driver.id)
        || (trip.status == TripStatus::Pending && trip.published && driver.is_eligible())
}

/// Trips a driver can see, soonest pickup first.
pub fn trips_for_driver(state: &AppState, driver: &Driver) -> Vec<Trip> {
    let mut trips: Vec<Trip> = state
        .trips
        .iter()
        .filter(|entry| is_visible_to(driver, entry.value()))
        .map(|entry| entry.value().clone())
        .collect();

    trips.sort_by_key(|trip| trip.pickup_at);
    trips
}

pub fn eligible_drivers(state: &AppState) -> Vec<Driver> {
    state
        .drivers
        .iter()
        .filter(|entry| entry.is_eligible())
        .map(|entry| entry.value().clone())
        .collect()
}

/// Broadcasts a ring for a trip without touching its state: the assignee of
/// an assigned trip, or every eligible driver for a pending one. Returns how
/// many drivers were rung.
pub async fn ring(state: &AppState, trip_id: Uuid) -> Result<usize, AppError> {
    let trip = lifecycle::find_trip(state, trip_id)?;

    let drivers: Vec<Uuid> = match (trip.status, trip.driver_id) {
        (TripStatus::Assigned, Some(driver_id)) => vec![driver_id],
        (TripStatus::Pending, _) => eligible_drivers(state).iter().map(|d| d.id).collect(),
        (status, _) => {
            state.metrics.record_transition("ring", false);
            return Err(AppError::Conflict(format!(
                "cannot ring a trip that is {}",
                status.as_str()
            )));
        }
    };

    state.metrics.record_transition("ring", true);
    let rung = drivers.len();
    info!(trip_id = %trip.id, drivers = rung, "drivers rung");

    publish(state, TripEvent::Rung { trip, drivers }).await;
    Ok(rung)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::dec;
    use uuid::Uuid;

    use super::{bind_driver, claim, is_visible_to};
    use crate::error::AppError;
    use crate::models::driver::{ApprovalStatus, Driver, DriverStatus, Vehicle};
    use crate::models::trip::{Location, Trip, TripStatus, VehicleType};

    fn driver(approval_status: ApprovalStatus, is_active: bool) -> Driver {
        Driver {
            id: Uuid::new_v4(),
            name: "Samir".to_string(),
            email: "samir@example.com".to_string(),
            phone: "+33780000000".to_string(),
            password_hash: String::new(),
            vehicle: Vehicle {
                model: "Mercedes E".to_string(),
                color: "noir".to_string(),
                plate: "AB-123-CD".to_string(),
            },
            status: DriverStatus::Available,
            approval_status,
            is_active,
            commission_rate: dec!(0.20),
            total_trips: 0,
            total_revenue: dec!(0),
            total_commission: dec!(0),
            email_notifications: true,
            notes: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn trip(status: TripStatus, published: bool) -> Trip {
        let now = Utc::now();
        Trip {
            id: Uuid::new_v4(),
            client_name: "Client".to_string(),
            client_phone: "0600000000".to_string(),
            client_email: "client@example.com".to_string(),
            pickup: Location {
                address: "Gare SNCF".to_string(),
                lat: None,
                lng: None,
            },
            dropoff: Location {
                address: "Aéroport".to_string(),
                lat: None,
                lng: None,
            },
            pickup_at: now,
            vehicle_type: VehicleType::Berline,
            passengers: 1,
            luggage_count: 0,
            price: dec!(0),
            distance_km: 0.0,
            status,
            published,
            driver_id: None,
            driver_name: None,
            driver_phone: None,
            driver_vehicle: None,
            commission_rate: dec!(0.15),
            notes: String::new(),
            created_at: now,
            updated_at: now,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            version: 0,
        }
    }

    #[test]
    fn unapproved_driver_sees_only_own_trips() {
        let pending_driver = driver(ApprovalStatus::Pending, true);
        let published = trip(TripStatus::Pending, true);
        let mut own = trip(TripStatus::Pending, false);
        bind_driver(&mut own, &pending_driver, dec!(0.15)).unwrap();

        assert!(!is_visible_to(&pending_driver, &published));
        assert!(is_visible_to(&pending_driver, &own));
    }

    #[test]
    fn approved_driver_sees_published_pending_trips_only() {
        let approved = driver(ApprovalStatus::Approved, true);

        assert!(is_visible_to(&approved, &trip(TripStatus::Pending, true)));
        assert!(!is_visible_to(&approved, &trip(TripStatus::Pending, false)));
        assert!(!is_visible_to(&approved, &trip(TripStatus::Assigned, true)));
    }

    #[test]
    fn binding_copies_driver_details_and_rate() {
        let d = driver(ApprovalStatus::Approved, true);
        let mut t = trip(TripStatus::Pending, false);

        bind_driver(&mut t, &d, dec!(0.25)).unwrap();

        assert_eq!(t.status, TripStatus::Assigned);
        assert_eq!(t.driver_id, Some(d.id));
        assert_eq!(t.driver_vehicle.as_deref(), Some("Mercedes E noir AB-123-CD"));
        assert_eq!(t.commission_rate, dec!(0.25));
    }

    #[test]
    fn claim_uses_driver_default_rate() {
        let d = driver(ApprovalStatus::Approved, true);
        let mut t = trip(TripStatus::Pending, true);

        claim(&mut t, &d).unwrap();

        assert_eq!(t.status, TripStatus::Assigned);
        assert_eq!(t.commission_rate, dec!(0.20));
    }

    #[test]
    fn claim_rejects_unpublished_or_rejected() {
        let approved = driver(ApprovalStatus::Approved, true);
        let rejected = driver(ApprovalStatus::Rejected, true);

        let mut hidden = trip(TripStatus::Pending, false);
        assert!(matches!(claim(&mut hidden, &approved), Err(AppError::Conflict(_))));

        let mut open = trip(TripStatus::Pending, true);
        assert!(matches!(claim(&mut open, &rejected), Err(AppError::Forbidden(_))));
    }
}
