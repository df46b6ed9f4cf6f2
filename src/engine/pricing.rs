use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::config::Tariff;
use crate::geo::haversine_km;
use crate::models::trip::GeoPoint;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PriceQuote {
    pub distance_km: f64,
    pub price: Decimal,
    pub base_fare: Decimal,
    pub price_per_km: Decimal,
}

/// Straight-line fare: `base_fare + price_per_km * distance_km`, both the
/// distance and the price rounded to two decimals.
pub fn quote(pickup: &GeoPoint, dropoff: &GeoPoint, tariff: &Tariff) -> PriceQuote {
    let distance = distance_decimal(haversine_km(pickup, dropoff));
    let price = round_money(tariff.base_fare + tariff.price_per_km * distance);

    PriceQuote {
        distance_km: to_f64(distance),
        price,
        base_fare: tariff.base_fare,
        price_per_km: tariff.price_per_km,
    }
}

/// Upper bound for any amount an admin can enter (1 000 000 000 EUR).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Two decimals, halves rounded away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn distance_decimal(km: f64) -> Decimal {
    Decimal::from_f64_retain(km.max(0.0))
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}
