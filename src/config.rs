use std::env;

use rust_decimal::Decimal;
use rust_decimal::dec;

use crate::error::AppError;

/// Fare parameters used by the pricing calculator.
#[derive(Debug, Clone)]
pub struct Tariff {
    pub base_fare: Decimal,
    pub price_per_km: Decimal,
}

impl Default for Tariff {
    fn default() -> Self {
        Self {
            base_fare: dec!(5),
            price_per_km: dec!(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_queue_size: usize,
    pub event_buffer_size: usize,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub admin_email: String,
    pub admin_password: String,
    pub admin_name: String,
    pub tariff: Tariff,
    /// Price trips at booking time when both coordinates resolve.
    pub auto_pricing: bool,
    pub default_commission_rate: Decimal,
    /// Interval polling clients are told to use for the unread queue.
    pub notification_poll_seconds: u64,
    pub pickup_grace_minutes: i64,
    pub cors_origins: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_queue_size: 1024,
            event_buffer_size: 1024,
            jwt_secret: "mslk-vtc-dev-secret".to_string(),
            jwt_ttl_hours: 24,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            admin_email: "admin@mslk-vtc.fr".to_string(),
            admin_password: "change-me".to_string(),
            admin_name: "Admin MSLK".to_string(),
            tariff: Tariff::default(),
            auto_pricing: true,
            default_commission_rate: dec!(0.15),
            notification_poll_seconds: 10,
            pickup_grace_minutes: 5,
            cors_origins: "*".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            event_queue_size: parse_or_default("EVENT_QUEUE_SIZE", defaults.event_queue_size)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            jwt_secret: env::var("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            jwt_ttl_hours: parse_or_default("JWT_TTL_HOURS", defaults.jwt_ttl_hours)?,
            bcrypt_cost: parse_or_default("BCRYPT_COST", defaults.bcrypt_cost)?,
            admin_email: env::var("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
            admin_password: env::var("ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
            admin_name: env::var("ADMIN_NAME").unwrap_or(defaults.admin_name),
            tariff: Tariff {
                base_fare: parse_or_default("BASE_FARE", defaults.tariff.base_fare)?,
                price_per_km: parse_or_default("PRICE_PER_KM", defaults.tariff.price_per_km)?,
            },
            auto_pricing: parse_or_default("AUTO_PRICING", defaults.auto_pricing)?,
            default_commission_rate: parse_or_default(
                "DEFAULT_COMMISSION_RATE",
                defaults.default_commission_rate,
            )?,
            notification_poll_seconds: parse_or_default(
                "NOTIFICATION_POLL_SECONDS",
                defaults.notification_poll_seconds,
            )?,
            pickup_grace_minutes: parse_or_default(
                "PICKUP_GRACE_MINUTES",
                defaults.pickup_grace_minutes,
            )?,
            cors_origins: env::var("CORS_ORIGINS").unwrap_or(defaults.cors_origins),
        };

        if config.default_commission_rate < Decimal::ZERO
            || config.default_commission_rate > Decimal::ONE
        {
            return Err(AppError::Internal(
                "invalid DEFAULT_COMMISSION_RATE: must be within [0, 1]".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
