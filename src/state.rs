use std::sync::atomic::AtomicU64;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::auth::password;
use crate::auth::token::TokenKeys;
use crate::config::Config;
use crate::engine::queue::TripEvent;
use crate::error::AppError;
use crate::models::account::Admin;
use crate::models::client::Client;
use crate::models::driver::Driver;
use crate::models::ledger::LedgerEntry;
use crate::models::notification::Notification;
use crate::models::trip::Trip;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: Config,
    pub tokens: TokenKeys,
    pub trips: DashMap<Uuid, Trip>,
    pub drivers: DashMap<Uuid, Driver>,
    pub clients: DashMap<Uuid, Client>,
    pub admins: DashMap<Uuid, Admin>,
    pub notifications: DashMap<Uuid, Notification>,
    pub ledger: DashMap<Uuid, LedgerEntry>,
    pub ledger_seq: AtomicU64,
    pub event_tx: mpsc::Sender<TripEvent>,
    pub notification_tx: broadcast::Sender<Notification>,
    pub metrics: Metrics,
}

impl AppState {
    /// Builds the shared state and seeds the configured administrator.
    pub fn new(config: Config) -> Result<(Self, mpsc::Receiver<TripEvent>), AppError> {
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_size);
        let (notification_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        let state = Self {
            tokens: TokenKeys::new(&config.jwt_secret, config.jwt_ttl_hours),
            trips: DashMap::new(),
            drivers: DashMap::new(),
            clients: DashMap::new(),
            admins: DashMap::new(),
            notifications: DashMap::new(),
            ledger: DashMap::new(),
            ledger_seq: AtomicU64::new(0),
            event_tx,
            notification_tx,
            metrics: Metrics::new(),
            config,
        };

        state.seed_admin()?;

        Ok((state, event_rx))
    }

    fn seed_admin(&self) -> Result<(), AppError> {
        let email = self.config.admin_email.trim().to_lowercase();
        if self.admins.iter().any(|entry| entry.email == email) {
            return Ok(());
        }

        let admin = Admin {
            id: Uuid::new_v4(),
            name: self.config.admin_name.clone(),
            email,
            password_hash: password::hash(&self.config.admin_password, self.config.bcrypt_cost)?,
            created_at: Utc::now(),
        };

        tracing::info!(admin_id = %admin.id, email = %admin.email, "default admin seeded");
        self.admins.insert(admin.id, admin);
        Ok(())
    }

    /// Whether any driver or admin already uses this (normalized) email.
    pub fn staff_email_taken(&self, email: &str) -> bool {
        self.drivers.iter().any(|entry| entry.email == email)
            || self.admins.iter().any(|entry| entry.email == email)
    }
}
