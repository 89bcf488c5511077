// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::models::stats::StatsCache;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::notify::Notifier;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    /// Injected time source; every window decision reads this clock.
    pub clock: Arc<dyn Clock>,
    pub stats_cache: StatsCache,
    pub notifier: Arc<Notifier>,
}

impl AppState {
    /// Production state with the system clock.
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        Self::with_clock(pool, config, Arc::new(SystemClock))
    }

    /// State with an explicit clock, used by tests to step across window
    /// boundaries.
    pub fn with_clock(pool: SqlitePool, config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            config,
            clock,
            stats_cache: StatsCache::new(),
            notifier: Arc::new(Notifier::new()),
        }
    }
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
