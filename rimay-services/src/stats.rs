//! Per-user alert counters.

use serde_json::{json, Value};
use tracing::info;

use rimay_core::error::RimayResult;
use rimay_models::{Database, UserStats};

use crate::service::{Service, ServiceState, StateCell};

pub struct StatsService {
    state: StateCell,
    database: Database,
}

impl StatsService {
    pub fn new(database: Database) -> Self {
        Self {
            state: StateCell::new(),
            database,
        }
    }

    /// The user's counters in API form, or `{}` without a stats row.
    pub fn user_stats(&self, user_id: i64) -> RimayResult<Value> {
        let conn = self.database.conn()?;
        Ok(UserStats::find_by_user(&conn, user_id)?
            .map(|s| s.to_api_json())
            .unwrap_or_else(|| json!({})))
    }

    pub fn record_reported(&self, user_id: i64) -> RimayResult<UserStats> {
        let conn = self.database.conn()?;
        UserStats::record_reported(&conn, user_id)
    }

    pub fn record_resolved(&self, user_id: i64) -> RimayResult<UserStats> {
        let conn = self.database.conn()?;
        UserStats::record_resolved(&conn, user_id)
    }
}

impl Service for StatsService {
    fn name(&self) -> &str { "stats" }
    fn state(&self) -> ServiceState { self.state.get() }
    fn init(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Running);
        info!("stats service initialized");
        Ok(())
    }
    fn shutdown(&self) -> RimayResult<()> {
        self.state.set(ServiceState::Stopped);
        Ok(())
    }
}
