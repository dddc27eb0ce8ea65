//! Optional local persistence (SPEC_FULL.md §2): daily stats, burn-rate
//! snapshots, and alert history, queried by the UI's history provider.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::domain::{Alert, PersistenceError};
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct DailyStat {
    pub date: String,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub session_count: u64,
}

#[derive(Debug, Clone)]
pub struct BurnRateSnapshotRow {
    pub timestamp: f64,
    pub hourly_rate: f64,
    pub token_velocity_per_min: f64,
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn record_daily_stat(&self, stat: &DailyStat) -> Result<(), PersistenceError>;
    async fn record_burn_rate_snapshot(&self, row: &BurnRateSnapshotRow) -> Result<(), PersistenceError>;
    async fn record_alert(&self, alert: &Alert) -> Result<(), PersistenceError>;

    async fn query_daily_stats(&self, days: u32) -> Result<Vec<DailyStat>, PersistenceError>;
    async fn query_burn_rate_daily_summary(&self, days: u32) -> Result<Vec<DailyStat>, PersistenceError>;
    async fn query_burn_rate_snapshots(&self, date: &str) -> Result<Vec<BurnRateSnapshotRow>, PersistenceError>;
    async fn query_alert_history(&self, days: u32, rule_filter: Option<&str>) -> Result<Vec<Alert>, PersistenceError>;
}

/// No-op storage for `storage.path = "memory"` — every query returns empty
/// (spec.md §6: "In memory-only mode these return empty").
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryStorage;

#[async_trait]
impl Storage for MemoryStorage {
    async fn record_daily_stat(&self, _stat: &DailyStat) -> Result<(), PersistenceError> {
        Ok(())
    }
    async fn record_burn_rate_snapshot(&self, _row: &BurnRateSnapshotRow) -> Result<(), PersistenceError> {
        Ok(())
    }
    async fn record_alert(&self, _alert: &Alert) -> Result<(), PersistenceError> {
        Ok(())
    }
    async fn query_daily_stats(&self, _days: u32) -> Result<Vec<DailyStat>, PersistenceError> {
        Ok(Vec::new())
    }
    async fn query_burn_rate_daily_summary(&self, _days: u32) -> Result<Vec<DailyStat>, PersistenceError> {
        Ok(Vec::new())
    }
    async fn query_burn_rate_snapshots(&self, _date: &str) -> Result<Vec<BurnRateSnapshotRow>, PersistenceError> {
        Ok(Vec::new())
    }
    async fn query_alert_history(&self, _days: u32, _rule_filter: Option<&str>) -> Result<Vec<Alert>, PersistenceError> {
        Ok(Vec::new())
    }
}
