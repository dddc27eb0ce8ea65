//! `rusqlite`-backed `Storage` (SPEC_FULL.md §2). `rusqlite::Connection`
//! blocks the calling thread on every call, so each method hands its query
//! to `tokio::task::spawn_blocking` rather than running disk I/O inline on
//! an async executor thread; the connection itself lives behind a
//! `std::sync::Mutex` since only one blocking task may use it at a time.

use super::{BurnRateSnapshotRow, DailyStat, Storage};
use crate::domain::{Alert, PersistenceError, Severity};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS daily_stats (
                date TEXT PRIMARY KEY,
                total_cost REAL NOT NULL,
                total_tokens INTEGER NOT NULL,
                session_count INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS burn_rate_snapshots (
                timestamp REAL NOT NULL,
                hourly_rate REAL NOT NULL,
                token_velocity_per_min REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS alert_history (
                rule_name TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                session_id TEXT,
                fired_at REAL NOT NULL
            );",
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Runs `f` against the connection on a blocking-pool thread, unwrapping
    /// the `JoinHandle` (a panic inside `f` is a bug, not a recoverable
    /// persistence error).
    async fn with_conn<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        F: FnOnce(&Connection) -> Result<T, PersistenceError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("sqlite mutex poisoned");
            f(&conn)
        })
        .await
        .expect("sqlite blocking task panicked")
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn record_daily_stat(&self, stat: &DailyStat) -> Result<(), PersistenceError> {
        let stat = stat.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO daily_stats (date, total_cost, total_tokens, session_count)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(date) DO UPDATE SET
                    total_cost = excluded.total_cost,
                    total_tokens = excluded.total_tokens,
                    session_count = excluded.session_count",
                (&stat.date, stat.total_cost, stat.total_tokens, stat.session_count),
            )?;
            Ok(())
        })
        .await
    }

    async fn record_burn_rate_snapshot(&self, row: &BurnRateSnapshotRow) -> Result<(), PersistenceError> {
        let row = row.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO burn_rate_snapshots (timestamp, hourly_rate, token_velocity_per_min) VALUES (?1, ?2, ?3)",
                (row.timestamp, row.hourly_rate, row.token_velocity_per_min),
            )?;
            Ok(())
        })
        .await
    }

    async fn record_alert(&self, alert: &Alert) -> Result<(), PersistenceError> {
        let alert = alert.clone();
        self.with_conn(move |conn| {
            let severity = match alert.severity {
                Severity::Warning => "warning",
                Severity::Critical => "critical",
            };
            conn.execute(
                "INSERT INTO alert_history (rule_name, severity, message, session_id, fired_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    &alert.rule_name,
                    severity,
                    &alert.message,
                    alert.session_id.as_ref().map(|s| s.0.clone()),
                    alert.fired_at.0,
                ),
            )?;
            Ok(())
        })
        .await
    }

    async fn query_daily_stats(&self, days: u32) -> Result<Vec<DailyStat>, PersistenceError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT date, total_cost, total_tokens, session_count FROM daily_stats
                 ORDER BY date DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map([days], |row| {
                Ok(DailyStat {
                    date: row.get(0)?,
                    total_cost: row.get(1)?,
                    total_tokens: row.get(2)?,
                    session_count: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(PersistenceError::from)
        })
        .await
    }

    async fn query_burn_rate_daily_summary(&self, days: u32) -> Result<Vec<DailyStat>, PersistenceError> {
        self.query_daily_stats(days).await
    }

    async fn query_burn_rate_snapshots(&self, date: &str) -> Result<Vec<BurnRateSnapshotRow>, PersistenceError> {
        let date = date.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, hourly_rate, token_velocity_per_min FROM burn_rate_snapshots
                 WHERE date(timestamp, 'unixepoch') = ?1
                 ORDER BY timestamp ASC",
            )?;
            let rows = stmt.query_map([date.as_str()], |row| {
                Ok(BurnRateSnapshotRow {
                    timestamp: row.get(0)?,
                    hourly_rate: row.get(1)?,
                    token_velocity_per_min: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(PersistenceError::from)
        })
        .await
    }

    async fn query_alert_history(&self, days: u32, rule_filter: Option<&str>) -> Result<Vec<Alert>, PersistenceError> {
        let cutoff_days = f64::from(days);
        let rule_filter = rule_filter.map(str::to_string);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT rule_name, severity, message, session_id, fired_at FROM alert_history
                 WHERE fired_at >= (strftime('%s', 'now') - ?1 * 86400)
                 AND (?2 IS NULL OR rule_name = ?2)
                 ORDER BY fired_at DESC",
            )?;
            let rows = stmt.query_map((cutoff_days, rule_filter.as_deref()), |row| {
                let severity_str: String = row.get(1)?;
                let severity = if severity_str == "critical" { Severity::Critical } else { Severity::Warning };
                let session_id: Option<String> = row.get(3)?;
                Ok(Alert {
                    rule_name: row.get(0)?,
                    severity,
                    message: row.get(2)?,
                    session_id: session_id.map(crate::domain::SessionId),
                    fired_at: crate::domain::Timestamp::from_secs(row.get(4)?),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(PersistenceError::from)
        })
        .await
    }
}
