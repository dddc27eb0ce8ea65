//! `AlertEngine` (spec.md §4.8): pluggable alert rules evaluated once per
//! tick against (SessionStore, BurnRate snapshot), with active-alert dedup
//! and an optional desktop-notification hook.

use crate::analytics::burn_rate::BurnRateSnapshot;
use crate::domain::{Alert, SessionId, Severity};
use crate::store::SessionStore;
use std::collections::HashMap;
use std::sync::Mutex;

pub trait AlertRule: Send + Sync {
    fn name(&self) -> &'static str;
    /// Evaluate this rule; return the alerts currently firing (empty if none).
    fn evaluate(&self, sessions: &[crate::domain::SessionRecord], burn_rate: &BurnRateSnapshot, now: f64) -> Vec<Alert>;
}

/// Fires when the hourly burn rate crosses a configured threshold.
pub struct CostRateSurgeRule {
    pub threshold_per_hour: f64,
}

impl AlertRule for CostRateSurgeRule {
    fn name(&self) -> &'static str {
        "cost_rate_surge"
    }

    fn evaluate(&self, _sessions: &[crate::domain::SessionRecord], burn_rate: &BurnRateSnapshot, now: f64) -> Vec<Alert> {
        if burn_rate.hourly_rate >= self.threshold_per_hour {
            vec![Alert {
                rule_name: self.name().to_string(),
                severity: Severity::Warning,
                message: format!(
                    "burn rate ${:.2}/hr exceeds threshold ${:.2}/hr",
                    burn_rate.hourly_rate, self.threshold_per_hour
                ),
                session_id: None,
                fired_at: crate::domain::Timestamp::from_secs(now),
            }]
        } else {
            Vec::new()
        }
    }
}

/// Fires per-session when `api_error` events in the last `window_secs` exceed `threshold`.
pub struct ErrorStormRule {
    pub window_secs: f64,
    pub threshold: usize,
}

impl AlertRule for ErrorStormRule {
    fn name(&self) -> &'static str {
        "error_storm"
    }

    fn evaluate(&self, sessions: &[crate::domain::SessionRecord], _burn_rate: &BurnRateSnapshot, now: f64) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for session in sessions {
            let count = session
                .events
                .iter()
                .filter(|e| e.name == "api_error" && now - e.timestamp.0 <= self.window_secs)
                .count();
            if count > self.threshold {
                alerts.push(Alert {
                    rule_name: self.name().to_string(),
                    severity: Severity::Critical,
                    message: format!("{count} api_error events in the last {:.0}s", self.window_secs),
                    session_id: Some(session.session_id.clone()),
                    fired_at: crate::domain::Timestamp::from_secs(now),
                });
            }
        }
        alerts
    }
}

/// Fires per-session when the same tool fails with the same error more than `threshold` times.
pub struct LoopDetectorRule {
    pub threshold: usize,
}

impl AlertRule for LoopDetectorRule {
    fn name(&self) -> &'static str {
        "loop_detector"
    }

    fn evaluate(&self, sessions: &[crate::domain::SessionRecord], _burn_rate: &BurnRateSnapshot, now: f64) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for session in sessions {
            let mut failure_counts: HashMap<(String, String), usize> = HashMap::new();
            for event in &session.events {
                if event.name != "tool_result" {
                    continue;
                }
                let Some(tool) = event.attributes.get("tool_name") else { continue };
                let Some(error) = event.attributes.get("error") else { continue };
                *failure_counts.entry((tool.clone(), error.clone())).or_insert(0) += 1;
            }
            for ((tool, error), count) in failure_counts {
                if count > self.threshold {
                    alerts.push(Alert {
                        rule_name: self.name().to_string(),
                        severity: Severity::Warning,
                        message: format!("{tool} failed with \"{error}\" {count} times"),
                        session_id: Some(session.session_id.clone()),
                        fired_at: crate::domain::Timestamp::from_secs(now),
                    });
                }
            }
        }
        alerts
    }
}

pub type Notifier = Box<dyn Fn(&Alert) + Send + Sync>;

pub struct AlertEngine {
    rules: Vec<Box<dyn AlertRule>>,
    active: Mutex<HashMap<(String, Option<SessionId>), Alert>>,
    notifier: Option<Notifier>,
}

impl AlertEngine {
    #[must_use]
    pub fn new(rules: Vec<Box<dyn AlertRule>>, notifier: Option<Notifier>) -> Self {
        Self { rules, active: Mutex::new(HashMap::new()), notifier }
    }

    /// Evaluate all rules, notifying on first-fire and dropping cleared alerts.
    pub async fn evaluate(&self, store: &SessionStore, burn_rate: &BurnRateSnapshot, now: f64) -> Vec<Alert> {
        let sessions = store.list_sessions().await;
        let mut firing = HashMap::new();
        for rule in &self.rules {
            for alert in rule.evaluate(&sessions, burn_rate, now) {
                firing.insert((alert.rule_name.clone(), alert.session_id.clone()), alert);
            }
        }

        let mut active = self.active.lock().expect("alert engine mutex poisoned");
        for (key, alert) in &firing {
            if !active.contains_key(key) {
                if let Some(notifier) = &self.notifier {
                    notifier(alert);
                }
            }
        }
        *active = firing.clone();
        firing.into_values().collect()
    }

    #[must_use]
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.active.lock().expect("alert engine mutex poisoned").values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, ProcessMetadata, SessionRecord, Timestamp};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn snapshot_with_rate(rate: f64) -> BurnRateSnapshot {
        BurnRateSnapshot {
            total_cost: 0.0,
            hourly_rate: rate,
            trend: crate::analytics::burn_rate::Trend::Flat,
            token_velocity_per_min: 0.0,
            daily_projection: rate * 24.0,
            monthly_projection: rate * 720.0,
            per_model: Vec::new(),
        }
    }

    #[tokio::test]
    async fn cost_rate_surge_fires_above_threshold() {
        let store = SessionStore::new();
        let engine = AlertEngine::new(vec![Box::new(CostRateSurgeRule { threshold_per_hour: 10.0 })], None);
        let alerts = engine.evaluate(&store, &snapshot_with_rate(15.0), 0.0).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule_name, "cost_rate_surge");
    }

    #[tokio::test]
    async fn cost_rate_surge_does_not_fire_below_threshold() {
        let store = SessionStore::new();
        let engine = AlertEngine::new(vec![Box::new(CostRateSurgeRule { threshold_per_hour: 10.0 })], None);
        let alerts = engine.evaluate(&store, &snapshot_with_rate(5.0), 0.0).await;
        assert!(alerts.is_empty());
    }

    #[tokio::test]
    async fn error_storm_counts_events_within_window() {
        let store = SessionStore::new();
        let sid = SessionId::from("sess-1");
        for i in 0..5 {
            store
                .add_event(
                    sid.clone(),
                    Event {
                        name: "api_error".to_string(),
                        attributes: Default::default(),
                        timestamp: Timestamp::from_secs(i as f64),
                    },
                )
                .await;
        }
        let engine = AlertEngine::new(
            vec![Box::new(ErrorStormRule { window_secs: 60.0, threshold: 3 })],
            None,
        );
        let alerts = engine.evaluate(&store, &snapshot_with_rate(0.0), 4.0).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].session_id, Some(sid));
    }

    #[tokio::test]
    async fn notifier_fires_once_per_alert_key() {
        let store = SessionStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let engine = AlertEngine::new(
            vec![Box::new(CostRateSurgeRule { threshold_per_hour: 10.0 })],
            Some(Box::new(move |_alert: &Alert| { count_clone.fetch_add(1, Ordering::Relaxed); })),
        );
        engine.evaluate(&store, &snapshot_with_rate(15.0), 0.0).await;
        engine.evaluate(&store, &snapshot_with_rate(16.0), 1.0).await;
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn notifier_refires_after_clearing() {
        let store = SessionStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let engine = AlertEngine::new(
            vec![Box::new(CostRateSurgeRule { threshold_per_hour: 10.0 })],
            Some(Box::new(move |_alert: &Alert| { count_clone.fetch_add(1, Ordering::Relaxed); })),
        );
        engine.evaluate(&store, &snapshot_with_rate(15.0), 0.0).await;
        engine.evaluate(&store, &snapshot_with_rate(1.0), 1.0).await;
        engine.evaluate(&store, &snapshot_with_rate(15.0), 2.0).await;
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn loop_detector_fires_on_repeated_failure() {
        let sessions = vec![{
            let mut record = SessionRecord::new(SessionId::from("sess-1"), Timestamp::from_secs(0.0));
            record.process_metadata = ProcessMetadata::default();
            for _ in 0..4 {
                record.events.push(Event {
                    name: "tool_result".to_string(),
                    attributes: HashMap::from([
                        ("tool_name".to_string(), "bash".to_string()),
                        ("error".to_string(), "timeout".to_string()),
                    ]),
                    timestamp: Timestamp::from_secs(0.0),
                });
            }
            record
        }];
        let rule = LoopDetectorRule { threshold: 3 };
        let alerts = rule.evaluate(&sessions, &snapshot_with_rate(0.0), 0.0);
        assert_eq!(alerts.len(), 1);
    }
}
