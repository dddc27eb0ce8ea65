//! `SessionStore` (spec.md §4.3): concurrent `session_id → SessionRecord` map
//! plus cross-session aggregates and a single event subscription.
//!
//! Grounded on the teacher-adjacent `SessionManager` pattern (an
//! `Arc<RwLock<HashMap<...>>>` behind a cloneable handle, write lock held
//! across the check-then-insert) rather than the teacher's own code, since
//! `hud` has no equivalent concurrent store.

pub mod ring_buffer;

use crate::domain::{Event, Metric, SessionId, SessionRecord, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-session cap on retained metrics/events before the oldest are evicted
/// (spec.md §4.3: "no single session can exhaust memory").
pub const MAX_METRICS_PER_SESSION: usize = 4096;
pub const MAX_EVENTS_PER_SESSION: usize = 4096;

/// What triggered an `on_event` subscription firing: a metric sample or a
/// log-derived event. Both `add_metric` and `add_event` dispatch through the
/// same subscription (spec.md §4.3), so the callback takes either shape.
pub enum SessionWrite<'a> {
    Metric(&'a Metric),
    Event(&'a Event),
}

type EventCallback = Box<dyn Fn(&SessionId, SessionWrite<'_>) + Send + Sync>;

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
    dropped_writes: Arc<AtomicU64>,
    on_event: Arc<RwLock<Option<EventCallback>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            dropped_writes: Arc::new(AtomicU64::new(0)),
            on_event: Arc::new(RwLock::new(None)),
        }
    }

    /// Registers the single subscription that receives every appended event.
    /// A later call replaces the earlier one (spec.md §4.3 names a single
    /// subscription, not a multicast list).
    pub async fn on_event<F>(&self, callback: F)
    where
        F: Fn(&SessionId, SessionWrite<'_>) + Send + Sync + 'static,
    {
        *self.on_event.write().await = Some(Box::new(callback));
    }

    pub async fn add_metric(&self, session_id: SessionId, metric: Metric) {
        let now = metric.timestamp;
        let mut sessions = self.inner.write().await;
        let record = sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionRecord::new(session_id.clone(), now));

        record.last_event_at = now;
        record.total_cost += cost_contribution(&metric);
        record.total_tokens += token_contribution(&metric);
        if let Some(model) = metric.attributes.get("model") {
            record.process_metadata.model = Some(model.clone());
        }

        if let Some(callback) = self.on_event.read().await.as_ref() {
            callback(&session_id, SessionWrite::Metric(&metric));
        }

        if record.metrics.len() >= MAX_METRICS_PER_SESSION {
            record.metrics.remove(0);
            self.dropped_writes.fetch_add(1, Ordering::Relaxed);
        }
        record.metrics.push(metric);
    }

    pub async fn add_event(&self, session_id: SessionId, event: Event) {
        let now = event.timestamp;
        let mut sessions = self.inner.write().await;
        let record = sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionRecord::new(session_id.clone(), now));
        record.last_event_at = now;
        if let Some(model) = event.attributes.get("model") {
            record.process_metadata.model = Some(model.clone());
        }

        if let Some(callback) = self.on_event.read().await.as_ref() {
            callback(&session_id, SessionWrite::Event(&event));
        }

        if record.events.len() >= MAX_EVENTS_PER_SESSION {
            record.events.remove(0);
            self.dropped_writes.fetch_add(1, Ordering::Relaxed);
        }
        record.events.push(event);
    }

    /// Marks a session's process as having exited, without destroying the record
    /// (spec.md §3: "never destroyed during a run").
    pub async fn mark_exited(&self, session_id: &SessionId) {
        if let Some(record) = self.inner.write().await.get_mut(session_id) {
            record.exited = true;
        }
    }

    pub async fn get_session(&self, session_id: &SessionId) -> Option<SessionRecord> {
        self.inner.read().await.get(session_id).cloned()
    }

    pub async fn list_sessions(&self) -> Vec<SessionRecord> {
        self.inner.read().await.values().cloned().collect()
    }

    #[must_use]
    pub async fn get_aggregated_cost(&self) -> f64 {
        self.inner.read().await.values().map(|s| s.total_cost).sum()
    }

    #[must_use]
    pub fn dropped_writes(&self) -> u64 {
        self.dropped_writes.load(Ordering::Relaxed)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cost_contribution(metric: &Metric) -> f64 {
    if metric.name == "cost_usd" {
        metric.value
    } else {
        0.0
    }
}

fn token_contribution(metric: &Metric) -> u64 {
    if metric.name.ends_with("_tokens") {
        metric.value.max(0.0) as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn metric(name: &str, value: f64) -> Metric {
        Metric { name: name.to_string(), value, attributes: HashMap::new(), timestamp: Timestamp::now() }
    }

    fn event(name: &str) -> Event {
        Event { name: name.to_string(), attributes: HashMap::new(), timestamp: Timestamp::now() }
    }

    #[tokio::test]
    async fn add_metric_creates_session_and_aggregates_cost() {
        let store = SessionStore::new();
        let sid = SessionId::from("sess-1");
        store.add_metric(sid.clone(), metric("cost_usd", 0.25)).await;
        store.add_metric(sid.clone(), metric("cost_usd", 0.10)).await;

        let record = store.get_session(&sid).await.expect("session exists");
        assert!((record.total_cost - 0.35).abs() < 1e-9);
        assert_eq!(record.metrics.len(), 2);
    }

    #[tokio::test]
    async fn add_metric_records_latest_observed_model() {
        let store = SessionStore::new();
        let sid = SessionId::from("sess-1");
        let mut m = metric("cost_usd", 0.1);
        m.attributes.insert("model".to_string(), "claude-opus".to_string());
        store.add_metric(sid.clone(), m).await;
        let record = store.get_session(&sid).await.unwrap();
        assert_eq!(record.process_metadata.model.as_deref(), Some("claude-opus"));
    }

    #[tokio::test]
    async fn add_metric_aggregates_tokens() {
        let store = SessionStore::new();
        let sid = SessionId::from("sess-1");
        store.add_metric(sid.clone(), metric("input_tokens", 100.0)).await;
        store.add_metric(sid.clone(), metric("output_tokens", 50.0)).await;
        let record = store.get_session(&sid).await.unwrap();
        assert_eq!(record.total_tokens, 150);
    }

    #[tokio::test]
    async fn get_session_snapshot_does_not_mutate_store() {
        let store = SessionStore::new();
        let sid = SessionId::from("sess-1");
        store.add_event(sid.clone(), event("user_prompt")).await;
        let mut snapshot = store.get_session(&sid).await.unwrap();
        snapshot.events.clear();
        let fresh = store.get_session(&sid).await.unwrap();
        assert_eq!(fresh.events.len(), 1);
    }

    #[tokio::test]
    async fn on_event_fires_for_every_appended_event() {
        let store = SessionStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        store.on_event(move |_sid, write| {
            if matches!(write, SessionWrite::Event(_)) {
                count_clone.fetch_add(1, Ordering::Relaxed);
            }
        }).await;

        let sid = SessionId::from("sess-1");
        store.add_event(sid.clone(), event("a")).await;
        store.add_event(sid, event("b")).await;
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn on_event_fires_for_every_appended_metric() {
        let store = SessionStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        store.on_event(move |_sid, write| {
            if matches!(write, SessionWrite::Metric(_)) {
                count_clone.fetch_add(1, Ordering::Relaxed);
            }
        }).await;

        let sid = SessionId::from("sess-1");
        store.add_metric(sid.clone(), metric("cost_usd", 0.1)).await;
        store.add_metric(sid, metric("input_tokens", 10.0)).await;
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn metrics_over_cap_evict_oldest_and_count_dropped_write() {
        let store = SessionStore::new();
        let sid = SessionId::from("sess-1");
        for i in 0..(MAX_METRICS_PER_SESSION + 5) {
            store.add_metric(sid.clone(), metric("input_tokens", i as f64)).await;
        }
        let record = store.get_session(&sid).await.unwrap();
        assert_eq!(record.metrics.len(), MAX_METRICS_PER_SESSION);
        assert_eq!(store.dropped_writes(), 5);
    }

    #[tokio::test]
    async fn mark_exited_preserves_record() {
        let store = SessionStore::new();
        let sid = SessionId::from("sess-1");
        store.add_event(sid.clone(), event("start")).await;
        store.mark_exited(&sid).await;
        let record = store.get_session(&sid).await.unwrap();
        assert!(record.exited);
        assert_eq!(record.events.len(), 1);
    }

    #[tokio::test]
    async fn get_aggregated_cost_sums_across_sessions() {
        let store = SessionStore::new();
        store.add_metric(SessionId::from("a"), metric("cost_usd", 1.0)).await;
        store.add_metric(SessionId::from("b"), metric("cost_usd", 2.5)).await;
        assert!((store.get_aggregated_cost().await - 3.5).abs() < 1e-9);
    }
}
