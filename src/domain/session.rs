//! Session record and the data that hangs off it (spec.md §3).

use super::types::{SessionId, Timestamp};
use std::collections::HashMap;

/// How long a session stays `Active` after its last event, before `Idle`.
pub const ACTIVE_WINDOW_SECS: f64 = 30.0;
/// How long a session stays `Idle` after its last event, before `Done`.
pub const IDLE_WINDOW_SECS: f64 = 600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Idle,
    Done,
    Exited,
}

/// A single metric data point, as appended by the receiver.
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub attributes: HashMap<String, String>,
    pub timestamp: Timestamp,
}

/// A single log-derived event, as appended by the receiver.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub timestamp: Timestamp,
}

/// Process metadata last observed for a session (binary name, terminal, cwd, model).
#[derive(Debug, Clone, Default)]
pub struct ProcessMetadata {
    pub binary_name: Option<String>,
    pub terminal: Option<String>,
    pub cwd: Option<String>,
    pub model: Option<String>,
}

/// The central entity: one logical unit of work identified by `session_id`.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: SessionId,
    /// `0` if not yet correlated to an OS process.
    pub pid: i32,
    pub process_metadata: ProcessMetadata,
    pub started_at: Timestamp,
    pub last_event_at: Timestamp,
    pub exited: bool,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub metrics: Vec<Metric>,
    pub events: Vec<Event>,
}

impl SessionRecord {
    #[must_use]
    pub fn new(session_id: SessionId, now: Timestamp) -> Self {
        Self {
            session_id,
            pid: 0,
            process_metadata: ProcessMetadata::default(),
            started_at: now,
            last_event_at: now,
            exited: false,
            total_cost: 0.0,
            total_tokens: 0,
            metrics: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Derived status per spec.md §3.
    #[must_use]
    pub fn status(&self, now: Timestamp) -> SessionStatus {
        if self.exited {
            return SessionStatus::Exited;
        }
        let age = now.duration_since(self.last_event_at);
        if age <= ACTIVE_WINDOW_SECS {
            SessionStatus::Active
        } else if age <= IDLE_WINDOW_SECS {
            SessionStatus::Idle
        } else {
            SessionStatus::Done
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(last_event_secs: f64) -> SessionRecord {
        let mut s = SessionRecord::new(SessionId::from("sess-abc"), Timestamp::from_secs(0.0));
        s.last_event_at = Timestamp::from_secs(last_event_secs);
        s
    }

    #[test]
    fn status_active_within_30s() {
        let s = session_at(0.0);
        assert_eq!(s.status(Timestamp::from_secs(29.0)), SessionStatus::Active);
    }

    #[test]
    fn status_idle_after_30s_within_10min() {
        let s = session_at(0.0);
        assert_eq!(s.status(Timestamp::from_secs(60.0)), SessionStatus::Idle);
    }

    #[test]
    fn status_done_after_10min() {
        let s = session_at(0.0);
        assert_eq!(s.status(Timestamp::from_secs(601.0)), SessionStatus::Done);
    }

    #[test]
    fn status_exited_overrides_all() {
        let mut s = session_at(0.0);
        s.exited = true;
        assert_eq!(s.status(Timestamp::from_secs(1.0)), SessionStatus::Exited);
    }
}
