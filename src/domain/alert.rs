//! Alert record shape (spec.md §3 / §4.8).

use super::types::{SessionId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub rule_name: String,
    pub severity: Severity,
    pub message: String,
    /// `None` for a global (not per-session) alert.
    pub session_id: Option<SessionId>,
    pub fired_at: Timestamp,
}

impl Alert {
    /// Dedup key used by `AlertEngine`'s active-alert set.
    #[must_use]
    pub fn key(&self) -> (String, Option<String>) {
        (self.rule_name.clone(), self.session_id.as_ref().map(|s| s.0.clone()))
    }
}
