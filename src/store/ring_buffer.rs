//! `EventRingBuffer` (spec.md §4.6): fixed-capacity circular buffer of
//! formatted, user-visible events, shared by the UI's event-tail provider.

use crate::domain::SessionId;
use std::collections::VecDeque;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct RingEvent {
    pub session_id: SessionId,
    pub event_type: String,
    pub formatted_text: String,
}

pub struct EventRingBuffer {
    capacity: usize,
    entries: RwLock<VecDeque<RingEvent>>,
}

impl EventRingBuffer {
    /// `capacity` of 0 is clamped to 1 — an empty buffer would defeat the
    /// caller's "always show the latest event" expectation.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: RwLock::new(VecDeque::new()) }
    }

    pub fn add(&self, entry: RingEvent) {
        let mut entries = self.entries.write().expect("ring buffer lock poisoned");
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    #[must_use]
    pub fn list_all(&self) -> Vec<RingEvent> {
        self.entries.read().expect("ring buffer lock poisoned").iter().cloned().collect()
    }

    #[must_use]
    pub fn list_by_session(&self, session_id: &SessionId) -> Vec<RingEvent> {
        self.entries
            .read()
            .expect("ring buffer lock poisoned")
            .iter()
            .filter(|e| &e.session_id == session_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn list_by_type(&self, event_type: &str) -> Vec<RingEvent> {
        self.entries
            .read()
            .expect("ring buffer lock poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().expect("ring buffer lock poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn cap(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(session: &str, kind: &str) -> RingEvent {
        RingEvent {
            session_id: SessionId::from(session),
            event_type: kind.to_string(),
            formatted_text: format!("{session}:{kind}"),
        }
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let buf = EventRingBuffer::new(0);
        assert_eq!(buf.cap(), 1);
        buf.add(entry("s1", "user_prompt"));
        buf.add(entry("s2", "tool_result"));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.list_all()[0].session_id, SessionId::from("s2"));
    }

    #[test]
    fn evicts_oldest_when_full() {
        let buf = EventRingBuffer::new(2);
        buf.add(entry("s1", "a"));
        buf.add(entry("s1", "b"));
        buf.add(entry("s1", "c"));
        let all = buf.list_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type, "b");
        assert_eq!(all[1].event_type, "c");
    }

    #[test]
    fn list_by_session_filters() {
        let buf = EventRingBuffer::new(10);
        buf.add(entry("s1", "a"));
        buf.add(entry("s2", "b"));
        buf.add(entry("s1", "c"));
        let filtered = buf.list_by_session(&SessionId::from("s1"));
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn list_by_type_filters() {
        let buf = EventRingBuffer::new(10);
        buf.add(entry("s1", "tool_result"));
        buf.add(entry("s2", "user_prompt"));
        buf.add(entry("s3", "tool_result"));
        let filtered = buf.list_by_type("tool_result");
        assert_eq!(filtered.len(), 2);
    }
}
