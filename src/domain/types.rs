//! Core newtypes shared across subsystems.
//!
//! Wrapping raw `i32`/`String` values keeps PID and session-id arguments from
//! being accidentally swapped at call sites — the same motivation as the
//! `Pid`/`Tid` newtypes this system is grounded on.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Operating-system process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub i32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<i32> for Pid {
    fn from(v: i32) -> Self {
        Self(v)
    }
}

/// Opaque session identifier carried in OTLP attributes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(v: String) -> Self {
        Self(v)
    }
}

impl From<&str> for SessionId {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

impl SessionId {
    /// First 12 characters, used by the event formatter (spec.md §4.10).
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(12).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

/// Ephemeral local TCP port, either side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Port(pub u16);

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Wall-clock instant, seconds since the Unix epoch.
///
/// Using seconds-since-epoch (rather than `Instant`) lets the burn-rate
/// calculator and the timing-heuristic correlator accept an injected "now"
/// for deterministic tests, per spec.md §4.7's "optionally with a supplied
/// now timestamp for testability".
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Timestamp(pub f64);

impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        let dur = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self(dur.as_secs_f64())
    }

    #[must_use]
    pub fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    #[must_use]
    pub fn duration_since(&self, earlier: Timestamp) -> f64 {
        self.0 - earlier.0
    }
}

/// An open TCP socket belonging to a process, as reported by `ProcessApi::get_open_ports`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenPort {
    pub local_port: Port,
    /// `0` when the socket is listen-only and no remote is observable.
    pub remote_port: Port,
}
