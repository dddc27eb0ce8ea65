//! Structured error types, one enum per subsystem.
//!
//! Mirrors the teacher's `domain/errors.rs` split (one `thiserror` enum per
//! component rather than one crate-wide error type) so each subsystem's
//! failure modes stay self-describing at the call site.

use super::types::Pid;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("process {0} not found")]
    NotFound(Pid),

    #[error("permission denied reading process {0}")]
    PermissionDenied(Pid),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("failed to decode OTLP payload: {0}")]
    Decode(String),

    #[error("failed to bind {transport} listener on port {port}: {source}")]
    Bind { transport: &'static str, port: u16, source: std::io::Error },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session {0} not found")]
    SessionNotFound(String),
}

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("process already exited")]
    NoSuchProcess,

    #[error("failed to signal {pid}: {errno}")]
    Failed { pid: Pid, errno: i32 },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
