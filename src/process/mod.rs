//! `ProcessAPI` (spec.md §4.1): per-OS primitives for owned-process discovery.
//!
//! One capability set, two compile-time-selected implementations — the same
//! shape as the teacher's `process_lookup.rs` (Linux `/proc` reads) gains an
//! Apple-platform sibling here, chosen via `cfg(target_os = ...)` rather than
//! any runtime dispatch (spec.md §9 "Polymorphism").

use crate::domain::{OpenPort, Pid, ProcessError};
use std::collections::HashMap;
use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

/// Best-effort identity of a process: pid plus its binary name.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub binary_name: String,
}

/// Capability set implemented once per supported OS.
pub trait ProcessApi: Send + Sync {
    /// PIDs whose real UID equals the current user's UID.
    fn list_owned_pids(&self) -> Result<Vec<Pid>, ProcessError>;

    fn get_process_info(&self, pid: Pid) -> Result<ProcessInfo, ProcessError>;

    /// Either half may be unavailable; an unreadable environment still
    /// yields argv if that half succeeded (spec.md §4.1: "partial results
    /// are acceptable when only env is unreadable").
    fn get_process_args(
        &self,
        pid: Pid,
    ) -> Result<(Vec<String>, HashMap<String, String>), ProcessError>;

    fn get_process_cwd(&self, pid: Pid) -> Result<PathBuf, ProcessError>;

    fn get_open_ports(&self, pid: Pid) -> Result<Vec<OpenPort>, ProcessError>;
}

/// Construct the `ProcessApi` implementation for the current platform.
#[cfg(target_os = "linux")]
#[must_use]
pub fn current() -> Box<dyn ProcessApi> {
    Box::new(linux::LinuxProcessApi)
}

#[cfg(target_os = "macos")]
#[must_use]
pub fn current() -> Box<dyn ProcessApi> {
    Box::new(macos::MacProcessApi)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
compile_error!("aiwatch's ProcessApi only supports Linux and macOS");
