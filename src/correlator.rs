//! `Correlator` (spec.md §4.5): binds an OTLP session to the OS process
//! emitting it, via port fingerprinting (authoritative) then a timing
//! heuristic (fallback).

use crate::domain::{Pid, Port, SessionId, Timestamp};
use crate::process::ProcessApi;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, trace};

/// Default window (seconds) within which a new PID and a new session are
/// considered plausibly paired by the timing fallback (spec.md GLOSSARY).
pub const DEFAULT_TIMING_WINDOW_SECS: f64 = 10.0;

struct State {
    port_to_session: HashMap<Port, SessionId>,
    pid_to_session: HashMap<Pid, SessionId>,
    session_to_pid: HashMap<SessionId, Pid>,
    new_pids: HashMap<Pid, Timestamp>,
    new_sessions: HashMap<SessionId, Timestamp>,
}

pub struct Correlator {
    state: Mutex<State>,
    receiver_port: Port,
    timing_window_secs: f64,
}

impl Correlator {
    #[must_use]
    pub fn new(receiver_port: Port, timing_window_secs: f64) -> Self {
        Self {
            state: Mutex::new(State {
                port_to_session: HashMap::new(),
                pid_to_session: HashMap::new(),
                session_to_pid: HashMap::new(),
                new_pids: HashMap::new(),
                new_sessions: HashMap::new(),
            }),
            receiver_port,
            timing_window_secs,
        }
    }

    /// Called by the Receiver once per distinct inbound source port.
    /// Idempotent under connection reuse: the most recent session id wins.
    pub fn record_connection(&self, source_port: Port, session_id: SessionId) {
        let now = Timestamp::now();
        let mut state = self.state.lock().expect("correlator mutex poisoned");
        state.port_to_session.insert(source_port, session_id.clone());
        if !state.session_to_pid.contains_key(&session_id) {
            state.new_sessions.entry(session_id).or_insert(now);
        }
    }

    /// Called by the Scanner when a target PID is newly observed.
    pub fn record_pid(&self, pid: Pid) {
        let now = Timestamp::now();
        let mut state = self.state.lock().expect("correlator mutex poisoned");
        if !state.pid_to_session.contains_key(&pid) {
            state.new_pids.entry(pid).or_insert(now);
        }
    }

    /// Called by the Scanner on PID exit. Only removes the PID from the
    /// `new_pids` timing-fallback queue; a confirmed binding is preserved
    /// for historical display (spec.md §3 invariant).
    pub fn remove_pid(&self, pid: Pid) {
        let mut state = self.state.lock().expect("correlator mutex poisoned");
        state.new_pids.remove(&pid);
    }

    #[must_use]
    pub fn get_session_for_pid(&self, pid: Pid) -> Option<SessionId> {
        self.state.lock().expect("correlator mutex poisoned").pid_to_session.get(&pid).cloned()
    }

    #[must_use]
    pub fn get_pid_for_session(&self, session_id: &SessionId) -> Option<Pid> {
        self.state.lock().expect("correlator mutex poisoned").session_to_pid.get(session_id).copied()
    }

    /// The periodic resolve pass (spec.md §4.5). Runs phase 1 (port
    /// fingerprinting) to completion across all `active_pids`, then phase 2
    /// (timing heuristic), then prunes stale `new_*` entries.
    pub fn correlate(&self, active_pids: &[Pid], process_api: &dyn ProcessApi) {
        self.phase1_port_fingerprint(active_pids, process_api);
        self.phase2_timing_heuristic();
        self.cleanup_stale_entries();
    }

    fn phase1_port_fingerprint(&self, active_pids: &[Pid], process_api: &dyn ProcessApi) {
        for &pid in active_pids {
            let already_bound = {
                let state = self.state.lock().expect("correlator mutex poisoned");
                state.pid_to_session.contains_key(&pid)
            };
            if already_bound {
                continue;
            }

            let open_ports = match process_api.get_open_ports(pid) {
                Ok(ports) => ports,
                // Per spec.md §4.5: a failure reading one PID's open ports is
                // silently skipped; the correlator never fails the caller.
                Err(_) => continue,
            };

            let matched_session = open_ports
                .iter()
                .find(|p| p.remote_port == self.receiver_port)
                .and_then(|p| {
                    let state = self.state.lock().expect("correlator mutex poisoned");
                    state.port_to_session.get(&p.local_port).cloned()
                });

            if let Some(session_id) = matched_session {
                let mut state = self.state.lock().expect("correlator mutex poisoned");
                self.bind_locked(&mut state, pid, session_id.clone());
                debug!(pid = pid.0, session = %session_id, "correlated via port fingerprint");
            }
        }
    }

    fn phase2_timing_heuristic(&self) {
        let mut state = self.state.lock().expect("correlator mutex poisoned");
        let pending_pids: Vec<(Pid, Timestamp)> = state.new_pids.iter().map(|(p, t)| (*p, *t)).collect();

        for (pid, pid_time) in pending_pids {
            if state.pid_to_session.contains_key(&pid) {
                continue;
            }
            let found = state
                .new_sessions
                .iter()
                .find(|(sid, sess_time)| {
                    !state.session_to_pid.contains_key(*sid)
                        && (pid_time.duration_since(**sess_time)).abs() <= self.timing_window_secs
                })
                .map(|(sid, _)| sid.clone());

            if let Some(session_id) = found {
                self.bind_locked(&mut state, pid, session_id.clone());
                trace!(pid = pid.0, session = %session_id, "correlated via timing heuristic");
            }
        }
    }

    fn bind_locked(&self, state: &mut State, pid: Pid, session_id: SessionId) {
        state.pid_to_session.insert(pid, session_id.clone());
        state.session_to_pid.insert(session_id.clone(), pid);
        state.new_pids.remove(&pid);
        state.new_sessions.remove(&session_id);
    }

    fn cleanup_stale_entries(&self) {
        let now = Timestamp::now();
        let cutoff = 2.0 * self.timing_window_secs;
        let mut state = self.state.lock().expect("correlator mutex poisoned");
        state.new_pids.retain(|_, t| now.duration_since(*t) <= cutoff);
        state.new_sessions.retain(|_, t| now.duration_since(*t) <= cutoff);
    }
}
