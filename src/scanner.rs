//! `Scanner` (spec.md §4.2): periodic target-process discovery and
//! telemetry-configuration classification.

use crate::correlator::Correlator;
use crate::domain::Pid;
use crate::process::ProcessApi;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How an observed target process's telemetry configuration looks, judged
/// purely from its environment (spec.md §4.2 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryState {
    /// Telemetry enabled and pointed at our receiver.
    Connected,
    /// Telemetry enabled, endpoint not yet observed as reachable.
    Waiting,
    /// Telemetry enabled but `OTEL_EXPORTER_OTLP_ENDPOINT` points elsewhere.
    WrongPort,
    /// Telemetry explicitly disabled.
    ConsoleOnly,
    /// `CLAUDE_CODE_ENABLE_TELEMETRY` absent or falsy.
    Off,
    /// Environment unreadable for this PID.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct TargetProcess {
    pub pid: Pid,
    pub binary_name: String,
    pub argv: Vec<String>,
    pub cwd: Option<String>,
    pub telemetry_state: TelemetryState,
    pub is_new: bool,
}

pub struct Scanner {
    process_api: Box<dyn ProcessApi>,
    correlator: Arc<Correlator>,
    target_binary_names: Vec<String>,
    expected_port: u16,
    processes: RwLock<HashMap<Pid, TargetProcess>>,
}

impl Scanner {
    #[must_use]
    pub fn new(
        process_api: Box<dyn ProcessApi>,
        correlator: Arc<Correlator>,
        target_binary_names: Vec<String>,
        expected_port: u16,
    ) -> Self {
        Self {
            process_api,
            correlator,
            target_binary_names,
            expected_port,
            processes: RwLock::new(HashMap::new()),
        }
    }

    fn is_target(&self, binary_name: &str, argv0: Option<&str>) -> bool {
        let matches_name = |candidate: &str| {
            self.target_binary_names.iter().any(|n| n.eq_ignore_ascii_case(candidate))
        };
        matches_name(binary_name) || argv0.is_some_and(matches_name)
    }

    fn classify_telemetry(&self, env: &HashMap<String, String>) -> TelemetryState {
        let enabled = match env.get("CLAUDE_CODE_ENABLE_TELEMETRY").map(String::as_str) {
            Some("1") | Some("true") | Some("yes") => true,
            Some(_) => false,
            None => return TelemetryState::Off,
        };
        if !enabled {
            return TelemetryState::ConsoleOnly;
        }
        match env.get("OTEL_EXPORTER_OTLP_ENDPOINT") {
            None => TelemetryState::Waiting,
            Some(endpoint) => {
                if endpoint_targets_port(endpoint, self.expected_port) {
                    TelemetryState::Connected
                } else {
                    TelemetryState::WrongPort
                }
            }
        }
    }

    /// Perform one discovery cycle (spec.md §4.2). A failure reading any
    /// single PID's details skips that PID for this cycle only.
    pub fn scan(&self) {
        let owned_pids = match self.process_api.list_owned_pids() {
            Ok(pids) => pids,
            Err(err) => {
                warn!(%err, "scan: failed to enumerate owned pids");
                return;
            }
        };

        let mut discovered: HashMap<Pid, TargetProcess> = HashMap::new();
        let previous_pids: HashSet<Pid> = self.processes.read().expect("scanner lock poisoned").keys().copied().collect();

        for pid in owned_pids {
            let info = match self.process_api.get_process_info(pid) {
                Ok(info) => info,
                Err(_) => continue,
            };

            let (argv, env) = match self.process_api.get_process_args(pid) {
                Ok(pair) => pair,
                Err(_) => (Vec::new(), HashMap::new()),
            };
            let argv0 = argv.first().map(String::as_str);

            if !self.is_target(&info.binary_name, argv0) {
                continue;
            }

            let cwd = self.process_api.get_process_cwd(pid).ok().map(|p| p.to_string_lossy().into_owned());
            let telemetry_state = if env.is_empty() {
                TelemetryState::Unknown
            } else {
                self.classify_telemetry(&env)
            };

            let is_new = !previous_pids.contains(&pid);
            if is_new {
                self.correlator.record_pid(pid);
                debug!(pid = pid.0, binary = %info.binary_name, "scanner: new target process");
            }

            discovered.insert(pid, TargetProcess {
                pid,
                binary_name: info.binary_name,
                argv,
                cwd,
                telemetry_state,
                is_new,
            });
        }

        for departed in previous_pids.difference(&discovered.keys().copied().collect()) {
            self.correlator.remove_pid(*departed);
            debug!(pid = departed.0, "scanner: target process exited");
        }

        *self.processes.write().expect("scanner lock poisoned") = discovered;
    }

    /// Snapshot of currently tracked target processes.
    #[must_use]
    pub fn processes(&self) -> Vec<TargetProcess> {
        self.processes.read().expect("scanner lock poisoned").values().cloned().collect()
    }

    /// Scheduled repetition at `interval`, stopping at the next tick boundary
    /// once `cancel` is triggered (spec.md §5 "periodic scanner task").
    pub async fn start_periodic_scan(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.scan(),
                () = cancel.cancelled() => break,
            }
        }
    }
}

/// True if `endpoint` (an OTLP exporter URL) resolves to `expected_port`.
fn endpoint_targets_port(endpoint: &str, expected_port: u16) -> bool {
    endpoint
        .rsplit_once(':')
        .and_then(|(_, port_part)| port_part.trim_end_matches('/').parse::<u16>().ok())
        .is_some_and(|p| p == expected_port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OpenPort, Port, ProcessError};
    use crate::process::ProcessInfo;
    use std::sync::Mutex;

    struct FakeProcessApi {
        infos: Arc<Mutex<HashMap<i32, (String, Vec<String>, HashMap<String, String>)>>>,
    }

    impl ProcessApi for FakeProcessApi {
        fn list_owned_pids(&self) -> Result<Vec<Pid>, ProcessError> {
            Ok(self.infos.lock().unwrap().keys().map(|&p| Pid(p)).collect())
        }
        fn get_process_info(&self, pid: Pid) -> Result<ProcessInfo, ProcessError> {
            let infos = self.infos.lock().unwrap();
            let (name, ..) = infos.get(&pid.0).ok_or(ProcessError::NotFound(pid))?;
            Ok(ProcessInfo { pid, binary_name: name.clone() })
        }
        fn get_process_args(
            &self,
            pid: Pid,
        ) -> Result<(Vec<String>, HashMap<String, String>), ProcessError> {
            let infos = self.infos.lock().unwrap();
            let (_, argv, env) = infos.get(&pid.0).ok_or(ProcessError::NotFound(pid))?;
            Ok((argv.clone(), env.clone()))
        }
        fn get_process_cwd(&self, _pid: Pid) -> Result<std::path::PathBuf, ProcessError> {
            Ok(std::path::PathBuf::from("/tmp"))
        }
        fn get_open_ports(&self, _pid: Pid) -> Result<Vec<OpenPort>, ProcessError> {
            Ok(Vec::new())
        }
    }

    fn scanner_with(infos: HashMap<i32, (String, Vec<String>, HashMap<String, String>)>) -> Scanner {
        scanner_with_shared(Arc::new(Mutex::new(infos)))
    }

    fn scanner_with_shared(
        infos: Arc<Mutex<HashMap<i32, (String, Vec<String>, HashMap<String, String>)>>>,
    ) -> Scanner {
        let correlator = Arc::new(Correlator::new(Port(4317), 10.0));
        Scanner::new(Box::new(FakeProcessApi { infos }), correlator, vec!["claude".to_string()], 4317)
    }

    #[test]
    fn retains_matching_binary_name_marks_new() {
        let scanner = scanner_with(HashMap::from([(
            100,
            ("claude".to_string(), vec!["claude".to_string()], HashMap::new()),
        )]));
        scanner.scan();
        let procs = scanner.processes();
        assert_eq!(procs.len(), 1);
        assert!(procs[0].is_new);
    }

    #[test]
    fn second_scan_clears_is_new() {
        let scanner = scanner_with(HashMap::from([(
            100,
            ("claude".to_string(), vec!["claude".to_string()], HashMap::new()),
        )]));
        scanner.scan();
        scanner.scan();
        let procs = scanner.processes();
        assert!(!procs[0].is_new);
    }

    #[test]
    fn ignores_non_target_binary() {
        let scanner = scanner_with(HashMap::from([(
            100,
            ("bash".to_string(), vec!["bash".to_string()], HashMap::new()),
        )]));
        scanner.scan();
        assert!(scanner.processes().is_empty());
    }

    #[test]
    fn matches_by_argv0_when_binary_name_differs() {
        let scanner = scanner_with(HashMap::from([(
            100,
            ("node".to_string(), vec!["claude".to_string(), "--flag".to_string()], HashMap::new()),
        )]));
        scanner.scan();
        assert_eq!(scanner.processes().len(), 1);
    }

    #[test]
    fn classifies_connected_when_endpoint_matches_expected_port() {
        let scanner = scanner_with(HashMap::from([(
            100,
            (
                "claude".to_string(),
                vec!["claude".to_string()],
                HashMap::from([
                    ("CLAUDE_CODE_ENABLE_TELEMETRY".to_string(), "1".to_string()),
                    ("OTEL_EXPORTER_OTLP_ENDPOINT".to_string(), "http://localhost:4317".to_string()),
                ]),
            ),
        )]));
        scanner.scan();
        assert_eq!(scanner.processes()[0].telemetry_state, TelemetryState::Connected);
    }

    #[test]
    fn classifies_wrong_port_when_endpoint_mismatches() {
        let scanner = scanner_with(HashMap::from([(
            100,
            (
                "claude".to_string(),
                vec!["claude".to_string()],
                HashMap::from([
                    ("CLAUDE_CODE_ENABLE_TELEMETRY".to_string(), "1".to_string()),
                    ("OTEL_EXPORTER_OTLP_ENDPOINT".to_string(), "http://localhost:9999".to_string()),
                ]),
            ),
        )]));
        scanner.scan();
        assert_eq!(scanner.processes()[0].telemetry_state, TelemetryState::WrongPort);
    }

    #[test]
    fn classifies_console_only_when_telemetry_disabled() {
        let scanner = scanner_with(HashMap::from([(
            100,
            (
                "claude".to_string(),
                vec!["claude".to_string()],
                HashMap::from([("CLAUDE_CODE_ENABLE_TELEMETRY".to_string(), "0".to_string())]),
            ),
        )]));
        scanner.scan();
        assert_eq!(scanner.processes()[0].telemetry_state, TelemetryState::ConsoleOnly);
    }

    #[test]
    fn classifies_unknown_when_env_unreadable() {
        let scanner = scanner_with(HashMap::from([(
            100,
            ("claude".to_string(), vec!["claude".to_string()], HashMap::new()),
        )]));
        scanner.scan();
        assert_eq!(scanner.processes()[0].telemetry_state, TelemetryState::Unknown);
    }

    #[test]
    fn departed_pid_is_dropped_and_correlator_notified() {
        let infos = Arc::new(Mutex::new(HashMap::from([(
            100,
            ("claude".to_string(), vec!["claude".to_string()], HashMap::new()),
        )])));
        let scanner = scanner_with_shared(infos.clone());
        scanner.scan();
        assert_eq!(scanner.processes().len(), 1);

        infos.lock().unwrap().remove(&100);
        scanner.scan();
        assert!(scanner.processes().is_empty());
    }

    #[test]
    fn endpoint_port_parsing() {
        assert!(endpoint_targets_port("http://localhost:4317", 4317));
        assert!(endpoint_targets_port("localhost:4317/", 4317));
        assert!(!endpoint_targets_port("http://localhost:4318", 4317));
        assert!(!endpoint_targets_port("not-a-url", 4317));
    }
}
