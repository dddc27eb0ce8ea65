//! Linux `/proc`-based `ProcessApi`.
//!
//! Built directly on the teacher's own `process_lookup.rs` idiom: read
//! `/proc/<pid>/exe`, `/proc/<pid>/stat`, `/proc/<pid>/environ`, and —
//! new for this system — `/proc/<pid>/net/tcp{,6}` cross-referenced against
//! `/proc/<pid>/fd` socket inodes to resolve open ports per spec.md §4.1.

use super::{ProcessApi, ProcessInfo};
use crate::domain::{OpenPort, Pid, Port, ProcessError};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

pub struct LinuxProcessApi;

impl ProcessApi for LinuxProcessApi {
    fn list_owned_pids(&self) -> Result<Vec<Pid>, ProcessError> {
        let my_uid = current_uid();
        let mut pids = Vec::new();
        for entry in fs::read_dir("/proc")? {
            let Ok(entry) = entry else { continue };
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else { continue };
            if process_uid(pid) == Some(my_uid) {
                pids.push(Pid(pid));
            }
        }
        Ok(pids)
    }

    fn get_process_info(&self, pid: Pid) -> Result<ProcessInfo, ProcessError> {
        let stat = fs::read_to_string(format!("/proc/{}/stat", pid.0))
            .map_err(|_| ProcessError::NotFound(pid))?;
        let binary_name = extract_comm(&stat).unwrap_or_else(|| "unknown".to_string());
        Ok(ProcessInfo { pid, binary_name })
    }

    fn get_process_args(
        &self,
        pid: Pid,
    ) -> Result<(Vec<String>, HashMap<String, String>), ProcessError> {
        let cmdline_path = format!("/proc/{}/cmdline", pid.0);
        let raw = fs::read(&cmdline_path).map_err(|_| ProcessError::NotFound(pid))?;
        let argv: Vec<String> = raw
            .split(|&b| b == 0)
            .filter(|s| !s.is_empty())
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .collect();

        // Environment may be unreadable (permission) without failing the call —
        // spec.md §4.1: "partial results are acceptable when only env is unreadable".
        let env = fs::read(format!("/proc/{}/environ", pid.0))
            .ok()
            .map(|raw| parse_environ(&raw))
            .unwrap_or_default();

        Ok((argv, env))
    }

    fn get_process_cwd(&self, pid: Pid) -> Result<PathBuf, ProcessError> {
        fs::read_link(format!("/proc/{}/cwd", pid.0)).map_err(|_| ProcessError::NotFound(pid))
    }

    fn get_open_ports(&self, pid: Pid) -> Result<Vec<OpenPort>, ProcessError> {
        let inodes = socket_inodes_for_pid(pid)?;
        if inodes.is_empty() {
            return Ok(Vec::new());
        }

        let mut ports = Vec::new();
        for table in ["tcp", "tcp6"] {
            let path = format!("/proc/{}/net/{table}", pid.0);
            let Ok(content) = fs::read_to_string(&path) else { continue };
            for line in content.lines().skip(1) {
                if let Some(port) = parse_net_tcp_line(line, &inodes) {
                    ports.push(port);
                }
            }
        }
        Ok(ports)
    }
}

/// Extract command name from `/proc/<pid>/stat` ("pid (comm) state ...").
/// Command names may themselves contain parentheses, so match the outermost pair.
fn extract_comm(stat_line: &str) -> Option<String> {
    let open = stat_line.find('(')?;
    let close = stat_line.rfind(')')?;
    if open >= close {
        return None;
    }
    Some(stat_line[open + 1..close].to_string())
}

fn parse_environ(raw: &[u8]) -> HashMap<String, String> {
    raw.split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            let text = String::from_utf8_lossy(entry);
            text.split_once('=').map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

fn current_uid() -> u32 {
    // SAFETY: getuid() has no preconditions and cannot fail.
    #[allow(unsafe_code)]
    unsafe {
        libc::getuid()
    }
}

fn process_uid(pid: i32) -> Option<u32> {
    let status = fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            // "Uid:\treal\teffective\tsaved\tfs"
            let real = rest.split_whitespace().next()?;
            return real.parse().ok();
        }
    }
    None
}

/// Socket inodes owned by `pid`, gathered from `/proc/<pid>/fd/*` symlinks of
/// the form `socket:[12345]`.
fn socket_inodes_for_pid(pid: Pid) -> Result<HashSet<u64>, ProcessError> {
    let fd_dir = format!("/proc/{}/fd", pid.0);
    let mut inodes = HashSet::new();
    let entries = match fs::read_dir(&fd_dir) {
        Ok(e) => e,
        // A process with no readable fd directory simply has no discoverable sockets.
        Err(_) => return Ok(inodes),
    };
    for entry in entries.flatten() {
        if let Ok(link) = fs::read_link(entry.path()) {
            let text = link.to_string_lossy();
            if let Some(inode_str) = text.strip_prefix("socket:[").and_then(|s| s.strip_suffix(']'))
            {
                if let Ok(inode) = inode_str.parse() {
                    inodes.insert(inode);
                }
            }
        }
    }
    Ok(inodes)
}

/// Parse one data line of `/proc/<pid>/net/tcp{,6}`, returning an `OpenPort`
/// only if the line's socket inode belongs to this process.
///
/// Line shape: `sl local_address:local_port rem_address:rem_port st ... inode ...`
/// with addresses/ports in hex, e.g. `0100007F:1F90`.
fn parse_net_tcp_line(line: &str, owned_inodes: &HashSet<u64>) -> Option<OpenPort> {
    let mut fields = line.split_whitespace();
    let _sl = fields.next()?;
    let local = fields.next()?;
    let remote = fields.next()?;
    let _state = fields.next()?;
    // queue, tr/tm, retrnsmt, uid, timeout, inode
    let inode: u64 = fields.nth(5)?.parse().ok()?;

    if !owned_inodes.contains(&inode) {
        return None;
    }

    let local_port = hex_port(local)?;
    let remote_port = hex_port(remote)?;
    Some(OpenPort { local_port: Port(local_port), remote_port: Port(remote_port) })
}

fn hex_port(addr_colon_port: &str) -> Option<u16> {
    let (_, port_hex) = addr_colon_port.split_once(':')?;
    u16::from_str_radix(port_hex, 16).ok()
}
