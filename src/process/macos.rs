//! Apple-platform `ProcessApi`, backed by the per-PID `libproc` kernel calls
//! (`proc_pidinfo`, `proc_pidpath`, `proc_pidfdinfo`) and `sysctl` rather than
//! a procfs-style filesystem — there is none on Darwin. Kept behind `libc`
//! FFI the same way the teacher reaches for `libc::geteuid()` in
//! `preflight.rs`'s privilege check.

use super::{ProcessApi, ProcessInfo};
use crate::domain::{OpenPort, Pid, Port, ProcessError};
use std::collections::HashMap;
use std::path::PathBuf;

const PROC_PIDPATH_MAXSIZE: usize = 4096;
const PROC_PIDLISTFDS: i32 = 1;
const PROC_PIDFDSOCKETINFO: i32 = 3;
const PROC_PIDTBSDINFO: i32 = 3;
const PROC_PIDVNODEPATHINFO: i32 = 9;
const PROX_FDTYPE_SOCKET: u32 = 2;
const SOCKINFO_TCP: i32 = 2;
const MAXPATHLEN: usize = 1024;
const CTL_KERN: i32 = 1;
const KERN_PROCARGS2: i32 = 49;

// Minimal bindings for the libproc/sysctl calls this module needs. The full
// layout of `proc_fdinfo`/`socket_fdinfo` is larger; only the fields read
// here are modeled, matching how a consumer of this API would bind just
// enough of `libproc.h`/`sysctl.h` to do the job.
#[allow(non_camel_case_types)]
mod ffi {
    use libc::{c_int, c_void};

    extern "C" {
        pub fn proc_listpids(kind: u32, typeinfo: u32, buffer: *mut c_void, size: c_int) -> c_int;
        pub fn proc_pidpath(pid: c_int, buffer: *mut c_void, size: u32) -> c_int;
        pub fn proc_pidinfo(
            pid: c_int,
            flavor: c_int,
            arg: u64,
            buffer: *mut c_void,
            size: c_int,
        ) -> c_int;
        pub fn proc_pidfdinfo(
            pid: c_int,
            fd: c_int,
            flavor: c_int,
            buffer: *mut c_void,
            size: c_int,
        ) -> c_int;
    }

    pub const PROC_ALL_PIDS: u32 = 1;
}

pub struct MacProcessApi;

impl ProcessApi for MacProcessApi {
    fn list_owned_pids(&self) -> Result<Vec<Pid>, ProcessError> {
        #[allow(unsafe_code)]
        let count = unsafe { ffi::proc_listpids(ffi::PROC_ALL_PIDS, 0, std::ptr::null_mut(), 0) };
        if count <= 0 {
            return Ok(Vec::new());
        }
        let capacity = count as usize;
        let mut buf: Vec<i32> = vec![0; capacity];
        #[allow(unsafe_code)]
        let written = unsafe {
            ffi::proc_listpids(
                ffi::PROC_ALL_PIDS,
                0,
                buf.as_mut_ptr().cast(),
                (capacity * std::mem::size_of::<i32>()) as i32,
            )
        };
        if written <= 0 {
            return Ok(Vec::new());
        }
        let n = (written as usize) / std::mem::size_of::<i32>();
        buf.truncate(n);

        let my_uid = current_uid();
        Ok(buf
            .into_iter()
            .filter(|&pid| pid > 0 && process_uid(pid) == Some(my_uid))
            .map(Pid)
            .collect())
    }

    fn get_process_info(&self, pid: Pid) -> Result<ProcessInfo, ProcessError> {
        let mut path_buf = vec![0u8; PROC_PIDPATH_MAXSIZE];
        #[allow(unsafe_code)]
        let len = unsafe {
            ffi::proc_pidpath(pid.0, path_buf.as_mut_ptr().cast(), PROC_PIDPATH_MAXSIZE as u32)
        };
        if len <= 0 {
            return Err(ProcessError::NotFound(pid));
        }
        path_buf.truncate(len as usize);
        let full_path = String::from_utf8_lossy(&path_buf).into_owned();
        let binary_name = full_path.rsplit('/').next().unwrap_or(&full_path).to_string();
        Ok(ProcessInfo { pid, binary_name })
    }

    fn get_process_args(
        &self,
        pid: Pid,
    ) -> Result<(Vec<String>, HashMap<String, String>), ProcessError> {
        let buf = sysctl_procargs2(pid.0).ok_or(ProcessError::NotFound(pid))?;
        Ok(parse_procargs2(&buf))
    }

    fn get_process_cwd(&self, pid: Pid) -> Result<PathBuf, ProcessError> {
        let mut info: ProcVnodePathInfo = unsafe { std::mem::zeroed() };
        #[allow(unsafe_code)]
        let ret = unsafe {
            ffi::proc_pidinfo(
                pid.0,
                PROC_PIDVNODEPATHINFO,
                0,
                std::ptr::addr_of_mut!(info).cast(),
                std::mem::size_of::<ProcVnodePathInfo>() as i32,
            )
        };
        if ret <= 0 {
            return Err(ProcessError::NotFound(pid));
        }
        let path = &info.pvi_cdir.vip_path;
        let len = path.iter().position(|&b| b == 0).unwrap_or(path.len());
        if len == 0 {
            return Err(ProcessError::NotFound(pid));
        }
        Ok(PathBuf::from(String::from_utf8_lossy(&path[..len]).into_owned()))
    }

    fn get_open_ports(&self, pid: Pid) -> Result<Vec<OpenPort>, ProcessError> {
        #[allow(unsafe_code)]
        let bytes_avail =
            unsafe { ffi::proc_pidinfo(pid.0, PROC_PIDLISTFDS, 0, std::ptr::null_mut(), 0) };
        if bytes_avail <= 0 {
            return Ok(Vec::new());
        }

        let fd_count = bytes_avail as usize / std::mem::size_of::<ProcFdInfo>();
        let mut fds: Vec<ProcFdInfo> = vec![ProcFdInfo { proc_fd: 0, proc_fdtype: 0 }; fd_count];
        #[allow(unsafe_code)]
        let written = unsafe {
            ffi::proc_pidinfo(pid.0, PROC_PIDLISTFDS, 0, fds.as_mut_ptr().cast(), bytes_avail)
        };
        if written <= 0 {
            return Ok(Vec::new());
        }
        fds.truncate(written as usize / std::mem::size_of::<ProcFdInfo>());

        let mut ports = Vec::new();
        for fd in &fds {
            if fd.proc_fdtype != PROX_FDTYPE_SOCKET {
                continue;
            }
            let mut sock: SocketFdInfo = unsafe { std::mem::zeroed() };
            #[allow(unsafe_code)]
            let ret = unsafe {
                ffi::proc_pidfdinfo(
                    pid.0,
                    fd.proc_fd,
                    PROC_PIDFDSOCKETINFO,
                    std::ptr::addr_of_mut!(sock).cast(),
                    std::mem::size_of::<SocketFdInfo>() as i32,
                )
            };
            if ret <= 0 || sock.psi.soi_kind != SOCKINFO_TCP {
                continue;
            }
            let local_port = be_port_from_head(&sock.psi.soi_proto_head, 4);
            let remote_port = be_port_from_head(&sock.psi.soi_proto_head, 0);
            ports.push(OpenPort { local_port: Port(local_port), remote_port: Port(remote_port) });
        }
        Ok(ports)
    }
}

/// `in_sockinfo`/`tcp_sockinfo` both open with `insi_fport`/`insi_lport` as
/// native `int`s holding the port in network byte order in their low 16
/// bits; `offset` selects which of the two 4-byte fields to read.
fn be_port_from_head(head: &[u8; 8], offset: usize) -> u16 {
    u16::from_be_bytes([head[offset], head[offset + 1]])
}

fn current_uid() -> u32 {
    #[allow(unsafe_code)]
    unsafe {
        libc::getuid()
    }
}

/// Layout subset of `struct proc_bsdinfo` (see `<libproc.h>`) needed to read
/// the owning UID; the real struct carries many more fields after `pbi_uid`.
#[repr(C)]
struct ProcBsdInfoPrefix {
    pbi_flags: u32,
    pbi_status: u32,
    pbi_xstatus: u32,
    pbi_pid: u32,
    pbi_ppid: u32,
    pbi_uid: u32,
}

fn process_uid(pid: i32) -> Option<u32> {
    #[allow(unsafe_code)]
    let mut info: ProcBsdInfoPrefix = unsafe { std::mem::zeroed() };
    #[allow(unsafe_code)]
    let ret = unsafe {
        ffi::proc_pidinfo(
            pid,
            PROC_PIDTBSDINFO,
            0,
            std::ptr::addr_of_mut!(info).cast(),
            std::mem::size_of::<ProcBsdInfoPrefix>() as i32,
        )
    };
    if ret <= 0 {
        return None;
    }
    Some(info.pbi_uid)
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ProcFdInfo {
    proc_fd: i32,
    proc_fdtype: u32,
}

/// `struct vinfo_stat` (`<sys/proc_info.h>`): the `stat`-shaped prefix of
/// `vnode_info`. Only used here to get `vip_path` at the right offset.
#[repr(C)]
struct VinfoStat {
    vst_dev: u32,
    vst_mode: u16,
    vst_nlink: u16,
    vst_ino: u64,
    vst_uid: u32,
    vst_gid: u32,
    vst_atime: i64,
    vst_atimensec: i64,
    vst_mtime: i64,
    vst_mtimensec: i64,
    vst_ctime: i64,
    vst_ctimensec: i64,
    vst_birthtime: i64,
    vst_birthtimensec: i64,
    vst_size: i64,
    vst_blocks: i64,
    vst_blksize: i32,
    vst_flags: u32,
    vst_gen: u32,
    vst_rdev: u32,
    vst_qspare: [i64; 2],
}

#[repr(C)]
struct VnodeInfoPath {
    vi_stat: VinfoStat,
    vi_type: i32,
    vi_pad: i32,
    vi_fsid: [i32; 2],
    vip_path: [u8; MAXPATHLEN],
}

/// `struct proc_vnodepathinfo`: only `pvi_cdir` (current working directory)
/// is read; `pvi_rdir` (chroot root) is unused.
#[repr(C)]
struct ProcVnodePathInfo {
    pvi_cdir: VnodeInfoPath,
    pvi_rdir: VnodeInfoPath,
}

/// `struct proc_fileinfo` prefix shared by every `proc_pidfdinfo` flavor.
#[repr(C)]
struct ProcFileInfo {
    fi_openflags: u32,
    fi_status: u32,
    fi_offset: i64,
    fi_type: i32,
    fi_guardflags: u32,
}

/// `struct soi_sockbuf_info` (send/recv buffer stats); not read here, but
/// modeled to keep `soi_kind`'s offset correct within `SocketInfo`.
#[repr(C)]
struct SockbufInfo {
    sbi_cc: u32,
    sbi_hiwat: u32,
    sbi_mbcnt: u32,
    sbi_mbmax: u32,
    sbi_lowat: u32,
    sbi_flags: i16,
    sbi_timeo: i16,
}

/// Subset of `struct socket_info`: everything up to `soi_proto` is modeled
/// field-for-field so the union lands at the right offset; `soi_proto_head`
/// reads only the first 8 bytes shared by `in_sockinfo`/`tcp_sockinfo`
/// (`insi_fport`, `insi_lport`) rather than the full tagged union.
#[repr(C)]
struct SocketInfo {
    soi_pfi: ProcFileInfo,
    soi_so: u64,
    soi_pcb: u64,
    soi_type: i32,
    soi_protocol: i32,
    soi_family: i32,
    soi_options: i16,
    soi_linger: i16,
    soi_state: i16,
    soi_qlen: i16,
    soi_incqlen: i16,
    soi_qlimit: i16,
    soi_timeo: i16,
    soi_error: u16,
    soi_oobmark: u32,
    soi_rcv: SockbufInfo,
    soi_snd: SockbufInfo,
    soi_kind: i32,
    rfu_1: u32,
    soi_proto_head: [u8; 8],
}

#[repr(C)]
struct SocketFdInfo {
    pfi: ProcFileInfo,
    psi: SocketInfo,
}

/// Recovers argv/env via `sysctl(CTL_KERN, KERN_PROCARGS2, pid)` — the
/// standard Darwin mechanism since there is no `/proc/<pid>/cmdline`.
fn sysctl_procargs2(pid: i32) -> Option<Vec<u8>> {
    let mut mib = [CTL_KERN, KERN_PROCARGS2, pid];
    let mut size: usize = 0;
    #[allow(unsafe_code)]
    let ret = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as u32,
            std::ptr::null_mut(),
            &mut size,
            std::ptr::null_mut(),
            0,
        )
    };
    if ret != 0 || size == 0 {
        return None;
    }
    let mut buf = vec![0u8; size];
    #[allow(unsafe_code)]
    let ret = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            mib.len() as u32,
            buf.as_mut_ptr().cast(),
            &mut size,
            std::ptr::null_mut(),
            0,
        )
    };
    if ret != 0 {
        return None;
    }
    buf.truncate(size);
    Some(buf)
}

/// Parses a `KERN_PROCARGS2` buffer: a leading `argc` (native `i32`), the
/// kernel-saved exec path (NUL-terminated, discarded), then `argc`
/// NUL-terminated argv strings, then `KEY=VALUE` environment strings running
/// to the end of the buffer.
fn parse_procargs2(buf: &[u8]) -> (Vec<String>, HashMap<String, String>) {
    if buf.len() < 4 {
        return (Vec::new(), HashMap::new());
    }
    let argc = i32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]).max(0) as usize;
    let mut pos = 4;

    while pos < buf.len() && buf[pos] != 0 {
        pos += 1;
    }
    while pos < buf.len() && buf[pos] == 0 {
        pos += 1;
    }

    let mut argv = Vec::with_capacity(argc);
    for _ in 0..argc {
        if pos >= buf.len() {
            break;
        }
        let start = pos;
        while pos < buf.len() && buf[pos] != 0 {
            pos += 1;
        }
        argv.push(String::from_utf8_lossy(&buf[start..pos]).into_owned());
        while pos < buf.len() && buf[pos] == 0 {
            pos += 1;
        }
    }

    let mut env = HashMap::new();
    while pos < buf.len() {
        let start = pos;
        while pos < buf.len() && buf[pos] != 0 {
            pos += 1;
        }
        if pos == start {
            break;
        }
        let entry = String::from_utf8_lossy(&buf[start..pos]);
        if let Some((k, v)) = entry.split_once('=') {
            env.insert(k.to_string(), v.to_string());
        }
        while pos < buf.len() && buf[pos] == 0 {
            pos += 1;
        }
    }

    (argv, env)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a synthetic KERN_PROCARGS2 buffer: argc, exec_path, argv, env.
    fn fake_procargs2(exec_path: &str, argv: &[&str], env: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(argv.len() as i32).to_ne_bytes());
        buf.extend_from_slice(exec_path.as_bytes());
        buf.push(0);
        for arg in argv {
            buf.extend_from_slice(arg.as_bytes());
            buf.push(0);
        }
        for (k, v) in env {
            buf.extend_from_slice(format!("{k}={v}").as_bytes());
            buf.push(0);
        }
        buf
    }

    #[test]
    fn parse_procargs2_splits_argv_and_env() {
        let buf = fake_procargs2(
            "/usr/bin/claude",
            &["claude", "--resume"],
            &[("HOME", "/Users/dev"), ("PATH", "/usr/bin:/bin")],
        );
        let (argv, env) = parse_procargs2(&buf);
        assert_eq!(argv, vec!["claude".to_string(), "--resume".to_string()]);
        assert_eq!(env.get("HOME"), Some(&"/Users/dev".to_string()));
        assert_eq!(env.get("PATH"), Some(&"/usr/bin:/bin".to_string()));
    }

    #[test]
    fn parse_procargs2_handles_empty_buffer() {
        let (argv, env) = parse_procargs2(&[]);
        assert!(argv.is_empty());
        assert!(env.is_empty());
    }

    #[test]
    fn be_port_from_head_reads_network_byte_order() {
        // Port 8443 = 0x20FB, stored big-endian in the low two bytes.
        let head = [0x20, 0xFB, 0, 0, 0x1F, 0x90, 0, 0];
        assert_eq!(be_port_from_head(&head, 0), 8443);
        assert_eq!(be_port_from_head(&head, 4), 8080);
    }
}
