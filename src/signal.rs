//! `SignalSender` (spec.md §4.1 / §4.9): POSIX signal delivery with a
//! process-group-then-PID fallback.

use crate::domain::{Pid, SignalError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Stop,
    Continue,
    Kill,
    Term,
}

impl Signal {
    fn raw(self) -> i32 {
        match self {
            Signal::Stop => libc::SIGSTOP,
            Signal::Continue => libc::SIGCONT,
            Signal::Kill => libc::SIGKILL,
            Signal::Term => libc::SIGTERM,
        }
    }
}

pub struct SignalSender;

impl SignalSender {
    /// Send `signal` to `pid`'s process group; if that fails because the
    /// process isn't a group leader (or for lack of permission), falls back
    /// to signaling the PID directly. `ESRCH` (already exited) is reported
    /// as `SignalError::NoSuchProcess`, which callers treat as non-fatal
    /// per spec.md §7.
    pub fn send(&self, pid: Pid, signal: Signal) -> Result<(), SignalError> {
        let raw = signal.raw();

        #[allow(unsafe_code)]
        let group_result = unsafe { libc::kill(-pid.0, raw) };
        if group_result == 0 {
            return Ok(());
        }

        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(-1);
        if errno == libc::ESRCH {
            return Err(SignalError::NoSuchProcess);
        }

        // Not a process group (EPERM/EINVAL on the negated pid) — fall back
        // to the individual PID.
        #[allow(unsafe_code)]
        let pid_result = unsafe { libc::kill(pid.0, raw) };
        if pid_result == 0 {
            return Ok(());
        }

        let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(-1);
        if errno == libc::ESRCH {
            Err(SignalError::NoSuchProcess)
        } else {
            Err(SignalError::Failed { pid, errno })
        }
    }
}
