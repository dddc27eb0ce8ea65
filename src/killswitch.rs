//! `KillSwitch` (spec.md §4.9): the three-state stop/confirm/cancel protocol
//! for freezing or terminating a target process.

use crate::domain::{Pid, SessionId, SignalError};
use crate::signal::{Signal, SignalSender};
use crate::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSwitchState {
    Idle,
    AwaitingConfirmation,
}

/// Outcome of a kill-switch transition, for the UI to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillSwitchOutcome {
    Stopped,
    Killed,
    Resumed,
    /// The process was already gone — reported non-fatally (spec.md §7).
    AlreadyExited,
    Failed(String),
}

pub struct KillSwitch {
    sender: SignalSender,
    state: KillSwitchState,
    target: Option<(Pid, SessionId)>,
}

impl KillSwitch {
    #[must_use]
    pub fn new(sender: SignalSender) -> Self {
        Self { sender, state: KillSwitchState::Idle, target: None }
    }

    #[must_use]
    pub fn state(&self) -> KillSwitchState {
        self.state
    }

    /// Step 1: verify the session hasn't already exited, then SIGSTOP.
    pub async fn initiate(&mut self, store: &SessionStore, pid: Pid, session_id: SessionId) -> KillSwitchOutcome {
        if pid.0 <= 0 {
            return KillSwitchOutcome::Failed("invalid pid".to_string());
        }
        if let Some(session) = store.get_session(&session_id).await {
            if session.exited {
                return KillSwitchOutcome::AlreadyExited;
            }
        }

        let outcome = match self.sender.send(pid, Signal::Stop) {
            Ok(()) => KillSwitchOutcome::Stopped,
            Err(SignalError::NoSuchProcess) => KillSwitchOutcome::AlreadyExited,
            Err(SignalError::Failed { errno, .. }) => {
                KillSwitchOutcome::Failed(format!("failed to stop process: errno {errno}"))
            }
        };

        if matches!(outcome, KillSwitchOutcome::Stopped) {
            self.state = KillSwitchState::AwaitingConfirmation;
            self.target = Some((pid, session_id));
        }
        outcome
    }

    /// Step 2: user confirmed — SIGKILL and return to idle.
    pub fn confirm(&mut self) -> KillSwitchOutcome {
        let Some((pid, _)) = self.target.take() else {
            return KillSwitchOutcome::Failed("no pending kill-switch target".to_string());
        };
        self.state = KillSwitchState::Idle;
        match self.sender.send(pid, Signal::Kill) {
            Ok(()) => KillSwitchOutcome::Killed,
            Err(SignalError::NoSuchProcess) => KillSwitchOutcome::AlreadyExited,
            Err(SignalError::Failed { errno, .. }) => {
                KillSwitchOutcome::Failed(format!("failed to kill process: errno {errno}"))
            }
        }
    }

    /// Step 3: user cancelled (or the overlay timed out) — SIGCONT and return to idle.
    pub fn cancel(&mut self) -> KillSwitchOutcome {
        let Some((pid, _)) = self.target.take() else {
            return KillSwitchOutcome::Failed("no pending kill-switch target".to_string());
        };
        self.state = KillSwitchState::Idle;
        match self.sender.send(pid, Signal::Continue) {
            Ok(()) => KillSwitchOutcome::Resumed,
            Err(SignalError::NoSuchProcess) => KillSwitchOutcome::AlreadyExited,
            Err(SignalError::Failed { errno, .. }) => {
                KillSwitchOutcome::Failed(format!("failed to resume process: errno {errno}"))
            }
        }
    }
}
