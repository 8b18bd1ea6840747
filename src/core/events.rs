//! Events published by the supervisor and the download manager
//!
//! The interactive side drains these from unbounded channels, so producers
//! never wait on a consumer.

use std::path::PathBuf;
use std::process::ExitStatus;

use super::instance::ProcessState;

/// How a supervised process ended on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with an exit code
    Finished { code: i32 },
    /// Killed by a signal or otherwise terminated abnormally
    Crashed { signal: Option<i32> },
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Crashed {
                    signal: Some(signal),
                };
            }
        }

        match status.code() {
            Some(code) => Self::Finished { code },
            None => Self::Crashed { signal: None },
        }
    }

    pub fn state(&self) -> ProcessState {
        match self {
            Self::Finished { .. } => ProcessState::Finished,
            Self::Crashed { .. } => ProcessState::Crashed,
        }
    }

    pub fn status_text(&self) -> String {
        match self {
            Self::Finished { code: 0 } => "Finished".to_string(),
            Self::Finished { code } => format!("Finished (Exit Code: {})", code),
            Self::Crashed { .. } => "Crashed".to_string(),
        }
    }
}

/// Lifecycle notifications from the process supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    StateChanged(ProcessState),
    Started { instance: String, pid: u32 },
    Exited { instance: String, outcome: ExitOutcome },
    LaunchFailed { instance: String, reason: String },
    /// A launch was requested while a process is still running
    AlreadyRunning,
    /// A kill was requested with nothing running
    NotRunning,
    /// The handle was cleared after a kill; `confirmed` is false when the
    /// exit was not observed within the timeout
    Killed { instance: String, confirmed: bool },
    KillFailed { instance: String, reason: String },
}

impl SupervisorEvent {
    /// Short status line for the interactive side
    pub fn status_text(&self) -> String {
        match self {
            Self::StateChanged(state) => state.label().to_string(),
            Self::Started { instance, .. } => format!("Running: {}", instance),
            Self::Exited { outcome, .. } => outcome.status_text(),
            Self::LaunchFailed { reason, .. } => format!("Error: {}", reason),
            Self::AlreadyRunning => "Already running".to_string(),
            Self::NotRunning => "Not running".to_string(),
            Self::Killed { .. } => "Killed".to_string(),
            Self::KillFailed { reason, .. } => format!("Kill failed: {}", reason),
        }
    }
}

/// Progress and terminal notifications for one download job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Percentage of the announced content length received so far
    Progress(u8),
    Completed { display_name: String, path: PathBuf },
    Failed { reason: String },
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}
