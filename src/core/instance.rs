//! Instance model - A registered, launchable copy of the game binary

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A registered game build
///
/// Instances are addressed by position in the registry, not by name:
/// two entries may share a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Display name shown in listings
    pub name: String,
    /// Path to the executable
    pub path: PathBuf,
}

impl Instance {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Get the display name, falling back to the executable's file name
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("Unknown")
        } else {
            &self.name
        }
    }

    /// Directory the executable is launched from
    pub fn working_directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Per-instance mod directory, next to the executable
    pub fn mod_directory(&self) -> PathBuf {
        self.working_directory().join("mods")
    }

    pub fn executable(&self) -> &Path {
        &self.path
    }
}

/// Lifecycle state of the supervised process slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProcessState {
    /// Nothing launched, or the last handle was cleared by a kill
    #[default]
    Idle,
    /// Spawn in progress
    Starting,
    /// Child is alive and owned by the supervisor
    Running,
    /// Child exited on its own
    Finished,
    /// Child was terminated by a signal or crashed
    Crashed,
    /// Child could not be started
    Failed,
}

impl ProcessState {
    /// Whether a handle occupies the single slot
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Finished => "Finished",
            Self::Crashed => "Crashed",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
