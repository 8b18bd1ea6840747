//! Platform-specific process-tree control for POSIX and Windows

#[cfg(unix)]
mod unix;

#[cfg(windows)]
mod windows;

use anyhow::Result;
use tokio::process::Command;

/// Configure a command so the child starts a new process group
pub fn configure_new_group(cmd: &mut Command) {
    #[cfg(unix)]
    {
        unix::configure_new_group(cmd)
    }
    #[cfg(windows)]
    {
        windows::configure_new_group(cmd)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = cmd;
    }
}

/// Register a spawned child for tree-wide termination
///
/// POSIX needs nothing beyond the new session; Windows attaches a Job Object.
pub fn attach_process_tree(pid: u32) -> Result<()> {
    #[cfg(windows)]
    {
        windows::attach_process_tree(pid)
    }
    #[cfg(not(windows))]
    {
        let _ = pid;
        Ok(())
    }
}

/// Release whatever `attach_process_tree` acquired
pub fn release_process_tree(pid: u32) {
    #[cfg(windows)]
    {
        windows::release_process_tree(pid)
    }
    #[cfg(not(windows))]
    {
        let _ = pid;
    }
}

/// Process group id of a running process, where the platform has one
pub fn process_group_of(pid: u32) -> Option<i32> {
    #[cfg(unix)]
    {
        unix::process_group_of(pid).ok()
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        None
    }
}

/// Force kill a process together with all its descendants
pub fn kill_process_tree(pid: u32) -> Result<()> {
    // PID 0 addresses the caller's own group on POSIX
    if pid == 0 {
        anyhow::bail!("Refusing to kill PID 0")
    }
    #[cfg(unix)]
    {
        unix::kill_process_tree(pid)
    }
    #[cfg(windows)]
    {
        windows::kill_process_tree(pid)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        anyhow::bail!("Unsupported platform")
    }
}

/// Force kill only the given process
pub fn kill_process(pid: u32) -> Result<()> {
    if pid == 0 {
        anyhow::bail!("Refusing to kill PID 0")
    }
    #[cfg(unix)]
    {
        unix::kill_process(pid)
    }
    #[cfg(windows)]
    {
        windows::kill_process(pid)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        anyhow::bail!("Unsupported platform")
    }
}

/// Check if a process is running
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        unix::is_process_running(pid)
    }
    #[cfg(windows)]
    {
        windows::is_process_running(pid)
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = pid;
        false
    }
}
