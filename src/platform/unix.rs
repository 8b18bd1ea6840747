//! POSIX process-group control

use anyhow::Result;
use std::io;
use tokio::process::Command;
use tracing::debug;

/// Make the child the leader of a fresh session and process group
pub fn configure_new_group(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

fn getpgid(pid: u32) -> io::Result<i32> {
    let pgid = unsafe { libc::getpgid(pid as libc::pid_t) };
    if pgid < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(pgid)
}

fn already_exited(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ESRCH)
}

/// Look up the process group a process belongs to
pub fn process_group_of(pid: u32) -> Result<i32> {
    getpgid(pid).map_err(|e| anyhow::anyhow!("Failed to resolve process group of {}: {}", pid, e))
}

/// Force kill every process in the child's group (SIGKILL)
///
/// A process that is already gone counts as killed.
pub fn kill_process_tree(pid: u32) -> Result<()> {
    let pgid = match getpgid(pid) {
        Ok(pgid) => pgid,
        Err(e) if already_exited(&e) => {
            debug!("Process {} already exited", pid);
            return Ok(());
        }
        Err(e) => anyhow::bail!("Failed to resolve process group of {}: {}", pid, e),
    };

    // Never signal our own group, that would take the launcher down too
    let own = unsafe { libc::getpgrp() };
    if pgid == own {
        anyhow::bail!("Process {} shares the launcher's process group", pid)
    }

    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
        debug!("Sent SIGKILL to process group {}", pgid);
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if already_exited(&err) {
        debug!("Process group {} already exited", pgid);
        return Ok(());
    }
    anyhow::bail!("Failed to kill process group {}: {}", pgid, err)
}

/// Force kill a single process (SIGKILL)
pub fn kill_process(pid: u32) -> Result<()> {
    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) } == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if already_exited(&err) {
        debug!("Process {} already exited", pid);
        return Ok(());
    }
    anyhow::bail!("Failed to kill process: {}", err)
}

/// Check if a process is running
pub fn is_process_running(pid: u32) -> bool {
    // kill with signal 0 checks if process exists without sending a signal
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
