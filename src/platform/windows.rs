//! Windows process-tree control through Job Objects

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};
use tokio::process::Command;
use tracing::{debug, warn};

use windows::Win32::Foundation::{CloseHandle, FALSE, HANDLE};
use windows::Win32::System::JobObjects::{
    AssignProcessToJobObject, CreateJobObjectW, TerminateJobObject,
};
use windows::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, TerminateProcess, CREATE_NEW_PROCESS_GROUP,
    PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SET_QUOTA, PROCESS_TERMINATE,
};

/// Job handles per child PID (stored as usize for Send/Sync safety)
static JOB_HANDLES: LazyLock<RwLock<HashMap<u32, usize>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn store_job_handle(pid: u32, handle: HANDLE) {
    if let Ok(mut handles) = JOB_HANDLES.write() {
        handles.insert(pid, handle.0 as usize);
    }
}

fn job_handle(pid: u32) -> Option<HANDLE> {
    JOB_HANDLES
        .read()
        .ok()
        .and_then(|handles| handles.get(&pid).copied())
        .map(|value| HANDLE(value as *mut std::ffi::c_void))
}

/// Start the child in its own console process group
pub fn configure_new_group(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP.0);
}

/// Put a freshly spawned child into a Job Object so its whole tree can be
/// terminated together
///
/// The job is not kill-on-close: children outlive the launcher.
pub fn attach_process_tree(pid: u32) -> Result<()> {
    unsafe {
        let job = CreateJobObjectW(None, None).context("Failed to create job object")?;
        let process = match OpenProcess(PROCESS_SET_QUOTA | PROCESS_TERMINATE, FALSE, pid) {
            Ok(h) => h,
            Err(e) => {
                let _ = CloseHandle(job);
                return Err(e).context("Failed to open process");
            }
        };

        let result = AssignProcessToJobObject(job, process);
        let _ = CloseHandle(process);

        if let Err(e) = result {
            // Common for processes already inside a job (some games, launchers)
            let _ = CloseHandle(job);
            return Err(e).context("Failed to assign process to job object");
        }

        store_job_handle(pid, job);
        debug!("Process {} attached to job object", pid);
        Ok(())
    }
}

/// Remove and close the job handle for a process
pub fn release_process_tree(pid: u32) {
    if let Ok(mut handles) = JOB_HANDLES.write() {
        if let Some(handle_value) = handles.remove(&pid) {
            let handle = HANDLE(handle_value as *mut std::ffi::c_void);
            unsafe {
                let _ = CloseHandle(handle);
            }
            debug!("Cleaned up job handle for PID {}", pid);
        }
    }
}

/// Terminate every process in the child's job
pub fn kill_process_tree(pid: u32) -> Result<()> {
    let job = job_handle(pid).context("Process has no job object")?;
    unsafe { TerminateJobObject(job, 1) }.context("Failed to terminate job object")?;
    Ok(())
}

/// Force kill a single process
pub fn kill_process(pid: u32) -> Result<()> {
    unsafe {
        let handle =
            OpenProcess(PROCESS_TERMINATE, FALSE, pid).context("Failed to open process")?;

        let result = TerminateProcess(handle, 1);
        if let Err(e) = CloseHandle(handle) {
            warn!("Failed to close process handle: {}", e);
        }

        result.context("Failed to kill process")
    }
}

/// Check if a process is running
pub fn is_process_running(pid: u32) -> bool {
    unsafe {
        let handle = match OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid) {
            Ok(h) => h,
            Err(_) => return false,
        };

        let mut exit_code: u32 = 0;
        let result = GetExitCodeProcess(handle, &mut exit_code);
        CloseHandle(handle).ok();

        // STILL_ACTIVE = 259
        result.is_ok() && exit_code == 259
    }
}
