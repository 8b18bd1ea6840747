//! Process supervision - Launching, watching and killing the game process
//!
//! The supervisor owns a single slot: at most one child runs per launcher
//! session. The slot sits behind an async mutex, so two launches can never
//! race into it. Every handle carries a generation number; exit
//! notifications from a handle that has since been cleared (by a kill that
//! timed out) are dropped instead of overwriting newer state.
//!
//! A kill marks the handle before signalling and waits for the exit with the
//! lock released, so status queries are answered while it waits. The exit
//! watcher leaves a marked handle to the kill that claimed it.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use super::events::{ExitOutcome, SupervisorEvent};
use super::instance::{Instance, ProcessState};
use super::log_sink::{LogSink, LogSource};
use crate::platform;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Binary not found or failed to start: {} does not exist", .path.display())]
    NotFound { path: PathBuf },

    #[error("Binary failed to start: permission denied for {}", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("Binary failed to start: {}: {source}", .path.display())]
    Spawn { path: PathBuf, source: io::Error },

    #[error("Binary failed to start: cannot create working directory {}: {source}", .path.display())]
    WorkingDirectory { path: PathBuf, source: io::Error },

    #[error("Failed to kill process {pid}: {reason}")]
    Kill { pid: u32, reason: String },
}

impl SupervisorError {
    fn from_spawn(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            _ => Self::Spawn { path, source },
        }
    }
}

/// Result of a launch request that did not fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Started { pid: u32 },
    /// A process is already running; nothing was done
    AlreadyRunning,
}

/// Result of a kill request that did not fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// Nothing was running; no signal was sent
    NotRunning,
    Killed { confirmed: bool },
}

/// The supervisor's live record of the process it manages
struct ProcessHandle {
    pid: u32,
    pgid: Option<i32>,
    instance_name: String,
    working_dir: PathBuf,
    started_at: DateTime<Utc>,
    generation: u64,
    exited: Option<oneshot::Receiver<()>>,
    /// Set by the kill that owns the cleanup of this handle
    killing: bool,
}

#[derive(Default)]
struct Slot {
    state: ProcessState,
    handle: Option<ProcessHandle>,
    generation: u64,
}

/// Point-in-time view of the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub pgid: Option<i32>,
    pub instance: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
}

struct Inner {
    slot: Mutex<Slot>,
    log_sink: LogSink,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    kill_timeout: Duration,
}

impl Inner {
    fn emit(&self, event: SupervisorEvent) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.events.send(event);
    }

    fn set_state(&self, slot: &mut Slot, state: ProcessState) {
        if slot.state != state {
            debug!("Supervisor state {} -> {}", slot.state, state);
            slot.state = state;
            self.emit(SupervisorEvent::StateChanged(state));
        }
    }

    fn launch_failed(&self, slot: &mut Slot, instance: String, error: &SupervisorError) {
        warn!("Failed to start '{}': {}", instance, error);
        slot.handle = None;
        self.set_state(slot, ProcessState::Failed);
        self.emit(SupervisorEvent::LaunchFailed {
            instance,
            reason: error.to_string(),
        });
    }
}

/// Single-slot process supervisor
///
/// Cloning yields another handle to the same slot.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

impl ProcessSupervisor {
    /// Create a supervisor and the receiver its events are published on
    pub fn new(
        log_sink: LogSink,
        kill_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::default()),
                log_sink,
                events,
                kill_timeout,
            }),
        };
        (supervisor, rx)
    }

    /// Launch an instance's executable in a new process group
    ///
    /// While another child is running this is a no-op reported as
    /// [`LaunchOutcome::AlreadyRunning`]. Start failures leave the slot empty
    /// in the `Failed` state, so a later launch is allowed.
    pub async fn launch(&self, instance: Instance) -> Result<LaunchOutcome, SupervisorError> {
        let inner = &self.inner;
        let mut slot = inner.slot.lock().await;

        if slot.state.is_active() {
            info!("Launch of '{}' ignored: already running", instance.display_name());
            inner.emit(SupervisorEvent::AlreadyRunning);
            return Ok(LaunchOutcome::AlreadyRunning);
        }

        let name = instance.display_name().to_string();
        info!("Launching '{}' from {:?}", name, instance.path);
        inner.set_state(&mut slot, ProcessState::Starting);
        inner.log_sink.append(format!("--- Launching {} ---", name));

        let (mut child, working_dir) = match spawn_child(&instance) {
            Ok(spawned) => spawned,
            Err(e) => {
                inner.launch_failed(&mut slot, name, &e);
                return Err(e);
            }
        };

        // Only an already reaped child has no PID; never track it as 0
        let Some(pid) = child.id() else {
            let e = SupervisorError::Spawn {
                path: instance.path.clone(),
                source: io::Error::other("process exited before its PID was read"),
            };
            inner.launch_failed(&mut slot, name, &e);
            return Err(e);
        };
        if let Err(e) = platform::attach_process_tree(pid) {
            warn!("Process tree of {} cannot be killed as a whole: {}", pid, e);
        }
        let pgid = platform::process_group_of(pid);
        info!("Spawned process with PID {} (group {:?})", pid, pgid);

        if let Some(stdout) = child.stdout.take() {
            spawn_stream_reader(stdout, LogSource::Stdout, inner.log_sink.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_stream_reader(stderr, LogSource::Stderr, inner.log_sink.clone());
        }

        slot.generation += 1;
        let generation = slot.generation;
        let (exit_tx, exited) = oneshot::channel();
        slot.handle = Some(ProcessHandle {
            pid,
            pgid,
            instance_name: name.clone(),
            working_dir,
            started_at: Utc::now(),
            generation,
            exited: Some(exited),
            killing: false,
        });
        inner.set_state(&mut slot, ProcessState::Running);
        inner.emit(SupervisorEvent::Started {
            instance: name,
            pid,
        });

        self.spawn_exit_watcher(child, generation, exit_tx);
        Ok(LaunchOutcome::Started { pid })
    }

    /// Force kill the running process and its whole process group
    ///
    /// Waits at most the configured timeout for the exit, then clears the
    /// handle whether or not the exit was observed. A second kill while one
    /// is waiting is reported as not running.
    pub async fn kill(&self) -> Result<KillOutcome, SupervisorError> {
        let inner = &self.inner;

        let (pid, generation, instance_name, exited) = {
            let mut slot = inner.slot.lock().await;
            let running = slot.state == ProcessState::Running;
            match slot.handle.as_mut() {
                Some(handle) if running && !handle.killing => {
                    handle.killing = true;
                    (
                        handle.pid,
                        handle.generation,
                        handle.instance_name.clone(),
                        handle.exited.take(),
                    )
                }
                _ => {
                    debug!("Kill ignored: not running");
                    inner.emit(SupervisorEvent::NotRunning);
                    return Ok(KillOutcome::NotRunning);
                }
            }
        };
        info!("Killing '{}' (PID {})", instance_name, pid);

        let kill_error = match platform::kill_process_tree(pid) {
            Ok(()) => None,
            Err(group_err) => {
                debug!("Group kill failed ({}), killing leader only", group_err);
                platform::kill_process(pid).err()
            }
        };

        let confirmed = match exited {
            Some(exited) => matches!(
                tokio::time::timeout(inner.kill_timeout, exited).await,
                Ok(Ok(()))
            ),
            None => false,
        };
        if !confirmed {
            warn!(
                "Process {} did not confirm exit within {:?}; clearing handle anyway",
                pid, inner.kill_timeout
            );
        }
        let gone = confirmed || !platform::is_process_running(pid);
        let kill_error = unresolved_kill_error(kill_error, gone);

        let mut slot = inner.slot.lock().await;
        if slot
            .handle
            .as_ref()
            .is_some_and(|h| h.generation == generation)
        {
            slot.handle = None;
        }
        platform::release_process_tree(pid);
        inner.set_state(&mut slot, ProcessState::Idle);

        if let Some(e) = kill_error {
            error!("Failed to kill process {}: {}", pid, e);
            inner.emit(SupervisorEvent::KillFailed {
                instance: instance_name,
                reason: e.to_string(),
            });
            return Err(SupervisorError::Kill {
                pid,
                reason: e.to_string(),
            });
        }

        inner.emit(SupervisorEvent::Killed {
            instance: instance_name,
            confirmed,
        });
        Ok(KillOutcome::Killed { confirmed })
    }

    pub async fn status(&self) -> SupervisorStatus {
        let slot = self.inner.slot.lock().await;
        let handle = slot.handle.as_ref();
        SupervisorStatus {
            state: slot.state,
            pid: handle.map(|h| h.pid),
            pgid: handle.and_then(|h| h.pgid),
            instance: handle.map(|h| h.instance_name.clone()),
            working_dir: handle.map(|h| h.working_dir.clone()),
            started_at: handle.map(|h| h.started_at),
        }
    }

    /// Reap the child and publish how it ended, unless its handle is stale
    fn spawn_exit_watcher(&self, mut child: Child, generation: u64, exit_tx: oneshot::Sender<()>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = child.wait().await;
            let _ = exit_tx.send(());

            let mut slot = inner.slot.lock().await;
            match slot.handle.as_ref() {
                Some(h) if h.generation == generation && !h.killing => {}
                Some(h) if h.generation == generation => {
                    debug!("Exit of process {} left to the pending kill", h.pid);
                    return;
                }
                _ => {
                    debug!("Ignoring exit of superseded process (generation {})", generation);
                    return;
                }
            }

            let Some(handle) = slot.handle.take() else {
                return;
            };
            platform::release_process_tree(handle.pid);

            let outcome = match result {
                Ok(status) => ExitOutcome::from_status(status),
                Err(e) => {
                    error!("Error waiting for process {}: {}", handle.pid, e);
                    ExitOutcome::Crashed { signal: None }
                }
            };
            info!("'{}' exited: {}", handle.instance_name, outcome.status_text());

            inner.set_state(&mut slot, outcome.state());
            inner.emit(SupervisorEvent::Exited {
                instance: handle.instance_name,
                outcome,
            });
        });
    }
}

/// Kill error still worth reporting once we know whether the process is gone
///
/// A signal that raced the process's own exit fails with "no such process";
/// the process is dead either way.
fn unresolved_kill_error(error: Option<anyhow::Error>, gone: bool) -> Option<anyhow::Error> {
    error.filter(|_| !gone)
}

fn spawn_child(instance: &Instance) -> Result<(Child, PathBuf), SupervisorError> {
    let executable =
        std::path::absolute(instance.executable()).unwrap_or_else(|_| instance.path.clone());
    let working_dir = std::path::absolute(instance.working_directory())
        .unwrap_or_else(|_| instance.working_directory());

    std::fs::create_dir_all(&working_dir).map_err(|source| SupervisorError::WorkingDirectory {
        path: working_dir.clone(),
        source,
    })?;

    let mut cmd = Command::new(&executable);
    cmd.current_dir(&working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    platform::configure_new_group(&mut cmd);

    let child = cmd
        .spawn()
        .map_err(|e| SupervisorError::from_spawn(&executable, e))?;
    Ok((child, working_dir))
}

/// Copy a child's output stream into the log sink line by line
///
/// Games can print invalid UTF-8; lines are decoded lossily so one bad byte
/// does not end the capture.
fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    source: LogSource,
    sink: LogSink,
) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    sink.append_from(source, String::from_utf8_lossy(&buf).into_owned());
                }
                Err(e) => {
                    debug!(stream = source.label(), error = %e, "output reader exiting on read error");
                    break;
                }
            }
        }

        debug!(stream = source.label(), "output reader finished");
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(10);

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn supervisor(
        kill_timeout: Duration,
    ) -> (ProcessSupervisor, mpsc::UnboundedReceiver<SupervisorEvent>) {
        ProcessSupervisor::new(LogSink::new(), kill_timeout)
    }

    async fn next_exit(rx: &mut mpsc::UnboundedReceiver<SupervisorEvent>) -> ExitOutcome {
        timeout(WAIT, async {
            loop {
                match rx.recv().await {
                    Some(SupervisorEvent::Exited { outcome, .. }) => return outcome,
                    Some(_) => continue,
                    None => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("process did not exit in time")
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SupervisorEvent>) -> Vec<SupervisorEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn captures_output_and_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "game", "echo hello\necho oops >&2\nexit 3");
        let (supervisor, mut rx) = supervisor(Duration::from_secs(1));

        let outcome = supervisor.launch(Instance::new("Build v1", &exe)).await.unwrap();
        assert!(matches!(outcome, LaunchOutcome::Started { .. }));

        let exit = next_exit(&mut rx).await;
        assert_eq!(exit, ExitOutcome::Finished { code: 3 });
        assert_eq!(exit.status_text(), "Finished (Exit Code: 3)");
        assert_eq!(supervisor.status().await.state, ProcessState::Finished);
        assert!(supervisor.status().await.pid.is_none());

        // Readers may still be draining after the exit is observed
        timeout(WAIT, async {
            while !(supervisor.inner.log_sink.text().contains("hello")
                && supervisor.inner.log_sink.text().contains("oops"))
            {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("output was not captured");
        assert!(supervisor
            .inner
            .log_sink
            .text()
            .starts_with("--- Launching Build v1 ---"));
    }

    #[tokio::test]
    async fn runs_in_executable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "game", "pwd");
        let (supervisor, mut rx) = supervisor(Duration::from_secs(1));

        supervisor.launch(Instance::new("pwd", &exe)).await.unwrap();
        assert_eq!(next_exit(&mut rx).await, ExitOutcome::Finished { code: 0 });

        let expected = fs::canonicalize(dir.path()).unwrap();
        timeout(WAIT, async {
            loop {
                let found = supervisor.inner.log_sink.snapshot().into_iter().any(|c| {
                    c.source == LogSource::Stdout
                        && fs::canonicalize(&c.text).ok().as_ref() == Some(&expected)
                });
                if found {
                    break;
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("pwd output not captured");
    }

    #[tokio::test]
    async fn signal_termination_is_reported_as_crash() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "game", "kill -9 $$");
        let (supervisor, mut rx) = supervisor(Duration::from_secs(1));

        supervisor.launch(Instance::new("crashy", &exe)).await.unwrap();

        let exit = next_exit(&mut rx).await;
        assert!(matches!(exit, ExitOutcome::Crashed { signal: Some(9) }));
        assert_eq!(supervisor.status().await.state, ProcessState::Crashed);
    }

    #[tokio::test]
    async fn missing_binary_fails_and_leaves_slot_free() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nested").join("not-there");
        let (supervisor, mut rx) = supervisor(Duration::from_secs(1));

        let err = supervisor
            .launch(Instance::new("ghost", &missing))
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound { .. }));
        assert!(err.to_string().to_lowercase().contains("failed to start"));
        assert_eq!(supervisor.status().await.state, ProcessState::Failed);
        assert!(supervisor.status().await.pid.is_none());
        // Working directory is created even though the binary is missing
        assert!(dir.path().join("nested").is_dir());

        let events = drain(&mut rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, SupervisorEvent::LaunchFailed { .. })));

        let exe = script(dir.path(), "game", "exit 0");
        let outcome = supervisor.launch(Instance::new("real", &exe)).await.unwrap();
        assert!(matches!(outcome, LaunchOutcome::Started { .. }));
        assert_eq!(next_exit(&mut rx).await, ExitOutcome::Finished { code: 0 });
    }

    #[tokio::test]
    async fn non_executable_file_is_permission_denied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game");
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let (supervisor, _rx) = supervisor(Duration::from_secs(1));

        let err = supervisor.launch(Instance::new("noexec", &path)).await.unwrap_err();
        assert!(matches!(err, SupervisorError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn second_launch_while_running_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "game", "exec sleep 30");
        let (supervisor, mut rx) = supervisor(Duration::from_secs(2));

        let first = supervisor.launch(Instance::new("a", &exe)).await.unwrap();
        let LaunchOutcome::Started { pid } = first else {
            panic!("first launch did not start: {first:?}");
        };

        let second = supervisor.launch(Instance::new("b", &exe)).await.unwrap();
        assert_eq!(second, LaunchOutcome::AlreadyRunning);
        assert_eq!(supervisor.status().await.pid, Some(pid));
        assert_eq!(supervisor.status().await.instance.as_deref(), Some("a"));
        assert!(drain(&mut rx).contains(&SupervisorEvent::AlreadyRunning));

        supervisor.kill().await.unwrap();
    }

    #[tokio::test]
    async fn kill_on_idle_reports_not_running() {
        let (supervisor, mut rx) = supervisor(Duration::from_secs(1));

        assert_eq!(supervisor.kill().await.unwrap(), KillOutcome::NotRunning);
        assert_eq!(supervisor.status().await.state, ProcessState::Idle);
        assert_eq!(drain(&mut rx), vec![SupervisorEvent::NotRunning]);
    }

    #[tokio::test]
    async fn kill_clears_handle_and_reaps_the_group_leader() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "game", "exec sleep 30");
        let (supervisor, mut rx) = supervisor(Duration::from_secs(1));

        let LaunchOutcome::Started { pid } =
            supervisor.launch(Instance::new("a", &exe)).await.unwrap()
        else {
            panic!("did not start");
        };
        assert_eq!(supervisor.status().await.pgid, Some(pid as i32));

        let outcome = timeout(Duration::from_secs(3), supervisor.kill())
            .await
            .expect("kill exceeded its bounded wait")
            .unwrap();
        assert_eq!(outcome, KillOutcome::Killed { confirmed: true });
        assert_eq!(supervisor.status().await.state, ProcessState::Idle);
        assert!(supervisor.status().await.pid.is_none());
        assert!(!platform::is_process_running(pid));

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| e.status_text() == "Killed"));
        assert!(!events
            .iter()
            .any(|e| matches!(e, SupervisorEvent::Exited { .. })));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn kill_takes_down_grandchildren() {
        fn gone_or_zombie(pid: u32) -> bool {
            match fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Err(_) => true,
                Ok(stat) => stat
                    .rsplit(')')
                    .next()
                    .map(|rest| rest.trim_start().starts_with('Z'))
                    .unwrap_or(false),
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let exe = script(
            dir.path(),
            "game",
            "sleep 30 &\necho $! > grandchild.pid\nwait",
        );
        let (supervisor, _rx) = supervisor(Duration::from_secs(1));
        supervisor.launch(Instance::new("tree", &exe)).await.unwrap();

        let pid_file = dir.path().join("grandchild.pid");
        let grandchild: u32 = timeout(WAIT, async {
            loop {
                if let Ok(text) = fs::read_to_string(&pid_file) {
                    if let Ok(pid) = text.trim().parse() {
                        return pid;
                    }
                }
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("grandchild never started");

        supervisor.kill().await.unwrap();

        timeout(WAIT, async {
            while !gone_or_zombie(grandchild) {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("grandchild survived the kill");
    }

    #[tokio::test]
    async fn late_exit_after_timed_out_kill_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "game", "exec sleep 30");
        // Too short to ever observe the exit
        let (supervisor, mut rx) = supervisor(Duration::ZERO);

        supervisor.launch(Instance::new("slow", &exe)).await.unwrap();
        let outcome = supervisor.kill().await.unwrap();
        assert!(matches!(outcome, KillOutcome::Killed { .. }));

        // Give the watcher time to reap and try to publish
        sleep(Duration::from_millis(300)).await;

        assert_eq!(supervisor.status().await.state, ProcessState::Idle);
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SupervisorEvent::Exited { .. })));
        assert_eq!(events.last().map(|e| e.status_text()).as_deref(), Some("Killed"));
    }

    #[tokio::test]
    async fn status_is_answered_while_kill_waits() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        platform::configure_new_group(&mut cmd);
        let mut child = cmd.spawn().unwrap();
        let pid = child.id().unwrap();

        let (supervisor, mut rx) = supervisor(Duration::from_secs(2));
        // Nobody reaps this handle, so the kill waits out its full timeout
        let (_exit_tx, exited) = oneshot::channel();
        {
            let mut slot = supervisor.inner.slot.lock().await;
            slot.generation = 1;
            slot.state = ProcessState::Running;
            slot.handle = Some(ProcessHandle {
                pid,
                pgid: Some(pid as i32),
                instance_name: "stuck".to_string(),
                working_dir: PathBuf::from("."),
                started_at: Utc::now(),
                generation: 1,
                exited: Some(exited),
                killing: false,
            });
        }

        let killer = tokio::spawn({
            let supervisor = supervisor.clone();
            async move { supervisor.kill().await }
        });
        sleep(Duration::from_millis(200)).await;

        let status = timeout(Duration::from_millis(500), supervisor.status())
            .await
            .expect("status blocked behind the kill");
        assert_eq!(status.state, ProcessState::Running);
        assert_eq!(status.pid, Some(pid));
        assert_eq!(supervisor.kill().await.unwrap(), KillOutcome::NotRunning);

        let outcome = killer.await.unwrap().unwrap();
        assert_eq!(outcome, KillOutcome::Killed { confirmed: false });
        assert_eq!(supervisor.status().await.state, ProcessState::Idle);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SupervisorEvent::Killed { .. })));
        let _ = child.wait().await;
    }

    #[test]
    fn kill_error_is_dropped_once_the_process_is_gone() {
        let error = || Some(anyhow::anyhow!("No such process"));
        assert!(unresolved_kill_error(error(), true).is_none());
        assert!(unresolved_kill_error(error(), false).is_some());
        assert!(unresolved_kill_error(None, false).is_none());
    }

    #[tokio::test]
    async fn invalid_utf8_output_is_decoded_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let exe = script(dir.path(), "game", r"printf 'bad \377 byte\n'");
        let (supervisor, mut rx) = supervisor(Duration::from_secs(1));

        supervisor.launch(Instance::new("bytes", &exe)).await.unwrap();
        next_exit(&mut rx).await;

        timeout(WAIT, async {
            while !supervisor.inner.log_sink.text().contains("bad \u{FFFD} byte") {
                sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("lossy line not captured");
    }
}
