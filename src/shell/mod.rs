//! Interactive shell - Line-oriented control surface over the core
//!
//! Commands that wait on a process or the network run on spawned tasks.
//! Their results come back as events, which the loop drains between input
//! lines without ever blocking on them.

mod commands;
mod display;

use std::cell::Cell;
use std::io::Write as _;

use anyhow::Result;
use clap::CommandFactory;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

use crate::core::mods::{self, ModState};
use crate::core::{AppState, DownloadEvent, DownloadHandle, DownloadJob, SupervisorEvent};

use commands::{parse_line, ModAction, ModTarget, ShellCommand, ShellLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

struct Shell {
    state: AppState,
    download_tx: UnboundedSender<DownloadEvent>,
    /// First log sequence number `logs --new` has not shown yet
    logs_seen: Cell<u64>,
}

/// Run the shell until `quit` or end of input
pub async fn run(
    state: AppState,
    mut supervisor_events: UnboundedReceiver<SupervisorEvent>,
) -> Result<()> {
    let (download_tx, mut download_events) = mpsc::unbounded_channel();
    let shell = Shell::new(state, download_tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", shell.banner());
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if shell.handle_line(&line).await == Flow::Quit {
                    break;
                }
                prompt();
            }
            Some(event) = supervisor_events.recv() => shell.on_supervisor_event(event),
            Some(event) = download_events.recv() => shell.on_download_event(event),
        }
    }

    shell.shutdown().await;
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

impl Shell {
    fn new(state: AppState, download_tx: UnboundedSender<DownloadEvent>) -> Self {
        Self {
            state,
            download_tx,
            logs_seen: Cell::new(0),
        }
    }

    fn banner(&self) -> String {
        let count = self.state.instances().map(|i| i.len()).unwrap_or(0);
        format!(
            "{} launcher v{}: {} instance(s). Type `help` for commands.",
            self.state.settings.game_name,
            crate::APP_VERSION,
            count
        )
    }

    async fn handle_line(&self, line: &str) -> Flow {
        match parse_line(line) {
            Ok(Some(command)) => {
                debug!("Shell command: {:?}", command);
                match self.execute(command).await {
                    Ok(flow) => flow,
                    Err(e) => {
                        println!("Error: {:#}", e);
                        Flow::Continue
                    }
                }
            }
            Ok(None) => Flow::Continue,
            Err(e) => {
                println!("{}", e);
                Flow::Continue
            }
        }
    }

    async fn execute(&self, command: ShellCommand) -> Result<Flow> {
        match command {
            ShellCommand::List => println!("{}", display::instances(&self.state.instances()?)),
            ShellCommand::Add { path, name } => {
                let index = self.state.add_instance(path, name)?;
                let instance = self.state.instance(index)?;
                println!("Added [{}] {}", index, instance.display_name());
            }
            ShellCommand::Reload => {
                let count = self.state.reload_instances()?;
                println!("Reloaded {} instance(s)", count);
            }
            ShellCommand::Remove { index } => match self.state.remove_instance(index)? {
                Some(removed) => println!("Removed {} (files were kept)", removed.display_name()),
                None => println!("No instance at index {}", index),
            },
            ShellCommand::Launch { index } => {
                let instance = self.state.instance(index)?;
                let supervisor = self.state.supervisor.clone();
                tokio::spawn(async move {
                    // Failures are reported as supervisor events
                    if let Err(e) = supervisor.launch(instance).await {
                        debug!("Launch failed: {}", e);
                    }
                });
            }
            ShellCommand::Kill => {
                let supervisor = self.state.supervisor.clone();
                tokio::spawn(async move {
                    if let Err(e) = supervisor.kill().await {
                        debug!("Kill failed: {}", e);
                    }
                });
            }
            ShellCommand::Status => {
                let status = self.state.supervisor.status().await;
                let downloading = self.state.downloads.active_file();
                println!("{}", display::status(&status, downloading.as_deref()));
            }
            ShellCommand::Logs { clear: true, .. } => {
                let dropped = self.state.log_sink.len();
                self.state.log_sink.clear();
                println!("Logs cleared ({} line(s))", dropped);
            }
            ShellCommand::Logs { new, .. } => {
                let sink = &self.state.log_sink;
                let seen = sink.next_seq();
                let chunks = if new {
                    sink.since(self.logs_seen.get())
                } else {
                    sink.snapshot()
                };
                self.logs_seen.set(seen.max(chunks.last().map_or(0, |c| c.seq + 1)));
                println!("{}", display::logs(&chunks));
            }
            ShellCommand::Releases => {
                println!("Fetching releases from {}...", self.state.releases.url());
                let state = self.state.clone();
                tokio::spawn(async move {
                    match state.fetch_releases().await {
                        Ok(releases) => println!("{}", display::releases(&releases)),
                        Err(e) => println!("Failed to fetch releases: {:#}", e),
                    }
                });
            }
            ShellCommand::Download { tag, asset } => {
                let state = self.state.clone();
                let tx = self.download_tx.clone();
                tokio::spawn(async move {
                    match state.download_release(&tag, asset.as_deref()).await {
                        Ok(handle) => {
                            println!("Downloading {}...", handle.file_name);
                            forward_events(handle, tx);
                        }
                        Err(e) => println!("Failed to start download: {:#}", e),
                    }
                });
            }
            ShellCommand::DownloadUrl { url, file, label } => {
                let handle = self.state.start_download(DownloadJob::new(url, file, label))?;
                println!("Downloading {}...", handle.file_name);
                forward_events(handle, self.download_tx.clone());
            }
            ShellCommand::Cancel => {
                if self.state.downloads.cancel_active() {
                    println!("Cancelling download...");
                } else {
                    println!("No download in progress");
                }
            }
            ShellCommand::Mods { target, action } => self.mods(target, action)?,
            ShellCommand::Help => {
                println!("{}", ShellLine::command().render_help());
            }
            ShellCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn mods(&self, target: ModTarget, action: Option<ModAction>) -> Result<()> {
        let dir = self.state.mod_directory(target.index())?;
        match action.unwrap_or(ModAction::List) {
            ModAction::List => {
                println!("Mods for {} ({}):", target, dir.display());
                println!("{}", display::mods(&mods::list_mods(&dir)?));
            }
            ModAction::Enable { name } => {
                let entry = mods::find_mod(&dir, &name)?;
                mods::set_state(&dir, &entry, ModState::Enabled)?;
                println!("Enabled {}", entry.name);
            }
            ModAction::Disable { name } => {
                let entry = mods::find_mod(&dir, &name)?;
                mods::set_state(&dir, &entry, ModState::Disabled)?;
                println!("Disabled {}", entry.name);
            }
            ModAction::Add { path } => {
                let entry = mods::install_mod(&dir, &path)?;
                println!("Installed {}", entry.name);
            }
            ModAction::Remove { name } => {
                let entry = mods::find_mod(&dir, &name)?;
                mods::remove_mod(&dir, &entry)?;
                println!("Removed {}", entry.file_name);
            }
            ModAction::Open => {
                mods::open_directory(&dir)?;
                println!("Opened {}", dir.display());
            }
        }
        Ok(())
    }

    fn on_supervisor_event(&self, event: SupervisorEvent) {
        match &event {
            SupervisorEvent::StateChanged(state) => debug!("Process state: {}", state),
            _ => println!("\n{}", event.status_text()),
        }
    }

    fn on_download_event(&self, event: DownloadEvent) {
        match &event {
            DownloadEvent::Progress(percent) => println!("Downloading... {}%", percent),
            DownloadEvent::Completed { display_name, .. } => {
                match self.state.register_download(&event) {
                    Ok(Some(index)) => {
                        println!("\nDownloaded and added instance: [{}] {}", index, display_name)
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!("Failed to register download: {:#}", e);
                        println!("\nDownloaded {} but could not register it: {:#}", display_name, e);
                    }
                }
            }
            DownloadEvent::Failed { reason } => {
                // Logs the failure into the sink; never registers anything
                if let Err(e) = self.state.register_download(&event) {
                    error!("Failed to record download failure: {:#}", e);
                }
                println!("\nFailed to download: {}", reason);
            }
        }
    }

    /// Leave a running game alone; the launcher only lets go of it
    async fn shutdown(&self) {
        let status = self.state.supervisor.status().await;
        if status.state.is_active() {
            let name = status.instance.unwrap_or_default();
            info!("Exiting with '{}' still running", name);
            println!("{} keeps running.", name);
        }
        if self.state.downloads.cancel_active() {
            info!("Cancelled unfinished download on exit");
        }
    }
}

/// Relay one job's events into the shell's download channel
fn forward_events(mut handle: DownloadHandle, tx: UnboundedSender<DownloadEvent>) {
    tokio::spawn(async move {
        while let Some(event) = handle.next_event().await {
            let terminal = event.is_terminal();
            if tx.send(event).is_err() || terminal {
                break;
            }
        }
        debug!("Stopped relaying events of download {}", handle.id);
    });
}
