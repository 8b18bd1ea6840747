//! Application state - Central state shared by the shell and background tasks

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use super::download::{DownloadHandle, DownloadJob, DownloadManager};
use super::events::{DownloadEvent, SupervisorEvent};
use super::instance::Instance;
use super::log_sink::LogSink;
use super::mods;
use super::process::ProcessSupervisor;
use super::registry::InstanceRegistry;
use super::release::{Release, ReleaseFeed};
use super::settings::Settings;

/// Central application state
///
/// Built once at startup; clones share the same registry, supervisor slot,
/// download slot and log buffer.
#[derive(Clone)]
pub struct AppState {
    /// Application settings
    pub settings: Arc<Settings>,
    /// Registered instances
    pub registry: Arc<RwLock<InstanceRegistry>>,
    /// Single-slot process supervisor
    pub supervisor: ProcessSupervisor,
    /// Single-slot download manager
    pub downloads: DownloadManager,
    /// Release listing for the version picker
    pub releases: ReleaseFeed,
    /// Launcher and child output
    pub log_sink: LogSink,
}

impl AppState {
    /// Create the application state and the supervisor's event receiver
    pub fn new(settings: Settings) -> Result<(Self, UnboundedReceiver<SupervisorEvent>)> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Self::with_client(settings, client)
    }

    /// Create the application state around an existing HTTP client
    pub fn with_client(
        settings: Settings,
        client: reqwest::Client,
    ) -> Result<(Self, UnboundedReceiver<SupervisorEvent>)> {
        let data_dir = settings.get_data_directory();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let registry = InstanceRegistry::open(settings.get_registry_path());
        let log_sink = LogSink::new();
        if let Some(warning) = registry.load_warning() {
            log_sink.append(format!("Could not load instances: {}", warning));
        }

        let (supervisor, events) = ProcessSupervisor::new(log_sink.clone(), settings.kill_timeout());
        let downloads = DownloadManager::from_settings(client.clone(), &settings);
        let releases = ReleaseFeed::new(client, settings.releases_url.clone());

        info!("Application state initialized in {:?}", data_dir);
        let state = Self {
            settings: Arc::new(settings),
            registry: Arc::new(RwLock::new(registry)),
            supervisor,
            downloads,
            releases,
            log_sink,
        };
        Ok((state, events))
    }

    /// Snapshot of the registered instances
    pub fn instances(&self) -> Result<Vec<Instance>> {
        Ok(self
            .registry
            .read()
            .map_err(|e| anyhow::anyhow!("Registry lock poisoned: {}", e))?
            .instances()
            .to_vec())
    }

    pub fn instance(&self, index: usize) -> Result<Instance> {
        self.registry
            .read()
            .map_err(|e| anyhow::anyhow!("Registry lock poisoned: {}", e))?
            .get(index)
            .with_context(|| format!("No instance at index {}", index))
    }

    /// Register an executable; the name defaults to its file name
    pub fn add_instance(&self, path: PathBuf, name: Option<String>) -> Result<usize> {
        let name = name.unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let index = self
            .registry
            .write()
            .map_err(|e| anyhow::anyhow!("Registry lock poisoned: {}", e))?
            .add(name, path)?;
        Ok(index)
    }

    /// Remove the registry entry at `index`; files on disk are left alone
    pub fn remove_instance(&self, index: usize) -> Result<Option<Instance>> {
        let removed = self
            .registry
            .write()
            .map_err(|e| anyhow::anyhow!("Registry lock poisoned: {}", e))?
            .remove_at(index)?;
        Ok(removed)
    }

    /// Re-read the instance list from disk, replacing what is in memory
    ///
    /// Returns the number of instances loaded. An unreadable file leaves the
    /// list empty and its problem in the log.
    pub fn reload_instances(&self) -> Result<usize> {
        let mut registry = self
            .registry
            .write()
            .map_err(|e| anyhow::anyhow!("Registry lock poisoned: {}", e))?;
        registry.load();
        if let Some(warning) = registry.load_warning() {
            warn!("Reloaded instance list is unreadable: {}", warning);
            self.log_sink
                .append(format!("Could not load instances: {}", warning));
        }
        Ok(registry.len())
    }

    /// Register the binary a finished download produced
    ///
    /// Returns the new index for `Completed`, `None` for other events.
    pub fn register_download(&self, event: &DownloadEvent) -> Result<Option<usize>> {
        match event {
            DownloadEvent::Completed { display_name, path } => {
                let index = self.add_instance(path.clone(), Some(display_name.clone()))?;
                self.log_sink
                    .append(format!("Downloaded and added instance: {}", display_name));
                Ok(Some(index))
            }
            DownloadEvent::Failed { reason } => {
                warn!("Download failed: {}", reason);
                self.log_sink.append(format!("Failed to download: {}", reason));
                Ok(None)
            }
            DownloadEvent::Progress(_) => Ok(None),
        }
    }

    pub async fn fetch_releases(&self) -> Result<Vec<Release>> {
        Ok(self.releases.fetch().await?)
    }

    /// Start downloading an asset of the release tagged `tag`
    pub async fn download_release(&self, tag: &str, asset: Option<&str>) -> Result<DownloadHandle> {
        let release = self.releases.find(tag).await?;
        let job = release.download_job(asset)?;
        self.start_download(job)
    }

    pub fn start_download(&self, job: DownloadJob) -> Result<DownloadHandle> {
        Ok(self.downloads.start(job)?)
    }

    /// Mod directory of the instance at `index`, or the global one for `None`
    pub fn mod_directory(&self, index: Option<usize>) -> Result<PathBuf> {
        match index {
            Some(index) => Ok(self.instance(index)?.mod_directory()),
            None => mods::global_mod_directory().context("No data directory on this platform"),
        }
    }

    pub fn data_directory(&self) -> PathBuf {
        self.settings.get_data_directory()
    }

    pub fn registry_path(&self) -> Result<PathBuf> {
        Ok(self
            .registry
            .read()
            .map_err(|e| anyhow::anyhow!("Registry lock poisoned: {}", e))?
            .path()
            .to_path_buf())
    }
}
