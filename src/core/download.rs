//! Download manager - Streams a release asset to disk on a background task

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::DownloadEvent;
use super::settings::Settings;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("a download of {file_name} is already in progress")]
    Busy { file_name: String },

    #[error("invalid destination file name {0:?}")]
    InvalidFileName(String),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("connection closed after {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },

    #[error("failed to write {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("download cancelled")]
    Cancelled,
}

/// One requested transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub url: String,
    /// File name inside the download directory; also the job's key
    pub file_name: String,
    /// Version label used in the completed instance's display name
    pub label: String,
}

impl DownloadJob {
    pub fn new(
        url: impl Into<String>,
        file_name: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            file_name: file_name.into(),
            label: label.into(),
        }
    }

    fn validate(&self) -> Result<(), DownloadError> {
        let name = self.file_name.as_str();
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\');
        if invalid {
            return Err(DownloadError::InvalidFileName(self.file_name.clone()));
        }
        Ok(())
    }
}

/// Caller's side of a running job
pub struct DownloadHandle {
    pub id: Uuid,
    pub file_name: String,
    events: mpsc::UnboundedReceiver<DownloadEvent>,
}

impl DownloadHandle {
    /// Wait for the next event; `None` once the job has finished
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }
}

struct ActiveJob {
    id: Uuid,
    file_name: String,
    cancel: CancellationToken,
}

/// Single-slot download manager
///
/// Only one job runs at a time; a second `start` is refused with
/// [`DownloadError::Busy`] until the first reports a terminal event.
#[derive(Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    dest_dir: PathBuf,
    chunk_size: usize,
    display_prefix: String,
    active: Arc<Mutex<Option<ActiveJob>>>,
}

impl DownloadManager {
    pub fn new(
        client: reqwest::Client,
        dest_dir: impl Into<PathBuf>,
        chunk_size: usize,
        display_prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            dest_dir: dest_dir.into(),
            chunk_size: chunk_size.max(1),
            display_prefix: display_prefix.into(),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Manager writing into the configured `bin` directory
    pub fn from_settings(client: reqwest::Client, settings: &Settings) -> Self {
        Self::new(
            client,
            settings.get_bin_directory(),
            settings.download_chunk_size,
            settings.game_name.clone(),
        )
    }

    /// Start a job on a background task
    pub fn start(&self, job: DownloadJob) -> Result<DownloadHandle, DownloadError> {
        job.validate()?;

        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = active.as_ref() {
            return Err(DownloadError::Busy {
                file_name: current.file_name.clone(),
            });
        }

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (tx, events) = mpsc::unbounded_channel();
        *active = Some(ActiveJob {
            id,
            file_name: job.file_name.clone(),
            cancel: cancel.clone(),
        });
        drop(active);

        info!("Starting download {} of {} from {}", id, job.file_name, job.url);
        let handle = DownloadHandle {
            id,
            file_name: job.file_name.clone(),
            events,
        };

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run(id, job, cancel, tx).await;
        });

        Ok(handle)
    }

    /// Cancel whatever job is running; false if the slot is empty
    pub fn cancel_active(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.as_ref() {
            Some(job) => {
                info!("Cancelling download {}", job.id);
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// File name of the running job, if any
    pub fn active_file(&self) -> Option<String> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|job| job.file_name.clone())
    }

    async fn run(
        self,
        id: Uuid,
        job: DownloadJob,
        cancel: CancellationToken,
        tx: mpsc::UnboundedSender<DownloadEvent>,
    ) {
        let result = self.transfer(&job, &cancel, &tx).await;

        // Free the slot before the terminal event so the caller can start
        // the next job as soon as it sees it
        self.release(id);

        let event = match result {
            Ok(path) => {
                info!("Download {} complete: {:?}", id, path);
                DownloadEvent::Completed {
                    display_name: format!("{} {}", self.display_prefix, job.label),
                    path,
                }
            }
            Err(e) => {
                warn!("Download {} failed: {}", id, e);
                DownloadEvent::Failed {
                    reason: e.to_string(),
                }
            }
        };
        let _ = tx.send(event);
    }

    async fn transfer(
        &self,
        job: &DownloadJob,
        cancel: &CancellationToken,
        tx: &mpsc::UnboundedSender<DownloadEvent>,
    ) -> Result<PathBuf, DownloadError> {
        tokio::fs::create_dir_all(&self.dest_dir)
            .await
            .map_err(|source| DownloadError::Io {
                path: self.dest_dir.clone(),
                source,
            })?;
        let path = self.dest_dir.join(&job.file_name);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            response = self.client.get(&job.url).send() => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        let total = response.content_length().filter(|&len| len > 0);
        debug!("Content length for {}: {:?}", job.file_name, total);

        let io_err = |source: io::Error| DownloadError::Io {
            path: path.clone(),
            source,
        };
        let mut file = File::create(&path).await.map_err(io_err)?;
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        let mut last_percent: Option<u8> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Keep whatever arrived so far on disk
                    let _ = file.flush().await;
                    return Err(DownloadError::Cancelled);
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            for piece in chunk.chunks(self.chunk_size) {
                file.write_all(piece).await.map_err(io_err)?;
            }
            received += chunk.len() as u64;

            if let Some(total) = total {
                let percent = progress_percent(received, total);
                if last_percent.map_or(true, |last| percent > last) {
                    last_percent = Some(percent);
                    let _ = tx.send(DownloadEvent::Progress(percent));
                }
            }
        }

        file.flush().await.map_err(io_err)?;
        drop(file);

        if let Some(expected) = total {
            if received < expected {
                return Err(DownloadError::Truncated { received, expected });
            }
        }

        mark_executable(&path).await.map_err(io_err)?;
        Ok(path)
    }

    fn release(&self, id: Uuid) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(|job| job.id == id) {
            *active = None;
        }
    }
}

fn progress_percent(received: u64, total: u64) -> u8 {
    (received.saturating_mul(100) / total).min(100) as u8
}

#[cfg(unix)]
async fn mark_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn mark_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
