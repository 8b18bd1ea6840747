//! Core module - Application state, instance registry, process supervision and downloads

mod app_state;
mod download;
mod events;
pub mod instance;
mod log_sink;
pub mod mods;
mod process;
mod registry;
pub mod release;
pub mod settings;

pub use app_state::AppState;
pub use download::{DownloadHandle, DownloadJob};
pub use events::{DownloadEvent, SupervisorEvent};
pub use instance::Instance;
pub use log_sink::{LogChunk, LogSource};
pub use process::SupervisorStatus;
pub use release::Release;
pub use settings::Settings;
