//! Launcher settings management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::persistence::JsonStore;

/// File name of the settings document inside the data directory
pub const SETTINGS_FILE: &str = "settings.json";

/// GitHub releases feed of the game
pub const DEFAULT_RELEASES_URL: &str =
    "https://api.github.com/repos/Pavle012/Skakavi-krompir/releases";

/// Launcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Storage
    /// Directory holding the registry, settings and downloaded builds
    /// (defaults to the launcher's own directory)
    pub data_directory: Option<PathBuf>,
    /// Registry file name, relative to the data directory
    pub registry_file: PathBuf,
    /// Download destination, relative to the data directory
    pub bin_directory: PathBuf,

    // Downloads
    /// Releases endpoint used to populate the version picker
    pub releases_url: String,
    /// Prefix for the display name of downloaded instances
    pub game_name: String,
    /// Maximum bytes written to disk per write call
    pub download_chunk_size: usize,
    /// User-Agent sent with every request
    pub user_agent: String,

    // Process supervision
    /// How long Kill waits for the child to exit (ms)
    pub kill_timeout_ms: u64,

    // Advanced
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_directory: None,
            registry_file: PathBuf::from("instances.json"),
            bin_directory: PathBuf::from("bin"),

            releases_url: DEFAULT_RELEASES_URL.to_string(),
            game_name: "Skakavi Krompir".to_string(),
            download_chunk_size: 8 * 1024,
            user_agent: concat!("krompir-launcher/", env!("CARGO_PKG_VERSION")).to_string(),

            kill_timeout_ms: 1000,

            debug_logging: false,
        }
    }
}

impl Settings {
    /// Load settings from `dir/settings.json`, falling back to defaults
    ///
    /// Missing files are silent; unreadable ones are logged.
    pub fn load_from(dir: &Path) -> Self {
        let store: JsonStore<Settings> = JsonStore::new(dir.join(SETTINGS_FILE));
        let mut settings = match store.load() {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!("Using default settings: {}", e);
                Settings::default()
            }
        };
        if settings.data_directory.is_none() {
            settings.data_directory = Some(dir.to_path_buf());
        }
        settings.validate();
        settings
    }

    /// Get the data directory, using the launcher's directory if not set
    pub fn get_data_directory(&self) -> PathBuf {
        self.data_directory
            .clone()
            .unwrap_or_else(default_data_directory)
    }

    /// Get the registry file path
    pub fn get_registry_path(&self) -> PathBuf {
        self.get_data_directory().join(&self.registry_file)
    }

    /// Get the download destination directory
    pub fn get_bin_directory(&self) -> PathBuf {
        self.get_data_directory().join(&self.bin_directory)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        self.download_chunk_size = self.download_chunk_size.clamp(1024, 1024 * 1024);
        self.kill_timeout_ms = self.kill_timeout_ms.clamp(100, 30_000);
        if self.game_name.trim().is_empty() {
            self.game_name = Settings::default().game_name;
        }
    }
}

/// Directory containing the launcher executable, or `.` if unknown
pub fn default_data_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
