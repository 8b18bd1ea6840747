//! Mod directories - Listing, toggling, installing and removing mod files
//!
//! A mod is a `.py` or `.skmod` file. Disabling a mod renames it with a
//! trailing `.disabled` so the game skips it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

const DISABLED_SUFFIX: &str = ".disabled";
const MOD_EXTENSIONS: [&str; 2] = [".py", ".skmod"];

#[derive(Debug, Error)]
pub enum ModError {
    #[error("failed to read mod directory {}: {source}", .path.display())]
    ReadDir { path: PathBuf, source: io::Error },

    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("failed to install {}: {source}", .path.display())]
    Install { path: PathBuf, source: io::Error },

    #[error("failed to remove {}: {source}", .path.display())]
    Remove { path: PathBuf, source: io::Error },

    #[error("{} is not a mod file (.py or .skmod)", .0.display())]
    NotAMod(PathBuf),

    #[error("failed to open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("no mod named {0}")]
    UnknownMod(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModState {
    Enabled,
    Disabled,
}

impl ModState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

/// A mod file found in a mod directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModEntry {
    /// Name without the disabled suffix
    pub name: String,
    /// Current file name on disk
    pub file_name: String,
    pub state: ModState,
}

impl ModEntry {
    fn from_file_name(file_name: &str) -> Option<Self> {
        let (name, state) = match file_name.strip_suffix(DISABLED_SUFFIX) {
            Some(name) => (name, ModState::Disabled),
            None => (file_name, ModState::Enabled),
        };
        if !is_mod_name(name) {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            file_name: file_name.to_string(),
            state,
        })
    }

    fn file_name_for(&self, state: ModState) -> String {
        match state {
            ModState::Enabled => self.name.clone(),
            ModState::Disabled => format!("{}{}", self.name, DISABLED_SUFFIX),
        }
    }
}

fn is_mod_name(name: &str) -> bool {
    MOD_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Mod directory shared by every instance
///
/// `~/.local/share/SkakaviKrompir/mods` on Linux, `%APPDATA%` on Windows.
pub fn global_mod_directory() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("SkakaviKrompir").join("mods"))
}

/// List mods in `dir`, sorted by file name; creates the directory if missing
pub fn list_mods(dir: &Path) -> Result<Vec<ModEntry>, ModError> {
    let read_err = |source| ModError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(dir).map_err(read_err)?;

    let mut file_names = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if !entry.file_type().map_err(read_err)?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            file_names.push(name.to_string());
        }
    }
    file_names.sort();

    let mods: Vec<_> = file_names
        .iter()
        .filter_map(|name| ModEntry::from_file_name(name))
        .collect();
    debug!("Found {} mod(s) in {:?}", mods.len(), dir);
    Ok(mods)
}

/// Find a mod by its name, with or without the disabled suffix
pub fn find_mod(dir: &Path, name: &str) -> Result<ModEntry, ModError> {
    list_mods(dir)?
        .into_iter()
        .find(|entry| entry.name == name || entry.file_name == name)
        .ok_or_else(|| ModError::UnknownMod(name.to_string()))
}

/// Enable or disable a mod by renaming it
pub fn set_state(dir: &Path, entry: &ModEntry, state: ModState) -> Result<ModEntry, ModError> {
    if entry.state == state {
        return Ok(entry.clone());
    }

    let file_name = entry.file_name_for(state);
    let from = dir.join(&entry.file_name);
    let to = dir.join(&file_name);
    fs::rename(&from, &to).map_err(|source| ModError::Rename {
        from: from.clone(),
        to: to.clone(),
        source,
    })?;

    info!("Mod '{}' {}", entry.name, state.label());
    Ok(ModEntry {
        name: entry.name.clone(),
        file_name,
        state,
    })
}

/// Copy a mod file into `dir`, overwriting any file of the same name
pub fn install_mod(dir: &Path, source: &Path) -> Result<ModEntry, ModError> {
    let file_name = source
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| is_mod_name(name))
        .ok_or_else(|| ModError::NotAMod(source.to_path_buf()))?;

    let install_err = |err| ModError::Install {
        path: source.to_path_buf(),
        source: err,
    };
    fs::create_dir_all(dir).map_err(install_err)?;
    fs::copy(source, dir.join(file_name)).map_err(install_err)?;

    info!("Installed mod '{}' into {:?}", file_name, dir);
    Ok(ModEntry {
        name: file_name.to_string(),
        file_name: file_name.to_string(),
        state: ModState::Enabled,
    })
}

pub fn remove_mod(dir: &Path, entry: &ModEntry) -> Result<(), ModError> {
    let path = dir.join(&entry.file_name);
    fs::remove_file(&path).map_err(|source| ModError::Remove {
        path: path.clone(),
        source,
    })?;
    info!("Removed mod '{}'", entry.name);
    Ok(())
}

/// Show `dir` in the desktop file manager
pub fn open_directory(dir: &Path) -> Result<(), ModError> {
    fs::create_dir_all(dir).map_err(|source| ModError::Open {
        path: dir.to_path_buf(),
        source,
    })?;
    open::that(dir).map_err(|source| ModError::Open {
        path: dir.to_path_buf(),
        source,
    })
}
