//! Cadence Settings
//!
//! Config file management for Cadence services. A service defines its own
//! config type and uses `Settings<T>` to load and persist it as JSON.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to write settings {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("Failed to parse settings {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("Failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Settings wrapper for any serializable config type.
///
/// ```ignore
/// let settings: Settings<CoordinatorConfig> = Settings::load_or_default("cadence", None)?;
/// ```
pub struct Settings<T> {
    pub config: T,
    path: PathBuf,
}

impl<T: Serialize + DeserializeOwned + Default> Settings<T> {
    /// Load settings from `custom_path` or the service's default path.
    /// A missing file is created with `T::default()`.
    pub fn load_or_default(service: &str, custom_path: Option<&Path>) -> Result<Self> {
        let path = match custom_path {
            Some(p) => p.to_path_buf(),
            None => default_settings_path(service),
        };

        if path.exists() {
            Self::load(&path)
        } else {
            debug!("Creating default settings at {}", path.display());
            let settings = Self { config: T::default(), path };
            settings.save()?;
            Ok(settings)
        }
    }

    /// Load an existing settings file. Fields absent from the file take
    /// their defaults when `T` is `#[serde(default)]`.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading settings from {}", path.display());
        let content = fs::read_to_string(path)
            .map_err(|source| SettingsError::Read { path: path.to_path_buf(), source })?;
        let config: T = serde_json::from_str(&content)
            .map_err(|source| SettingsError::Parse { path: path.to_path_buf(), source })?;
        Ok(Self { config, path: path.to_path_buf() })
    }

    /// Save current settings to disk, creating parent directories.
    pub fn save(&self) -> Result<()> {
        let write_err = |source| SettingsError::Write { path: self.path.clone(), source };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(&self.config)?;
        fs::write(&self.path, content).map_err(write_err)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Per-service config directory.
///
/// - Linux: `$XDG_CONFIG_HOME/{service}` or `~/.config/{service}`
/// - macOS: `~/Library/Application Support/{service}`
/// - elsewhere: `~/.{service}`
pub fn default_config_dir_for(service: &str) -> PathBuf {
    let home = std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."));
    let service = service.to_lowercase();
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join(service)
    }
    #[cfg(target_os = "macos")]
    {
        home.join("Library").join("Application Support").join(service)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        home.join(format!(".{}", service))
    }
}

/// Default settings file path for a service.
pub fn default_settings_path(service: &str) -> PathBuf {
    default_config_dir_for(service).join("settings.json")
}
