use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::SqliteQueueStorage;

/// Environment variable that overrides `remote.path`
pub const REMOTE_PATH_ENV: &str = "LIFTSYNC_REMOTE_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
  /// Write logs to this file instead of stderr
  pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Directory holding the shared JSON collections
  pub path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Pending-queue database (defaults to the user data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectivityConfig {
  /// Seconds between reachability checks of the remote directory
  #[serde(default = "default_probe_interval")]
  pub probe_interval_secs: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: default_probe_interval(),
    }
  }
}

fn default_probe_interval() -> u64 {
  5
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./liftsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/liftsync/config.yaml
  ///
  /// Without a file, `LIFTSYNC_REMOTE_PATH` alone is enough.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let remote_override = std::env::var(REMOTE_PATH_ENV).ok();

    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match (path, remote_override.as_deref()) {
      (Some(p), _) => Self::load_from_path(&p)?,
      (None, Some(remote)) => Self::from_remote(PathBuf::from(remote)),
      (None, None) => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/liftsync/config.yaml\n\
                 or set {} to the shared remote directory.",
          REMOTE_PATH_ENV
        ))
      }
    };

    Ok(config.with_remote_override(remote_override))
  }

  /// Defaults for everything but the remote directory.
  pub fn from_remote(path: PathBuf) -> Self {
    Self {
      remote: RemoteConfig { path },
      storage: StorageConfig::default(),
      connectivity: ConnectivityConfig::default(),
      log_file: None,
    }
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("liftsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("liftsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn with_remote_override(mut self, remote: Option<String>) -> Self {
    if let Some(remote) = remote.filter(|r| !r.trim().is_empty()) {
      self.remote.path = PathBuf::from(remote);
    }
    self
  }

  /// Where the pending queue lives.
  pub fn storage_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(path) => Ok(path.clone()),
      None => SqliteQueueStorage::default_path(),
    }
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.connectivity.probe_interval_secs.max(1))
  }
}
