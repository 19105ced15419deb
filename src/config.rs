use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_URL: &str = "https://rebrickable.com/api/v3/lego/";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub catalog: CatalogConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub audit: AuditConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-request timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for CatalogConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  /// Store database (default: $XDG_DATA_HOME/brickaudit/store.db)
  pub path: Option<PathBuf>,
  /// Total bytes the store may hold; `null` disables the limit
  #[serde(default = "default_quota_bytes")]
  pub quota_bytes: Option<usize>,
}

impl Default for StorageConfig {
  fn default() -> Self {
    Self {
      path: None,
      quota_bytes: default_quota_bytes(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
  /// Delay before a burst of part updates is written out
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
}

impl Default for AuditConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
    }
  }
}

fn default_base_url() -> String {
  DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_quota_bytes() -> Option<usize> {
  Some(5 * 1024 * 1024)
}

fn default_debounce_ms() -> u64 {
  500
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./brickaudit.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/brickaudit/config.yaml
  ///
  /// Without any file the defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("brickaudit.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("brickaudit").join("config.yaml");
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

  /// Directory for the store database and log file.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("brickaudit"))
  }

  pub fn store_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(path) => Ok(path.clone()),
      None => Ok(Self::data_dir()?.join("store.db")),
    }
  }

  /// API key from the environment, which takes precedence over the stored key.
  pub fn api_key_override() -> Option<String> {
    std::env::var("BRICKAUDIT_API_KEY")
      .ok()
      .filter(|key| !key.trim().is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_from_empty_file() {
    let config: Config = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config.catalog.base_url, DEFAULT_BASE_URL);
    assert_eq!(config.catalog.timeout_secs, 30);
    assert_eq!(config.storage.quota_bytes, Some(5 * 1024 * 1024));
    assert_eq!(config.audit.debounce_ms, 500);
  }

  #[test]
  fn test_load_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brickaudit.yaml");
    std::fs::write(
      &path,
      "catalog:\n  base_url: http://localhost:9000/lego/\nstorage:\n  path: /tmp/x.db\n  quota_bytes: null\naudit:\n  debounce_ms: 50\n",
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.catalog.base_url, "http://localhost:9000/lego/");
    assert_eq!(config.catalog.timeout_secs, 30);
    assert_eq!(config.storage.quota_bytes, None);
    assert_eq!(config.store_path().unwrap(), PathBuf::from("/tmp/x.db"));
    assert_eq!(config.audit.debounce_ms, 50);
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/brickaudit.yaml"))).is_err());
  }
}
