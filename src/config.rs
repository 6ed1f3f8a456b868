use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Name of the current cache generation. Bump on every deploy that changes assets.
pub const GENERATION: &str = "trackmymoney-v3";

/// Page served when a same-origin request cannot be fetched.
pub const OFFLINE_PAGE: &str = "/index.html";

/// Resources needed to run offline, relative to the origin unless absolute.
pub const ASSETS: &[&str] = &[
  "/",
  "/index.html",
  "/manifest.json",
  "https://fonts.googleapis.com/css2?family=Instrument+Serif:ital@0;1&family=DM+Mono:ital,wght@0,300;0,500;1,300&family=Manrope:wght@200;400;600;800&display=swap",
];

/// Background sync tag that triggers the transaction upload.
pub const SYNC_TAG: &str = "sync-transactions";

/// Runtime configuration. The generation and manifest are fixed at build time
/// and deliberately absent here.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the worker is installed for
  #[serde(default = "default_origin")]
  pub origin: Url,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub log: LogConfig,
  #[serde(default)]
  pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Database path (default: $XDG_DATA_HOME/offline-sw/caches.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  /// Filter directive used when OFFLINE_SW_LOG is unset
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Directory for the log file (default: next to the database)
  pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      dir: None,
    }
  }
}

/// Defaults applied to push notifications.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub default_title: String,
  pub default_body: String,
  pub default_url: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      default_title: "TrackMyMoney".to_string(),
      default_body: "Budget alert!".to_string(),
      default_url: "/".to_string(),
      icon: "/icon-192.png".to_string(),
      badge: "/icon-192.png".to_string(),
      vibrate: vec![100, 50, 100],
    }
  }
}

fn default_origin() -> Url {
  Url::parse("http://localhost:8080/").expect("static origin is a valid URL")
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: default_origin(),
      storage: StorageConfig::default(),
      log: LogConfig::default(),
      notifications: NotificationConfig::default(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-sw/config.yaml
  ///
  /// Without any file the defaults are used.
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
    let local = PathBuf::from("offline-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;

    if config.origin.origin().is_tuple() {
      Ok(config)
    } else {
      Err(eyre!("origin {} has no host", config.origin))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("{}").unwrap();
    assert_eq!(config.origin.as_str(), "http://localhost:8080/");
    assert_eq!(config.log.level, "info");
    assert_eq!(config.notifications.vibrate, vec![100, 50, 100]);
  }

  #[test]
  fn test_partial_notification_section() {
    let config = Config::parse(
      "origin: https://money.example.com\nnotifications:\n  default_title: Budget\n",
    )
    .unwrap();
    assert_eq!(config.origin.host_str(), Some("money.example.com"));
    assert_eq!(config.notifications.default_title, "Budget");
    assert_eq!(config.notifications.default_body, "Budget alert!");
    assert_eq!(config.notifications.icon, "/icon-192.png");
  }

  #[test]
  fn test_origin_without_host_is_rejected() {
    assert!(Config::parse("origin: \"data:text/plain,hi\"").is_err());
  }

  #[test]
  fn test_manifest_contains_offline_page() {
    assert!(ASSETS.contains(&OFFLINE_PAGE));
  }
}
