use std::collections::{BTreeMap, HashMap};
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to write {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },

    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("webhook key '{0}' is not a numeric owner id")]
    InvalidOwnerId(String),

    #[error("could not determine a config directory, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub probe: ProbeConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
    pub pool_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between due-set passes
    pub cadence_seconds: u64,
    pub max_concurrent_probes: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Honour HTTP(S)_PROXY from the environment
    pub use_system_proxy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub webhook_timeout_seconds: u64,
    /// Owner id -> webhook URL. TOML keys are strings.
    pub webhooks: BTreeMap<String, String>,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().is_none_or(|ext| ext != "toml") {
        path.set_extension("toml");
    }
    path
}

/// Base directory for config and data ($XDG_CONFIG_HOME/domain-monitor or
/// $HOME/.config/domain-monitor)
fn config_dir() -> Result<path::PathBuf, Error> {
    let base = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(base.join("domain-monitor"))
}

fn default_config_path() -> Result<path::PathBuf, Error> {
    Ok(config_dir()?.join("config.toml"))
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = config_dir()
            .map(|dir| dir.join("domains.db"))
            .unwrap_or_else(|_| path::PathBuf::from("domains.db"));
        Self { path, pool_size: 8 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { cadence_seconds: 60, max_concurrent_probes: 32, queue_capacity: 1024 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { use_system_proxy: true }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { webhook_timeout_seconds: 10, webhooks: BTreeMap::new() }
    }
}

impl NotificationConfig {
    /// Webhook table keyed by numeric owner id
    pub fn webhooks_by_owner(&self) -> Result<HashMap<i64, String>, Error> {
        self.webhooks
            .iter()
            .map(|(owner, url)| {
                let owner_id = owner.trim().parse().map_err(|_| Error::InvalidOwnerId(owner.clone()))?;
                Ok((owner_id, url.clone()))
            })
            .collect()
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Effective Configuration:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Pool Size", &self.database.pool_size)?;

        write_title_1(f, "Scheduler")?;
        write_1(f, "Cadence (s)", &self.scheduler.cadence_seconds)?;
        write_1(f, "Max Concurrent Probes", &self.scheduler.max_concurrent_probes)?;
        write_1(f, "Queue Capacity", &self.scheduler.queue_capacity)?;

        write_title_1(f, "Probe")?;
        write_1(f, "Use System Proxy", &self.probe.use_system_proxy)?;

        write_title_1(f, "Notifications")?;
        write_1(f, "Webhook Timeout (s)", &self.notifications.webhook_timeout_seconds)?;
        if self.notifications.webhooks.is_empty() {
            write_1(f, "Webhooks", &"none, alerts go to the log")?;
        } else {
            write_1(f, "Webhooks", &self.notifications.webhooks.len())?;
            for (owner, url) in &self.notifications.webhooks {
                write_2(f, &format!("Owner {owner}"), url)?;
            }
        }

        Ok(())
    }
}

impl Config {
    /// Load the config from `optional_path`, or the default location.
    ///
    /// A missing file is created with the defaults.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path = match optional_path {
            Some(path) => normalize_toml_path(path.as_ref()),
            None => default_config_path()?,
        };

        if config_path.exists() {
            let raw = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            Ok(toml::from_str(&raw)?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str = toml::to_string_pretty(self)?;
        let write_failed = |source| Error::WriteFailed { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        fs::write(path, config_str).map_err(write_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_toml_path() {
        assert_eq!(normalize_toml_path(path::Path::new("/tmp/cfg")), path::PathBuf::from("/tmp/cfg.toml"));
        assert_eq!(normalize_toml_path(path::Path::new("/tmp/cfg.json")), path::PathBuf::from("/tmp/cfg.toml"));
        assert_eq!(normalize_toml_path(path::Path::new("a.toml")), path::PathBuf::from("a.toml"));
    }

    #[test]
    fn test_missing_file_is_written_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let config = Config::from_config(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.scheduler, SchedulerConfig::default());

        let reloaded = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[scheduler]
cadence_seconds = 15

[probe]
use_system_proxy = false

[notifications.webhooks]
42 = "https://hooks.example/42"
"#,
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.scheduler.cadence_seconds, 15);
        assert_eq!(config.scheduler.max_concurrent_probes, 32);
        assert!(!config.probe.use_system_proxy);
        assert_eq!(config.notifications.webhook_timeout_seconds, 10);

        let webhooks = config.notifications.webhooks_by_owner().unwrap();
        assert_eq!(webhooks.get(&42).map(String::as_str), Some("https://hooks.example/42"));
    }

    #[test]
    fn test_invalid_files_are_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler\ncadence_seconds = ").unwrap();
        assert!(matches!(Config::from_config(Some(&path)), Err(Error::ParseFailed(_))));

        let mut notifications = NotificationConfig::default();
        notifications.webhooks.insert("alice".into(), "https://hooks.example".into());
        assert!(matches!(notifications.webhooks_by_owner(), Err(Error::InvalidOwnerId(_))));
    }

    #[test]
    fn test_display_lists_sections() {
        let rendered = Config::default().to_string();
        assert!(rendered.contains("Scheduler"));
        assert!(rendered.contains("Max Concurrent Probes: 32"));
        assert!(rendered.contains("alerts go to the log"));
    }
}
