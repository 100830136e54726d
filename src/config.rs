//! Configuration management for the backup daemon.
//!
//! Loads configuration from a TOML file; every knob has a serde default so a
//! partial file is enough.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::naming::FALLBACK_DATE_FORMAT;
use crate::utils::errors::{BackupError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub backup: BackupConfig,

    #[serde(default)]
    pub messages: MessagesConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Root directory snapshots are written to.
    pub root: PathBuf,

    /// Directory whose immediate subdirectories are the live targets
    /// (standalone host adapter only).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// strftime pattern for dated snapshot names. A malformed pattern is
    /// recovered at naming time, not here.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Replace each uncompressed snapshot with a zip archive.
    #[serde(default = "default_true")]
    pub zip: bool,

    /// Aggregated mode: one destination per run holding all targets.
    /// When false, each target gets its own `<id>-<date>` sibling.
    #[serde(default = "default_true")]
    pub aggregate: bool,

    /// Per-target mode switch for the live targets themselves.
    #[serde(default = "default_true")]
    pub include_targets: bool,

    /// Also snapshot the auxiliary plugins directory.
    #[serde(default)]
    pub include_plugins: bool,

    /// Location of the auxiliary plugins directory.
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,

    /// Maximum number of entries kept in the backup root (minimum 1).
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,

    /// Target identifiers excluded from every run.
    #[serde(default)]
    pub skip: Vec<String>,

    /// Only run scheduled backups while at least one user is online.
    #[serde(default)]
    pub only_with_users: bool,

    /// Re-enable periodic auto-save once a run finishes.
    #[serde(default = "default_true")]
    pub reenable_autosave: bool,

    /// Period between scheduled triggers in daemon mode.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesConfig {
    /// Broadcast before quiescing. Empty suppresses the broadcast.
    #[serde(default = "default_started_message")]
    pub started: String,

    /// Broadcast after the run finishes. Empty suppresses the broadcast.
    #[serde(default = "default_finished_message")]
    pub finished: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_date_format() -> String {
    FALLBACK_DATE_FORMAT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("plugins")
}

fn default_max_backups() -> u32 {
    10
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_started_message() -> String {
    "Backup started".to_string()
}

fn default_finished_message() -> String {
    "Backup complete".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            started: default_started_message(),
            finished: default_finished_message(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup: BackupConfig {
                root: PathBuf::from("backups"),
                data_dir: default_data_dir(),
                date_format: default_date_format(),
                zip: true,
                aggregate: true,
                include_targets: true,
                include_plugins: false,
                plugins_dir: default_plugins_dir(),
                max_backups: default_max_backups(),
                skip: Vec::new(),
                only_with_users: false,
                reenable_autosave: true,
                interval_secs: default_interval_secs(),
            },
            messages: MessagesConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate and normalize. `max_backups = 0` would mean "keep nothing",
    /// which is never what an operator intends; clamp it to 1 with a warning.
    pub fn validate(&mut self) -> Result<()> {
        if self.backup.root.as_os_str().is_empty() {
            return Err(BackupError::Config("backup.root must not be empty".into()));
        }
        if self.backup.max_backups == 0 {
            warn!("max_backups of 0 would delete every backup, clamping to 1");
            self.backup.max_backups = 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let config: Config = toml::from_str("[backup]\nroot = \"backups\"\n").unwrap();
        assert_eq!(config.backup.root, PathBuf::from("backups"));
        assert!(config.backup.zip);
        assert!(config.backup.aggregate);
        assert_eq!(config.backup.max_backups, 10);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_validate_clamps_max_backups() {
        let mut config = Config::default();
        config.backup.max_backups = 0;
        config.validate().unwrap();
        assert_eq!(config.backup.max_backups, 1);
    }

    #[test]
    fn test_validate_rejects_empty_root() {
        let mut config = Config::default();
        config.backup.root = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_skip_list_parsed() {
        let config: Config = toml::from_str(
            "[backup]\nroot = \"backups\"\nskip = [\"world_nether\", \"scratch\"]\n",
        )
        .unwrap();
        assert_eq!(config.backup.skip, vec!["world_nether", "scratch"]);
    }
}
