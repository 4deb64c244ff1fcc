//! Configuration management for the log backup agent.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables (a `.env` file is honoured), then CLI flags.

use crate::utils::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SOURCE_FILE: &str = "logs/VM-state.log";
pub const DEFAULT_BACKUP_DIR: &str = "backup";
pub const DEFAULT_INTERVAL_SECS: i64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Log file to watch
    #[serde(default = "default_source_file")]
    pub source_file: PathBuf,

    /// Directory receiving backups and the state file
    #[serde(default = "default_backup_dir")]
    pub backup_dir: PathBuf,

    /// Poll interval in seconds; non-positive values fall back to the default
    #[serde(default = "default_interval_secs")]
    pub interval_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_source_file() -> PathBuf {
    PathBuf::from(DEFAULT_SOURCE_FILE)
}

fn default_backup_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BACKUP_DIR)
}

fn default_interval_secs() -> i64 {
    DEFAULT_INTERVAL_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            source_file: default_source_file(),
            backup_dir: default_backup_dir(),
            interval_secs: default_interval_secs(),
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

impl WatchConfig {
    /// Effective poll interval, never shorter than one second
    pub fn interval(&self) -> Duration {
        Duration::from_secs(effective_interval_secs(self.interval_secs))
    }
}

/// Parse a raw interval value. Anything that is not a positive integer
/// yields the default.
pub fn parse_interval(raw: &str) -> i64 {
    match raw.trim().parse::<i64>() {
        Ok(secs) if secs > 0 => secs,
        _ => DEFAULT_INTERVAL_SECS,
    }
}

fn effective_interval_secs(secs: i64) -> u64 {
    if secs > 0 {
        secs as u64
    } else {
        DEFAULT_INTERVAL_SECS as u64
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| AgentError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    /// Defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override values from environment variables read through `lookup`.
    ///
    /// Empty values count as unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(source) = get("SOURCE_FILE").or_else(|| get("LOG_FILE")) {
            self.watch.source_file = PathBuf::from(source);
        }
        if let Some(dir) = get("BACKUP_DIR") {
            self.watch.backup_dir = PathBuf::from(dir);
        }
        if let Some(raw) = get("BACKUP_INTERVAL").or_else(|| get("INTERVAL_BACKUP")) {
            self.watch.interval_secs = parse_interval(&raw);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.watch.source_file, PathBuf::from("logs/VM-state.log"));
        assert_eq!(config.watch.backup_dir, PathBuf::from("backup"));
        assert_eq!(config.watch.interval(), Duration::from_secs(5));
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_interval() {
        assert_eq!(parse_interval("abc"), 5);
        assert_eq!(parse_interval(""), 5);
        assert_eq!(parse_interval("0"), 5);
        assert_eq!(parse_interval("-3"), 5);
        assert_eq!(parse_interval("2.5"), 5);
        assert_eq!(parse_interval(" 7 "), 7);
        assert_eq!(parse_interval("1"), 1);
    }

    #[test]
    fn test_non_numeric_env_interval_falls_back() {
        let mut config = Config::default();
        config.apply_env(env(&[("BACKUP_INTERVAL", "abc")]));
        assert_eq!(config.watch.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_env_fallback_names() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("LOG_FILE", "/var/log/vm.log"),
            ("INTERVAL_BACKUP", "30"),
            ("BACKUP_DIR", "/srv/backup"),
        ]));
        assert_eq!(config.watch.source_file, PathBuf::from("/var/log/vm.log"));
        assert_eq!(config.watch.backup_dir, PathBuf::from("/srv/backup"));
        assert_eq!(config.watch.interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_primary_env_names_win() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("SOURCE_FILE", "/a.log"),
            ("LOG_FILE", "/b.log"),
            ("BACKUP_INTERVAL", "2"),
            ("INTERVAL_BACKUP", "9"),
        ]));
        assert_eq!(config.watch.source_file, PathBuf::from("/a.log"));
        assert_eq!(config.watch.interval_secs, 2);
    }

    #[test]
    fn test_empty_env_value_is_unset() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("SOURCE_FILE", ""),
            ("LOG_FILE", "/b.log"),
            ("BACKUP_DIR", ""),
        ]));
        assert_eq!(config.watch.source_file, PathBuf::from("/b.log"));
        assert_eq!(config.watch.backup_dir, PathBuf::from(DEFAULT_BACKUP_DIR));
    }

    #[test]
    fn test_from_file_partial() {
        use std::io::Write;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[watch]\nsource_file = \"/var/log/app.log\"\ninterval_secs = -4\n\n[log]\nlevel = \"debug\""
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.watch.source_file, PathBuf::from("/var/log/app.log"));
        assert_eq!(config.watch.backup_dir, PathBuf::from("backup"));
        assert_eq!(config.watch.interval(), Duration::from_secs(5));
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_from_file_invalid() {
        use std::io::Write;

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[watch\nsource_file = ").unwrap();

        assert!(matches!(
            Config::from_file(file.path()),
            Err(AgentError::Config(_))
        ));
    }
}
