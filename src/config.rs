//! Configuration loading.
//!
//! Grounded on `blz-core`'s `Config::load()` pattern: a TOML file located
//! via an env var override, then the OS's XDG/standard config directory,
//! then a dotfile fallback; deserialized with `serde`, then overridden
//! field-by-field by `PAPERBOT_*` environment variables.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no config directory could be determined for this platform")]
    NoConfigDir,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeLimits {
    pub max_papers_per_agent: Option<u32>,
    pub per_query_limit: u32,
    pub respect_date_range: bool,
}

impl ModeLimits {
    fn test_defaults() -> Self {
        Self { max_papers_per_agent: Some(5), per_query_limit: 10, respect_date_range: false }
    }
    fn daily_defaults() -> Self {
        Self { max_papers_per_agent: Some(50), per_query_limit: 100, respect_date_range: true }
    }
    fn backfill_defaults() -> Self {
        Self { max_papers_per_agent: None, per_query_limit: 500, respect_date_range: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModeSettings {
    pub testing: ModeLimits,
    pub daily: ModeLimits,
    pub backfill: ModeLimits,
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self {
            testing: ModeLimits::test_defaults(),
            daily: ModeLimits::daily_defaults(),
            backfill: ModeLimits::backfill_defaults(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrySettings {
    pub max_worker_retries: u32,
    pub worker_timeout_secs: u64,
    pub worker_retry_delay_secs: u64,
    pub api_max_retries: u32,
    pub api_base_delay_secs: u64,
    pub request_pacing_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_worker_retries: 2,
            worker_timeout_secs: 600,
            worker_retry_delay_secs: 5,
            api_max_retries: 3,
            api_base_delay_secs: 2,
            request_pacing_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloudStorageConfig {
    pub path: Option<PathBuf>,
    pub enabled: bool,
    pub check_duplicates: bool,
    pub backup_path: Option<PathBuf>,
    pub backup_enabled: bool,
}

impl Default for CloudStorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            enabled: true,
            check_duplicates: true,
            backup_path: None,
            backup_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AdapterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub prompt_file: Option<PathBuf>,
    /// Use the relaxed relevance prompt for this adapter instead of the
    /// strict one. Resolved here rather than hard-coded per source name
    /// (see DESIGN.md Open Question 3).
    #[serde(default)]
    pub relaxed: bool,
    pub page_size: Option<u32>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub papers_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub cloud_storage: CloudStorageConfig,
    pub mode_settings: ModeSettings,
    pub date_overlap_days: u32,
    pub retry_settings: RetrySettings,
    pub ingest_path: Option<PathBuf>,
    #[serde(default)]
    pub adapters: HashMap<String, AdapterConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let base = ProjectDirs::from("dev", "paperbot", "paperbot")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            db_path: base.join("metadata.db"),
            papers_dir: base.join("papers"),
            staging_dir: base.join("staging"),
            cloud_storage: CloudStorageConfig::default(),
            mode_settings: ModeSettings::default(),
            date_overlap_days: 1,
            retry_settings: RetrySettings::default(),
            ingest_path: None,
            adapters: HashMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration following the override hierarchy:
    /// `PAPERBOT_CONFIG` (exact file) > `PAPERBOT_CONFIG_DIR` (directory
    /// containing `config.toml`) > the OS config directory > a dotfile
    /// fallback (`~/.paperbot.toml`) > built-in defaults if nothing exists.
    /// A sibling `config.local.toml` next to whichever file was found is
    /// merged on top if present. Finally, individual `PAPERBOT_*`
    /// environment variables override specific fields.
    pub fn load() -> Result<Self, ConfigError> {
        let path = match existing_config_path()? {
            Some(p) => p,
            None => return Ok(Self::apply_env_overrides(Self::default())),
        };

        let raw = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        let mut value: toml::Value = toml::from_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;

        if let Some(parent) = path.parent() {
            let local_path = parent.join("config.local.toml");
            if local_path.is_file() {
                let local_raw = std::fs::read_to_string(&local_path)
                    .map_err(|source| ConfigError::Read { path: local_path.clone(), source })?;
                let local_value: toml::Value = toml::from_str(&local_raw)
                    .map_err(|source| ConfigError::Parse { path: local_path, source })?;
                merge_toml(&mut value, local_value);
            }
        }

        let config: Self = value
            .try_into()
            .map_err(|source| ConfigError::Parse { path, source })?;
        Ok(Self::apply_env_overrides(config))
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let serialized = toml::to_string_pretty(self)?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, serialized)
            .map_err(|source| ConfigError::Write { path: tmp_path.clone(), source })?;
        std::fs::rename(&tmp_path, path)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;
        Ok(())
    }

    fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("PAPERBOT_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PAPERBOT_STAGING_DIR") {
            self.staging_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PAPERBOT_PAPERS_DIR") {
            self.papers_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PAPERBOT_CLOUD_PATH") {
            self.cloud_storage.path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("PAPERBOT_CLOUD_ENABLED") {
            self.cloud_storage.enabled = parse_bool(&v, self.cloud_storage.enabled);
        }
        if let Ok(v) = std::env::var("PAPERBOT_DATE_OVERLAP_DAYS") {
            if let Ok(n) = v.parse() {
                self.date_overlap_days = n;
            }
        }
        self
    }
}

fn parse_bool(v: &str, default: bool) -> bool {
    match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn existing_config_path() -> Result<Option<PathBuf>, ConfigError> {
    if let Ok(path) = std::env::var("PAPERBOT_CONFIG") {
        return Ok(Some(PathBuf::from(path)));
    }
    if let Ok(dir) = std::env::var("PAPERBOT_CONFIG_DIR") {
        return Ok(Some(PathBuf::from(dir).join("config.toml")));
    }

    let canonical = canonical_config_path()?;
    if canonical.is_file() {
        return Ok(Some(canonical));
    }

    let dotfile = dotfile_config_path()?;
    if dotfile.is_file() {
        return Ok(Some(dotfile));
    }

    Ok(None)
}

fn canonical_config_path() -> Result<PathBuf, ConfigError> {
    let dirs = ProjectDirs::from("dev", "paperbot", "paperbot").ok_or(ConfigError::NoConfigDir)?;
    Ok(dirs.config_dir().join("config.toml"))
}

fn dotfile_config_path() -> Result<PathBuf, ConfigError> {
    let home = directories::BaseDirs::new().ok_or(ConfigError::NoConfigDir)?;
    Ok(home.home_dir().join(".paperbot.toml"))
}

fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (base_slot, overlay_value) => {
            *base_slot = overlay_value;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_self_consistent() {
        let config = Config::default();
        assert!(config.cloud_storage.enabled);
        assert_eq!(config.date_overlap_days, 1);
        assert_eq!(config.mode_settings.backfill.max_papers_per_agent, None);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let config = Config::default();
        config.save(&path).expect("save");
        let raw = std::fs::read_to_string(&path).expect("read back");
        let reloaded: Config = toml::from_str(&raw).expect("parse back");
        assert_eq!(reloaded, config);
    }

    #[test]
    fn merge_toml_overlays_nested_tables() {
        let mut base: toml::Value = toml::from_str("[a]\nx = 1\ny = 2\n").unwrap();
        let overlay: toml::Value = toml::from_str("[a]\ny = 3\n").unwrap();
        merge_toml(&mut base, overlay);
        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
    }

    #[test]
    fn parse_bool_recognizes_common_forms() {
        assert!(parse_bool("true", false));
        assert!(parse_bool("1", false));
        assert!(!parse_bool("no", true));
        assert!(parse_bool("garbage", true));
    }
}
