use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub library: LibraryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub organize: OrganizeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryConfig {
    /// Books root; every placed file lives below it.
    pub root_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `shelfkeep=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Records fetched per round of a hash backfill.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrganizeConfig {
    /// Suffixed names (` (2)`, ` (3)`, ...) tried before giving up.
    #[serde(default = "default_max_conflict_attempts")]
    pub max_conflict_attempts: u32,
    /// Maximum characters per path component.
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            max_conflict_attempts: default_max_conflict_attempts(),
            max_name_len: default_max_name_len(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

// Default value functions

fn default_db_url() -> String {
    "sqlite://shelfkeep.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_batch_size() -> u32 {
    50
}

fn default_max_conflict_attempts() -> u32 {
    100
}

fn default_max_name_len() -> usize {
    200
}
