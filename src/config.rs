use std::fs::read_to_string;
use std::io;
use std::path::{Path, PathBuf};

use ahash::AHashSet;
use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

const DEFAULT_PASSWD_FILE: &str = "/etc/passwd";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub subuid_file: PathBuf,
    pub subgid_file: PathBuf,
    pub minimum_user_id: u32,
    /// Seconds between reconciliation cycles in daemon mode.
    pub service_timeout: u64,
    /// Users excluded from the mapping regardless of their uid.
    #[serde(default)]
    pub filtered_user_names: AHashSet<String>,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default = "default_passwd_file")]
    pub passwd_file: PathBuf,
}

fn default_passwd_file() -> PathBuf {
    PathBuf::from(DEFAULT_PASSWD_FILE)
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Config = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.service_timeout == 0 {
            return Err(ConfigError::Invalid(
                "service_timeout must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
