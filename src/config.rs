//! Layered configuration: TOML file, then environment overrides, then defaults.

use crate::monitor::job::CancelMode;
use crate::monitor::scheduler::SchedulerConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// An endpoint loaded into the in-memory store when running without a
/// database.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EndpointSeed {
    pub name: String,
    pub url: String,
    #[serde(default = "default_seed_interval")]
    pub interval_seconds: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub log_dir: String,
    pub reconcile_interval_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub max_concurrent_probes: Option<usize>,
    pub cancel_mode: CancelMode,
    pub user_agent: String,
    pub endpoints: Vec<EndpointSeed>,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct FileConfig {
    database_url: Option<String>,
    db_max_connections: Option<u32>,
    log_dir: Option<String>,
    reconcile_interval_seconds: Option<u64>,
    probe_timeout_seconds: Option<u64>,
    max_concurrent_probes: Option<usize>,
    cancel_mode: Option<String>,
    user_agent: Option<String>,
    #[serde(default)]
    endpoints: Vec<EndpointSeed>,
}

#[derive(Deserialize, Default, Debug)]
struct EnvConfig {
    database_url: Option<String>,
    db_max_connections: Option<u32>,
    log_dir: Option<String>,
    reconcile_interval_seconds: Option<u64>,
    probe_timeout_seconds: Option<u64>,
    max_concurrent_probes: Option<usize>,
    cancel_mode: Option<String>,
    user_agent: Option<String>,
}

fn default_seed_interval() -> i32 {
    300
}

fn default_true() -> bool {
    true
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_user_agent() -> String {
    format!("pingwatch/{}", crate::VERSION)
}

impl MonitorConfig {
    /// Loads `config_path` if it exists, then applies environment overrides
    /// (including values from a `.env` file).
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let contents = fs::read_to_string(path_str).map_err(|source| ConfigError::Read {
                    path: path_str.to_string(),
                    source,
                })?;
                parse_file(path_str, &contents)?
            }
            _ => FileConfig::default(),
        };

        let env_config = envy::from_env::<EnvConfig>()?;
        Self::merge(file_config, env_config)
    }

    /// Builds a config from TOML text and explicit environment pairs.
    pub fn from_sources<I>(toml_contents: Option<&str>, env: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let file_config = match toml_contents {
            Some(contents) => parse_file("<inline>", contents)?,
            None => FileConfig::default(),
        };
        let env_config = envy::from_iter::<_, EnvConfig>(env)?;
        Self::merge(file_config, env_config)
    }

    fn merge(file: FileConfig, env: EnvConfig) -> Result<Self, ConfigError> {
        let cancel_mode = match env.cancel_mode.or(file.cancel_mode) {
            Some(raw) => raw.parse::<CancelMode>().map_err(ConfigError::Invalid)?,
            None => CancelMode::default(),
        };

        let config = MonitorConfig {
            database_url: env.database_url.or(file.database_url),
            db_max_connections: env.db_max_connections.or(file.db_max_connections).unwrap_or(10),
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            reconcile_interval_seconds: env
                .reconcile_interval_seconds
                .or(file.reconcile_interval_seconds)
                .unwrap_or(60),
            probe_timeout_seconds: env
                .probe_timeout_seconds
                .or(file.probe_timeout_seconds)
                .unwrap_or(10),
            max_concurrent_probes: env.max_concurrent_probes.or(file.max_concurrent_probes),
            cancel_mode,
            user_agent: env
                .user_agent
                .or(file.user_agent)
                .unwrap_or_else(default_user_agent),
            endpoints: file.endpoints,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reconcile_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "reconcile_interval_seconds must be positive".to_string(),
            ));
        }
        if self.probe_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "probe_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.max_concurrent_probes == Some(0) {
            return Err(ConfigError::Invalid(
                "max_concurrent_probes must be positive when set".to_string(),
            ));
        }
        if self.db_max_connections == 0 {
            return Err(ConfigError::Invalid(
                "db_max_connections must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("DATABASE_URL is required".to_string()))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_seconds)
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            reconcile_interval: Duration::from_secs(self.reconcile_interval_seconds),
            cancel_mode: self.cancel_mode,
            max_concurrent_probes: self.max_concurrent_probes,
        }
    }
}

fn parse_file(path: &str, contents: &str) -> Result<FileConfig, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}
