//! Engine configuration.
//!
//! # Responsibility
//! - Load the host's engine settings from JSON.
//! - Reject settings the engine cannot run with before anything is opened.
//!
//! # Invariants
//! - A config that passed `validate` names a non-zero dispatcher and admin,
//!   and a supported log level.

use crate::logging::{default_log_level, init_logging, normalize_level, normalize_log_dir};
use crate::model::address::Address;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Ledger account the dispatcher holds balances under.
    pub dispatcher_address: Address,
    /// Registry authority.
    pub admin: Address,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite file; `None` keeps the ledger in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Absolute log directory; `None` leaves logging to the host.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: None,
        }
    }
}

fn default_level() -> String {
    default_log_level().to_string()
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl EngineConfig {
    /// In-memory ledger, default logging.
    pub fn new(dispatcher_address: Address, admin: Address) -> Self {
        Self {
            dispatcher_address,
            admin,
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher_address.is_zero() {
            return Err(ConfigError::Invalid(
                "dispatcher_address must not be zero".to_string(),
            ));
        }
        if self.admin.is_zero() {
            return Err(ConfigError::Invalid("admin must not be zero".to_string()));
        }
        if self.admin == self.dispatcher_address {
            return Err(ConfigError::Invalid(
                "admin and dispatcher_address must differ".to_string(),
            ));
        }
        normalize_level(&self.logging.level)
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        if let Some(dir) = &self.logging.dir {
            normalize_log_dir(dir).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        }
        if let Some(path) = &self.database.path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "database.path must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Starts file logging when `logging.dir` is set; no-op otherwise.
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        match &self.logging.dir {
            Some(dir) => init_logging(&self.logging.level, dir)
                .map_err(|err| ConfigError::Invalid(err.to_string())),
            None => Ok(()),
        }
    }
}
