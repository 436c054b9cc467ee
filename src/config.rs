use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::autosave::DEFAULT_DEBOUNCE;
use crate::keys::{Namespace, DEFAULT_NAMESPACE};
use crate::store::{StoreOptions, DEFAULT_QUOTA_BYTES};

pub const DEFAULT_CONFIG_FILE: &str = "casekeep.toml";
pub const DEFAULT_STORE_PATH: &str = ".casekeep/cases.db";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub storage: StorageConfig,
    pub autosave: AutosaveConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub namespace: String,
    pub quota_bytes: u64,
    pub read_only: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_STORE_PATH),
            namespace: DEFAULT_NAMESPACE.to_string(),
            quota_bytes: DEFAULT_QUOTA_BYTES,
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
        }
    }
}

impl Config {
    /// Reads `explicit` when given, otherwise `casekeep.toml` in the working
    /// directory if present. A relative store path in a file is taken
    /// relative to that file.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.is_file() {
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let mut config = Self::from_toml(&raw)?;
        if config.storage.path.is_relative() {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                config.storage.path = dir.join(&config.storage.path);
            }
        }
        tracing::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Command-line and environment values win over the file.
    pub fn apply_overrides(
        &mut self,
        store: Option<PathBuf>,
        namespace: Option<String>,
        read_only: bool,
    ) -> Result<(), ConfigError> {
        if let Some(store) = store {
            self.storage.path = store;
        }
        if let Some(namespace) = namespace {
            self.storage.namespace = namespace;
        }
        if read_only {
            self.storage.read_only = true;
        }
        self.validate()
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::new(self.storage.namespace.clone())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            quota_bytes: self.storage.quota_bytes,
            read_only: self.storage.read_only,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.autosave.debounce_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.namespace must not be empty".to_string(),
            ));
        }
        if self.storage.quota_bytes == 0 {
            return Err(ConfigError::Invalid(
                "storage.quota_bytes must be greater than zero".to_string(),
            ));
        }
        if self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "could not read config '{}': {}", path.display(), source)
            }
            ConfigError::Toml(err) => write!(f, "invalid config TOML: {}", err),
            ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml(err) => Some(err),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Toml(value)
    }
}
