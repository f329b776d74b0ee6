//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod messaging;
mod server;
mod storage;

pub use messaging::{BrokerConfig, BrokerType, SecurityConfig};
pub use server::{PipelineConfig, ServerConfig};
pub use storage::{StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "EVENTPIPE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "EVENTPIPE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "EVENTPIPE_LOG";
/// Environment variable selecting the log format (`json` or text).
pub const LOG_FORMAT_ENV_VAR: &str = "EVENTPIPE_LOG_FORMAT";

use serde::Deserialize;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Broker configuration.
    pub broker: BrokerConfig,
    /// Event store configuration.
    pub storage: StorageConfig,
    /// Background pipeline configuration.
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix, `__` separated
    ///    (e.g. `EVENTPIPE_BROKER__TOPIC`)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.topic must not be empty".into()));
        }
        if self.broker.consumer_group.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "broker.consumer_group must not be empty".into(),
            ));
        }
        if self.broker.topic_partitions == 0 {
            return Err(ConfigError::Invalid(
                "broker.topic_partitions must be at least 1".into(),
            ));
        }
        if self.broker.replication_factor == 0 {
            return Err(ConfigError::Invalid(
                "broker.replication_factor must be at least 1".into(),
            ));
        }
        if self.storage.url.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.url must not be empty".into()));
        }
        Ok(())
    }

    /// Create config for testing: in-process broker, in-memory SQLite.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.storage.url = "sqlite::memory:".to_string();
        config.storage.max_connections = 1;
        config.pipeline.shutdown_grace_secs = 1;
        config
    }
}
