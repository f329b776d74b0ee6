//! Server and pipeline configuration types.

use std::time::Duration;

use serde::Deserialize;

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port for the HTTP API.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Background pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How long `stop` waits for the consume loop to exit before abandoning it.
    pub shutdown_grace_secs: u64,
}

impl PipelineConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 5,
        }
    }
}
