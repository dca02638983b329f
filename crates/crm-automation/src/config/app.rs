//! Application configuration for the automation server.

use std::path::PathBuf;

use serde::Deserialize;

/// Where definitions and runs are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory; lost on restart.
    #[default]
    Memory,
    Postgres,
}

/// Application configuration loaded from environment variables.
///
/// Environment variables are prefixed with `CRMFLOW_`:
/// - `CRMFLOW_HOST`: Server bind address (default: "0.0.0.0")
/// - `CRMFLOW_PORT`: Server port (default: 8090)
/// - `CRMFLOW_DEBUG`: Enable debug mode (default: false)
/// - `CRMFLOW_SERVER_NAME`: Server name for identification
/// - `CRMFLOW_STORE`: `memory` or `postgres` (default: memory)
/// - `CRMFLOW_WORKER_CONCURRENCY`: Jobs run in parallel (default: 16)
/// - `CRMFLOW_DEFINITIONS_PATH`: YAML/JSON file of definitions to load at startup
/// - `CRMFLOW_LOG_JSON`: Emit JSON logs (default: false)
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable debug mode
    #[serde(default)]
    pub debug: bool,

    /// Server name for identification
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Storage backend for definitions, runs and audit entries
    #[serde(default)]
    pub store: StoreBackend,

    /// Maximum jobs executing at once
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Definitions seed file
    #[serde(default)]
    pub definitions_path: Option<PathBuf>,

    /// JSON log output
    #[serde(default)]
    pub log_json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_server_name() -> String {
    "crm-automation".to_string()
}

fn default_worker_concurrency() -> usize {
    16
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `CRMFLOW_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("CRMFLOW_").from_env::<AppConfig>()
    }

    /// Get the server bind address as a string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debug: false,
            server_name: default_server_name(),
            store: StoreBackend::default(),
            worker_concurrency: default_worker_concurrency(),
            definitions_path: None,
            log_json: false,
        }
    }
}
