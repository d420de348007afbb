//! Server configuration

use fleet_sdk::FleetConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host
    pub host: String,

    /// Server port (HTTP)
    pub port: u16,

    pub log_format: LogFormat,

    /// YAML file with partner registrations
    pub partners_file: Option<PathBuf>,

    /// Telemetry database. Without one, records are kept in memory.
    pub database_url: Option<String>,

    pub database_max_connections: u32,

    /// Engine configuration
    pub fleet: FleetConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            log_format: LogFormat::Text,
            partners_file: None,
            database_url: None,
            database_max_connections: 10,
            fleet: FleetConfig::default(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Connection strings may carry credentials
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_format", &self.log_format)
            .field("partners_file", &self.partners_file)
            .field("database_url", &self.database_url.as_ref().map(|_| "***"))
            .field("database_max_connections", &self.database_max_connections)
            .field("fleet", &self.fleet)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, `config/server.*` and `FLEET_` environment variables
    pub fn load() -> anyhow::Result<Self> {
        // Load .env file if exists
        dotenvy::dotenv().ok();
        Self::load_from("config/server")
    }

    /// Load from a config file (optional) overridden by the environment.
    ///
    /// Nested keys use `__`, e.g. `FLEET_FLEET__INGESTION__BATCH_SIZE=50`.
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("FLEET")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize config: {}", e))?;

        config
            .fleet
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid fleet config: {}", e))?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
