//! Engine initialization
//!
//! Converts the server configuration into a [`FleetEngineBuilder`] and picks
//! the telemetry store.

use crate::config::ServerConfig;
use anyhow::Result;
use fleet_sdk::{FleetEngine, FleetEngineBuilder};
use tracing::{info, warn};

/// Build and start the engine
pub async fn init_engine(config: &ServerConfig) -> Result<FleetEngine> {
    let mut builder = FleetEngineBuilder::new().with_config(config.fleet.clone());

    if let Some(path) = &config.partners_file {
        builder = builder.with_partners_file(path);
    }

    // Try to get database URL from config first, then fall back to environment variable
    let database_url = config
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());
    builder = with_store(builder, database_url, config.database_max_connections).await?;

    let engine = builder.build().await?;
    engine.start().await?;
    info!("Fleet engine started");
    Ok(engine)
}

#[cfg(feature = "sqlx")]
async fn with_store(
    builder: FleetEngineBuilder,
    database_url: Option<String>,
    max_connections: u32,
) -> Result<FleetEngineBuilder> {
    use fleet_runtime::storage::PostgresStore;
    use std::sync::Arc;

    match database_url {
        Some(url) => {
            let store = PostgresStore::connect(&url, max_connections).await?;
            info!("Telemetry store connected");
            Ok(builder.with_store(Arc::new(store)))
        }
        None => {
            warn!("Database URL not configured, telemetry will be kept in memory");
            Ok(builder)
        }
    }
}

#[cfg(not(feature = "sqlx"))]
async fn with_store(
    builder: FleetEngineBuilder,
    database_url: Option<String>,
    _max_connections: u32,
) -> Result<FleetEngineBuilder> {
    if database_url.is_some() {
        warn!("Database URL ignored, built without the sqlx feature; telemetry will be kept in memory");
    }
    Ok(builder)
}
