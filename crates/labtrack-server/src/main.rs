//! Labtrack Server Binary
//!
//! Standalone record store service.
//!
//! Configuration comes from the TOML file named by `LABTRACK_CONFIG` (if
//! set), then `LABTRACK_ADDR` and `LABTRACK_DATA_FILE` override the bind
//! address and switch storage to a JSON file.

use std::sync::Arc;

use labtrack_core::{ServerConfig, StorageConfig};
use labtrack_server::{serve, AppState};
use tracing_subscriber::EnvFilter;

fn load_config() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = match std::env::var("LABTRACK_CONFIG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)?;
            tracing::info!("Loaded configuration from {}", path);
            ServerConfig::from_toml(&raw)?
        }
        Err(_) => ServerConfig::default(),
    };

    if let Ok(addr) = std::env::var("LABTRACK_ADDR") {
        config.addr = addr;
    }
    if let Ok(path) = std::env::var("LABTRACK_DATA_FILE") {
        config.storage = StorageConfig::File { path: path.into() };
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    let state = Arc::new(AppState::from_config(&config)?);

    serve(&config.addr, state).await
}
