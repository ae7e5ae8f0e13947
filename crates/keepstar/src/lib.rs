pub mod cli;
pub mod commands;

pub use keepstar_core::{app, config, session, utils};

use eyre::{Result, eyre};
use keepstar_core::{EngineConfig, StateEngine, StateStoreConfig, open_state_store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Resolve configuration and open the engine over the configured store.
///
/// `state_db` wins over both the config file and the environment.
pub async fn open_engine(
    config_path: Option<&Path>,
    state_db: Option<PathBuf>,
) -> Result<Arc<StateEngine>> {
    let mut config = EngineConfig::load(config_path)
        .map_err(|e| eyre!("Failed to load engine config: {}", e))?;
    if let Some(path) = state_db {
        config.store = StateStoreConfig::sqlite(path);
    }

    debug!(store = ?config.store, "Opening state store");

    let store = open_state_store(&config.store)
        .await
        .map_err(|e| eyre!("Failed to open state store: {}", e))?;
    Ok(Arc::new(StateEngine::new(store, &config)))
}
