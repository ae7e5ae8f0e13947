use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::session::StateStoreConfig;

pub const STATE_DB_ENV: &str = "KEEPSTAR_STATE_DB";
pub const OPERATION_TIMEOUT_ENV: &str = "KEEPSTAR_OPERATION_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StateStoreConfig,

    /// Default per-call deadline. Zero disables it.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    #[serde(default = "default_conversation_queue_capacity")]
    pub conversation_queue_capacity: usize,
}

fn default_operation_timeout_ms() -> u64 {
    5000
}

fn default_conversation_queue_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StateStoreConfig::default(),
            operation_timeout_ms: default_operation_timeout_ms(),
            conversation_queue_capacity: default_conversation_queue_capacity(),
        }
    }
}

impl EngineConfig {
    /// `~/.config/keepstar/engine.toml` (platform config dir).
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            Error::Configuration("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("keepstar").join("engine.toml"))
    }

    /// Load from `path` if given, else from the default location when present,
    /// else defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::config_path() {
                Ok(path) if path.exists() => match Self::from_file(&path) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!(
                            "Failed to load engine config at {:?}: {}. Using defaults.",
                            path,
                            e
                        );
                        Self::default()
                    }
                },
                _ => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse engine config {}: {e}",
                path.display()
            ))
        })
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup(STATE_DB_ENV).filter(|p| !p.is_empty()) {
            self.store = StateStoreConfig::sqlite(PathBuf::from(path));
        }
        if let Some(timeout) = lookup(OPERATION_TIMEOUT_ENV) {
            self.operation_timeout_ms = timeout.trim().parse().map_err(|e| {
                Error::Configuration(format!("Invalid {OPERATION_TIMEOUT_ENV}={timeout}: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }
}
