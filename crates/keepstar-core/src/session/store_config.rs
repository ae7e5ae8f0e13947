use crate::app::domain::session::{InMemoryStateStore, SqliteStateStore, StateStore};
use crate::error::Result;
use crate::utils::session::create_state_store_path;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Configuration for state store creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// SQLite database store
    Sqlite {
        /// Path to the database file
        path: PathBuf,
    },
    /// Process-local store, lost on exit
    Memory,
}

impl StateStoreConfig {
    pub fn sqlite(path: PathBuf) -> Self {
        Self::Sqlite { path }
    }

    /// `~/.keepstar/state.db`
    pub fn default_sqlite() -> Result<Self> {
        Ok(Self::sqlite(create_state_store_path()?))
    }
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self::default_sqlite().unwrap_or_else(|_| Self::sqlite(PathBuf::from("./state.db")))
    }
}

/// Select and open the concrete adapter. Call once at startup.
pub async fn open_state_store(config: &StateStoreConfig) -> Result<Arc<dyn StateStore>> {
    match config {
        StateStoreConfig::Sqlite { path } => {
            info!(path = %path.display(), "Opening SQLite state store");
            Ok(Arc::new(SqliteStateStore::new(path).await?))
        }
        StateStoreConfig::Memory => {
            info!("Using in-memory state store");
            Ok(Arc::new(InMemoryStateStore::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::domain::types::SessionId;

    #[test]
    fn test_default_sqlite_config() {
        let config = StateStoreConfig::default_sqlite().unwrap();

        let StateStoreConfig::Sqlite { path } = config else {
            unreachable!("expected SQLite config")
        };
        assert!(path.to_string_lossy().contains(".keepstar"));
        assert!(path.to_string_lossy().ends_with("state.db"));
    }

    #[test]
    fn test_config_is_tagged() {
        let config: StateStoreConfig = toml::from_str("type = \"memory\"").unwrap();
        assert_eq!(config, StateStoreConfig::Memory);

        let config: StateStoreConfig =
            toml::from_str("type = \"sqlite\"\npath = \"/tmp/x.db\"").unwrap();
        assert_eq!(config, StateStoreConfig::sqlite(PathBuf::from("/tmp/x.db")));
    }

    #[tokio::test]
    async fn test_open_sqlite_store_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = StateStoreConfig::sqlite(dir.path().join("state.db"));

        let store = open_state_store(&config).await.unwrap();
        let session_id = SessionId::new();
        store.create_state(&session_id).await.unwrap();
        assert_eq!(store.list_sessions().await.unwrap().len(), 1);
    }
}
