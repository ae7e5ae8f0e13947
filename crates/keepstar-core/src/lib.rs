// Session state engine: zone-partitioned, delta-logged session state with
// navigation, reconstruction and rollback.

pub mod app;
pub mod config;
pub mod error;
pub mod session;
pub mod test_utils;
pub mod utils;

pub use app::domain::session::{InMemoryStateStore, SqliteStateStore, StateStore, StateStoreError};
pub use app::{CallContext, StateEngine, StateError};
pub use config::EngineConfig;
pub use session::{StateStoreConfig, open_state_store};
