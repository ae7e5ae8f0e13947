pub mod store_config;

pub use store_config::{StateStoreConfig, open_state_store};
