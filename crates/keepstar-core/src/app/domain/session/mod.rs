pub mod conversation_queue;
pub mod locks;
pub mod sqlite_state_store;
pub mod state_store;
mod zone;

pub use conversation_queue::{ConversationQueue, ConversationQueueError, ConversationQueueStats};
pub use locks::{SessionGuard, SessionLocks};
pub use sqlite_state_store::SqliteStateStore;
pub use state_store::{InMemoryStateStore, SessionSummary, StateStore, StateStoreError};
