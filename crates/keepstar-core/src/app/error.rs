use thiserror::Error;

use crate::app::domain::session::StateStoreError;
use crate::app::domain::types::{EntityType, Step};

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] StateStoreError),

    #[error("Entity not found: {entity_type}:{entity_id}")]
    EntityNotFound {
        entity_type: EntityType,
        entity_id: String,
    },

    #[error("Invalid rollback target: step {to_step} is not before current step {current_step}")]
    InvalidRollbackTarget { current_step: Step, to_step: Step },

    #[error("Deadline exceeded during {operation}")]
    DeadlineExceeded { operation: String },

    #[error("Cancelled during {operation}")]
    Cancelled { operation: String },
}

impl StateError {
    /// Orchestration creates the state lazily on this and retries.
    pub fn is_session_not_found(&self) -> bool {
        matches!(
            self,
            StateError::Store(StateStoreError::SessionNotFound { .. })
        )
    }

    pub fn entity_not_found(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

pub type StateResult<T> = std::result::Result<T, StateError>;
