use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::app::domain::delta::{
    ActionType, Delta, DeltaAction, DeltaInfo, DeltaSource, DeltaType, Trigger, ViewChange, paths,
};
use crate::app::domain::session::{SessionLocks, StateStore};
use crate::app::domain::state::SessionState;
use crate::app::domain::types::{SessionId, Step};
use crate::app::error::{StateError, StateResult};
use crate::app::reconstruct::Reconstructor;

#[derive(Debug, Clone)]
pub struct RollbackRequest {
    pub to_step: Step,
    pub source: DeltaSource,
    pub actor_id: String,
}

impl RollbackRequest {
    pub fn to(to_step: Step) -> Self {
        Self {
            to_step,
            source: DeltaSource::System,
            actor_id: "rollback".to_string(),
        }
    }

    pub fn by(mut self, source: DeltaSource, actor_id: impl Into<String>) -> Self {
        self.source = source;
        self.actor_id = actor_id.into();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackResponse {
    pub state: SessionState,
    pub rolled_back: Step,
    pub from_step: Step,
    pub to_step: Step,
    pub rollback_delta: Delta,
}

/// Moves "current" back to an earlier step by appending a rollback delta.
#[derive(Clone)]
pub struct RollbackEngine {
    store: Arc<dyn StateStore>,
    reconstructor: Reconstructor,
    locks: Arc<SessionLocks>,
}

impl RollbackEngine {
    pub fn new(store: Arc<dyn StateStore>, locks: Arc<SessionLocks>) -> Self {
        Self {
            reconstructor: Reconstructor::new(store.clone()),
            store,
            locks,
        }
    }

    #[instrument(skip(self, request), fields(session_id = %session_id, to_step = request.to_step))]
    pub async fn rollback(
        &self,
        session_id: &SessionId,
        request: RollbackRequest,
    ) -> StateResult<RollbackResponse> {
        let _guard = self.locks.acquire(session_id).await?;

        let current = self.store.get_state(session_id).await?;
        let from_step = current.step;
        let to_step = request.to_step;
        if to_step >= from_step {
            return Err(StateError::InvalidRollbackTarget {
                current_step: from_step,
                to_step,
            });
        }

        let reconstruction = self.reconstructor.reconstruct(session_id, to_step).await?;

        let mut state = reconstruction.state;
        state.id = current.id.clone();
        state.created_at = current.created_at;
        state.conversation_history = current.conversation_history;

        let action = DeltaAction::new(ActionType::Rollback)
            .with_param("from_step", from_step)
            .with_param("to_step", to_step);
        let delta = DeltaInfo::new(
            Trigger::System,
            request.source,
            request.actor_id,
            DeltaType::Rollback,
            action,
        )
        .into_delta(paths::STATE, state.current.meta.clone())
        .with_template(state.current.template.clone())
        .with_view(ViewChange {
            view: state.view.clone(),
            stack: state.view_stack.clone(),
        });

        let step = self
            .store
            .restore_state(&state, delta.clone(), from_step)
            .await?;

        let mut rollback_delta = delta;
        rollback_delta.step = step;
        let state = self.store.get_state(session_id).await?;

        info!(from_step, to_step, step, "Rolled back session state");

        Ok(RollbackResponse {
            state,
            rolled_back: from_step - to_step,
            from_step,
            to_step,
            rollback_delta,
        })
    }
}
