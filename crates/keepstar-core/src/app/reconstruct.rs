use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::app::domain::delta::Delta;
use crate::app::domain::reduce::replay;
use crate::app::domain::session::StateStore;
use crate::app::domain::state::SessionState;
use crate::app::domain::types::{SessionId, Step};
use crate::app::error::StateResult;

#[derive(Debug, Clone, Serialize)]
pub struct Reconstruction {
    pub state: SessionState,
    /// Deltas that were applied, step-ascending.
    pub deltas: Vec<Delta>,
    pub step_now: Step,
    pub delta_count: usize,
}

/// Rebuilds a session's state as of a historical step by replaying its log.
#[derive(Clone)]
pub struct Reconstructor {
    store: Arc<dyn StateStore>,
}

impl Reconstructor {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn reconstruct(
        &self,
        session_id: &SessionId,
        to_step: Step,
    ) -> StateResult<Reconstruction> {
        let current = self.store.get_state(session_id).await?;
        let deltas = self.store.get_deltas_until(session_id, to_step).await?;

        let state = replay(current.empty_like(), &deltas);
        debug!(
            to_step,
            step_now = state.step,
            delta_count = deltas.len(),
            "Reconstructed state"
        );

        Ok(Reconstruction {
            step_now: state.step,
            delta_count: deltas.len(),
            state,
            deltas,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::domain::delta::{
        ActionType, DeltaAction, DeltaInfo, DeltaSource, DeltaType, Trigger,
    };
    use crate::app::domain::session::InMemoryStateStore;
    use crate::app::domain::state::{StateData, StateMeta, Template};
    use crate::test_utils::{seed_data, seed_meta};

    fn info(delta_type: DeltaType) -> DeltaInfo {
        DeltaInfo::new(
            Trigger::UserQuery,
            DeltaSource::Llm,
            "agent1",
            delta_type,
            DeltaAction::new(ActionType::Search),
        )
    }

    #[tokio::test]
    async fn reconstructs_meta_at_each_step() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let session_id = SessionId::new();
        store.create_state(&session_id).await.unwrap();

        store
            .update_data(&session_id, seed_data(), seed_meta(), info(DeltaType::Add))
            .await
            .unwrap();
        let mut template = Template::new();
        template.insert("formation".into(), serde_json::json!({"mode": "grid"}));
        store
            .update_template(&session_id, template.clone(), info(DeltaType::Update))
            .await
            .unwrap();
        store
            .update_data(
                &session_id,
                StateData::default(),
                StateMeta::default(),
                info(DeltaType::Remove),
            )
            .await
            .unwrap();

        let reconstructor = Reconstructor::new(store.clone());

        let at0 = reconstructor.reconstruct(&session_id, 0).await.unwrap();
        assert_eq!(at0.step_now, 0);
        assert_eq!(at0.delta_count, 0);
        assert_eq!(at0.state.current.meta, StateMeta::default());

        let at2 = reconstructor.reconstruct(&session_id, 2).await.unwrap();
        assert_eq!(at2.step_now, 2);
        assert_eq!(at2.state.current.meta.count, 4);
        assert_eq!(at2.state.current.template, Some(template));
        // Data is never replayed.
        assert!(at2.state.current.data.is_empty());

        let at3 = reconstructor.reconstruct(&session_id, 3).await.unwrap();
        assert_eq!(at3.state.current.meta.count, 0);
    }

    #[tokio::test]
    async fn missing_session_is_reported() {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let err = Reconstructor::new(store)
            .reconstruct(&SessionId::new(), 1)
            .await
            .unwrap_err();
        assert!(err.is_session_not_found());
    }
}
