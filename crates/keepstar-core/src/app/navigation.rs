//! Expand/back navigation over the View zone and its snapshot stack.
//!
//! Both transitions commit the complete stack through `update_view`, so the
//! stack and the view it belongs to can never diverge, and then rewrite the
//! Template zone. The per-session lock keeps concurrent expand/back calls for
//! one session from interleaving between those two writes.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::app::domain::delta::{
    ActionType, DeltaAction, DeltaInfo, DeltaSource, DeltaType, Trigger,
};
use crate::app::domain::formation::TemplateBuilder;
use crate::app::domain::session::{SessionLocks, StateStore};
use crate::app::domain::state::{LayoutMode, Template, ViewMode, ViewSnapshot, ViewState};
use crate::app::domain::types::{EntityRef, SessionId, TurnId};
use crate::app::error::{StateError, StateResult};

pub const EXPAND_ACTOR: &str = "user_expand";
pub const BACK_ACTOR: &str = "user_back";

#[derive(Debug, Clone, Serialize)]
pub struct ExpandResponse {
    pub template: Template,
    pub view_mode: ViewMode,
    pub focused: EntityRef,
    pub stack_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackResponse {
    pub template: Option<Template>,
    pub view_mode: ViewMode,
    pub focused: Option<EntityRef>,
    pub stack_size: usize,
    pub can_go_back: bool,
}

#[derive(Clone)]
pub struct Navigator {
    store: Arc<dyn StateStore>,
    templates: Arc<dyn TemplateBuilder>,
    locks: Arc<SessionLocks>,
}

fn navigation_info(actor: &str, delta_type: DeltaType, turn_id: Option<TurnId>) -> DeltaInfo {
    DeltaInfo {
        turn_id,
        trigger: Trigger::WidgetAction,
        source: DeltaSource::User,
        actor_id: actor.to_string(),
        delta_type,
        action: DeltaAction::new(ActionType::Navigate),
    }
}

impl Navigator {
    pub fn new(
        store: Arc<dyn StateStore>,
        templates: Arc<dyn TemplateBuilder>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self {
            store,
            templates,
            locks,
        }
    }

    /// Push the current view and focus `entity` in a detail view.
    #[instrument(skip(self, turn_id), fields(session_id = %session_id, entity = %entity))]
    pub async fn expand(
        &self,
        session_id: &SessionId,
        entity: EntityRef,
        turn_id: Option<TurnId>,
    ) -> StateResult<ExpandResponse> {
        let _guard = self.locks.acquire(session_id).await?;
        let state = self.store.get_state(session_id).await?;

        let Some(found) = state.current.data.find(&entity) else {
            return Err(StateError::entity_not_found(
                entity.entity_type,
                entity.id.clone(),
            ));
        };
        let template = self.templates.detail(found);

        let mut stack = state.view_stack.clone();
        stack.push(ViewSnapshot::capture(&state));
        let stack_size = stack.len();

        let view = ViewState::Detail(entity.clone());
        self.store
            .update_view(
                session_id,
                view.clone(),
                stack,
                navigation_info(EXPAND_ACTOR, DeltaType::Push, turn_id.clone()),
            )
            .await?;
        self.store
            .update_template(
                session_id,
                template.clone(),
                navigation_info(EXPAND_ACTOR, DeltaType::Update, turn_id),
            )
            .await?;

        debug!(stack_size, "Expanded to detail view");
        Ok(ExpandResponse {
            template,
            view_mode: view.mode(),
            focused: entity,
            stack_size,
        })
    }

    /// Restore the most recent snapshot. An empty stack is a successful no-op.
    #[instrument(skip(self, turn_id), fields(session_id = %session_id))]
    pub async fn back(
        &self,
        session_id: &SessionId,
        turn_id: Option<TurnId>,
    ) -> StateResult<BackResponse> {
        let _guard = self.locks.acquire(session_id).await?;
        let state = self.store.get_state(session_id).await?;

        let mut stack = state.view_stack.clone();
        let Some(snapshot) = stack.pop() else {
            debug!("Back on empty stack");
            return Ok(BackResponse {
                template: None,
                view_mode: state.view.mode(),
                focused: state.view.focused().cloned(),
                stack_size: 0,
                can_go_back: false,
            });
        };
        let stack_size = stack.len();

        let view = snapshot.view;
        self.store
            .update_view(
                session_id,
                view.clone(),
                stack,
                navigation_info(BACK_ACTOR, DeltaType::Pop, turn_id.clone()),
            )
            .await?;

        let layout = match &view {
            ViewState::Browsing(layout) => *layout,
            ViewState::Detail(_) => LayoutMode::Grid,
        };
        let template = self.templates.browse(&state.current.data, layout);
        self.store
            .update_template(
                session_id,
                template.clone(),
                navigation_info(BACK_ACTOR, DeltaType::Update, turn_id),
            )
            .await?;

        debug!(stack_size, view_mode = %view.mode(), "Restored previous view");
        Ok(BackResponse {
            template: Some(template),
            view_mode: view.mode(),
            focused: view.focused().cloned(),
            stack_size,
            can_go_back: stack_size > 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::domain::formation::PresetTemplateBuilder;
    use crate::app::domain::session::InMemoryStateStore;
    use crate::app::domain::types::EntityType;
    use crate::test_utils::seed_session;

    async fn navigator() -> (Navigator, Arc<dyn StateStore>, SessionId) {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        let session_id = seed_session(store.as_ref()).await.unwrap();
        let navigator = Navigator::new(
            store.clone(),
            Arc::new(PresetTemplateBuilder),
            Arc::new(SessionLocks::new()),
        );
        (navigator, store, session_id)
    }

    #[tokio::test]
    async fn expand_unknown_entity_fails_without_writes() {
        let (navigator, store, session_id) = navigator().await;
        let before = store.get_deltas(&session_id).await.unwrap().len();

        let err = navigator
            .expand(&session_id, EntityRef::product("nope"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StateError::EntityNotFound {
                entity_type: EntityType::Product,
                ..
            }
        ));
        assert_eq!(store.get_deltas(&session_id).await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn expand_writes_push_then_template() {
        let (navigator, store, session_id) = navigator().await;

        let response = navigator
            .expand(
                &session_id,
                EntityRef::product("prod-3"),
                Some(TurnId::from_string("turn-9")),
            )
            .await
            .unwrap();
        assert_eq!(response.view_mode, ViewMode::Detail);
        assert_eq!(response.stack_size, 1);
        assert_eq!(response.template["formation"]["preset"], "product_detail");

        let deltas = store.get_deltas_since(&session_id, 2).await.unwrap();
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].delta_type, DeltaType::Push);
        assert_eq!(deltas[0].path, "view");
        assert_eq!(deltas[0].actor_id, EXPAND_ACTOR);
        assert_eq!(deltas[1].delta_type, DeltaType::Update);
        assert_eq!(deltas[1].path, "template");
        assert!(
            deltas
                .iter()
                .all(|d| d.turn_id == Some(TurnId::from_string("turn-9")))
        );

        let state = store.get_state(&session_id).await.unwrap();
        assert_eq!(state.view_stack[0].refs.len(), 4);
        assert_eq!(state.view_stack[0].step, 1);
    }

    #[tokio::test]
    async fn back_on_empty_stack_is_a_noop() {
        let (navigator, store, session_id) = navigator().await;
        let before = store.get_state(&session_id).await.unwrap();

        let response = navigator.back(&session_id, None).await.unwrap();
        assert!(!response.can_go_back);
        assert_eq!(response.stack_size, 0);
        assert!(response.template.is_none());
        assert_eq!(response.view_mode, ViewMode::Grid);

        let after = store.get_state(&session_id).await.unwrap();
        assert_eq!(after.step, before.step);
        assert_eq!(after.current.template, before.current.template);
    }
}
