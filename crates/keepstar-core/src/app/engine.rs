use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::app::context::CallContext;
use crate::app::domain::conversation::ConversationMessage;
use crate::app::domain::delta::{Delta, DeltaInfo};
use crate::app::domain::formation::{PresetTemplateBuilder, TemplateBuilder};
use crate::app::domain::session::{
    ConversationQueue, ConversationQueueError, ConversationQueueStats, SessionLocks,
    SessionSummary, StateStore, StateStoreError,
};
use crate::app::domain::state::{
    SessionState, StateData, StateMeta, Template, ViewSnapshot, ViewState,
};
use crate::app::domain::types::{EntityRef, SessionId, Step, TurnId};
use crate::app::error::StateResult;
use crate::app::navigation::{BackResponse, ExpandResponse, Navigator};
use crate::app::reconstruct::{Reconstruction, Reconstructor};
use crate::app::rollback::{RollbackEngine, RollbackRequest, RollbackResponse};
use crate::config::EngineConfig;

/// Entry point for the orchestration layer.
///
/// Every operation takes a [`CallContext`]; its deadline and cancellation
/// token bound the whole operation, except navigation, which they only gate.
pub struct StateEngine {
    store: Arc<dyn StateStore>,
    navigator: Navigator,
    reconstructor: Reconstructor,
    rollback: RollbackEngine,
    conversation: ConversationQueue,
    default_timeout: Option<Duration>,
}

impl StateEngine {
    /// Must be called inside a tokio runtime (spawns the conversation worker).
    pub fn new(store: Arc<dyn StateStore>, config: &EngineConfig) -> Self {
        Self::with_template_builder(store, config, Arc::new(PresetTemplateBuilder))
    }

    pub fn with_template_builder(
        store: Arc<dyn StateStore>,
        config: &EngineConfig,
        templates: Arc<dyn TemplateBuilder>,
    ) -> Self {
        let locks = Arc::new(SessionLocks::new());
        Self {
            navigator: Navigator::new(store.clone(), templates, locks.clone()),
            reconstructor: Reconstructor::new(store.clone()),
            rollback: RollbackEngine::new(store.clone(), locks),
            conversation: ConversationQueue::spawn(
                store.clone(),
                config.conversation_queue_capacity,
            ),
            default_timeout: config.operation_timeout(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Context carrying the configured default deadline.
    pub fn context(&self) -> CallContext {
        match self.default_timeout {
            Some(timeout) => CallContext::with_timeout(timeout),
            None => CallContext::background(),
        }
    }

    pub async fn create_state(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
    ) -> StateResult<SessionState> {
        ctx.run("create_state", async {
            Ok(self.store.create_state(session_id).await?)
        })
        .await
    }

    pub async fn get_state(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
    ) -> StateResult<SessionState> {
        ctx.run("get_state", async {
            Ok(self.store.get_state(session_id).await?)
        })
        .await
    }

    /// Check-then-create. A concurrent creator winning the race is not an error.
    #[instrument(skip(self, ctx), fields(session_id = %session_id))]
    pub async fn get_or_create_state(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
    ) -> StateResult<SessionState> {
        ctx.run("get_or_create_state", async {
            match self.store.get_state(session_id).await {
                Ok(state) => return Ok(state),
                Err(StateStoreError::SessionNotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            match self.store.create_state(session_id).await {
                Ok(state) => {
                    debug!("Created session state");
                    Ok(state)
                }
                Err(StateStoreError::SessionAlreadyExists { .. }) => {
                    Ok(self.store.get_state(session_id).await?)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    #[instrument(skip(self, ctx, data, meta, info), fields(session_id = %session_id, count = meta.count))]
    pub async fn update_data(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        data: StateData,
        meta: StateMeta,
        info: DeltaInfo,
    ) -> StateResult<Step> {
        ctx.run("update_data", async {
            Ok(self.store.update_data(session_id, data, meta, info).await?)
        })
        .await
    }

    #[instrument(skip(self, ctx, template, info), fields(session_id = %session_id))]
    pub async fn update_template(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        template: Template,
        info: DeltaInfo,
    ) -> StateResult<Step> {
        ctx.run("update_template", async {
            Ok(self
                .store
                .update_template(session_id, template, info)
                .await?)
        })
        .await
    }

    #[instrument(skip(self, ctx, stack, info), fields(session_id = %session_id, view_mode = %view.mode()))]
    pub async fn update_view(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        view: ViewState,
        stack: Vec<ViewSnapshot>,
        info: DeltaInfo,
    ) -> StateResult<Step> {
        ctx.run("update_view", async {
            Ok(self
                .store
                .update_view(session_id, view, stack, info)
                .await?)
        })
        .await
    }

    pub async fn append_conversation(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        messages: Vec<ConversationMessage>,
    ) -> StateResult<()> {
        ctx.run("append_conversation", async {
            Ok(self
                .store
                .append_conversation(session_id, messages)
                .await?)
        })
        .await
    }

    /// Fire-and-forget variant of [`Self::append_conversation`].
    pub fn enqueue_conversation(
        &self,
        session_id: &SessionId,
        messages: Vec<ConversationMessage>,
    ) -> Result<(), ConversationQueueError> {
        self.conversation.enqueue(session_id, messages)
    }

    pub fn conversation_stats(&self) -> ConversationQueueStats {
        self.conversation.stats()
    }

    pub async fn add_delta(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        delta: Delta,
    ) -> StateResult<Step> {
        ctx.run("add_delta", async {
            Ok(self.store.add_delta(session_id, delta).await?)
        })
        .await
    }

    pub async fn get_deltas(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
    ) -> StateResult<Vec<Delta>> {
        ctx.run("get_deltas", async {
            Ok(self.store.get_deltas(session_id).await?)
        })
        .await
    }

    pub async fn get_deltas_since(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        from_step: Step,
    ) -> StateResult<Vec<Delta>> {
        ctx.run("get_deltas_since", async {
            Ok(self.store.get_deltas_since(session_id, from_step).await?)
        })
        .await
    }

    pub async fn get_deltas_until(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        to_step: Step,
    ) -> StateResult<Vec<Delta>> {
        ctx.run("get_deltas_until", async {
            Ok(self.store.get_deltas_until(session_id, to_step).await?)
        })
        .await
    }

    pub async fn push_view(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        snapshot: ViewSnapshot,
    ) -> StateResult<()> {
        ctx.run("push_view", async {
            Ok(self.store.push_view(session_id, snapshot).await?)
        })
        .await
    }

    pub async fn pop_view(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
    ) -> StateResult<Option<ViewSnapshot>> {
        ctx.run("pop_view", async {
            Ok(self.store.pop_view(session_id).await?)
        })
        .await
    }

    pub async fn get_view_stack(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
    ) -> StateResult<Vec<ViewSnapshot>> {
        ctx.run("get_view_stack", async {
            Ok(self.store.get_view_stack(session_id).await?)
        })
        .await
    }

    /// Push the current view and focus `entity`.
    ///
    /// The context gates the start only. Once the first write lands, the view
    /// and template writes both complete.
    pub async fn expand(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        entity: EntityRef,
        turn_id: Option<TurnId>,
    ) -> StateResult<ExpandResponse> {
        ctx.run_to_completion(
            "expand",
            self.navigator.expand(session_id, entity, turn_id),
        )
        .await
    }

    pub async fn back(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        turn_id: Option<TurnId>,
    ) -> StateResult<BackResponse> {
        ctx.run_to_completion("back", self.navigator.back(session_id, turn_id))
            .await
    }

    pub async fn reconstruct(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        to_step: Step,
    ) -> StateResult<Reconstruction> {
        ctx.run(
            "reconstruct",
            self.reconstructor.reconstruct(session_id, to_step),
        )
        .await
    }

    pub async fn rollback(
        &self,
        ctx: &CallContext,
        session_id: &SessionId,
        request: RollbackRequest,
    ) -> StateResult<RollbackResponse> {
        ctx.run("rollback", self.rollback.rollback(session_id, request))
            .await
    }

    pub async fn delete_state(&self, ctx: &CallContext, session_id: &SessionId) -> StateResult<()> {
        ctx.run("delete_state", async {
            Ok(self.store.delete_state(session_id).await?)
        })
        .await
    }

    pub async fn list_sessions(&self, ctx: &CallContext) -> StateResult<Vec<SessionSummary>> {
        ctx.run("list_sessions", async { Ok(self.store.list_sessions().await?) })
            .await
    }

    /// Drain pending conversation writes.
    pub async fn shutdown(&self) {
        self.conversation.shutdown().await;
    }
}
