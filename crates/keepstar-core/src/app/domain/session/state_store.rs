use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::zone;
use crate::app::domain::conversation::ConversationMessage;
use crate::app::domain::delta::{Delta, DeltaInfo};
use crate::app::domain::state::{
    SessionState, StateData, StateMeta, Template, ViewSnapshot, ViewState,
};
use crate::app::domain::types::{SessionId, Step, Timestamp};

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session already exists: {session_id}")]
    SessionAlreadyExists { session_id: String },

    #[error("Write conflict on session {session_id} at step {step}")]
    WriteConflict { session_id: String, step: Step },

    #[error("Invalid view: {message}")]
    InvalidView { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Migration error: {message}")]
    Migration { message: String },

    #[error("In-memory store lock poisoned: {message}")]
    LockPoisoned { message: String },
}

impl StateStoreError {
    pub fn session_not_found(session_id: &SessionId) -> Self {
        Self::SessionNotFound {
            session_id: session_id.to_string(),
        }
    }

    pub fn already_exists(session_id: &SessionId) -> Self {
        Self::SessionAlreadyExists {
            session_id: session_id.to_string(),
        }
    }

    pub fn write_conflict(session_id: &SessionId, step: Step) -> Self {
        Self::WriteConflict {
            session_id: session_id.to_string(),
            step,
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn lock_poisoned(message: impl Into<String>) -> Self {
        Self::LockPoisoned {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub step: Step,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Persistence port for session state and its delta log.
///
/// Every zone write (`update_data`, `update_template`, `update_view`) and
/// `add_delta` assigns the next step and commits the zone mutation together
/// with the delta, or neither. Implementations serialize writers per session.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn create_state(&self, session_id: &SessionId) -> Result<SessionState, StateStoreError>;

    async fn get_state(&self, session_id: &SessionId) -> Result<SessionState, StateStoreError>;

    /// Overwrite the whole materialized state without recording a delta.
    ///
    /// `state.step` must equal the head of the delta log, else `WriteConflict`.
    async fn update_state(&self, state: &SessionState) -> Result<(), StateStoreError>;

    /// Append `delta` and overwrite the materialized state in one unit.
    ///
    /// Fails with `WriteConflict` if the session moved past `expected_step`.
    /// The stored state and delta are both stamped with the assigned step.
    async fn restore_state(
        &self,
        state: &SessionState,
        delta: Delta,
        expected_step: Step,
    ) -> Result<Step, StateStoreError>;

    async fn delete_state(&self, session_id: &SessionId) -> Result<(), StateStoreError>;

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StateStoreError>;

    async fn update_data(
        &self,
        session_id: &SessionId,
        data: StateData,
        meta: StateMeta,
        info: DeltaInfo,
    ) -> Result<Step, StateStoreError>;

    async fn update_template(
        &self,
        session_id: &SessionId,
        template: Template,
        info: DeltaInfo,
    ) -> Result<Step, StateStoreError>;

    async fn update_view(
        &self,
        session_id: &SessionId,
        view: ViewState,
        stack: Vec<ViewSnapshot>,
        info: DeltaInfo,
    ) -> Result<Step, StateStoreError>;

    /// Extend the conversation buffer. No delta, no step.
    async fn append_conversation(
        &self,
        session_id: &SessionId,
        messages: Vec<ConversationMessage>,
    ) -> Result<(), StateStoreError>;

    /// Append a raw delta. `delta.step` is ignored and replaced.
    async fn add_delta(&self, session_id: &SessionId, delta: Delta)
    -> Result<Step, StateStoreError>;

    async fn get_deltas(&self, session_id: &SessionId) -> Result<Vec<Delta>, StateStoreError>;

    /// Deltas with `step >= from_step`.
    async fn get_deltas_since(
        &self,
        session_id: &SessionId,
        from_step: Step,
    ) -> Result<Vec<Delta>, StateStoreError>;

    /// Deltas with `step <= to_step`.
    async fn get_deltas_until(
        &self,
        session_id: &SessionId,
        to_step: Step,
    ) -> Result<Vec<Delta>, StateStoreError>;

    async fn push_view(
        &self,
        session_id: &SessionId,
        snapshot: ViewSnapshot,
    ) -> Result<(), StateStoreError>;

    async fn pop_view(&self, session_id: &SessionId)
    -> Result<Option<ViewSnapshot>, StateStoreError>;

    async fn get_view_stack(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ViewSnapshot>, StateStoreError>;
}

struct SessionRecord {
    state: SessionState,
    deltas: Vec<Delta>,
}

impl SessionRecord {
    fn next_step(&self) -> Step {
        self.deltas.last().map_or(0, |d| d.step) + 1
    }
}

pub struct InMemoryStateStore {
    sessions: std::sync::RwLock<HashMap<SessionId, SessionRecord>>,
    #[cfg(test)]
    fail_next_append: std::sync::atomic::AtomicBool,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            sessions: std::sync::RwLock::new(HashMap::new()),
            #[cfg(test)]
            fail_next_append: std::sync::atomic::AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    fn fail_next_append(&self) {
        self.fail_next_append
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn check_append(&self) -> Result<(), StateStoreError> {
        #[cfg(test)]
        if self
            .fail_next_append
            .swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            return Err(StateStoreError::database("injected delta append failure"));
        }
        Ok(())
    }

    /// Run one zone write against a copy of the state and swap it in only
    /// once the delta has been appended. The write lock is held throughout.
    fn commit<F>(&self, session_id: &SessionId, mutate: F) -> Result<Step, StateStoreError>
    where
        F: FnOnce(&mut SessionState) -> Delta,
    {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| StateStoreError::lock_poisoned("sessions"))?;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| StateStoreError::session_not_found(session_id))?;

        let step = record.next_step();
        let mut next = record.state.clone();
        let mut delta = mutate(&mut next);
        zone::seal(&mut next, &mut delta, step);

        self.check_append()?;
        record.deltas.push(delta);
        record.state = next;
        Ok(step)
    }

    fn read_deltas<P>(&self, session_id: &SessionId, keep: P) -> Result<Vec<Delta>, StateStoreError>
    where
        P: Fn(&Delta) -> bool,
    {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| StateStoreError::lock_poisoned("sessions"))?;
        Ok(sessions
            .get(session_id)
            .map(|r| r.deltas.iter().filter(|d| keep(d)).cloned().collect())
            .unwrap_or_default())
    }

    fn with_state_mut<T>(
        &self,
        session_id: &SessionId,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> Result<T, StateStoreError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| StateStoreError::lock_poisoned("sessions"))?;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| StateStoreError::session_not_found(session_id))?;
        Ok(f(&mut record.state))
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn create_state(&self, session_id: &SessionId) -> Result<SessionState, StateStoreError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| StateStoreError::lock_poisoned("sessions"))?;
        if sessions.contains_key(session_id) {
            return Err(StateStoreError::already_exists(session_id));
        }
        let state = SessionState::new(session_id.clone());
        sessions.insert(
            session_id.clone(),
            SessionRecord {
                state: state.clone(),
                deltas: Vec::new(),
            },
        );
        Ok(state)
    }

    async fn get_state(&self, session_id: &SessionId) -> Result<SessionState, StateStoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| StateStoreError::lock_poisoned("sessions"))?;
        sessions
            .get(session_id)
            .map(|r| r.state.clone())
            .ok_or_else(|| StateStoreError::session_not_found(session_id))
    }

    async fn update_state(&self, state: &SessionState) -> Result<(), StateStoreError> {
        let session_id = &state.session_id;
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| StateStoreError::lock_poisoned("sessions"))?;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| StateStoreError::session_not_found(session_id))?;

        let head = record.next_step() - 1;
        if state.step != head {
            return Err(StateStoreError::write_conflict(session_id, head));
        }
        record.state = state.clone();
        Ok(())
    }

    async fn restore_state(
        &self,
        state: &SessionState,
        delta: Delta,
        expected_step: Step,
    ) -> Result<Step, StateStoreError> {
        let session_id = &state.session_id;
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| StateStoreError::lock_poisoned("sessions"))?;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| StateStoreError::session_not_found(session_id))?;

        if record.state.step != expected_step {
            return Err(StateStoreError::write_conflict(session_id, record.state.step));
        }

        let step = record.next_step();
        let mut next = state.clone();
        let mut delta = delta;
        zone::seal(&mut next, &mut delta, step);

        self.check_append()?;
        record.deltas.push(delta);
        record.state = next;
        Ok(step)
    }

    async fn delete_state(&self, session_id: &SessionId) -> Result<(), StateStoreError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| StateStoreError::lock_poisoned("sessions"))?;
        sessions.remove(session_id);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StateStoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| StateStoreError::lock_poisoned("sessions"))?;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .map(|r| SessionSummary {
                session_id: r.state.session_id.clone(),
                step: r.state.step,
                created_at: r.state.created_at,
                updated_at: r.state.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn update_data(
        &self,
        session_id: &SessionId,
        data: StateData,
        meta: StateMeta,
        info: DeltaInfo,
    ) -> Result<Step, StateStoreError> {
        self.commit(session_id, |state| zone::write_data(state, data, meta, info))
    }

    async fn update_template(
        &self,
        session_id: &SessionId,
        template: Template,
        info: DeltaInfo,
    ) -> Result<Step, StateStoreError> {
        self.commit(session_id, |state| {
            zone::write_template(state, template, info)
        })
    }

    async fn update_view(
        &self,
        session_id: &SessionId,
        view: ViewState,
        stack: Vec<ViewSnapshot>,
        info: DeltaInfo,
    ) -> Result<Step, StateStoreError> {
        self.commit(session_id, |state| {
            zone::write_view(state, view, stack, info)
        })
    }

    async fn append_conversation(
        &self,
        session_id: &SessionId,
        messages: Vec<ConversationMessage>,
    ) -> Result<(), StateStoreError> {
        self.with_state_mut(session_id, |state| {
            state.conversation_history.extend(messages);
        })
    }

    async fn add_delta(
        &self,
        session_id: &SessionId,
        delta: Delta,
    ) -> Result<Step, StateStoreError> {
        self.commit(session_id, |_| delta)
    }

    async fn get_deltas(&self, session_id: &SessionId) -> Result<Vec<Delta>, StateStoreError> {
        self.read_deltas(session_id, |_| true)
    }

    async fn get_deltas_since(
        &self,
        session_id: &SessionId,
        from_step: Step,
    ) -> Result<Vec<Delta>, StateStoreError> {
        self.read_deltas(session_id, |d| d.step >= from_step)
    }

    async fn get_deltas_until(
        &self,
        session_id: &SessionId,
        to_step: Step,
    ) -> Result<Vec<Delta>, StateStoreError> {
        self.read_deltas(session_id, |d| d.step <= to_step)
    }

    async fn push_view(
        &self,
        session_id: &SessionId,
        snapshot: ViewSnapshot,
    ) -> Result<(), StateStoreError> {
        self.with_state_mut(session_id, |state| state.view_stack.push(snapshot))
    }

    async fn pop_view(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<ViewSnapshot>, StateStoreError> {
        self.with_state_mut(session_id, |state| state.view_stack.pop())
    }

    async fn get_view_stack(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ViewSnapshot>, StateStoreError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| StateStoreError::lock_poisoned("sessions"))?;
        sessions
            .get(session_id)
            .map(|r| r.state.view_stack.clone())
            .ok_or_else(|| StateStoreError::session_not_found(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::domain::conversation::ConversationMessage;
    use crate::app::domain::delta::{ActionType, DeltaAction, DeltaSource, DeltaType, Trigger};
    use crate::app::domain::state::LayoutMode;
    use crate::app::domain::types::EntityRef;
    use crate::test_utils::{seed_data, seed_meta};

    fn info(delta_type: DeltaType, action: ActionType) -> DeltaInfo {
        DeltaInfo::new(
            Trigger::UserQuery,
            DeltaSource::Llm,
            "agent1",
            delta_type,
            DeltaAction::new(action),
        )
    }

    #[tokio::test]
    async fn test_in_memory_create_is_not_idempotent() {
        let store = InMemoryStateStore::new();
        let session_id = SessionId::new();

        let state = store.create_state(&session_id).await.unwrap();
        assert_eq!(state.step, 0);

        let err = store.create_state(&session_id).await.unwrap_err();
        assert!(matches!(err, StateStoreError::SessionAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_in_memory_zone_write_requires_state() {
        let store = InMemoryStateStore::new();
        let err = store
            .update_template(
                &SessionId::new(),
                Template::new(),
                info(DeltaType::Update, ActionType::Layout),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_in_memory_steps_are_gap_free() {
        let store = InMemoryStateStore::new();
        let session_id = SessionId::new();
        store.create_state(&session_id).await.unwrap();

        let mut delta = info(DeltaType::Add, ActionType::Search)
            .into_delta("data.products", StateMeta::default());
        delta.step = 99;

        let s1 = store.add_delta(&session_id, delta).await.unwrap();
        let s2 = store
            .update_data(
                &session_id,
                seed_data(),
                seed_meta(),
                info(DeltaType::Add, ActionType::Search),
            )
            .await
            .unwrap();
        let s3 = store
            .update_template(
                &session_id,
                Template::new(),
                info(DeltaType::Update, ActionType::Layout),
            )
            .await
            .unwrap();

        assert_eq!((s1, s2, s3), (1, 2, 3));
        let state = store.get_state(&session_id).await.unwrap();
        assert_eq!(state.step, 3);
        let steps: Vec<Step> = store
            .get_deltas(&session_id)
            .await
            .unwrap()
            .iter()
            .map(|d| d.step)
            .collect();
        assert_eq!(steps, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_in_memory_failed_append_leaves_zone_untouched() {
        let store = InMemoryStateStore::new();
        let session_id = SessionId::new();
        store.create_state(&session_id).await.unwrap();

        store.fail_next_append();
        let result = store
            .update_data(
                &session_id,
                seed_data(),
                seed_meta(),
                info(DeltaType::Add, ActionType::Search),
            )
            .await;
        assert!(result.is_err());

        let state = store.get_state(&session_id).await.unwrap();
        assert!(state.current.data.products.is_empty());
        assert_eq!(state.step, 0);
        assert!(store.get_deltas(&session_id).await.unwrap().is_empty());

        // The next write goes through and takes step 1.
        let step = store
            .update_data(
                &session_id,
                seed_data(),
                seed_meta(),
                info(DeltaType::Add, ActionType::Search),
            )
            .await
            .unwrap();
        assert_eq!(step, 1);
    }

    #[tokio::test]
    async fn test_in_memory_delta_ranges() {
        let store = InMemoryStateStore::new();
        let session_id = SessionId::new();
        store.create_state(&session_id).await.unwrap();
        for _ in 0..5 {
            store
                .update_template(
                    &session_id,
                    Template::new(),
                    info(DeltaType::Update, ActionType::Layout),
                )
                .await
                .unwrap();
        }

        let since = store.get_deltas_since(&session_id, 4).await.unwrap();
        assert_eq!(since.iter().map(|d| d.step).collect::<Vec<_>>(), vec![4, 5]);

        let until = store.get_deltas_until(&session_id, 2).await.unwrap();
        assert_eq!(until.iter().map(|d| d.step).collect::<Vec<_>>(), vec![1, 2]);

        assert!(
            store
                .get_deltas(&SessionId::new())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_in_memory_raw_stack_ops_have_no_delta() {
        let store = InMemoryStateStore::new();
        let session_id = SessionId::new();
        let state = store.create_state(&session_id).await.unwrap();

        assert_eq!(store.pop_view(&session_id).await.unwrap(), None);

        let snapshot = ViewSnapshot::capture(&state);
        store.push_view(&session_id, snapshot.clone()).await.unwrap();
        assert_eq!(store.get_view_stack(&session_id).await.unwrap().len(), 1);
        assert_eq!(store.pop_view(&session_id).await.unwrap(), Some(snapshot));

        assert!(store.get_deltas(&session_id).await.unwrap().is_empty());
        assert_eq!(store.get_state(&session_id).await.unwrap().step, 0);
    }

    #[tokio::test]
    async fn test_in_memory_view_write_records_payload() {
        let store = InMemoryStateStore::new();
        let session_id = SessionId::new();
        let state = store.create_state(&session_id).await.unwrap();

        let stack = vec![ViewSnapshot::capture(&state)];
        store
            .update_view(
                &session_id,
                ViewState::Detail(EntityRef::product("prod-1")),
                stack.clone(),
                info(DeltaType::Push, ActionType::Navigate),
            )
            .await
            .unwrap();

        let deltas = store.get_deltas(&session_id).await.unwrap();
        let change = deltas[0].view.as_ref().unwrap();
        assert_eq!(change.stack, stack);
        assert_eq!(deltas[0].path, "view");

        let state = store.get_state(&session_id).await.unwrap();
        assert!(state.view.is_detail());
        assert_eq!(state.view_stack.len(), 1);
        assert_ne!(state.view, ViewState::Browsing(LayoutMode::Grid));
    }

    #[tokio::test]
    async fn test_in_memory_conversation_append_is_delta_free() {
        let store = InMemoryStateStore::new();
        let session_id = SessionId::new();
        store.create_state(&session_id).await.unwrap();

        store
            .append_conversation(&session_id, vec![ConversationMessage::user("nike shoes")])
            .await
            .unwrap();
        store
            .append_conversation(&session_id, vec![ConversationMessage::user("cheaper")])
            .await
            .unwrap();

        let state = store.get_state(&session_id).await.unwrap();
        assert_eq!(state.conversation_history.len(), 2);
        assert_eq!(state.step, 0);
        assert!(store.get_deltas(&session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_restore_rejects_stale_step() {
        let store = InMemoryStateStore::new();
        let session_id = SessionId::new();
        let state = store.create_state(&session_id).await.unwrap();
        store
            .update_template(
                &session_id,
                Template::new(),
                info(DeltaType::Update, ActionType::Layout),
            )
            .await
            .unwrap();

        let delta = info(DeltaType::Rollback, ActionType::Rollback)
            .into_delta("state", StateMeta::default());
        let err = store.restore_state(&state, delta.clone(), 0).await.unwrap_err();
        assert!(matches!(err, StateStoreError::WriteConflict { step: 1, .. }));

        let step = store.restore_state(&state, delta, 1).await.unwrap();
        assert_eq!(step, 2);
        let restored = store.get_state(&session_id).await.unwrap();
        assert_eq!(restored.step, 2);
        assert!(restored.current.template.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_update_state_must_match_log_head() {
        let store = InMemoryStateStore::new();
        let session_id = SessionId::new();
        store.create_state(&session_id).await.unwrap();
        store
            .update_template(
                &session_id,
                Template::new(),
                info(DeltaType::Update, ActionType::Layout),
            )
            .await
            .unwrap();

        let mut ahead = store.get_state(&session_id).await.unwrap();
        ahead.step = 10;
        let err = store.update_state(&ahead).await.unwrap_err();
        assert!(matches!(err, StateStoreError::WriteConflict { step: 1, .. }));
        assert_eq!(store.get_state(&session_id).await.unwrap().step, 1);

        let mut at_head = store.get_state(&session_id).await.unwrap();
        at_head.current.meta = seed_meta();
        store.update_state(&at_head).await.unwrap();

        // The step clock keeps moving forward from the log head.
        let step = store
            .update_template(
                &session_id,
                Template::new(),
                info(DeltaType::Update, ActionType::Layout),
            )
            .await
            .unwrap();
        assert_eq!(step, 2);
        let state = store.get_state(&session_id).await.unwrap();
        assert_eq!(state.step, 2);
        assert_eq!(state.current.meta, seed_meta());
    }
}
