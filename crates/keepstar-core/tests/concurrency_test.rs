use std::sync::Arc;

use futures::future::join_all;
use keepstar_core::app::domain::{
    ActionType, ConversationMessage, DeltaAction, DeltaInfo, DeltaSource, DeltaType, EntityRef,
    LayoutMode, PresetTemplateBuilder, SessionId, TemplateBuilder, Trigger,
};
use keepstar_core::test_utils::{seed_data, seed_delta_info, seed_meta, seed_session};
use keepstar_core::{EngineConfig, InMemoryStateStore, SqliteStateStore, StateEngine, StateStore};
use tempfile::TempDir;

const WRITERS: usize = 16;

fn info(actor: String, action: ActionType) -> DeltaInfo {
    DeltaInfo::new(
        Trigger::UserQuery,
        DeltaSource::Llm,
        actor,
        DeltaType::Update,
        DeltaAction::new(action),
    )
}

async fn stores() -> Vec<(&'static str, Arc<dyn StateStore>, Option<TempDir>)> {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteStateStore::new(&dir.path().join("state.db"))
        .await
        .unwrap();
    let memory: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
    let sqlite: Arc<dyn StateStore> = Arc::new(sqlite);
    vec![("memory", memory, None), ("sqlite", sqlite, Some(dir))]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_get_distinct_gap_free_steps() {
    for (name, store, _dir) in stores().await {
        let session_id = SessionId::new();
        store.create_state(&session_id).await.unwrap();

        let handles = (0..WRITERS).map(|i| {
            let store = store.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                let layout = match i % 3 {
                    0 => LayoutMode::Grid,
                    1 => LayoutMode::List,
                    _ => LayoutMode::Carousel,
                };
                store
                    .update_template(
                        &session_id,
                        PresetTemplateBuilder.browse(&seed_data(), layout),
                        info(format!("agent-{i}"), ActionType::Layout),
                    )
                    .await
            })
        });

        let mut steps: Vec<u64> = join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();
        steps.sort_unstable();
        let expected: Vec<u64> = (1..=WRITERS as u64).collect();
        assert_eq!(steps, expected, "{name}: steps must be distinct and gap-free");

        let deltas = store.get_deltas(&session_id).await.unwrap();
        let logged: Vec<u64> = deltas.iter().map(|d| d.step).collect();
        assert_eq!(logged, expected, "{name}: log must be step-ordered");

        let state = store.get_state(&session_id).await.unwrap();
        assert_eq!(state.step, WRITERS as u64, "{name}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_agents_keep_both_zones() {
    for (name, store, _dir) in stores().await {
        let session_id = SessionId::new();
        store.create_state(&session_id).await.unwrap();
        let template = PresetTemplateBuilder.browse(&seed_data(), LayoutMode::Grid);

        let data_writer = {
            let store = store.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                store
                    .update_data(&session_id, seed_data(), seed_meta(), seed_delta_info())
                    .await
            })
        };
        let template_writer = {
            let store = store.clone();
            let session_id = session_id.clone();
            let template = template.clone();
            tokio::spawn(async move {
                store
                    .update_template(
                        &session_id,
                        template,
                        info("agent2".to_string(), ActionType::Layout),
                    )
                    .await
            })
        };

        let data_step = data_writer.await.unwrap().unwrap();
        let template_step = template_writer.await.unwrap().unwrap();
        assert_ne!(data_step, template_step, "{name}");

        let state = store.get_state(&session_id).await.unwrap();
        assert_eq!(state.step, 2, "{name}");
        assert_eq!(state.current.data.products.len(), 4, "{name}");
        assert_eq!(state.current.meta.count, 4, "{name}");
        assert_eq!(state.current.template, Some(template), "{name}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_expands_never_lose_a_snapshot() {
    for (name, store, _dir) in stores().await {
        let engine = Arc::new(StateEngine::new(store.clone(), &EngineConfig::default()));
        let session_id = seed_session(store.as_ref()).await.unwrap();

        let handles = (1..=4).map(|i| {
            let engine = engine.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                let ctx = engine.context();
                engine
                    .expand(&ctx, &session_id, EntityRef::product(format!("prod-{i}")), None)
                    .await
            })
        });
        for joined in join_all(handles).await {
            joined.unwrap().unwrap();
        }

        let state = store.get_state(&session_id).await.unwrap();
        assert_eq!(state.view_stack.len(), 4, "{name}");
        assert!(state.view.is_detail(), "{name}");
        // seed + (view, template) per expand
        assert_eq!(state.step, 9, "{name}");
        assert_eq!(store.get_deltas(&session_id).await.unwrap().len(), 9, "{name}");
    }
}

#[tokio::test]
async fn test_conversation_appends_are_not_logged() {
    for (name, store, _dir) in stores().await {
        let engine = StateEngine::new(store.clone(), &EngineConfig::default());
        let session_id = seed_session(store.as_ref()).await.unwrap();

        for i in 0..8 {
            engine
                .enqueue_conversation(
                    &session_id,
                    vec![ConversationMessage::user(format!("message {i}"))],
                )
                .unwrap();
        }
        engine.shutdown().await;

        let state = store.get_state(&session_id).await.unwrap();
        assert_eq!(state.conversation_history.len(), 8, "{name}");
        assert_eq!(state.step, 1, "{name}");
        assert_eq!(store.get_deltas(&session_id).await.unwrap().len(), 1, "{name}");
    }
}
