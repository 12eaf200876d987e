//! End-to-end tests for the container lifecycle against SQLite

use karl_container::learning::codec;
use karl_container::learning::STATE_SCHEMA_VERSION;
use karl_container::{
    ContainerLifecycleState, ContainerOrchestrator, EngineConfig, Instruction, InteractionEvent, LearnedState,
    SqliteStore, StateStore,
};
use std::sync::Arc;
use tempfile::TempDir;

const SUBJECT: &str = "user-42";

async fn open_store(dir: &TempDir) -> anyhow::Result<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::new(dir.path().join("karl_database.db")).await?))
}

fn container(store: Arc<SqliteStore>) -> ContainerOrchestrator {
    ContainerOrchestrator::new(SUBJECT, EngineConfig::default(), store.clone()).with_event_log(store)
}

#[tokio::test]
async fn test_learning_survives_restart() -> anyhow::Result<()> {
    let dir = TempDir::new()?;

    {
        let store = open_store(&dir).await?;
        let first = container(store);
        first.initialize_from_store().await?;
        for _ in 0..5 {
            assert!(first.ingest(InteractionEvent::new("click", SUBJECT).with_attribute("ms", 120i64)));
        }
        let saved = first.save_state().await?;
        assert_eq!(saved.schema_version, STATE_SCHEMA_VERSION);
        first.release().await;
    }

    let store = open_store(&dir).await?;
    let second = container(store.clone());
    second.initialize_from_store().await?;
    assert_eq!(second.state(), ContainerLifecycleState::Ready);
    assert_eq!(second.insights().await?.interaction_count, 5);

    let counts = store.interaction_counts(SUBJECT).await?;
    assert_eq!(counts, vec![("click".to_string(), 5)]);

    second.release().await;
    Ok(())
}

#[tokio::test]
async fn test_learned_sequence_is_predicted() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let c = container(open_store(&dir).await?);
    c.initialize(None).await?;

    for _ in 0..6 {
        c.ingest(InteractionEvent::new("open_inbox", SUBJECT));
        c.ingest(InteractionEvent::new("read_mail", SUBJECT));
    }
    c.save_state().await?;

    let context = vec![InteractionEvent::new("open_inbox", SUBJECT)];
    let prediction = c.predict(&context, &[]).await?.expect("a prediction after training");
    assert_eq!(prediction.content, "read_mail");
    assert!((0.0..=1.0).contains(&prediction.confidence));

    let strict = vec![Instruction::min_confidence(1.0)];
    if let Some(p) = c.predict(&context, &strict).await? {
        assert!(p.confidence >= 1.0);
    }

    c.release().await;
    Ok(())
}

#[tokio::test]
async fn test_prediction_after_restart_uses_learned_sequence() -> anyhow::Result<()> {
    let dir = TempDir::new()?;

    {
        let first = container(open_store(&dir).await?);
        first.initialize_from_store().await?;
        for _ in 0..5 {
            first.ingest(InteractionEvent::new("a", SUBJECT));
            first.ingest(InteractionEvent::new("b", SUBJECT));
        }
        first.save_state().await?;
        first.release().await;
    }

    let second = container(open_store(&dir).await?);
    second.initialize_from_store().await?;

    let after_a = second
        .predict(&[InteractionEvent::new("a", SUBJECT)], &[])
        .await?
        .expect("a prediction after restart");
    assert_eq!(after_a.content, "b");
    assert!(after_a.confidence < 1.0);

    let open = second.predict(&[], &[]).await?.expect("a prediction without context");
    assert_eq!(open.content, "a");

    second.release().await;
    Ok(())
}

#[tokio::test]
async fn test_suppressed_kind_never_trains() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = open_store(&dir).await?;
    let c = container(store.clone()).with_training_instructions(vec![Instruction::suppress_category("noise")]);
    c.initialize(None).await?;

    c.ingest(InteractionEvent::new("noise", SUBJECT));
    c.ingest(InteractionEvent::new("noise", SUBJECT));
    let saved = c.save_state().await?;

    assert_eq!(codec::decode_state(&saved)?.interaction_count, 0);
    // still archived
    assert_eq!(store.interaction_counts(SUBJECT).await?, vec![("noise".to_string(), 2)]);

    c.release().await;
    Ok(())
}

#[tokio::test]
async fn test_unreadable_stored_state_starts_blank() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = open_store(&dir).await?;

    store.save(SUBJECT, &LearnedState::new(vec![0xde, 0xad], STATE_SCHEMA_VERSION)).await?;
    let corrupted = container(store.clone());
    corrupted.initialize_from_store().await?;
    assert_eq!(corrupted.state(), ContainerLifecycleState::Ready);
    assert_eq!(corrupted.insights().await?.interaction_count, 0);
    corrupted.release().await;

    store.save(SUBJECT, &LearnedState::new(vec![0; 16], STATE_SCHEMA_VERSION + 1)).await?;
    let future = container(store);
    future.initialize_from_store().await?;
    assert_eq!(future.state(), ContainerLifecycleState::Ready);
    assert_eq!(future.insights().await?.interaction_count, 0);
    future.release().await;
    Ok(())
}

#[tokio::test]
async fn test_release_is_final() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let c = container(open_store(&dir).await?);
    c.initialize(None).await?;
    c.ingest(InteractionEvent::new("click", SUBJECT));

    c.release().await;
    c.release().await;
    assert_eq!(c.state(), ContainerLifecycleState::Released);

    assert!(!c.ingest(InteractionEvent::new("click", SUBJECT)));
    assert!(c.predict(&[], &[]).await.is_err());
    assert!(c.save_state().await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_ingest_with_saves() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let c = Arc::new(container(open_store(&dir).await?));
    c.initialize(None).await?;

    let producers: Vec<_> = (0..4)
        .map(|i| {
            let c = c.clone();
            tokio::spawn(async move {
                for _ in 0..25 {
                    c.ingest(InteractionEvent::new(format!("kind{}", i), SUBJECT));
                }
            })
        })
        .collect();
    let saver = {
        let c = c.clone();
        tokio::spawn(async move { c.save_state().await.map(|s| s.len()) })
    };

    futures::future::join_all(producers).await;
    saver.await??;

    let saved = c.save_state().await?;
    assert_eq!(codec::decode_state(&saved)?.interaction_count, 100);

    c.release().await;
    Ok(())
}
