//! Container orchestration
//!
//! A container is the per-user runtime around one learning engine. It owns
//! the lifecycle state machine:
//!
//! ```text
//! Created --initialize--> Initializing --> Ready --release--> Releasing --> Released
//!    \                          |
//!     `------ unrecoverable ----`--> Failed
//! ```
//!
//! `Released` and `Failed` are terminal.

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::{ContainerError, InitError, PersistError};
use crate::instructions::{Instruction, InstructionEngine};
use crate::learning::{AdaptiveEngine, LearningEngine, LearningInsights, RestoreOutcome};
use crate::pipeline::{EventSource, InteractionPipeline};
use crate::storage::{EventLog, StateStore};
use crate::types::{InteractionEvent, LearnedState, Prediction};

/// Lifecycle of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ContainerLifecycleState {
    Created = 0,
    Initializing = 1,
    Ready = 2,
    Releasing = 3,
    Released = 4,
    Failed = 5,
}

impl ContainerLifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ContainerLifecycleState::Created,
            1 => ContainerLifecycleState::Initializing,
            2 => ContainerLifecycleState::Ready,
            3 => ContainerLifecycleState::Releasing,
            4 => ContainerLifecycleState::Released,
            _ => ContainerLifecycleState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ContainerLifecycleState::Released | ContainerLifecycleState::Failed)
    }
}

impl std::fmt::Display for ContainerLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerLifecycleState::Created => write!(f, "created"),
            ContainerLifecycleState::Initializing => write!(f, "initializing"),
            ContainerLifecycleState::Ready => write!(f, "ready"),
            ContainerLifecycleState::Releasing => write!(f, "releasing"),
            ContainerLifecycleState::Released => write!(f, "released"),
            ContainerLifecycleState::Failed => write!(f, "failed"),
        }
    }
}

/// Builds the engine when the container initializes
pub type EngineFactory = Box<dyn Fn() -> Result<Arc<dyn LearningEngine>, InitError> + Send + Sync>;

/// Per-user learning container
pub struct ContainerOrchestrator {
    subject_id: String,
    state: AtomicU8,
    factory: EngineFactory,
    engine: OnceCell<Arc<dyn LearningEngine>>,
    pipeline: OnceCell<InteractionPipeline>,
    store: Arc<dyn StateStore>,
    event_log: Option<Arc<dyn EventLog>>,
    event_source: Option<Arc<dyn EventSource>>,
    training_instructions: Mutex<Vec<Instruction>>,
    /// Serializes initialize and release
    lifecycle: tokio::sync::Mutex<()>,
}

impl ContainerOrchestrator {
    /// Container backed by the adaptive engine
    pub fn new(subject_id: impl Into<String>, engine_config: EngineConfig, store: Arc<dyn StateStore>) -> Self {
        let factory: EngineFactory = Box::new(move || {
            let engine = AdaptiveEngine::new(engine_config.clone())?;
            Ok(Arc::new(engine) as Arc<dyn LearningEngine>)
        });

        Self {
            subject_id: subject_id.into(),
            state: AtomicU8::new(ContainerLifecycleState::Created as u8),
            factory,
            engine: OnceCell::new(),
            pipeline: OnceCell::new(),
            store,
            event_log: None,
            event_source: None,
            training_instructions: Mutex::new(Vec::new()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Use a different engine implementation
    pub fn with_engine_factory(mut self, factory: EngineFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Archive ingested events
    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Subscribe to an external event source once ready
    pub fn with_event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.event_source = Some(source);
        self
    }

    pub fn with_training_instructions(self, instructions: Vec<Instruction>) -> Self {
        *self
            .training_instructions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = instructions;
        self
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn state(&self) -> ContainerLifecycleState {
        ContainerLifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: ContainerLifecycleState, to: ContainerLifecycleState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            info!("Container {} {} -> {}", self.subject_id, from, to);
        }
        moved
    }

    fn fail(&self, reason: &str) {
        let previous = self.state();
        self.state.store(ContainerLifecycleState::Failed as u8, Ordering::Release);
        error!("Container {} failed from {}: {}", self.subject_id, previous, reason);
    }

    /// Engine and pipeline, only while `Ready`
    fn ready_parts(&self) -> Option<(&Arc<dyn LearningEngine>, &InteractionPipeline)> {
        if self.state() != ContainerLifecycleState::Ready {
            return None;
        }
        Some((self.engine.get()?, self.pipeline.get()?))
    }

    /// Bring the container to `Ready`, resuming from `prior` when it decodes.
    ///
    /// A second call after success is a no-op. A prior state that cannot be
    /// applied is logged and discarded; only failing to build the engine is fatal.
    pub async fn initialize(&self, prior: Option<LearnedState>) -> Result<(), InitError> {
        let _lifecycle = self.lifecycle.lock().await;

        match self.state() {
            ContainerLifecycleState::Ready => {
                debug!("Container {} already initialized", self.subject_id);
                return Ok(());
            }
            ContainerLifecycleState::Created => {}
            other => return Err(InitError::InvalidState(other)),
        }

        if !self.transition(ContainerLifecycleState::Created, ContainerLifecycleState::Initializing) {
            return Err(InitError::InvalidState(self.state()));
        }

        let engine = match (self.factory)() {
            Ok(engine) => engine,
            Err(e) => {
                self.fail(&e.to_string());
                return Err(e);
            }
        };

        match engine.initialize(prior.as_ref()).await {
            RestoreOutcome::Restored { interaction_count } => {
                info!("Container {} resumed with {} interactions", self.subject_id, interaction_count);
                self.name_restored_kinds(engine.as_ref()).await;
            }
            RestoreOutcome::Discarded(e) => {
                warn!("Container {} discarded prior state ({}), starting blank", self.subject_id, e);
            }
            RestoreOutcome::Blank => {
                info!("Container {} starting blank", self.subject_id);
            }
            RestoreOutcome::AlreadyInitialized => {
                debug!("Engine for {} was initialized elsewhere", self.subject_id);
            }
        }

        let instructions = self
            .training_instructions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let pipeline = InteractionPipeline::start(engine.clone(), instructions, self.event_log.clone());
        if let Some(source) = &self.event_source {
            pipeline.attach(source.as_ref(), self.subject_id.clone());
        }

        if self.engine.set(engine).is_err() || self.pipeline.set(pipeline).is_err() {
            self.fail("engine installed twice");
            return Err(InitError::Engine("engine installed twice".to_string()));
        }

        if !self.transition(ContainerLifecycleState::Initializing, ContainerLifecycleState::Ready) {
            return Err(InitError::InvalidState(self.state()));
        }
        Ok(())
    }

    /// Restored state carries kind codes only; recover names from the event log
    async fn name_restored_kinds(&self, engine: &dyn LearningEngine) {
        let Some(log) = &self.event_log else {
            return;
        };
        let kinds = match log.known_kinds(&self.subject_id).await {
            Ok(kinds) => kinds,
            Err(e) => {
                warn!("Failed to read known kinds for {}: {}", self.subject_id, e);
                return;
            }
        };
        match engine.name_kinds(&kinds).await {
            Ok(named) => debug!("Recovered {} kind names for {}", named, self.subject_id),
            Err(e) => warn!("Engine refused kind names for {}: {}", self.subject_id, e),
        }
    }

    /// Initialize from whatever the store holds for this subject.
    ///
    /// Load failures are treated as "no prior state".
    pub async fn initialize_from_store(&self) -> Result<(), InitError> {
        let prior = match self.store.load(&self.subject_id).await {
            Ok(prior) => prior,
            Err(e) => {
                warn!("Failed to load state for {}: {}, starting blank", self.subject_id, e);
                None
            }
        };
        self.initialize(prior).await
    }

    /// Hand an event to the pipeline without waiting for training.
    ///
    /// Outside `Ready`, or for another subject, the event is dropped.
    pub fn ingest(&self, event: InteractionEvent) -> bool {
        let Some((_, pipeline)) = self.ready_parts() else {
            warn!(
                "Container {} is {}, dropping {} event",
                self.subject_id,
                self.state(),
                event.kind
            );
            return false;
        };

        if event.subject_id != self.subject_id {
            warn!(
                "Container {} dropping {} event for subject {}",
                self.subject_id, event.kind, event.subject_id
            );
            return false;
        }

        pipeline.submit(event)
    }

    /// Best suggestion for `context` under `instructions`.
    ///
    /// `Ok(None)` means no sufficiently confident suggestion.
    pub async fn predict(
        &self,
        context: &[InteractionEvent],
        instructions: &[Instruction],
    ) -> Result<Option<Prediction>, ContainerError> {
        let (engine, _) = self
            .ready_parts()
            .ok_or_else(|| ContainerError::NotReady(self.state()))?;

        let prediction = engine.predict(context, instructions).await?;
        // Engine output is not trusted to be filtered
        Ok(prediction.and_then(|p| InstructionEngine::filter(p, instructions)))
    }

    /// Snapshot the model after all previously ingested events and persist it
    pub async fn save_state(&self) -> Result<LearnedState, PersistError> {
        let (engine, pipeline) = self
            .ready_parts()
            .ok_or_else(|| PersistError::NotReady(self.state()))?;

        pipeline.drain().await;
        let state = engine.current_state().await?;

        // No engine lock is held here
        if let Err(e) = self.store.save(&self.subject_id, &state).await {
            warn!("Failed to save state for {}: {}", self.subject_id, e);
            return Err(PersistError::Store(e));
        }

        info!("Saved {} byte state for {}", state.len(), self.subject_id);
        Ok(state)
    }

    /// Replace the live model with an externally supplied state
    pub async fn import_state(&self, state: &LearnedState) -> Result<(), ContainerError> {
        let (engine, pipeline) = self
            .ready_parts()
            .ok_or_else(|| ContainerError::NotReady(self.state()))?;

        pipeline.drain().await;
        engine.restore(state).await?;
        self.name_restored_kinds(engine.as_ref()).await;
        Ok(())
    }

    /// Forget everything learned; the container stays `Ready`
    pub async fn reset(&self) {
        let Some((engine, pipeline)) = self.ready_parts() else {
            warn!("Container {} is {}, ignoring reset", self.subject_id, self.state());
            return;
        };

        pipeline.drain().await;
        if let Err(e) = engine.reset().await {
            warn!("Reset of {} rejected: {}", self.subject_id, e);
        }
    }

    /// What the model has learned, after all previously ingested events
    pub async fn insights(&self) -> Result<LearningInsights, ContainerError> {
        let (engine, pipeline) = self
            .ready_parts()
            .ok_or_else(|| ContainerError::NotReady(self.state()))?;

        pipeline.drain().await;
        Ok(engine.insights().await?)
    }

    /// Replace the instructions that decide which events are trained on
    pub async fn set_training_instructions(&self, instructions: Vec<Instruction>) {
        *self
            .training_instructions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = instructions.clone();
        if let Some(pipeline) = self.pipeline.get() {
            pipeline.set_instructions(instructions).await;
        }
    }

    /// Events queued but not yet processed
    pub fn pending_events(&self) -> u64 {
        self.pipeline
            .get()
            .map(|p| p.submitted().saturating_sub(p.completed()))
            .unwrap_or(0)
    }

    /// Stop the pipeline, let queued training finish, and release the engine.
    ///
    /// Idempotent.
    pub async fn release(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        match self.state() {
            ContainerLifecycleState::Ready => {}
            ContainerLifecycleState::Created => {
                self.transition(ContainerLifecycleState::Created, ContainerLifecycleState::Released);
                return;
            }
            other => {
                debug!("Container {} is {}, release is a no-op", self.subject_id, other);
                return;
            }
        }

        if !self.transition(ContainerLifecycleState::Ready, ContainerLifecycleState::Releasing) {
            return;
        }

        if let Some(pipeline) = self.pipeline.get() {
            if let Err(e) = pipeline.shutdown().await {
                self.fail(&format!("training worker crashed: {}", e));
                return;
            }
        }

        if let Some(engine) = self.engine.get() {
            engine.release().await;
        }

        self.transition(ContainerLifecycleState::Releasing, ContainerLifecycleState::Released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::learning::STATE_SCHEMA_VERSION;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    const SUBJECT: &str = "karl";

    fn container(store: Arc<MemoryStore>) -> ContainerOrchestrator {
        ContainerOrchestrator::new(SUBJECT, EngineConfig::default(), store)
    }

    fn event(kind: &str) -> InteractionEvent {
        InteractionEvent::new(kind, SUBJECT)
    }

    /// Engine that always suggests the same thing at a fixed confidence
    struct FixedEngine {
        confidence: f32,
    }

    #[async_trait]
    impl LearningEngine for FixedEngine {
        async fn initialize(&self, _state: Option<&LearnedState>) -> RestoreOutcome {
            RestoreOutcome::Blank
        }
        async fn restore(&self, _state: &LearnedState) -> Result<(), EngineError> {
            Ok(())
        }
        async fn train_step(&self, _event: &InteractionEvent) -> Result<(), EngineError> {
            Ok(())
        }
        async fn predict(
            &self,
            _context: &[InteractionEvent],
            _instructions: &[Instruction],
        ) -> Result<Option<Prediction>, EngineError> {
            // deliberately unfiltered
            Ok(Some(Prediction::new("open_mail", self.confidence, "next_interaction")))
        }
        async fn current_state(&self) -> Result<LearnedState, EngineError> {
            Ok(LearnedState::new(Vec::new(), STATE_SCHEMA_VERSION))
        }
        async fn reset(&self) -> Result<(), EngineError> {
            Ok(())
        }
        async fn insights(&self) -> Result<LearningInsights, EngineError> {
            Ok(LearningInsights {
                interaction_count: 0,
                history_len: 0,
                learning_rate: 0.1,
                top_kinds: Vec::new(),
            })
        }
        async fn release(&self) {}
    }

    fn fixed(confidence: f32) -> ContainerOrchestrator {
        container(Arc::new(MemoryStore::new())).with_engine_factory(Box::new(move || {
            Ok(Arc::new(FixedEngine { confidence }) as Arc<dyn LearningEngine>)
        }))
    }

    struct BrokenStore;

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn save(&self, _subject_id: &str, _state: &LearnedState) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
        async fn load(&self, _subject_id: &str) -> anyhow::Result<Option<LearnedState>> {
            anyhow::bail!("database locked")
        }
    }

    #[tokio::test]
    async fn test_initialize_reaches_ready_and_is_idempotent() {
        let c = container(Arc::new(MemoryStore::new()));
        assert_eq!(c.state(), ContainerLifecycleState::Created);

        c.initialize(None).await.unwrap();
        assert_eq!(c.state(), ContainerLifecycleState::Ready);

        c.ingest(event("click"));
        c.save_state().await.unwrap();

        let other = LearnedState::new(vec![0; 16], STATE_SCHEMA_VERSION);
        c.initialize(Some(other)).await.unwrap();
        assert_eq!(c.state(), ContainerLifecycleState::Ready);
        assert_eq!(c.insights().await.unwrap().interaction_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_initialize_claims_once() {
        let c = Arc::new(container(Arc::new(MemoryStore::new())));
        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let c = c.clone();
                tokio::spawn(async move { c.initialize(None).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(c.state(), ContainerLifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_corrupt_prior_state_still_reaches_ready() {
        let c = container(Arc::new(MemoryStore::new()));
        c.initialize(Some(LearnedState::new(vec![1, 2, 3], STATE_SCHEMA_VERSION)))
            .await
            .unwrap();
        assert_eq!(c.state(), ContainerLifecycleState::Ready);
        assert_eq!(c.insights().await.unwrap().interaction_count, 0);
    }

    #[tokio::test]
    async fn test_store_load_failure_starts_blank() {
        let c = ContainerOrchestrator::new(SUBJECT, EngineConfig::default(), Arc::new(BrokenStore));
        c.initialize_from_store().await.unwrap();
        assert_eq!(c.state(), ContainerLifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_engine_construction_failure_is_fatal() {
        let config = EngineConfig {
            learning_rate: 2.0,
            ..EngineConfig::default()
        };
        let c = ContainerOrchestrator::new(SUBJECT, config, Arc::new(MemoryStore::new()));
        assert!(matches!(c.initialize(None).await, Err(InitError::InvalidConfig(_))));
        assert_eq!(c.state(), ContainerLifecycleState::Failed);

        assert!(matches!(c.initialize(None).await, Err(InitError::InvalidState(ContainerLifecycleState::Failed))));
        assert!(!c.ingest(event("click")));
        c.release().await;
        assert_eq!(c.state(), ContainerLifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_ingest_before_ready_is_dropped() {
        let c = container(Arc::new(MemoryStore::new()));
        assert!(!c.ingest(event("click")));
        assert!(matches!(
            c.predict(&[], &[]).await,
            Err(ContainerError::NotReady(ContainerLifecycleState::Created))
        ));
        assert!(matches!(c.save_state().await, Err(PersistError::NotReady(_))));

        c.initialize(None).await.unwrap();
        assert_eq!(c.insights().await.unwrap().interaction_count, 0);
    }

    #[tokio::test]
    async fn test_events_for_other_subjects_are_dropped() {
        let c = container(Arc::new(MemoryStore::new()));
        c.initialize(None).await.unwrap();
        assert!(!c.ingest(InteractionEvent::new("click", "someone-else")));
        assert_eq!(c.insights().await.unwrap().interaction_count, 0);
    }

    #[tokio::test]
    async fn test_min_confidence_applied_to_engine_output() {
        let rules = vec![Instruction::min_confidence(0.8)];

        let low = fixed(0.7);
        low.initialize(None).await.unwrap();
        assert_eq!(low.predict(&[], &rules).await.unwrap(), None);

        let high = fixed(0.85);
        high.initialize(None).await.unwrap();
        let prediction = high.predict(&[], &rules).await.unwrap().unwrap();
        assert_eq!(prediction, Prediction::new("open_mail", 0.85, "next_interaction"));
    }

    #[tokio::test]
    async fn test_suppressed_category_does_not_train() {
        let c = container(Arc::new(MemoryStore::new()))
            .with_training_instructions(vec![Instruction::suppress_category("noise")]);
        c.initialize(None).await.unwrap();

        c.ingest(event("noise"));
        assert_eq!(c.insights().await.unwrap().interaction_count, 0);

        c.ingest(event("click"));
        assert_eq!(c.insights().await.unwrap().interaction_count, 1);

        c.set_training_instructions(vec![]).await;
        c.ingest(event("noise"));
        assert_eq!(c.insights().await.unwrap().interaction_count, 2);
    }

    #[tokio::test]
    async fn test_save_state_sees_every_prior_ingest() {
        let store = Arc::new(MemoryStore::new());
        let c = container(store.clone());
        c.initialize(None).await.unwrap();

        for _ in 0..40 {
            c.ingest(event("click"));
        }
        let saved = c.save_state().await.unwrap();

        let params = crate::learning::codec::decode_state(&saved).unwrap();
        assert_eq!(params.interaction_count, 40);
        assert_eq!(store.load(SUBJECT).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_store_failure_is_reported_and_container_stays_ready() {
        let c = ContainerOrchestrator::new(SUBJECT, EngineConfig::default(), Arc::new(BrokenStore));
        c.initialize(None).await.unwrap();
        c.ingest(event("click"));

        assert!(matches!(c.save_state().await, Err(PersistError::Store(_))));
        assert_eq!(c.state(), ContainerLifecycleState::Ready);
        assert_eq!(c.insights().await.unwrap().interaction_count, 1);
    }

    #[tokio::test]
    async fn test_reset_keeps_ready() {
        let c = container(Arc::new(MemoryStore::new()));
        c.initialize(None).await.unwrap();
        c.ingest(event("click"));
        c.reset().await;

        assert_eq!(c.state(), ContainerLifecycleState::Ready);
        assert_eq!(c.insights().await.unwrap().interaction_count, 0);
    }

    #[tokio::test]
    async fn test_import_rejects_bad_state() {
        let c = container(Arc::new(MemoryStore::new()));
        c.initialize(None).await.unwrap();
        c.ingest(event("click"));

        let bad = LearnedState::new(vec![0; 3], 7);
        assert!(matches!(
            c.import_state(&bad).await,
            Err(ContainerError::Engine(EngineError::InvalidState(_)))
        ));
        assert_eq!(c.insights().await.unwrap().interaction_count, 1);
    }

    #[tokio::test]
    async fn test_release_drains_and_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let c = container(store.clone()).with_event_log(store.clone());
        c.initialize(None).await.unwrap();
        for _ in 0..10 {
            c.ingest(event("click"));
        }

        c.release().await;
        assert_eq!(c.state(), ContainerLifecycleState::Released);
        assert_eq!(store.events().await.len(), 10);

        c.release().await;
        assert_eq!(c.state(), ContainerLifecycleState::Released);
        assert!(!c.ingest(event("click")));
        assert!(matches!(c.predict(&[], &[]).await, Err(ContainerError::NotReady(_))));
        assert!(matches!(
            c.initialize(None).await,
            Err(InitError::InvalidState(ContainerLifecycleState::Released))
        ));
    }

    #[tokio::test]
    async fn test_release_before_initialize() {
        let c = container(Arc::new(MemoryStore::new()));
        c.release().await;
        assert_eq!(c.state(), ContainerLifecycleState::Released);
        assert_eq!(c.pending_events(), 0);
    }

    #[tokio::test]
    async fn test_event_source_feeds_container() {
        let source = Arc::new(crate::pipeline::LocalEventSource::new());
        let c = container(Arc::new(MemoryStore::new())).with_event_source(source.clone());
        c.initialize(None).await.unwrap();

        source.publish(event("click"));
        source.publish(event("scroll"));
        assert_eq!(c.insights().await.unwrap().interaction_count, 2);

        c.release().await;
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_shared_source_only_trains_own_subject() {
        let source = Arc::new(crate::pipeline::LocalEventSource::new());
        let c = container(Arc::new(MemoryStore::new())).with_event_source(source.clone());
        c.initialize(None).await.unwrap();

        source.publish(event("click"));
        source.publish(InteractionEvent::new("click", "someone-else"));
        assert_eq!(c.insights().await.unwrap().interaction_count, 1);
    }

    #[tokio::test]
    async fn test_resumed_container_predicts_by_name() {
        let store = Arc::new(MemoryStore::new());
        let first = container(store.clone()).with_event_log(store.clone());
        first.initialize(None).await.unwrap();
        for _ in 0..5 {
            first.ingest(event("open_inbox"));
            first.ingest(event("read_mail"));
        }
        first.save_state().await.unwrap();
        first.release().await;

        let second = container(store.clone()).with_event_log(store.clone());
        second.initialize_from_store().await.unwrap();

        let prediction = second
            .predict(&[event("open_inbox")], &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prediction.content, "read_mail");
        assert!(prediction.confidence < 1.0);

        let open = second.predict(&[], &[]).await.unwrap().unwrap();
        assert_eq!(open.content, "open_inbox");
    }
}
