//! Learning engine contract and the adaptive reference engine
//!
//! Every operation that touches the model goes through one exclusive lock, so
//! training steps never interleave and a snapshot never sees a half-applied
//! update. Nothing outside the lock ever holds a reference into live model
//! memory: snapshots are encoded copies.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::{self, ModelParameters};
use super::features::{self, EventFeatures};
use crate::config::EngineConfig;
use crate::error::{DecodeError, EngineError, InitError};
use crate::instructions::{Instruction, InstructionEngine};
use crate::types::{InteractionEvent, LearnedState, Prediction};

/// Category attached to every prediction of the adaptive engine
pub const NEXT_INTERACTION: &str = "next_interaction";

const TOP_KINDS: usize = 5;
const MIN_WEIGHT: f32 = 1e-6;

/// What happened to the prior state handed to [`LearningEngine::initialize`]
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    /// No prior state; starting blank
    Blank,
    /// Prior state applied in full
    Restored { interaction_count: u64 },
    /// Prior state rejected; starting blank
    Discarded(DecodeError),
    /// Engine was already initialized; nothing changed
    AlreadyInitialized,
}

/// Summary of what a model has learned so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningInsights {
    pub interaction_count: u64,
    pub history_len: usize,
    pub learning_rate: f32,
    pub top_kinds: Vec<KindWeight>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindWeight {
    pub kind: String,
    pub weight: f32,
}

/// Contract for an on-device incremental learner.
///
/// Implementations serialize `train_step`, `predict`, `current_state`,
/// `reset` and `release` against each other. After `release` every model
/// operation fails with [`EngineError::Released`].
#[async_trait]
pub trait LearningEngine: Send + Sync {
    /// Prepare the model, resuming from `state` when it decodes.
    ///
    /// Only the first call has an effect.
    async fn initialize(&self, state: Option<&LearnedState>) -> RestoreOutcome;

    /// Replace the live model with `state`, or leave it untouched on error
    async fn restore(&self, state: &LearnedState) -> Result<(), EngineError>;

    /// Apply one incremental update
    async fn train_step(&self, event: &InteractionEvent) -> Result<(), EngineError>;

    /// Best suggestion for `context`, or `None` when nothing clears the instructions
    async fn predict(
        &self,
        context: &[InteractionEvent],
        instructions: &[Instruction],
    ) -> Result<Option<Prediction>, EngineError>;

    /// Encoded snapshot of the model; waits for any in-flight step
    async fn current_state(&self) -> Result<LearnedState, EngineError>;

    /// Forget all learned parameters and history
    async fn reset(&self) -> Result<(), EngineError>;

    async fn insights(&self) -> Result<LearningInsights, EngineError>;

    /// Attach readable names to kinds the model tracks only by code, as
    /// after a restore. Returns how many codes gained a name.
    async fn name_kinds(&self, _kinds: &[String]) -> Result<usize, EngineError> {
        Ok(0)
    }

    /// Release held resources. Idempotent.
    async fn release(&self);
}

/// Handle to a training step running as its own task
pub type TrainHandle = JoinHandle<Result<(), EngineError>>;

/// Run `train_step` as an independent task on the runtime
pub fn spawn_train_step(engine: Arc<dyn LearningEngine>, event: InteractionEvent) -> TrainHandle {
    tokio::spawn(async move { engine.train_step(&event).await })
}

/// Live model guarded by the engine lock
struct Model {
    params: ModelParameters,
    weights: HashMap<i32, f32>,
    vocabulary: HashMap<i32, String>,
}

impl Model {
    fn blank(learning_rate: f32) -> Self {
        Self {
            params: ModelParameters::blank(learning_rate),
            weights: HashMap::new(),
            vocabulary: HashMap::new(),
        }
    }

    /// Rebuild derived weights by replaying the restored history
    fn from_params(mut params: ModelParameters, capacity: usize) -> Self {
        while params.history.len() > capacity {
            params.history.pop_front();
        }
        let mut model = Self {
            weights: HashMap::new(),
            vocabulary: HashMap::new(),
            params,
        };
        let replay: Vec<i32> = model.params.history.iter().copied().collect();
        for code in replay {
            model.reinforce(code);
        }
        model
    }

    fn reinforce(&mut self, code: i32) {
        let lr = self.params.learning_rate;
        for (other, weight) in self.weights.iter_mut() {
            if *other != code {
                *weight *= 1.0 - lr;
            }
        }
        self.weights.retain(|_, w| *w >= MIN_WEIGHT);
        let weight = self.weights.entry(code).or_insert(0.0);
        *weight += lr * (1.0 - *weight);
    }

    fn learn(&mut self, features: &EventFeatures, capacity: usize) {
        self.reinforce(features.kind_code);
        self.vocabulary
            .entry(features.kind_code)
            .or_insert_with(|| features.kind.clone());
        self.params.interaction_count = self.params.interaction_count.saturating_add(1);
        self.params.history.push_back(features.kind_code);
        while self.params.history.len() > capacity {
            self.params.history.pop_front();
        }
        self.prune_vocabulary();
    }

    /// Codes with a live weight or a place in the history window
    fn tracked_codes(&self) -> HashSet<i32> {
        self.weights
            .keys()
            .chain(self.params.history.iter())
            .copied()
            .collect()
    }

    /// Names are kept only for tracked codes
    fn prune_vocabulary(&mut self) {
        let tracked = self.tracked_codes();
        self.vocabulary.retain(|code, _| tracked.contains(code));
    }

    fn name_kinds(&mut self, kinds: &[String]) -> usize {
        let tracked = self.tracked_codes();
        let mut named = 0;
        for kind in kinds {
            let code = features::kind_code(kind);
            if tracked.contains(&code) && !self.vocabulary.contains_key(&code) {
                self.vocabulary.insert(code, kind.clone());
                named += 1;
            }
        }
        named
    }

    fn name_of(&self, code: i32) -> String {
        self.vocabulary
            .get(&code)
            .cloned()
            .unwrap_or_else(|| format!("kind:{:08x}", code as u32))
    }

    /// How often each code followed `anchor` inside the history window
    fn transitions_from(&self, anchor: i32) -> (HashMap<i32, u32>, u32) {
        let mut counts = HashMap::new();
        let mut total = 0;
        let history = &self.params.history;
        for (prev, next) in history.iter().zip(history.iter().skip(1)) {
            if *prev == anchor {
                *counts.entry(*next).or_insert(0) += 1;
                total += 1;
            }
        }
        (counts, total)
    }
}

/// Reference engine: exponential-moving kind preferences blended with
/// first-order transitions observed in the recent-history window
pub struct AdaptiveEngine {
    config: EngineConfig,
    model: Mutex<Model>,
    initialized: AtomicBool,
    released: AtomicBool,
}

impl AdaptiveEngine {
    pub fn new(config: EngineConfig) -> Result<Self, InitError> {
        config.validate()?;
        Ok(Self {
            model: Mutex::new(Model::blank(config.learning_rate)),
            config,
            initialized: AtomicBool::new(false),
            released: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn ensure_usable(&self) -> Result<(), EngineError> {
        if self.released.load(Ordering::Acquire) {
            return Err(EngineError::Released);
        }
        if !self.initialized.load(Ordering::Acquire) {
            return Err(EngineError::NotInitialized);
        }
        Ok(())
    }
}

#[async_trait]
impl LearningEngine for AdaptiveEngine {
    async fn initialize(&self, state: Option<&LearnedState>) -> RestoreOutcome {
        let mut model = self.model.lock().await;
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Engine already initialized, ignoring repeated initialize");
            return RestoreOutcome::AlreadyInitialized;
        }

        let Some(state) = state else {
            info!("Engine starting from a blank model");
            return RestoreOutcome::Blank;
        };

        match codec::decode_state(state) {
            Ok(params) => {
                let interaction_count = params.interaction_count;
                *model = Model::from_params(params, self.config.history_capacity);
                info!(
                    "Engine restored {} interactions ({} history entries)",
                    interaction_count,
                    model.params.history.len()
                );
                RestoreOutcome::Restored { interaction_count }
            }
            Err(e) => {
                warn!("Discarding prior learned state: {}", e);
                *model = Model::blank(self.config.learning_rate);
                RestoreOutcome::Discarded(e)
            }
        }
    }

    async fn restore(&self, state: &LearnedState) -> Result<(), EngineError> {
        let mut model = self.model.lock().await;
        self.ensure_usable()?;

        // Decode fully before touching the live model
        let params = codec::decode_state(state)?;
        *model = Model::from_params(params, self.config.history_capacity);
        info!("Engine state replaced ({} interactions)", model.params.interaction_count);
        Ok(())
    }

    async fn train_step(&self, event: &InteractionEvent) -> Result<(), EngineError> {
        let mut model = self.model.lock().await;
        self.ensure_usable()?;

        let features = features::extract(event);
        model.learn(&features, self.config.history_capacity);
        debug!(
            "Trained on {} (interactions: {}, window: {})",
            event.kind,
            model.params.interaction_count,
            model.params.history.len()
        );
        Ok(())
    }

    async fn predict(
        &self,
        context: &[InteractionEvent],
        instructions: &[Instruction],
    ) -> Result<Option<Prediction>, EngineError> {
        let model = self.model.lock().await;
        self.ensure_usable()?;

        if model.params.interaction_count == 0 || model.weights.is_empty() {
            return Ok(None);
        }

        let mut candidates: HashMap<i32, String> = model
            .tracked_codes()
            .into_iter()
            .map(|code| (code, model.name_of(code)))
            .collect();
        for event in context {
            candidates.insert(features::kind_code(&event.kind), event.kind.clone());
        }

        let anchor = context
            .last()
            .map(|e| features::kind_code(&e.kind))
            .or_else(|| model.params.history.back().copied());
        let (transitions, total) = anchor
            .map(|a| model.transitions_from(a))
            .unwrap_or_default();
        let context_weight = if total > 0 { self.config.context_weight } else { 0.0 };

        let mut scored: Vec<(String, f32)> = candidates
            .into_iter()
            .map(|(code, name)| {
                let preference = model.weights.get(&code).copied().unwrap_or(0.0);
                let transition = transitions
                    .get(&code)
                    .map(|c| *c as f32 / total as f32)
                    .unwrap_or(0.0);
                let score = (1.0 - context_weight) * preference + context_weight * transition;
                (name, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();

        if scored.is_empty() {
            return Ok(None);
        }

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        let sum: f32 = scored.iter().map(|(_, s)| s).sum();
        let (best, best_score) = scored[0].clone();

        let mut metadata = BTreeMap::new();
        metadata.insert("interaction_count".to_string(), model.params.interaction_count.to_string());
        metadata.insert("context_len".to_string(), context.len().to_string());
        let anchor_name = context
            .last()
            .map(|e| e.kind.clone())
            .or_else(|| anchor.map(|a| model.name_of(a)));
        if let Some(anchor_name) = anchor_name {
            metadata.insert("anchor".to_string(), anchor_name);
        }

        let alternatives: Vec<String> = scored
            .iter()
            .skip(1)
            .take(self.config.max_alternatives)
            .map(|(name, _)| name.clone())
            .collect();

        let mut prediction = Prediction::new(best, best_score / sum, NEXT_INTERACTION);
        prediction.metadata = Some(metadata);
        if !alternatives.is_empty() {
            prediction.alternatives = Some(alternatives);
        }

        debug!("Prediction {} at {:.3}", prediction.content, prediction.confidence);
        Ok(InstructionEngine::filter(prediction, instructions))
    }

    async fn current_state(&self) -> Result<LearnedState, EngineError> {
        let model = self.model.lock().await;
        self.ensure_usable()?;
        Ok(codec::encode_state(&model.params))
    }

    async fn reset(&self) -> Result<(), EngineError> {
        let mut model = self.model.lock().await;
        self.ensure_usable()?;
        *model = Model::blank(self.config.learning_rate);
        info!("Engine reset to a blank model");
        Ok(())
    }

    async fn insights(&self) -> Result<LearningInsights, EngineError> {
        let model = self.model.lock().await;
        self.ensure_usable()?;

        let mut top: Vec<KindWeight> = model
            .weights
            .iter()
            .map(|(code, weight)| KindWeight {
                kind: model.name_of(*code),
                weight: *weight,
            })
            .collect();
        top.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(CmpOrdering::Equal)
                .then_with(|| a.kind.cmp(&b.kind))
        });
        top.truncate(TOP_KINDS);

        Ok(LearningInsights {
            interaction_count: model.params.interaction_count,
            history_len: model.params.history.len(),
            learning_rate: model.params.learning_rate,
            top_kinds: top,
        })
    }

    async fn name_kinds(&self, kinds: &[String]) -> Result<usize, EngineError> {
        let mut model = self.model.lock().await;
        self.ensure_usable()?;
        let named = model.name_kinds(kinds);
        if named > 0 {
            debug!("Named {} restored kinds", named);
        }
        Ok(named)
    }

    async fn release(&self) {
        let mut model = self.model.lock().await;
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        *model = Model::blank(self.config.learning_rate);
        info!("Engine released");
    }
}
