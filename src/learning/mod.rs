//! Incremental learning
//!
//! The engine contract, the adaptive reference engine, feature extraction
//! and the versioned state codec used to persist models between sessions.

pub mod codec;
pub mod engine;
pub mod features;

pub use codec::{ModelParameters, PERSISTED_HISTORY, STATE_SCHEMA_VERSION};
pub use engine::{
    spawn_train_step, AdaptiveEngine, KindWeight, LearningEngine, LearningInsights, RestoreOutcome,
    TrainHandle,
};
