//! Error types for the container runtime
//!
//! Decode and persistence failures are recovered close to where they happen;
//! only a failure to build the engine itself is fatal to a container.

use thiserror::Error;

use crate::container::ContainerLifecycleState;

/// The engine could not reach a usable state, even blank.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Container cannot be initialized from state {0}")]
    InvalidState(ContainerLifecycleState),

    #[error("Engine construction failed: {0}")]
    Engine(String),
}

/// Learned-state bytes are malformed or from an unknown schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("Unsupported schema version {found} (expected {expected})")]
    UnsupportedVersion { found: i32, expected: i32 },

    #[error("Buffer truncated reading {field}: need {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{0} trailing bytes after history")]
    TrailingBytes(usize),

    #[error("Invalid learning rate {0}")]
    InvalidLearningRate(f32),
}

/// Saving learned state failed. The container stays `Ready`.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Container is not ready (state {0})")]
    NotReady(ContainerLifecycleState),

    #[error("Engine refused snapshot: {0}")]
    Engine(#[from] EngineError),

    #[error("Store failed: {0}")]
    Store(#[source] anyhow::Error),
}

/// A textual instruction could not be parsed. Nothing from the input is applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstructionParseError {
    #[error("line {line}: expected key=value, got {text:?}")]
    Malformed { line: usize, text: String },

    #[error("line {line}: unknown instruction key {key:?}")]
    UnknownKey { line: usize, key: String },

    #[error("line {line}: invalid value {value:?} for {key}")]
    InvalidValue { line: usize, key: String, value: String },

    #[error("line {line}: {key} value {value} is outside [0, 1]")]
    OutOfRange { line: usize, key: String, value: f32 },
}

/// Engine contract violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Engine used before initialize")]
    NotInitialized,

    #[error("Engine used after release")]
    Released,

    #[error("Rejected learned state: {0}")]
    InvalidState(#[from] DecodeError),
}

/// Orchestrator operations invoked outside the state that allows them.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Container is not ready (state {0})")]
    NotReady(ContainerLifecycleState),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
