//! Karl Container - on-device adaptive learning runtime
//!
//! A per-user container that:
//! - Ingests interaction events without blocking the caller
//! - Trains an incremental model on a single worker, in order
//! - Serves predictions filtered by user instructions
//! - Persists learned state in a versioned binary format
//!
//! # Example
//!
//! ```ignore
//! use karl_container::{ContainerOrchestrator, EngineConfig, InteractionEvent, MemoryStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let container = ContainerOrchestrator::new("user-1", EngineConfig::default(), Arc::new(MemoryStore::new()));
//!     container.initialize_from_store().await?;
//!     container.ingest(InteractionEvent::new("click", "user-1"));
//!     container.save_state().await?;
//!     container.release().await;
//!     Ok(())
//! }
//! ```

// Core modules (order matters for cross-module dependencies)
pub mod types;
pub mod error;
pub mod config;
pub mod instructions;
pub mod learning;
pub mod storage;
pub mod pipeline;
pub mod container;
pub mod cli;

// Re-export commonly used types for convenience
pub use types::{AttributeValue, InteractionEvent, LearnedState, Prediction};

pub use error::{ContainerError, DecodeError, EngineError, InitError, InstructionParseError, PersistError};

pub use config::{Config, EngineConfig};

pub use instructions::{parse_instructions, Instruction, InstructionEngine};

pub use learning::{AdaptiveEngine, LearningEngine, LearningInsights};

pub use storage::{EventLog, MemoryStore, SqliteStore, StateStore};

pub use pipeline::{EventSource, InteractionPipeline, LocalEventSource, Subscription};

pub use container::{ContainerLifecycleState, ContainerOrchestrator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - On-device adaptive learning container", NAME, VERSION)
}
