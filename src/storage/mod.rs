//! Persistence collaborators
//!
//! The container depends only on these two traits. Stores are injected at
//! construction; there is no process-wide database handle.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::types::{InteractionEvent, LearnedState};

pub use sqlite::{InteractionSummary, SqliteStore, StateSummary};

/// Durable home of learned state, keyed by subject
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn save(&self, subject_id: &str, state: &LearnedState) -> Result<()>;

    /// `Ok(None)` means no prior state for this subject
    async fn load(&self, subject_id: &str) -> Result<Option<LearnedState>>;
}

/// Archive of ingested events
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: &InteractionEvent) -> Result<()>;

    /// Distinct event kinds archived for a subject
    async fn known_kinds(&self, subject_id: &str) -> Result<Vec<String>>;
}

/// In-process store for tests and embedders that persist elsewhere
#[derive(Default)]
pub struct MemoryStore {
    states: RwLock<HashMap<String, LearnedState>>,
    events: RwLock<Vec<InteractionEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<InteractionEvent> {
        self.events.read().await.clone()
    }

    pub async fn state_count(&self) -> usize {
        self.states.read().await.len()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn save(&self, subject_id: &str, state: &LearnedState) -> Result<()> {
        self.states
            .write()
            .await
            .insert(subject_id.to_string(), state.clone());
        Ok(())
    }

    async fn load(&self, subject_id: &str) -> Result<Option<LearnedState>> {
        Ok(self.states.read().await.get(subject_id).cloned())
    }
}

#[async_trait]
impl EventLog for MemoryStore {
    async fn append(&self, event: &InteractionEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn known_kinds(&self, subject_id: &str) -> Result<Vec<String>> {
        let kinds: BTreeSet<String> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.subject_id == subject_id)
            .map(|e| e.kind.clone())
            .collect();
        Ok(kinds.into_iter().collect())
    }
}
