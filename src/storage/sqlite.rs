//! SQLite-based persistent storage for container state and interactions

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::{EventLog, StateStore};
use crate::types::{InteractionEvent, LearnedState};

/// Stored state row, without the payload
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub user_id: String,
    pub size_bytes: usize,
    pub version: i32,
    pub created_at: String,
    pub updated_at: String,
}

/// One archived interaction
#[derive(Debug, Clone, Serialize)]
pub struct InteractionSummary {
    pub user_id: String,
    pub kind: String,
    pub details: String,
    pub timestamp: i64,
}

/// SQLite-backed state store and interaction log
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Database that lives only as long as this store
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS container_states (
                user_id TEXT PRIMARY KEY,
                state_data BLOB NOT NULL,
                version INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS interaction_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                type TEXT NOT NULL,
                details TEXT NOT NULL DEFAULT '{}',
                timestamp INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_interaction_user ON interaction_data(user_id);
            CREATE INDEX IF NOT EXISTS idx_interaction_timestamp ON interaction_data(timestamp DESC);
        "#)?;

        Ok(())
    }

    /// Per-kind interaction counts for a subject, most frequent first
    pub async fn interaction_counts(&self, subject_id: &str) -> Result<Vec<(String, u64)>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT type, COUNT(*) AS count FROM interaction_data
             WHERE user_id = ?1
             GROUP BY type
             ORDER BY count DESC, type ASC",
        )?;
        let rows = stmt.query_map(params![subject_id], |row| {
            let kind: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((kind, count.max(0) as u64))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Most recent interactions across all subjects
    pub async fn recent_interactions(&self, limit: usize) -> Result<Vec<InteractionSummary>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT user_id, type, details, timestamp FROM interaction_data
             ORDER BY timestamp DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(InteractionSummary {
                user_id: row.get(0)?,
                kind: row.get(1)?,
                details: row.get(2)?,
                timestamp: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// One line per stored container state
    pub async fn state_summaries(&self) -> Result<Vec<StateSummary>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT user_id, length(state_data), version, created_at, updated_at
             FROM container_states ORDER BY user_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let size: i64 = row.get(1)?;
            Ok(StateSummary {
                user_id: row.get(0)?,
                size_bytes: size.max(0) as usize,
                version: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn save(&self, subject_id: &str, state: &LearnedState) -> Result<()> {
        let conn = self.conn.lock().await;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"INSERT INTO container_states (user_id, state_data, version, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?4)
               ON CONFLICT(user_id) DO UPDATE SET
                   state_data = excluded.state_data,
                   version = excluded.version,
                   updated_at = excluded.updated_at"#,
            params![subject_id, state.payload, state.schema_version, now],
        )?;

        debug!("Saved {} byte state for {}", state.len(), subject_id);
        Ok(())
    }

    async fn load(&self, subject_id: &str) -> Result<Option<LearnedState>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT state_data, version FROM container_states WHERE user_id = ?1",
        )?;
        let state = stmt
            .query_row(params![subject_id], |row| {
                let payload: Vec<u8> = row.get(0)?;
                let version: i32 = row.get(1)?;
                Ok(LearnedState::new(payload, version))
            })
            .optional()?;

        Ok(state)
    }
}

#[async_trait]
impl EventLog for SqliteStore {
    async fn append(&self, event: &InteractionEvent) -> Result<()> {
        let details = serde_json::to_string(&event.attributes)?;
        let conn = self.conn.lock().await;

        conn.execute(
            "INSERT INTO interaction_data (user_id, type, details, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![event.subject_id, event.kind, details, event.occurred_at_millis],
        )?;

        Ok(())
    }

    async fn known_kinds(&self, subject_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT type FROM interaction_data WHERE user_id = ?1 ORDER BY type",
        )?;
        let rows = stmt.query_map(params![subject_id], |row| row.get::<_, String>(0))?;

        let mut kinds = Vec::new();
        for row in rows {
            kinds.push(row?);
        }
        Ok(kinds)
    }
}
