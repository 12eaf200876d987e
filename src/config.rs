//! Configuration management
//!
//! Engine tuning, storage location and default instructions, stored as TOML
//! in the platform config directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::InitError;
use crate::instructions::{parse_instructions, Instruction};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Learning engine settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Persistence settings
    #[serde(default)]
    pub storage: StorageConfig,
    /// Default instructions
    #[serde(default)]
    pub instructions: InstructionsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Step size of each incremental update, in (0, 1]
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    /// Recent-history window length
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Share of a prediction score that comes from context transitions, in [0, 1]
    #[serde(default = "default_context_weight")]
    pub context_weight: f32,
    /// Alternatives attached to each prediction
    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,
}

fn default_learning_rate() -> f32 {
    0.1
}

fn default_history_capacity() -> usize {
    50
}

fn default_context_weight() -> f32 {
    0.5
}

fn default_max_alternatives() -> usize {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            history_capacity: default_history_capacity(),
            context_weight: default_context_weight(),
            max_alternatives: default_max_alternatives(),
        }
    }
}

impl EngineConfig {
    /// Reject settings no engine can run with
    pub fn validate(&self) -> std::result::Result<(), InitError> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(InitError::InvalidConfig(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        if self.history_capacity == 0 {
            return Err(InitError::InvalidConfig("history_capacity must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.context_weight) {
            return Err(InitError::InvalidConfig(format!(
                "context_weight must be in [0, 1], got {}",
                self.context_weight
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file; defaults to `karl_database.db` in the data directory
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Archive ingested events in the interaction log
    #[serde(default = "default_true")]
    pub log_interactions: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_interactions: true,
        }
    }
}

impl StorageConfig {
    pub fn resolved_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("karl_database.db")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstructionsConfig {
    /// Rules in the textual `key=value` format
    #[serde(default)]
    pub rules: Vec<String>,
}

impl InstructionsConfig {
    /// Parse all configured rules; one bad rule rejects the set
    pub fn parsed(&self) -> Result<Vec<Instruction>> {
        let joined = self.rules.join("\n");
        parse_instructions(&joined).context("Invalid instruction in configuration")
    }
}

impl Config {
    /// Load configuration from file, writing defaults on first run
    pub fn load() -> Result<Self> {
        let config_path = config_path()?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .context("Failed to read config file")?;
            Self::from_toml_str(&contents)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = config_path()?;
        let parent = config_path.parent()
            .context("Config path has no parent")?;

        std::fs::create_dir_all(parent)
            .context("Failed to create config directory")?;

        std::fs::write(&config_path, self.to_toml()?)
            .context("Failed to write config file")?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

/// Get the configuration file path
pub fn config_path() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "karl", "karl")
        .context("Failed to get project directories")?;
    Ok(base.config_dir().join("config.toml"))
}

/// Get the data directory path
pub fn data_dir() -> Result<PathBuf> {
    let base = directories::ProjectDirs::from("com", "karl", "karl")
        .context("Failed to get project directories")?;
    Ok(base.data_dir().to_path_buf())
}
