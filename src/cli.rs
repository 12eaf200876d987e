//! CLI interface for karl

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::container::ContainerOrchestrator;
use crate::instructions::Instruction;
use crate::storage::SqliteStore;
use crate::types::{AttributeValue, InteractionEvent, LearnedState};

#[derive(Parser)]
#[command(name = "karl")]
#[command(about = "On-device adaptive learning container", long_about = None)]
#[command(version)]
struct Cli {
    /// Subject whose container to operate on
    #[arg(short, long, global = true, env = "KARL_SUBJECT", default_value = "default")]
    subject: String,

    /// Database file (overrides the configured path)
    #[arg(long, global = true, env = "KARL_DATABASE")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one interaction and train on it
    Ingest {
        /// Interaction kind, e.g. "click"
        #[arg(short, long)]
        kind: String,
        /// Attribute as key=value (repeatable)
        #[arg(short, long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Suggest the next interaction
    Predict {
        /// Recent interaction kinds, oldest first (repeatable)
        #[arg(short, long = "context", value_name = "KIND")]
        context: Vec<String>,
        /// Instruction such as min_confidence=0.8 (repeatable)
        #[arg(short, long = "rule", value_name = "RULE")]
        rules: Vec<String>,
    },
    /// Show what the container has learned
    Insights,
    /// Forget everything learned for the subject
    Reset,
    /// Write the learned state to a file
    Export {
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Replace the learned state with one read from a file
    Import {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Summarize the database contents
    Inspect {
        /// Number of recent interactions to list
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Print the effective configuration
    Config,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    let database = match cli.database {
        Some(path) => path,
        None => config.storage.resolved_database_path()?,
    };

    match cli.command {
        Commands::Config => {
            println!("# database: {}", database.display());
            print!("{}", config.to_toml()?);
            return Ok(());
        }
        Commands::Inspect { limit } => {
            let store = SqliteStore::new(&database).await?;
            return inspect(&store, &database, limit).await;
        }
        _ => {}
    }

    let store = Arc::new(SqliteStore::new(&database).await?);
    let container = open_container(&cli.subject, &config, store.clone()).await?;

    let outcome = match cli.command {
        Commands::Ingest { kind, attrs } => {
            let mut event = InteractionEvent::new(kind, cli.subject.clone());
            for attr in &attrs {
                let (key, value) = parse_attribute(attr)?;
                event = event.with_attribute(key, value);
            }
            let kind = event.kind.clone();
            container.ingest(event);
            let state = container.save_state().await?;
            println!("Recorded {} for {} ({} byte state)", kind, cli.subject, state.len());
            Ok(())
        }
        Commands::Predict { context, rules } => {
            predict(&container, &cli.subject, &config, &context, &rules).await
        }
        Commands::Insights => {
            let insights = container.insights().await?;
            println!("{}", serde_json::to_string_pretty(&insights)?);
            Ok(())
        }
        Commands::Reset => {
            container.reset().await;
            container.save_state().await?;
            println!("Reset learned state for {}", cli.subject);
            Ok(())
        }
        Commands::Export { out } => {
            let state = container.save_state().await?;
            tokio::fs::write(&out, state.to_bytes())
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!("Exported {} byte state to {}", state.len(), out.display());
            Ok(())
        }
        Commands::Import { file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let state = LearnedState::from_bytes(&bytes)?;
            container.import_state(&state).await?;
            container.save_state().await?;
            println!("Imported state from {}", file.display());
            Ok(())
        }
        Commands::Inspect { .. } | Commands::Config => Ok(()),
    };

    container.release().await;
    outcome
}

async fn open_container(subject: &str, config: &Config, store: Arc<SqliteStore>) -> Result<ContainerOrchestrator> {
    let mut container = ContainerOrchestrator::new(subject, config.engine.clone(), store.clone())
        .with_training_instructions(config.instructions.parsed()?);
    if config.storage.log_interactions {
        container = container.with_event_log(store);
    }

    container.initialize_from_store().await?;
    Ok(container)
}

async fn predict(
    container: &ContainerOrchestrator,
    subject: &str,
    config: &Config,
    context: &[String],
    rules: &[String],
) -> Result<()> {
    let mut instructions = config.instructions.parsed()?;
    for rule in rules {
        let instruction: Instruction = rule
            .parse()
            .with_context(|| format!("Invalid rule {:?}", rule))?;
        instructions.push(instruction);
    }

    let context: Vec<InteractionEvent> = context
        .iter()
        .map(|kind| InteractionEvent::new(kind.as_str(), subject))
        .collect();

    match container.predict(&context, &instructions).await? {
        Some(prediction) => println!("{}", serde_json::to_string_pretty(&prediction)?),
        None => println!("No prediction"),
    }
    Ok(())
}

async fn inspect(store: &SqliteStore, database: &std::path::Path, limit: usize) -> Result<()> {
    println!("\nDatabase: {}", database.display());

    let states = store.state_summaries().await?;
    println!("\nContainer states ({})", states.len());
    for state in &states {
        println!(
            "  {:<20} {:>8} bytes  v{}  updated {}",
            state.user_id, state.size_bytes, state.version, state.updated_at
        );
        for (kind, count) in store.interaction_counts(&state.user_id).await? {
            println!("      {:<16} {}", kind, count);
        }
    }

    let recent = store.recent_interactions(limit).await?;
    println!("\nRecent interactions ({})", recent.len());
    for interaction in &recent {
        println!(
            "  {:>14}  {:<20} {:<16} {}",
            interaction.timestamp, interaction.user_id, interaction.kind, interaction.details
        );
    }

    Ok(())
}

/// Split `key=value`, typing the value as bool, integer, float, or text
fn parse_attribute(raw: &str) -> Result<(String, AttributeValue)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Attribute {:?} is not key=value", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Attribute {:?} has an empty key", raw);
    }

    let value = value.trim();
    let value = if let Ok(b) = value.parse::<bool>() {
        AttributeValue::Bool(b)
    } else if let Ok(i) = value.parse::<i64>() {
        AttributeValue::Int(i)
    } else if let Ok(x) = value.parse::<f64>() {
        AttributeValue::Float(x)
    } else {
        AttributeValue::Text(value.to_string())
    };

    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attribute_types() {
        assert_eq!(parse_attribute("seen=true").unwrap(), ("seen".into(), AttributeValue::Bool(true)));
        assert_eq!(parse_attribute("ms=250").unwrap(), ("ms".into(), AttributeValue::Int(250)));
        assert_eq!(parse_attribute("ratio=0.5").unwrap(), ("ratio".into(), AttributeValue::Float(0.5)));
        assert_eq!(parse_attribute("screen = home").unwrap(), ("screen".into(), AttributeValue::Text("home".into())));
        assert!(parse_attribute("novalue").is_err());
        assert!(parse_attribute("=1").is_err());
    }

    #[test]
    fn test_cli_parses_repeated_flags() {
        let cli = Cli::try_parse_from([
            "karl", "--subject", "u1", "predict", "--context", "a", "--context", "b", "--rule", "min_confidence=0.5",
        ])
        .unwrap();
        assert_eq!(cli.subject, "u1");
        match cli.command {
            Commands::Predict { context, rules } => {
                assert_eq!(context, vec!["a", "b"]);
                assert_eq!(rules, vec!["min_confidence=0.5"]);
            }
            _ => panic!("expected predict"),
        }
    }
}
