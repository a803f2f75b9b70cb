//! CLI interface for tutor-agent

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::agent::gateway::{OpenRouterGateway, SharedGateway};
use crate::config::{self, Config};
use crate::learning::{LearningAgent, ProgressStore, QuizSubmission, SqliteProgressStore};
use crate::orchestrator::{CycleOrchestrator, CycleResult, QuizReady};
use crate::types::{Level, Topic, UserModel};

#[derive(Parser)]
#[command(name = "tutor-agent")]
#[command(
    about = "Adaptive learning pipeline: plan, teach, quiz and adapt with LLMs",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a learning cycle (plan, lesson, quiz, and optionally evaluation)
    Cycle {
        /// Subject to study
        #[arg(short, long)]
        topic: String,
        /// Learner level: beginner, intermediate or advanced
        #[arg(short, long, default_value = "beginner")]
        level: String,
        /// Learner id
        #[arg(short, long, default_value = "learner")]
        user: String,
        /// Comma-separated answer indices, e.g. "1,3,0,0,2"
        #[arg(short, long)]
        answers: Option<String>,
        /// Cycle state file: written when a quiz is ready, read back when answers are given
        #[arg(short, long)]
        state: Option<PathBuf>,
    },
    /// Submit a graded quiz to the learning agent
    Submit {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        topic: String,
        /// Score as a percentage
        #[arg(short, long)]
        score: f64,
        /// Answers as JSON
        #[arg(short, long)]
        answers: Option<String>,
    },
    /// Manage the topic graph
    Topics {
        #[command(subcommand)]
        command: TopicCommands,
    },
    /// Show recent quiz attempts and learning sessions
    History {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        topic: String,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Configure the agent
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Route a purpose (analyzer, generator, tutor, motivator) to a model
        #[arg(long, num_args = 2, value_names = ["PURPOSE", "MODEL"])]
        set_model: Option<Vec<String>>,
        /// Set OpenRouter API key
        #[arg(long)]
        set_api_key: Option<String>,
    },
}

#[derive(Subcommand)]
enum TopicCommands {
    /// Add or update a topic
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// Difficulty from 1 to 10
        #[arg(long)]
        difficulty: Option<u8>,
        /// Prerequisite topic id (repeatable)
        #[arg(long = "prereq")]
        prereqs: Vec<String>,
    },
}

/// Run the CLI
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Cycle { topic, level, user, answers, state } => {
            let level: Level = level.parse().map_err(anyhow::Error::msg)?;
            let answers = answers.as_deref().map(parse_answers).transpose()?;
            run_cycle(UserModel::new(user, topic, level), answers, state.as_deref()).await?;
        }
        Commands::Submit { user, topic, score, answers } => {
            let answers = match answers {
                Some(raw) => serde_json::from_str(&raw).context("--answers must be valid JSON")?,
                None => serde_json::Value::Null,
            };
            let config = Config::load()?;
            let agent = LearningAgent::new(gateway(&config)?, open_store(&config).await?);
            let outcome = agent
                .submit_quiz(QuizSubmission { user_id: user, topic_id: topic, score, answers })
                .await?;
            print_json(&outcome)?;
        }
        Commands::Topics { command } => match command {
            TopicCommands::Add { id, name, difficulty, prereqs } => {
                let config = Config::load()?;
                let store = open_store(&config).await?;
                store
                    .upsert_topic(&Topic { id: id.clone(), name, difficulty_level: difficulty })
                    .await?;
                for prereq in &prereqs {
                    store.add_prerequisite(&id, prereq).await?;
                }
                println!("Topic '{}' saved with {} prerequisite(s).", id, prereqs.len());
            }
        },
        Commands::History { user, topic, limit } => {
            let config = Config::load()?;
            let store = open_store(&config).await?;
            let attempts = store.recent_attempts(&user, &topic, limit).await?;
            let sessions = store.sessions(&user, &topic, limit).await?;
            print_json(&serde_json::json!({
                "attempts": attempts,
                "sessions": sessions,
            }))?;
        }
        Commands::Config { show, set_model, set_api_key } => {
            let mut config = Config::load()?;
            let mut changed = false;

            if let Some(key) = set_api_key {
                config::set_api_key(&key)?;
                changed = true;
            }
            if let Some(pair) = set_model {
                if let [purpose, model] = pair.as_slice() {
                    config::set_model(&mut config, purpose, model)?;
                    changed = true;
                }
            }
            if show || !changed {
                config::show_config(&config)?;
            }
        }
    }

    Ok(())
}

async fn run_cycle(
    user_model: UserModel,
    answers: Option<Vec<usize>>,
    state: Option<&Path>,
) -> Result<()> {
    let config = Config::load()?;
    let orchestrator = CycleOrchestrator::new(gateway(&config)?, config.planner.clone())
        .with_store(open_store(&config).await?);

    let pending = match (state, &answers) {
        (Some(path), Some(_)) if path.exists() => Some(QuizReady::load(path)?),
        _ => None,
    };

    let result = match (pending, answers) {
        (Some(pending), Some(answers)) => orchestrator.resume_cycle(pending, &answers).await?,
        (_, answers) => orchestrator.run_cycle(user_model, answers.as_deref()).await?,
    };

    if let Some(path) = state {
        result.sync_state_file(path)?;
        if matches!(result, CycleResult::QuizReady(_)) {
            eprintln!("Cycle state saved to {}", path.display());
        }
    }

    print_json(&result)
}

fn gateway(config: &Config) -> Result<SharedGateway> {
    Ok(Arc::new(OpenRouterGateway::from_config(config)?))
}

async fn open_store(config: &Config) -> Result<Arc<dyn ProgressStore>> {
    let path = config.database_path()?;
    let store = SqliteProgressStore::new(&path)
        .await
        .with_context(|| format!("Failed to open progress store at {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Parse "1,3,0,0,2" into answer indices
fn parse_answers(raw: &str) -> Result<Vec<usize>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .with_context(|| format!("Invalid answer index '{}'", s))
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
