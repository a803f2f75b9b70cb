//! Tutor Agent - adaptive learning pipeline library
//!
//! Drives a learner through plan, lesson, quiz and evaluation using
//! role-routed LLM calls:
//! - Tolerant parsing of model output into JSON
//! - Curriculum planning, lesson and quiz generation
//! - Adaptive decisions (DRILL, RETEACH, ADVANCE, REINFORCE) with rule fallbacks
//! - Progress persistence in SQLite
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tutor_agent::{Config, CycleOrchestrator, OpenRouterGateway, UserModel, Level};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let gateway = Arc::new(OpenRouterGateway::from_config(&config)?);
//!     let orchestrator = CycleOrchestrator::new(gateway, config.planner.clone());
//!     let model = UserModel::new("learner", "Calculus", Level::Beginner);
//!     let result = orchestrator.run_cycle(model, None).await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

pub mod types;
pub mod error;
pub mod parser;
pub mod agent;
pub mod config;
pub mod security;
pub mod orchestrator;
pub mod learning;
pub mod cli;

pub use agent::{LlmGateway, OpenRouterClient, OpenRouterGateway, ScriptedGateway, SharedGateway};

pub use config::Config;

pub use error::{GatewayError, ParseError, PipelineError, QuizError, StageError};

pub use learning::{InMemoryProgressStore, LearningAgent, ProgressStore, SqliteProgressStore};

pub use orchestrator::{CycleOrchestrator, CycleResult, PlanResult, Purpose, QuizReady};

pub use parser::parse_llm_json;

pub use security::{delete_api_key, get_api_key, set_api_key};

pub use types::{Level, UserModel};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Adaptive Learning Pipeline", NAME, VERSION)
}
