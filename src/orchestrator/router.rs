//! Purpose-based model router
//!
//! Every model call names a purpose; the routing table maps it to a model id.
//! Purposes differ in cost/latency/quality, never in what callers see.

use serde::{Deserialize, Serialize};

use crate::config::ModelsConfig;

/// Routing key for a model call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    /// Fast pattern recognition: weakness analysis, grading, error analysis
    Analysis,
    /// Creative generation: subtopic maps, quizzes, practice problems
    Generation,
    /// Deep reasoning: lessons, curriculum design, adaptive decisions
    Tutoring,
    /// Motivational framing of feedback
    Motivation,
}

impl Purpose {
    pub const ALL: [Purpose; 4] = [
        Purpose::Analysis,
        Purpose::Generation,
        Purpose::Tutoring,
        Purpose::Motivation,
    ];

    /// Name used in config files and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Analysis => "analyzer",
            Purpose::Generation => "generator",
            Purpose::Tutoring => "tutor",
            Purpose::Motivation => "motivator",
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analyzer" | "analysis" => Ok(Purpose::Analysis),
            "generator" | "generation" | "quiz_generator" => Ok(Purpose::Generation),
            "tutor" | "tutoring" => Ok(Purpose::Tutoring),
            "motivator" | "motivation" => Ok(Purpose::Motivation),
            other => Err(format!(
                "Unknown purpose '{}'. Available: {}",
                other,
                ModelsConfig::roles().join(", ")
            )),
        }
    }
}

/// Model configuration for one purpose
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model: String,
    pub max_tokens: u32,
}

/// Static purpose → model table
#[derive(Debug, Clone)]
pub struct ModelRouter {
    models: ModelsConfig,
    max_tokens: u32,
}

impl ModelRouter {
    pub fn new(models: ModelsConfig, max_tokens: u32) -> Self {
        Self { models, max_tokens }
    }

    /// Model serving `purpose`
    pub fn route(&self, purpose: Purpose) -> ModelConfig {
        let model = match purpose {
            Purpose::Analysis => &self.models.analyzer,
            Purpose::Generation => &self.models.generator,
            Purpose::Tutoring => &self.models.tutor,
            Purpose::Motivation => &self.models.motivator,
        };
        ModelConfig {
            model: model.clone(),
            max_tokens: self.max_tokens,
        }
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new(ModelsConfig::default(), crate::config::DEFAULT_MAX_TOKENS)
    }
}
