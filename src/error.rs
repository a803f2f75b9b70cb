//! Error taxonomy for the learning pipeline
//!
//! Parsing and gateway failures are the two leaf errors. Stage errors wrap
//! them with the stage that failed so callers get a single descriptive error.

use thiserror::Error;

/// Number of characters of raw model output kept for diagnostics when no
/// JSON region is found.
pub const RAW_SNIPPET_CHARS: usize = 500;

/// Number of characters of the repaired candidate shown in error messages.
pub const REPAIRED_SNIPPET_CHARS: usize = 1500;

/// Model output could not be turned into structured data
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("No JSON-like block found in LLM output. Raw start: {snippet}")]
    NoJson { snippet: String },

    #[error(
        "Failed to parse LLM JSON. First error: {first_error}; After repairs: {repair_error}. Candidate (repaired): {}",
        truncate_chars(.repaired, REPAIRED_SNIPPET_CHARS)
    )]
    Malformed {
        /// Candidate region before repairs
        original: String,
        /// Candidate region after textual repairs
        repaired: String,
        first_error: String,
        repair_error: String,
    },

    #[error("LLM JSON did not match expected {expected}: {message}")]
    Shape {
        expected: &'static str,
        message: String,
    },
}

/// Transport or provider failure while calling a model
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("LLM gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Failed to reach LLM provider: {0}")]
    Transport(String),

    #[error("LLM API error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("LLM returned no usable content (model {model})")]
    EmptyResponse { model: String },

    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Failure of a single model-backed step: either the call or its parse
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Sub-steps of curriculum planning, used to say where planning failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningStep {
    SubtopicMap,
    WeaknessAnalysis,
    CurriculumDraft,
    Optimization,
    Validation,
}

impl std::fmt::Display for PlanningStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanningStep::SubtopicMap => write!(f, "subtopic mapping"),
            PlanningStep::WeaknessAnalysis => write!(f, "weakness analysis"),
            PlanningStep::CurriculumDraft => write!(f, "curriculum draft"),
            PlanningStep::Optimization => write!(f, "curriculum optimization"),
            PlanningStep::Validation => write!(f, "curriculum validation"),
        }
    }
}

/// Quiz generation or evaluation failure
#[derive(Debug, Clone, Error)]
pub enum QuizError {
    #[error("quiz generation failed: {0}")]
    Generation(StageError),

    #[error("quiz evaluation failed: {0}")]
    Evaluation(StageError),

    #[error("quiz is malformed: {0}")]
    Invalid(String),

    #[error("expected {expected} answers for the quiz, got {actual}")]
    AnswerCountMismatch { expected: usize, actual: usize },
}

/// Error surfaced to callers of a learning cycle
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("User must choose a topic before planning")]
    MissingTopic,

    #[error("planning failed during {step}: {source}")]
    Planning {
        step: PlanningStep,
        #[source]
        source: StageError,
    },

    #[error("lesson generation failed: {0}")]
    Lesson(StageError),

    #[error(transparent)]
    Quiz(#[from] QuizError),

    #[error("Planner did not return a usable next subtopic")]
    NoSubtopic,

    #[error("progress store failed: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Short name of the stage that failed, for logs and API responses
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::MissingTopic | PipelineError::Planning { .. } => "planning",
            PipelineError::Lesson(_) => "lesson",
            PipelineError::Quiz(QuizError::Evaluation(_))
            | PipelineError::Quiz(QuizError::AnswerCountMismatch { .. }) => "evaluation",
            PipelineError::Quiz(_) => "quiz",
            PipelineError::NoSubtopic => "subtopic selection",
            PipelineError::Storage(_) => "storage",
        }
    }
}

/// Take at most `max` characters without splitting a code point
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
