//! Follow-up practice problems
//!
//! Never fails: anything other than a non-empty problem list from the model
//! is replaced with two built-in problems for the requested difficulty.

use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::gateway::{GatewayRequest, SharedGateway};
use crate::orchestrator::router::Purpose;
use crate::parser::parse_llm_json;
use crate::types::{Difficulty, Problem};

/// Most problems kept from one generation
pub const MAX_PROBLEMS: usize = 3;

const PROBLEM_TEMPERATURE: f32 = 0.8;

const PROBLEM_SYSTEM: &str = "You are an expert problem generator for adaptive learning. Create targeted practice problems.";

/// Generate 2-3 problems aimed at the gaps in `error_analysis`
pub async fn generate_follow_up_problems(
    gateway: &SharedGateway,
    error_analysis: &str,
    topic_id: &str,
    difficulty: Difficulty,
) -> Vec<Problem> {
    let user = format!(
        "A student just completed a quiz on {} with gaps in their understanding:\n{}\n\nGenerate 2-3 practice problems that directly target their weak areas.\nFocus on: {} difficulty level\n\nFormat your response as a JSON array with this structure:\n[\n  {{\n    \"problem\": \"The actual problem statement\",\n    \"topic\": \"Specific concept being tested\",\n    \"difficulty\": \"easy/medium/hard\",\n    \"hint\": \"A helpful hint if they get stuck\"\n  }}\n]\n\nMake sure the problems are DIFFERENT from typical textbook questions.\nInclude real-world applications when possible.\nRespond ONLY with a valid JSON array, no other text.",
        topic_id, error_analysis, difficulty
    );

    let raw = match gateway
        .invoke(GatewayRequest::new(Purpose::Generation, PROBLEM_SYSTEM, user, PROBLEM_TEMPERATURE))
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, %difficulty, "Problem generation failed, using built-in problems");
            return fallback_problems(difficulty);
        }
    };

    match parse_problems(&raw) {
        Some(mut problems) if !problems.is_empty() => {
            problems.truncate(MAX_PROBLEMS);
            debug!(count = problems.len(), "Follow-up problems generated");
            problems
        }
        _ => {
            warn!(%difficulty, "Problem list missing or empty, using built-in problems");
            fallback_problems(difficulty)
        }
    }
}

/// Problem list from model text: a bare array, a bracketed region inside
/// prose, or a fenced/object payload with a `problems` key
pub fn parse_problems(raw: &str) -> Option<Vec<Problem>> {
    if let Ok(problems) = serde_json::from_str::<Vec<Problem>>(raw.trim()) {
        return Some(problems);
    }

    if let (Some(start), Some(end)) = (raw.find('['), raw.rfind(']')) {
        if end > start {
            if let Ok(problems) = serde_json::from_str::<Vec<Problem>>(&raw[start..=end]) {
                return Some(problems);
            }
        }
    }

    let list = match parse_llm_json(raw).ok()? {
        Value::Object(mut map) => map.remove("problems")?,
        list @ Value::Array(_) => list,
        _ => return None,
    };
    serde_json::from_value(list).ok()
}

/// Built-in problems for one difficulty
pub fn fallback_problems(difficulty: Difficulty) -> Vec<Problem> {
    let canned: [(&str, &str, &str); 2] = match difficulty {
        Difficulty::Easy => [
            (
                "Practice problem 1: Basic understanding check",
                "Fundamentals",
                "Review the core concepts from the lesson",
            ),
            (
                "Practice problem 2: Simple application",
                "Application",
                "Apply what you learned in a straightforward way",
            ),
        ],
        Difficulty::Medium => [
            (
                "Practice problem 1: Standard problem",
                "Core Concept",
                "Consider how the concepts interact",
            ),
            (
                "Practice problem 2: Problem with twist",
                "Application",
                "Think about edge cases and exceptions",
            ),
        ],
        Difficulty::Hard => [
            (
                "Challenge problem 1: Complex scenario",
                "Advanced",
                "Break down the problem into smaller parts",
            ),
            (
                "Challenge problem 2: Multi-step solution",
                "Synthesis",
                "Combine multiple concepts to solve",
            ),
        ],
    };

    canned
        .into_iter()
        .map(|(problem, topic, hint)| Problem {
            problem: problem.to_string(),
            topic: topic.to_string(),
            difficulty,
            hint: Some(hint.to_string()),
        })
        .collect()
}
