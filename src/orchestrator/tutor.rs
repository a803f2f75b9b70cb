//! Lesson stage
//!
//! One model call per lesson. There is no fallback content: a lesson is
//! required for the cycle to continue.

use tracing::{debug, info, warn};

use crate::agent::gateway::{GatewayRequest, SharedGateway, DEFAULT_TEMPERATURE};
use crate::error::{PipelineError, StageError};
use crate::orchestrator::router::Purpose;
use crate::parser::parse_llm_as;
use crate::types::{Lesson, UserModel};

const LESSON_SYSTEM: &str = "You are an education-focused lesson generation AI.
You MUST return structured JSON only.

Your responsibilities:
- Write a clear, structured lesson for the given subtopic.
- Adapt content to the student's level: beginner, intermediate, advanced.
- Use the mastery scores to pitch depth and tone: go slower where scores are low.
- Include:
  * Title
  * Learning objectives
  * Explanation
  * Step-by-step examples
  * One mini-check (small question)
  * 2-3 practice problems (no solutions)
  * Optional visual explanation (ASCII if needed)

Do NOT include extra commentary.";

/// Generates one structured lesson per subtopic
pub struct Tutor {
    gateway: SharedGateway,
}

impl Tutor {
    pub fn new(gateway: SharedGateway) -> Self {
        Self { gateway }
    }

    pub async fn generate_lesson(
        &self,
        subtopic: &str,
        user_model: &UserModel,
    ) -> Result<Lesson, PipelineError> {
        info!(subtopic, level = %user_model.level, "Generating lesson");

        let mastery =
            serde_json::to_string(&user_model.mastery).unwrap_or_else(|_| "{}".to_string());
        let user = format!(
            "Subtopic to teach: \"{}\"\nStudent Level: {}\nMastery Scores: {}\n\nReturn JSON in EXACT format:\n\n{{\n  \"lessonId\": \"\",\n  \"title\": \"\",\n  \"subtopic\": \"\",\n  \"level\": \"\",\n  \"objectives\": [\"\"],\n  \"explanation\": \"\",\n  \"examples\": [\n    {{\n      \"header\": \"\",\n      \"steps\": [\"\"]\n    }}\n  ],\n  \"miniCheck\": \"\",\n  \"practiceProblems\": [\"\"],\n  \"asciiVisual\": \"\"\n}}",
            subtopic, user_model.level, mastery
        );

        let raw = self
            .gateway
            .invoke(GatewayRequest::new(
                Purpose::Tutoring,
                LESSON_SYSTEM,
                user,
                DEFAULT_TEMPERATURE,
            ))
            .await
            .map_err(lesson_error)?;
        let mut lesson: Lesson = parse_llm_as(raw, "lesson").map_err(lesson_error)?;

        if lesson.subtopic.trim().is_empty() {
            lesson.subtopic = subtopic.to_string();
        }
        if lesson.level.trim().is_empty() {
            lesson.level = user_model.level.to_string();
        }

        debug!(
            title = %lesson.title,
            examples = lesson.examples.len(),
            problems = lesson.practice_problems.len(),
            "Lesson parsed"
        );
        Ok(lesson)
    }
}

fn lesson_error(source: impl Into<StageError>) -> PipelineError {
    let source = source.into();
    warn!(error = %source, "Lesson generation failed");
    PipelineError::Lesson(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::gateway::ScriptedGateway;
    use crate::error::ParseError;
    use crate::types::Level;
    use std::sync::Arc;

    const LESSON: &str = r#"Here is your lesson:
```json
{
  "lessonId": "lesson-1",
  "title": "Chain Rule Basics",
  "subtopic": "",
  "level": "beginner",
  "objectives": ["Apply the chain rule"],
  "explanation": "Differentiate the outer function, then multiply by the inner derivative.",
  "examples": [{"header": "Example 1", "steps": ["outer", "inner", "multiply"]}],
  "miniCheck": "What is d/dx (2x+1)^2?",
  "practiceProblems": ["Differentiate (3x+1)^5"],
  "asciiVisual": ""
}
```"#;

    #[tokio::test]
    async fn test_generate_lesson() {
        let gateway = Arc::new(ScriptedGateway::new().on("lesson generation", LESSON));
        let tutor = Tutor::new(gateway.clone());
        let mut model = UserModel::new("u1", "Calculus", Level::Beginner);
        model.mastery.insert("chain_rule".to_string(), 0.2);

        let lesson = tutor.generate_lesson("Chain Rule", &model).await.unwrap();

        assert_eq!(lesson.title, "Chain Rule Basics");
        assert_eq!(lesson.subtopic, "Chain Rule");
        assert_eq!(lesson.examples[0].steps.len(), 3);

        let request = &gateway.requests()[0];
        assert_eq!(request.purpose, Purpose::Tutoring);
        assert!(request.user_prompt.contains("Student Level: beginner"));
        assert!(request.user_prompt.contains("\"chain_rule\":0.2"));
    }

    #[tokio::test]
    async fn test_unparseable_lesson_is_fatal() {
        let gateway = Arc::new(ScriptedGateway::new().on("lesson generation", "no lesson today"));
        let tutor = Tutor::new(gateway);
        let err = tutor
            .generate_lesson("Limits", &UserModel::new("u1", "Calculus", Level::Advanced))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Lesson(StageError::Parse(ParseError::NoJson { .. }))));
        assert_eq!(err.stage(), "lesson");
    }
}
