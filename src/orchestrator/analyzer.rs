//! Quiz error analysis
//!
//! Free-text diagnosis of a quiz submission. Feeds the decision engine, so
//! it always produces something: on gateway failure a canned analysis by
//! score band is returned.

use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::gateway::{GatewayRequest, SharedGateway};
use crate::orchestrator::mastery::as_percent;
use crate::orchestrator::router::Purpose;

const ANALYSIS_TEMPERATURE: f32 = 0.5;

const ANALYSIS_SYSTEM: &str = "You are an expert AI tutor analyzing student quiz performance. Identify specific learning gaps and patterns.";

/// Analyze a quiz submission.
///
/// `score` is a percentage, `recent_scores` the learner's latest attempt
/// scores (newest first) and `current_mastery` in `[0, 1]`.
pub async fn analyze_quiz_errors(
    gateway: &SharedGateway,
    score: f64,
    answers: &Value,
    recent_scores: &[f64],
    current_mastery: f64,
) -> String {
    let recent = recent_scores
        .iter()
        .map(|s| format!("{}%", s.round()))
        .collect::<Vec<_>>()
        .join(", ");
    let user = format!(
        "You are an expert educational tutor analyzing student performance.\n\nQuiz Results:\n- Score: {}/100\n- Student answers: {}\n- Recent performance: {}\n- Current mastery: {}%\n\nANALYZE:\n1. What specific concepts did the student struggle with?\n2. What patterns do you see in the errors?\n3. Are there prerequisite knowledge gaps?\n4. Is this a one-time mistake or a consistent pattern?\n\nBe concise and actionable. Focus on what to teach next.",
        score.round(),
        answers,
        if recent.is_empty() { "none".to_string() } else { recent },
        as_percent(current_mastery)
    );

    match gateway
        .invoke(GatewayRequest::new(Purpose::Analysis, ANALYSIS_SYSTEM, user, ANALYSIS_TEMPERATURE))
        .await
    {
        Ok(analysis) => {
            debug!(chars = analysis.len(), "Quiz error analysis received");
            analysis
        }
        Err(e) => {
            warn!(error = %e, "Quiz error analysis failed, using canned analysis");
            fallback_analysis(score)
        }
    }
}

/// Canned analysis by score band
pub fn fallback_analysis(score: f64) -> String {
    if score < 50.0 {
        "Student scored below 50%. Significant gaps in this topic detected. Recommend reteaching fundamentals.".to_string()
    } else if score < 70.0 {
        "Student scored between 50-70%. Mixed understanding. Recommend targeted practice on weak areas.".to_string()
    } else {
        "Student performed well. Ready for advanced topics or consolidation.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::gateway::{LlmGateway, ScriptedGateway};
    use crate::error::GatewayError;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_fallback_bands() {
        assert!(fallback_analysis(49.9).contains("below 50%"));
        assert!(fallback_analysis(50.0).contains("Mixed understanding"));
        assert!(fallback_analysis(69.0).contains("Mixed understanding"));
        assert!(fallback_analysis(70.0).contains("performed well"));
    }

    #[tokio::test]
    async fn test_analysis_from_model() {
        let scripted = Arc::new(
            ScriptedGateway::new().on("quiz performance", "Struggles with limits at infinity."),
        );
        let gateway: SharedGateway = scripted.clone();

        let analysis =
            analyze_quiz_errors(&gateway, 40.0, &json!([1, 2]), &[60.0, 55.0], 0.35).await;

        assert_eq!(analysis, "Struggles with limits at infinity.");
        let request = &scripted.requests()[0];
        assert_eq!(request.purpose, Purpose::Analysis);
        assert!((request.temperature - 0.5).abs() < f32::EPSILON);
        assert!(request.user_prompt.contains("Recent performance: 60%, 55%"));
        assert!(request.user_prompt.contains("Current mastery: 35%"));
    }

    #[tokio::test]
    async fn test_analysis_falls_back_on_gateway_error() {
        let gateway: Arc<dyn LlmGateway> = Arc::new(ScriptedGateway::new().fail_on(
            "quiz",
            GatewayError::Transport("connection reset".into()),
        ));
        let analysis = analyze_quiz_errors(&gateway, 85.0, &json!({}), &[], 0.9).await;
        assert!(analysis.contains("performed well"));
    }
}
