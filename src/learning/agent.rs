//! Learning agent
//!
//! Handles a single quiz submission end to end: record it, diagnose it,
//! pick the next action, move mastery, and log a session. Model failures
//! degrade to canned text inside the analyzer and decision engine; storage
//! failures abort the run.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::store::{ProgressStore, QuizAttempt, SessionRecord};
use crate::agent::gateway::SharedGateway;
use crate::error::truncate_chars;
use crate::orchestrator::analyzer::analyze_quiz_errors;
use crate::orchestrator::decision::DecisionEngine;
use crate::orchestrator::mastery::{as_percent, next_mastery};
use crate::types::{AdaptationKind, Problem};

/// Attempts fed into the error analysis as recent history
pub const RECENT_ATTEMPTS: usize = 5;

/// Characters of the analysis kept as a session's rationale
pub const RATIONALE_CHARS: usize = 200;

/// A graded quiz handed to the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmission {
    pub user_id: String,
    pub topic_id: String,
    /// Percentage in `[0, 100]`
    pub score: f64,
    #[serde(default)]
    pub answers: serde_json::Value,
}

/// What the learner sees after a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningOutcome {
    pub decision: AdaptationKind,
    pub feedback: String,
    pub follow_up_problems: Vec<Problem>,
    pub error_analysis: String,
    /// Updated mastery as a rounded percentage
    pub new_mastery: u32,
    pub session_id: String,
}

pub struct LearningAgent {
    gateway: SharedGateway,
    decisions: DecisionEngine,
    store: Arc<dyn ProgressStore>,
}

impl LearningAgent {
    pub fn new(gateway: SharedGateway, store: Arc<dyn ProgressStore>) -> Self {
        Self {
            decisions: DecisionEngine::new(gateway.clone()),
            gateway,
            store,
        }
    }

    pub async fn submit_quiz(&self, submission: QuizSubmission) -> Result<LearningOutcome> {
        let QuizSubmission { user_id, topic_id, score, answers } = submission;
        let score = score.clamp(0.0, 100.0);
        info!(user = %user_id, topic = %topic_id, score, "Learning agent started");

        self.store
            .record_quiz_attempt(&QuizAttempt {
                user_id: user_id.clone(),
                topic_id: topic_id.clone(),
                score,
                answers: answers.clone(),
                attempted_at: Utc::now(),
            })
            .await
            .context("Failed to record quiz attempt")?;

        let current = self
            .store
            .mastery(&user_id, &topic_id)
            .await
            .context("Failed to read mastery")?
            .unwrap_or(0.0);
        let recent: Vec<f64> = self
            .store
            .recent_attempts(&user_id, &topic_id, RECENT_ATTEMPTS)
            .await
            .context("Failed to read recent attempts")?
            .into_iter()
            .map(|a| a.score)
            .collect();
        let prerequisites = self
            .store
            .prerequisites(&topic_id)
            .await
            .context("Failed to read prerequisites")?;
        debug!(
            mastery = current,
            attempts = recent.len(),
            prerequisites = prerequisites.len(),
            "Context gathered"
        );

        let error_analysis =
            analyze_quiz_errors(&self.gateway, score, &answers, &recent, current).await;

        let decision = self
            .decisions
            .decide(&error_analysis, current, score, &prerequisites)
            .await;
        let decision = self.decisions.execute(decision, &error_analysis, &topic_id).await;

        let new_mastery = next_mastery(current, score);
        self.store
            .set_mastery(&user_id, &topic_id, new_mastery)
            .await
            .context("Failed to update mastery")?;
        info!(
            from = as_percent(current),
            to = as_percent(new_mastery),
            "Mastery updated"
        );

        let session_id = Uuid::new_v4().to_string();
        self.store
            .record_session(&SessionRecord {
                id: session_id.clone(),
                user_id,
                topic_id,
                decision: decision.kind,
                feedback: decision.feedback.clone(),
                problems: decision.follow_up_problems.clone(),
                rationale: truncate_chars(&error_analysis, RATIONALE_CHARS).to_string(),
                created_at: Utc::now(),
            })
            .await
            .context("Failed to record learning session")?;
        debug!(session = %session_id, "Session stored");

        Ok(LearningOutcome {
            decision: decision.kind,
            feedback: decision.feedback,
            follow_up_problems: decision.follow_up_problems,
            error_analysis,
            new_mastery: as_percent(new_mastery),
            session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::gateway::ScriptedGateway;
    use crate::learning::store::InMemoryProgressStore;
    use crate::types::Topic;
    use serde_json::json;

    fn submission(score: f64) -> QuizSubmission {
        QuizSubmission {
            user_id: "u1".into(),
            topic_id: "limits".into(),
            score,
            answers: json!([1, 0, 2]),
        }
    }

    #[tokio::test]
    async fn test_submission_updates_mastery_and_logs_session() {
        let gateway = Arc::new(
            ScriptedGateway::new()
                .on("quiz performance", "Confuses one-sided limits.")
                .on("decision engine", "DRILL")
                .on("problem generator", r#"[{"problem": "lim x->0+ 1/x", "difficulty": "hard"}]"#),
        );
        let store = Arc::new(InMemoryProgressStore::new());
        store.set_mastery("u1", "limits", 0.4).await.unwrap();
        let agent = LearningAgent::new(gateway, store.clone());

        let outcome = agent.submit_quiz(submission(60.0)).await.unwrap();

        assert_eq!(outcome.decision, AdaptationKind::Drill);
        assert_eq!(outcome.follow_up_problems.len(), 1);
        assert_eq!(outcome.error_analysis, "Confuses one-sided limits.");
        assert_eq!(outcome.new_mastery, 49);

        let stored = store.mastery("u1", "limits").await.unwrap().unwrap();
        assert!((stored - 0.49).abs() < 1e-9);
        let sessions = store.sessions("u1", "limits", 10).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, outcome.session_id);
        assert_eq!(store.recent_attempts("u1", "limits", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_run_uses_fallbacks() {
        let store = Arc::new(InMemoryProgressStore::new());
        let algebra = Topic {
            id: "algebra".into(),
            name: "Algebra".into(),
            difficulty_level: None,
        };
        store.upsert_topic(&algebra).await.unwrap();
        store.add_prerequisite("limits", "algebra").await.unwrap();
        let agent = LearningAgent::new(Arc::new(ScriptedGateway::new()), store.clone());

        let outcome = agent.submit_quiz(submission(20.0)).await.unwrap();

        assert_eq!(outcome.decision, AdaptationKind::Reteach);
        assert!(outcome.feedback.contains("reviewing Algebra first"));
        assert!(outcome.follow_up_problems.is_empty());
        assert!(outcome.error_analysis.contains("below 50%"));
        assert_eq!(outcome.new_mastery, 3);
    }

    #[tokio::test]
    async fn test_rationale_is_truncated() {
        let long = "x".repeat(500);
        let gateway = Arc::new(
            ScriptedGateway::new()
                .on("quiz performance", long.as_str())
                .on("decision engine", "ADVANCE"),
        );
        let store = Arc::new(InMemoryProgressStore::new());
        let agent = LearningAgent::new(gateway, store.clone());

        agent.submit_quiz(submission(95.0)).await.unwrap();

        let sessions = store.sessions("u1", "limits", 1).await.unwrap();
        assert_eq!(sessions[0].rationale.chars().count(), RATIONALE_CHARS);
    }
}
