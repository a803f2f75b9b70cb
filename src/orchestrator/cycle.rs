//! Cycle orchestrator
//!
//! Runs one learning cycle as a two-phase protocol:
//!
//! - Phase A (no answers): plan, pick the next subtopic, generate a lesson
//!   and a quiz, and hand the quiz back without scoring.
//! - Phase B (answers supplied): everything in phase A, then grade, update
//!   mastery, re-plan with the graded quiz as test input and recommend the
//!   next subtopic.
//!
//! Stages run strictly in order. Planning, lesson, quiz and evaluation
//! failures abort the cycle with an error naming the stage.

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::gateway::SharedGateway;
use crate::config::PlannerConfig;
use crate::error::PipelineError;
use crate::learning::store::{ProgressStore, QuizAttempt};
use crate::orchestrator::planner::{CurriculumPlan, Planner, SubtopicMapPlan};
use crate::orchestrator::quiz::QuizMaster;
use crate::orchestrator::tutor::Tutor;
use crate::types::{
    CurriculumEntry, EvaluationResult, HistoryEntry, Lesson, Quiz, Subtopic, SubtopicMap, UserModel,
};

/// What a planning pass produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanResult {
    /// The plan is already a subtopic name
    Subtopic(String),
    /// A validated curriculum
    Curriculum(CurriculumPlan),
    /// Only a subtopic map
    SubtopicMap(SubtopicMapPlan),
}

impl PlanResult {
    /// Interpret a loosely shaped plan value.
    ///
    /// Strings are taken as subtopic names. Objects become a curriculum plan
    /// when they carry a `curriculum` list, otherwise a subtopic-map plan built
    /// from the first non-empty `subtopicMap` or `subtopics` list.
    pub fn from_value(value: &Value) -> Option<PlanResult> {
        match value {
            Value::String(s) => Some(PlanResult::Subtopic(s.clone())),
            Value::Object(map) => {
                let subject = map
                    .get("subject")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let subtopic_map = ["subtopicMap", "subtopics"]
                    .iter()
                    .filter_map(|key| map.get(*key))
                    .filter_map(|v| serde_json::from_value::<SubtopicMap>(v.clone()).ok())
                    .find(|m| !m.is_empty())
                    .unwrap_or_default();

                let curriculum = map
                    .get("curriculum")
                    .and_then(|v| serde_json::from_value::<Vec<CurriculumEntry>>(v.clone()).ok())
                    .filter(|c| !c.is_empty());
                Some(match curriculum {
                    Some(curriculum) => PlanResult::Curriculum(CurriculumPlan {
                        subject,
                        subtopic_map,
                        curriculum,
                        ..Default::default()
                    }),
                    None => PlanResult::SubtopicMap(SubtopicMapPlan { subject, subtopic_map }),
                })
            }
            _ => None,
        }
    }

    /// Subtopic to teach next, if the plan names one
    pub fn next_subtopic(&self) -> Option<String> {
        extract_next_subtopic(self)
    }
}

/// Resolve the next subtopic from a plan.
///
/// Precedence: the plan itself when it is a name; the first curriculum
/// entry's subtopic, else its title; the first subtopic-map entry's name,
/// else its id. Empty strings count as absent.
pub fn extract_next_subtopic(plan: &PlanResult) -> Option<String> {
    match plan {
        PlanResult::Subtopic(name) => non_empty(name),
        PlanResult::Curriculum(plan) => match plan.curriculum.first() {
            Some(entry) => non_empty(&entry.subtopic).or_else(|| non_empty(&entry.title)),
            None => first_subtopic(&plan.subtopic_map),
        },
        PlanResult::SubtopicMap(plan) => first_subtopic(&plan.subtopic_map),
    }
}

fn first_subtopic(map: &SubtopicMap) -> Option<String> {
    map.first().and_then(|s: &Subtopic| non_empty(&s.name).or_else(|| non_empty(&s.id)))
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Phase A output: a quiz waiting for answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizReady {
    pub plan: PlanResult,
    pub next_subtopic: String,
    pub lesson: Lesson,
    pub quiz: Quiz,
    pub user_model: UserModel,
}

impl QuizReady {
    /// Save to a JSON state file so the cycle can be resumed later
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize cycle state")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write cycle state to {}", path.display()))?;
        Ok(())
    }

    /// Load a state file written by [`QuizReady::save`]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cycle state from {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse cycle state")
    }
}

/// Phase B output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationComplete {
    pub plan: PlanResult,
    pub previous_lesson: Lesson,
    pub quiz: Quiz,
    pub eval_result: EvaluationResult,
    pub updated_model: UserModel,
    pub followup_plan: PlanResult,
    pub recommended_next: Option<String>,
}

/// Result of one cycle, tagged by `cycle`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cycle", rename_all = "snake_case")]
pub enum CycleResult {
    QuizReady(QuizReady),
    EvaluationComplete(EvaluationComplete),
}

impl CycleResult {
    /// Keep a state file in step with this result: a pending quiz is saved,
    /// a completed evaluation consumes the file so it cannot be graded twice
    pub fn sync_state_file(&self, path: &Path) -> anyhow::Result<()> {
        match self {
            CycleResult::QuizReady(ready) => ready.save(path),
            CycleResult::EvaluationComplete(_) if path.exists() => std::fs::remove_file(path)
                .with_context(|| format!("Failed to remove cycle state {}", path.display())),
            CycleResult::EvaluationComplete(_) => Ok(()),
        }
    }
}

/// Drives planning, lesson, quiz and evaluation for one learner
pub struct CycleOrchestrator {
    planner: Planner,
    tutor: Tutor,
    quiz_master: QuizMaster,
    store: Option<Arc<dyn ProgressStore>>,
}

impl CycleOrchestrator {
    pub fn new(gateway: SharedGateway, planner_config: PlannerConfig) -> Self {
        Self {
            planner: Planner::new(gateway.clone(), planner_config),
            tutor: Tutor::new(gateway.clone()),
            quiz_master: QuizMaster::new(gateway),
            store: None,
        }
    }

    /// Also record graded quizzes and mastery in `store`
    pub fn with_store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run a cycle. Without answers the result is `quiz_ready`; with answers
    /// the freshly generated quiz is graded and the result is
    /// `evaluation_complete`.
    pub async fn run_cycle(
        &self,
        user_model: UserModel,
        answers: Option<&[usize]>,
    ) -> Result<CycleResult, PipelineError> {
        let ready = self.prepare_quiz(user_model).await?;
        match answers {
            None => {
                info!(subtopic = %ready.next_subtopic, "Cycle paused, quiz ready");
                Ok(CycleResult::QuizReady(ready))
            }
            Some(answers) => self.complete(ready, answers).await,
        }
    }

    /// Grade the quiz the learner actually saw and finish the cycle
    pub async fn resume_cycle(
        &self,
        pending: QuizReady,
        answers: &[usize],
    ) -> Result<CycleResult, PipelineError> {
        info!(quiz_id = %pending.quiz.quiz_id, "Resuming cycle with submitted answers");
        self.complete(pending, answers).await
    }

    async fn prepare_quiz(&self, mut user_model: UserModel) -> Result<QuizReady, PipelineError> {
        info!(user = %user_model.user_id, topic = %user_model.topic, "Starting learning cycle");

        let plan = self.planner.plan(&mut user_model, None).await?;
        let next_subtopic = plan.next_subtopic().ok_or_else(|| {
            warn!("Planner output has no usable subtopic");
            PipelineError::NoSubtopic
        })?;
        info!(subtopic = %next_subtopic, "Next subtopic selected");

        let lesson = self.tutor.generate_lesson(&next_subtopic, &user_model).await?;
        let quiz = self.quiz_master.generate_quiz(&lesson, &user_model).await?;
        info!(questions = quiz.questions.len(), "Quiz generated");

        Ok(QuizReady { plan, next_subtopic, lesson, quiz, user_model })
    }

    async fn complete(
        &self,
        ready: QuizReady,
        answers: &[usize],
    ) -> Result<CycleResult, PipelineError> {
        let QuizReady { plan, next_subtopic, lesson, quiz, mut user_model } = ready;

        let eval_result = self
            .quiz_master
            .evaluate_quiz(&quiz, answers, &user_model.mastery)
            .await?;
        info!(score = eval_result.score, total = eval_result.total, "Quiz evaluated");

        user_model.mastery = eval_result.updated_mastery.clone();
        user_model.history.push(HistoryEntry {
            subtopic: next_subtopic.clone(),
            score: eval_result.score,
            total: eval_result.total,
            completed_at: Utc::now(),
        });

        if let Some(store) = &self.store {
            self.persist(store.as_ref(), &user_model, &next_subtopic, answers, &eval_result)
                .await?;
        }

        let followup_plan = self.planner.plan(&mut user_model, Some(&eval_result)).await?;
        let recommended_next = followup_plan.next_subtopic();
        info!(recommended = ?recommended_next, "Follow-up plan ready");

        Ok(CycleResult::EvaluationComplete(EvaluationComplete {
            plan,
            previous_lesson: lesson,
            quiz,
            eval_result,
            updated_model: user_model,
            followup_plan,
            recommended_next,
        }))
    }

    async fn persist(
        &self,
        store: &dyn ProgressStore,
        user_model: &UserModel,
        subtopic: &str,
        answers: &[usize],
        eval_result: &EvaluationResult,
    ) -> Result<(), PipelineError> {
        let attempt = QuizAttempt {
            user_id: user_model.user_id.clone(),
            topic_id: subtopic.to_string(),
            score: eval_result.percent(),
            answers: serde_json::json!(answers),
            attempted_at: Utc::now(),
        };
        store
            .record_quiz_attempt(&attempt)
            .await
            .map_err(|e| PipelineError::Storage(format!("{:#}", e)))?;

        for (concept, level) in &user_model.mastery {
            store
                .set_mastery(&user_model.user_id, concept, *level)
                .await
                .map_err(|e| PipelineError::Storage(format!("{:#}", e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_from_curriculum() {
        let plan =
            PlanResult::from_value(&json!({"curriculum": [{"subtopic": "Limits"}]})).unwrap();
        assert_eq!(plan.next_subtopic().as_deref(), Some("Limits"));
    }

    #[test]
    fn test_extract_from_subtopic_map() {
        let plan = PlanResult::from_value(&json!({
            "subtopicMap": [{"id": "s1", "name": "Derivatives"}]
        }))
        .unwrap();
        assert_eq!(plan.next_subtopic().as_deref(), Some("Derivatives"));
    }

    #[test]
    fn test_extract_from_empty_plan_is_none() {
        let plan = PlanResult::from_value(&json!({})).unwrap();
        assert_eq!(plan.next_subtopic(), None);
    }

    #[test]
    fn test_extract_precedence_and_fallbacks() {
        let plan = PlanResult::Subtopic("Series".to_string());
        assert_eq!(extract_next_subtopic(&plan).as_deref(), Some("Series"));

        let plan = PlanResult::from_value(&json!({
            "curriculum": [{"subtopic": "", "title": "Intro to limits"}],
            "subtopicMap": [{"id": "s1", "name": "Derivatives"}]
        }))
        .unwrap();
        assert_eq!(plan.next_subtopic().as_deref(), Some("Intro to limits"));

        let plan = PlanResult::from_value(&json!({
            "subtopicMap": [],
            "subtopics": [{"id": "s7", "name": ""}]
        }))
        .unwrap();
        assert_eq!(plan.next_subtopic().as_deref(), Some("s7"));

        assert!(PlanResult::from_value(&json!(42)).is_none());
    }

    #[test]
    fn test_curriculum_with_blank_first_entry_is_none() {
        let plan = PlanResult::Curriculum(CurriculumPlan {
            curriculum: vec![CurriculumEntry::default()],
            ..Default::default()
        });
        assert_eq!(plan.next_subtopic(), None);
    }

    #[test]
    fn test_cycle_result_tag() {
        let result = CycleResult::QuizReady(QuizReady {
            plan: PlanResult::Subtopic("Limits".to_string()),
            next_subtopic: "Limits".to_string(),
            lesson: Lesson::default(),
            quiz: Quiz::default(),
            user_model: UserModel::default(),
        });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["cycle"], "quiz_ready");
        assert_eq!(value["nextSubtopic"], "Limits");
        assert_eq!(value["plan"], "Limits");
    }

    #[test]
    fn test_plan_result_untagged_round_trip() {
        let plan = PlanResult::from_value(&json!({
            "subject": "Calculus",
            "subtopicMap": [{"id": "s1", "name": "Limits", "prerequisites": []}]
        }))
        .unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let back: PlanResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
        assert!(matches!(back, PlanResult::SubtopicMap(_)));
    }
}
