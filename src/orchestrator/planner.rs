//! Curriculum planning stage
//!
//! Five chained model calls: subtopic mapping, weakness analysis, curriculum
//! draft, optimization and validation. Each call's parsed output feeds the
//! next prompt. Any failure aborts planning; there is no partial curriculum.
//!
//! Without final-test results only the subtopic map is produced, unless
//! `planner.full_plan_on_first_pass` asks for the whole chain seeded with a
//! weakness analysis derived from prior mastery.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use crate::agent::gateway::{GatewayRequest, SharedGateway, DEFAULT_TEMPERATURE};
use crate::config::PlannerConfig;
use crate::error::{ParseError, PipelineError, PlanningStep, StageError};
use crate::orchestrator::cycle::PlanResult;
use crate::orchestrator::router::Purpose;
use crate::parser::parse_llm_json;
use crate::types::{
    CurriculumEntry, EvaluationResult, MasteryMap, SubtopicMap, UserModel, WeaknessAnalysis,
};

/// Inclusive bounds on the number of subtopics the map should contain
pub const SUBTOPIC_RANGE: std::ops::RangeInclusive<usize> = 8..=15;

/// Mastery below this counts as weak in a derived weakness analysis
const WEAK_BELOW: f64 = 0.5;
/// Mastery at or above this counts as strong in a derived weakness analysis
const STRONG_FROM: f64 = 0.8;

const MAP_SYSTEM: &str = "You are a subject-mapping AI.
Given any subject, list the most important subtopics a student at the given
level must learn to master it, in a sensible learning order.

Requirements:
- Output ONLY JSON.
- Subtopics must be specific enough to build a lesson around.
- Include 8-15 subtopics.
- Prerequisites reference ids of other subtopics in the same list.";

const WEAKNESS_SYSTEM: &str = "You are an educational analytics AI.
Use ONLY the final test performance and the generated subtopics to decide
which areas the learner must focus on.

Output ONLY JSON.";

const DRAFT_SYSTEM: &str = "You are a curriculum designer AI.
Design lessons ONLY from the generated subtopics and the weakness analysis.

Rules:
- Address critical failures first.
- Next, address the remaining weak concepts.
- Leave out strong concepts entirely.
- Build the sequence so prerequisites come first.
- Return ONLY JSON.";

const OPTIMIZE_SYSTEM: &str = "You are a curriculum optimization AI.
Improve the curriculum by applying:
- Prerequisite ordering
- Difficulty scaling
- Avoiding overload
- Removing redundant lessons

Output ONLY JSON.";

const VALIDATE_SYSTEM: &str = "You are a curriculum validation AI.
Check that:
- All weak concepts are addressed
- Critical failures come FIRST
- Prerequisite order is correct
- The curriculum is actionable and realistic
- Subtopic names match the generated map

Output ONLY JSON.";

/// Full planning output: map, weaknesses and the validated curriculum
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumPlan {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub subtopic_map: SubtopicMap,
    #[serde(default)]
    pub weakness_analysis: WeaknessAnalysis,
    pub curriculum: Vec<CurriculumEntry>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub used_final_test: bool,
}

/// First-pass planning output: only the subtopic map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtopicMapPlan {
    #[serde(default)]
    pub subject: String,
    pub subtopic_map: SubtopicMap,
}

/// Curriculum planning stage
pub struct Planner {
    gateway: SharedGateway,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(gateway: SharedGateway, config: PlannerConfig) -> Self {
        Self { gateway, config }
    }

    /// Plan for `user_model`, optionally informed by a graded quiz.
    ///
    /// Stores the generated subtopics on the user model.
    pub async fn plan(
        &self,
        user_model: &mut UserModel,
        final_test: Option<&EvaluationResult>,
    ) -> Result<PlanResult, PipelineError> {
        let subject = user_model.topic.trim().to_string();
        if subject.is_empty() {
            return Err(PipelineError::MissingTopic);
        }

        info!(subject = %subject, level = %user_model.level, "Planning curriculum");

        let subtopic_map = self.map_subtopics(&subject, user_model).await?;
        user_model.generated_subtopics = Some(subtopic_map.0.clone());

        let weakness_analysis = match final_test {
            Some(results) => {
                self.analyze_weaknesses(&subtopic_map, results, &user_model.mastery)
                    .await?
            }
            None if self.config.full_plan_on_first_pass => {
                debug!("No test results yet, deriving weakness analysis from mastery");
                baseline_weakness(&subtopic_map, &user_model.mastery)
            }
            None => {
                info!(subtopics = subtopic_map.len(), "First pass, skipping weakness analysis");
                return Ok(PlanResult::SubtopicMap(SubtopicMapPlan { subject, subtopic_map }));
            }
        };

        let draft = self.draft_curriculum(&subtopic_map, &weakness_analysis).await?;
        let optimized = self
            .optimize_curriculum(&draft, &subtopic_map, &weakness_analysis)
            .await?;
        let (curriculum, notes) = self
            .validate_curriculum(&optimized, &subtopic_map, &weakness_analysis)
            .await?;

        check_curriculum_against_map(&curriculum, &subtopic_map);
        info!(lessons = curriculum.len(), "Curriculum planned");

        Ok(PlanResult::Curriculum(CurriculumPlan {
            subject,
            subtopic_map,
            weakness_analysis,
            curriculum,
            notes,
            used_final_test: final_test.is_some(),
        }))
    }

    async fn map_subtopics(
        &self,
        subject: &str,
        user_model: &UserModel,
    ) -> Result<SubtopicMap, PipelineError> {
        let user = format!(
            "Subject chosen by user: {}\n\nStudent level: {}\n\nReturn EXACT JSON:\n{{\n  \"subtopics\": [\n    {{ \"id\": \"s1\", \"name\": \"\", \"prerequisites\": [] }}\n  ]\n}}",
            subject, user_model.level
        );
        let mut value = self
            .call(PlanningStep::SubtopicMap, Purpose::Generation, MAP_SYSTEM, user)
            .await?;
        let map = SubtopicMap(take_list(&mut value, "subtopics", "subtopic map").map_err(
            |e| planning_error(PlanningStep::SubtopicMap, e),
        )?);

        check_subtopic_map(&map);
        debug!(subtopics = map.len(), "Subtopic map parsed");
        Ok(map)
    }

    async fn analyze_weaknesses(
        &self,
        map: &SubtopicMap,
        results: &EvaluationResult,
        mastery: &MasteryMap,
    ) -> Result<WeaknessAnalysis, PipelineError> {
        let user = format!(
            "Generated Subtopics:\n{}\n\nFinal Test Results:\n{}\n\nMastery (before test):\n{}\n\nReturn EXACT JSON:\n{{\n  \"weakConcepts\": [],\n  \"strongConcepts\": [],\n  \"criticalFailures\": [],\n  \"primaryFocus\": \"\"\n}}",
            to_json(map),
            to_json(results),
            to_json(mastery)
        );
        let value = self
            .call(PlanningStep::WeaknessAnalysis, Purpose::Analysis, WEAKNESS_SYSTEM, user)
            .await?;
        let analysis: WeaknessAnalysis = typed(value, "weakness analysis")
            .map_err(|e| planning_error(PlanningStep::WeaknessAnalysis, e))?;
        debug!(
            weak = analysis.weak_concepts.len(),
            critical = analysis.critical_failures.len(),
            focus = %analysis.primary_focus,
            "Weakness analysis parsed"
        );
        Ok(analysis)
    }

    async fn draft_curriculum(
        &self,
        map: &SubtopicMap,
        weakness: &WeaknessAnalysis,
    ) -> Result<Vec<CurriculumEntry>, PipelineError> {
        let user = format!(
            "Weakness Analysis:\n{}\n\nAll available subtopics for this subject:\n{}\n\nReturn EXACT JSON:\n{{\n  \"curriculum\": [\n    {{\n      \"lessonId\": \"\",\n      \"title\": \"\",\n      \"subtopic\": \"\",\n      \"estimatedTime\": 0,\n      \"skillsTargeted\": []\n    }}\n  ]\n}}",
            to_json(weakness),
            to_json(map)
        );
        let mut value = self
            .call(PlanningStep::CurriculumDraft, Purpose::Tutoring, DRAFT_SYSTEM, user)
            .await?;
        let draft = take_list(&mut value, "curriculum", "curriculum draft")
            .map_err(|e| planning_error(PlanningStep::CurriculumDraft, e))?;
        debug!(lessons = draft.len(), "Curriculum draft parsed");
        Ok(draft)
    }

    async fn optimize_curriculum(
        &self,
        draft: &[CurriculumEntry],
        map: &SubtopicMap,
        weakness: &WeaknessAnalysis,
    ) -> Result<Vec<CurriculumEntry>, PipelineError> {
        let user = format!(
            "Draft Curriculum:\n{}\n\nSubtopics (for prerequisites):\n{}\n\nWeakness Analysis:\n{}\n\nReturn:\n{{\n  \"optimizedCurriculum\": []\n}}",
            to_json(draft),
            to_json(map),
            to_json(weakness)
        );
        let mut value = self
            .call(PlanningStep::Optimization, Purpose::Tutoring, OPTIMIZE_SYSTEM, user)
            .await?;
        let optimized = take_list(&mut value, "optimizedCurriculum", "optimized curriculum")
            .map_err(|e| planning_error(PlanningStep::Optimization, e))?;
        debug!(lessons = optimized.len(), "Optimized curriculum parsed");
        Ok(optimized)
    }

    async fn validate_curriculum(
        &self,
        optimized: &[CurriculumEntry],
        map: &SubtopicMap,
        weakness: &WeaknessAnalysis,
    ) -> Result<(Vec<CurriculumEntry>, String), PipelineError> {
        let user = format!(
            "Optimized Curriculum:\n{}\n\nGenerated Subtopics:\n{}\n\nWeakness Analysis:\n{}\n\nReturn EXACT JSON:\n{{\n  \"finalCurriculum\": [],\n  \"notes\": \"\"\n}}",
            to_json(optimized),
            to_json(map),
            to_json(weakness)
        );
        let mut value = self
            .call(PlanningStep::Validation, Purpose::Analysis, VALIDATE_SYSTEM, user)
            .await?;
        let notes = match value.get("notes") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let curriculum = take_list(&mut value, "finalCurriculum", "final curriculum")
            .map_err(|e| planning_error(PlanningStep::Validation, e))?;
        Ok((curriculum, notes))
    }

    async fn call(
        &self,
        step: PlanningStep,
        purpose: Purpose,
        system: &str,
        user: String,
    ) -> Result<Value, PipelineError> {
        debug!(%step, %purpose, "Planning step started");
        let raw = self
            .gateway
            .invoke(GatewayRequest::new(purpose, system, user, DEFAULT_TEMPERATURE))
            .await
            .map_err(|e| planning_error(step, e))?;
        parse_llm_json(raw).map_err(|e| planning_error(step, e))
    }
}

fn planning_error(step: PlanningStep, source: impl Into<StageError>) -> PipelineError {
    let source = source.into();
    warn!(%step, error = %source, "Planning step failed");
    PipelineError::Planning { step, source }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn typed<T: DeserializeOwned>(value: Value, expected: &'static str) -> Result<T, ParseError> {
    serde_json::from_value(value).map_err(|e| ParseError::Shape {
        expected,
        message: e.to_string(),
    })
}

/// Pull the list under `key`, accepting a bare array as well.
/// A missing key is an empty list.
fn take_list<T: DeserializeOwned>(
    value: &mut Value,
    key: &str,
    expected: &'static str,
) -> Result<Vec<T>, ParseError> {
    let list = match value {
        Value::Array(items) => Value::Array(std::mem::take(items)),
        Value::Object(map) => map.remove(key).unwrap_or(Value::Array(Vec::new())),
        other => {
            return Err(ParseError::Shape {
                expected,
                message: format!("expected an object or array, got {}", other),
            })
        }
    };
    match list {
        Value::Null => Ok(Vec::new()),
        list => typed(list, expected),
    }
}

/// Weakness analysis from prior mastery, used when no test results exist
pub fn baseline_weakness(map: &SubtopicMap, mastery: &MasteryMap) -> WeaknessAnalysis {
    let level = |name: &str, id: &str| {
        mastery
            .get(name)
            .or_else(|| mastery.get(id))
            .copied()
            .unwrap_or(0.0)
    };

    let mut weak = BTreeSet::new();
    let mut strong = BTreeSet::new();
    for subtopic in &map.0 {
        let m = level(&subtopic.name, &subtopic.id);
        if m >= STRONG_FROM {
            strong.insert(subtopic.name.clone());
        } else if m < WEAK_BELOW {
            weak.insert(subtopic.name.clone());
        }
    }

    let primary_focus = map
        .0
        .iter()
        .find(|s| weak.contains(&s.name))
        .or_else(|| map.first())
        .map(|s| s.name.clone())
        .unwrap_or_default();

    WeaknessAnalysis {
        weak_concepts: weak,
        strong_concepts: strong,
        critical_failures: BTreeSet::new(),
        primary_focus,
    }
}

/// Non-fatal structural checks on a subtopic map
fn check_subtopic_map(map: &SubtopicMap) {
    if !SUBTOPIC_RANGE.contains(&map.len()) {
        warn!(
            count = map.len(),
            "Subtopic map has {} entries, expected {}-{}",
            map.len(),
            SUBTOPIC_RANGE.start(),
            SUBTOPIC_RANGE.end()
        );
    }
    for (subtopic, missing) in map.dangling_prerequisites() {
        warn!(
            subtopic = %subtopic,
            prerequisite = %missing,
            "Dangling prerequisite id in subtopic map"
        );
    }
}

/// Non-fatal check that curriculum subtopics come from the map
fn check_curriculum_against_map(curriculum: &[CurriculumEntry], map: &SubtopicMap) {
    for entry in curriculum {
        if !entry.subtopic.is_empty() && !map.contains_name(&entry.subtopic) {
            warn!(
                subtopic = %entry.subtopic,
                lesson = %entry.lesson_id,
                "Curriculum subtopic not in subtopic map"
            );
        }
    }
}
