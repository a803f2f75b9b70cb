//! Quiz stage: generation from a lesson and grading of answers
//!
//! Grading is done locally so score, total and incorrect concepts never
//! depend on model arithmetic. The analysis model only contributes the
//! updated mastery map and recommendations.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::agent::gateway::{GatewayRequest, SharedGateway, DEFAULT_TEMPERATURE};
use crate::error::{QuizError, StageError};
use crate::orchestrator::mastery::{clamp_unit, next_mastery};
use crate::orchestrator::router::Purpose;
use crate::parser::parse_llm_as;
use crate::types::{EvaluationResult, Lesson, MasteryMap, Quiz, UserModel};

/// Questions per quiz
pub const QUIZ_LENGTH: usize = 5;
/// Options per question
pub const OPTIONS_PER_QUESTION: usize = 4;

const QUIZ_SYSTEM: &str = "You are a quiz generation AI for a learning platform.
Create a quiz that evaluates understanding of the provided lesson.

Requirements:
- Exactly 5 multiple-choice questions.
- Each question has exactly 4 options and one correctOptionIndex (0-3).
- Each question MUST include a \"concept\" tag.
- Questions must reflect the lesson content, not generic trivia.
- Return ONLY JSON.";

const GRADING_SYSTEM: &str = "You are a grading and learning analytics AI.

Your responsibilities:
- Review the graded answers.
- Identify the concepts the learner is weak in.
- Update mastery scores on a 0-1 scale, one entry per concept.
- Recommend the EXACT concepts to reteach.
- Output ONLY JSON.";

/// Local grading of one submission
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub score: u32,
    pub total: u32,
    pub incorrect_concepts: BTreeSet<String>,
    /// Concept → (correct, asked)
    pub per_concept: BTreeMap<String, (u32, u32)>,
}

impl Grade {
    /// Accuracy for one concept as a percentage
    pub fn concept_percent(&self, concept: &str) -> Option<f64> {
        self.per_concept
            .get(concept)
            .filter(|(_, asked)| *asked > 0)
            .map(|(correct, asked)| f64::from(*correct) * 100.0 / f64::from(*asked))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradingPayload {
    #[serde(default, deserialize_with = "lenient_mastery")]
    updated_mastery: MasteryMap,
    #[serde(default)]
    recommendations: Vec<String>,
}

/// Keep numeric (or numeric-string) entries, drop the rest
fn lenient_mastery<'de, D>(deserializer: D) -> Result<MasteryMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Option::<BTreeMap<String, Value>>::deserialize(deserializer)? {
        Some(map) => map,
        None => return Ok(MasteryMap::new()),
    };
    Ok(raw
        .into_iter()
        .filter_map(|(concept, value)| {
            let level = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            level.map(|l| (concept, l))
        })
        .collect())
}

/// Generates and grades quizzes
pub struct QuizMaster {
    gateway: SharedGateway,
}

impl QuizMaster {
    pub fn new(gateway: SharedGateway) -> Self {
        Self { gateway }
    }

    /// Generate a quiz for `lesson`
    pub async fn generate_quiz(
        &self,
        lesson: &Lesson,
        user_model: &UserModel,
    ) -> Result<Quiz, QuizError> {
        info!(lesson = %lesson.title, "Generating quiz");

        let lesson_json = serde_json::to_string(lesson).unwrap_or_else(|_| "{}".to_string());
        let user = format!(
            "Student Level: {}\n\nLesson data:\n{}\n\nReturn JSON EXACTLY in this format:\n\n{{\n  \"quizId\": \"\",\n  \"questions\": [\n    {{\n      \"id\": \"\",\n      \"concept\": \"\",\n      \"question\": \"\",\n      \"options\": [\"\", \"\", \"\", \"\"],\n      \"correctOptionIndex\": 0\n    }}\n  ]\n}}",
            user_model.level, lesson_json
        );

        let raw = self
            .gateway
            .invoke(GatewayRequest::new(
                Purpose::Generation,
                QUIZ_SYSTEM,
                user,
                DEFAULT_TEMPERATURE,
            ))
            .await
            .map_err(generation_error)?;
        let mut quiz: Quiz = parse_llm_as(raw, "quiz").map_err(generation_error)?;

        if quiz.quiz_id.trim().is_empty() {
            quiz.quiz_id = uuid::Uuid::new_v4().to_string();
        }
        for (i, question) in quiz.questions.iter_mut().enumerate() {
            if question.id.trim().is_empty() {
                question.id = format!("q{}", i + 1);
            }
            if question.concept.trim().is_empty() {
                question.concept = lesson.subtopic.clone();
            }
        }

        validate_quiz(&quiz)?;
        debug!(quiz_id = %quiz.quiz_id, questions = quiz.questions.len(), "Quiz parsed");
        Ok(quiz)
    }

    /// Grade `answers` against `quiz` and compute updated mastery.
    ///
    /// `answers[i]` is the chosen option index for question `i`.
    pub async fn evaluate_quiz(
        &self,
        quiz: &Quiz,
        answers: &[usize],
        prior_mastery: &MasteryMap,
    ) -> Result<EvaluationResult, QuizError> {
        validate_quiz(quiz)?;
        let grade = grade(quiz, answers)?;
        info!(score = grade.score, total = grade.total, "Quiz graded");

        let user = format!(
            "Quiz:\n{}\n\nUser Answers (index represents question order):\n{}\n\nGrading (authoritative):\n{{\"score\": {}, \"total\": {}, \"incorrectConcepts\": {}}}\n\nExisting mastery:\n{}\n\nReturn JSON EXACTLY:\n\n{{\n  \"updatedMastery\": {{}},\n  \"recommendations\": [\"\", \"\"]\n}}",
            serde_json::to_string(quiz).unwrap_or_default(),
            serde_json::to_string(answers).unwrap_or_default(),
            grade.score,
            grade.total,
            serde_json::to_string(&grade.incorrect_concepts).unwrap_or_default(),
            serde_json::to_string(prior_mastery).unwrap_or_default()
        );

        let raw = self
            .gateway
            .invoke(GatewayRequest::new(
                Purpose::Analysis,
                GRADING_SYSTEM,
                user,
                DEFAULT_TEMPERATURE,
            ))
            .await
            .map_err(evaluation_error)?;
        let payload: GradingPayload =
            parse_llm_as(raw, "quiz evaluation").map_err(evaluation_error)?;

        let updated_mastery = merge_mastery(prior_mastery, payload.updated_mastery, &grade);
        let recommendations = if payload.recommendations.iter().all(|r| r.trim().is_empty()) {
            grade
                .incorrect_concepts
                .iter()
                .map(|c| format!("Review {}", c))
                .collect()
        } else {
            payload
                .recommendations
                .into_iter()
                .filter(|r| !r.trim().is_empty())
                .collect()
        };

        Ok(EvaluationResult {
            score: grade.score,
            total: grade.total,
            incorrect_concepts: grade.incorrect_concepts,
            updated_mastery,
            recommendations,
        })
    }
}

/// Check the structural quiz invariants
pub fn validate_quiz(quiz: &Quiz) -> Result<(), QuizError> {
    if quiz.questions.len() != QUIZ_LENGTH {
        return Err(QuizError::Invalid(format!(
            "expected {} questions, got {}",
            QUIZ_LENGTH,
            quiz.questions.len()
        )));
    }
    for question in &quiz.questions {
        if question.options.len() != OPTIONS_PER_QUESTION {
            return Err(QuizError::Invalid(format!(
                "question {} has {} options, expected {}",
                question.id,
                question.options.len(),
                OPTIONS_PER_QUESTION
            )));
        }
        if question.correct_option_index >= OPTIONS_PER_QUESTION {
            return Err(QuizError::Invalid(format!(
                "question {} has correct option {} out of range",
                question.id, question.correct_option_index
            )));
        }
    }
    Ok(())
}

/// Grade index-for-index. Out-of-range answers count as wrong.
pub fn grade(quiz: &Quiz, answers: &[usize]) -> Result<Grade, QuizError> {
    if answers.len() != quiz.questions.len() {
        return Err(QuizError::AnswerCountMismatch {
            expected: quiz.questions.len(),
            actual: answers.len(),
        });
    }

    let mut score = 0;
    let mut incorrect_concepts = BTreeSet::new();
    let mut per_concept: BTreeMap<String, (u32, u32)> = BTreeMap::new();

    for (question, &answer) in quiz.questions.iter().zip(answers) {
        if answer >= question.options.len() {
            warn!(question = %question.id, answer, "Answer index out of range, counting as wrong");
        }
        let correct = answer == question.correct_option_index;
        let entry = per_concept.entry(question.concept.clone()).or_default();
        entry.1 += 1;
        if correct {
            score += 1;
            entry.0 += 1;
        } else {
            incorrect_concepts.insert(question.concept.clone());
        }
    }

    Ok(Grade {
        score,
        total: quiz.questions.len() as u32,
        incorrect_concepts,
        per_concept,
    })
}

/// Prior mastery, overlaid with the model's values (clamped), with any
/// quizzed concept the model skipped advanced from its local accuracy
fn merge_mastery(prior: &MasteryMap, from_model: MasteryMap, grade: &Grade) -> MasteryMap {
    let mut merged = prior.clone();
    let mut covered = BTreeSet::new();
    for (concept, level) in from_model {
        covered.insert(concept.clone());
        merged.insert(concept, clamp_unit(level));
    }
    for concept in grade.per_concept.keys() {
        if !covered.contains(concept) {
            let percent = grade.concept_percent(concept).unwrap_or(0.0);
            let current = prior.get(concept).copied().unwrap_or(0.0);
            merged.insert(concept.clone(), next_mastery(current, percent));
        }
    }
    merged
}

fn generation_error(source: impl Into<StageError>) -> QuizError {
    let source = source.into();
    warn!(error = %source, "Quiz generation failed");
    QuizError::Generation(source)
}

fn evaluation_error(source: impl Into<StageError>) -> QuizError {
    let source = source.into();
    warn!(error = %source, "Quiz evaluation failed");
    QuizError::Evaluation(source)
}
