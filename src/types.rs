//! Shared types used across the learning pipeline
//!
//! Field names serialize in camelCase because the same shapes are shown to
//! models in prompts and returned to callers as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-concept proficiency in [0, 1]
pub type MasteryMap = BTreeMap<String, f64>;

/// Learner's declared level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Beginner => write!(f, "beginner"),
            Level::Intermediate => write!(f, "intermediate"),
            Level::Advanced => write!(f, "advanced"),
        }
    }
}

impl std::str::FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "advanced" => Ok(Level::Advanced),
            other => Err(format!(
                "Unknown level '{}'. Expected beginner, intermediate or advanced",
                other
            )),
        }
    }
}

/// One completed quiz in the learner's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub subtopic: String,
    pub score: u32,
    pub total: u32,
    pub completed_at: DateTime<Utc>,
}

/// The learner state threaded through a whole cycle.
///
/// Owned by the caller. Planning writes `generated_subtopics`, evaluation
/// replaces `mastery`; nothing else in the pipeline mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserModel {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub level: Level,
    #[serde(default)]
    pub mastery: MasteryMap,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_subtopics: Option<Vec<Subtopic>>,
}

impl UserModel {
    pub fn new(user_id: impl Into<String>, topic: impl Into<String>, level: Level) -> Self {
        Self {
            user_id: user_id.into(),
            topic: topic.into(),
            level,
            ..Default::default()
        }
    }
}

/// A node of the subtopic map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtopic {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::string_set")]
    pub prerequisites: BTreeSet<String>,
}

/// Ordered subtopics for one subject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtopicMap(pub Vec<Subtopic>);

impl SubtopicMap {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn first(&self) -> Option<&Subtopic> {
        self.0.first()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.0.iter().any(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// `(subtopic id, missing prerequisite id)` for every reference that does
    /// not resolve inside this map
    pub fn dangling_prerequisites(&self) -> Vec<(String, String)> {
        let ids: BTreeSet<&str> = self.0.iter().map(|s| s.id.as_str()).collect();
        self.0
            .iter()
            .flat_map(|s| {
                s.prerequisites
                    .iter()
                    .filter(|p| !ids.contains(p.as_str()))
                    .map(move |p| (s.id.clone(), p.clone()))
            })
            .collect()
    }
}

/// Which concepts the learner is weak or strong in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaknessAnalysis {
    #[serde(default, deserialize_with = "lenient::string_set")]
    pub weak_concepts: BTreeSet<String>,
    #[serde(default, deserialize_with = "lenient::string_set")]
    pub strong_concepts: BTreeSet<String>,
    #[serde(default, deserialize_with = "lenient::string_set")]
    pub critical_failures: BTreeSet<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub primary_focus: String,
}

/// One lesson slot in a curriculum (draft, optimized or final)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumEntry {
    #[serde(default, deserialize_with = "lenient::string")]
    pub lesson_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub subtopic: String,
    /// Minutes
    #[serde(default, deserialize_with = "lenient::minutes")]
    pub estimated_time: u32,
    #[serde(default, deserialize_with = "lenient::string_set")]
    pub skills_targeted: BTreeSet<String>,
}

/// A worked example inside a lesson
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonExample {
    #[serde(default, deserialize_with = "lenient::string")]
    pub header: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// A generated lesson for one subtopic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    #[serde(default, deserialize_with = "lenient::string")]
    pub lesson_id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub subtopic: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub level: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub explanation: String,
    #[serde(default)]
    pub examples: Vec<LessonExample>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub mini_check: String,
    #[serde(default)]
    pub practice_problems: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub ascii_visual: String,
}

/// A multiple-choice question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub concept: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Required: a question without an answer key cannot be graded
    #[serde(deserialize_with = "lenient::index")]
    pub correct_option_index: usize,
}

/// A quiz generated from a lesson
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    #[serde(default, deserialize_with = "lenient::string")]
    pub quiz_id: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Outcome of grading a quiz
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub score: u32,
    pub total: u32,
    #[serde(default)]
    pub incorrect_concepts: BTreeSet<String>,
    #[serde(default)]
    pub updated_mastery: MasteryMap,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl EvaluationResult {
    /// Score as a percentage in [0, 100]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.score) * 100.0 / f64::from(self.total)
        }
    }
}

/// The fixed set of pedagogical actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AdaptationKind {
    Drill,
    Reteach,
    Advance,
    Reinforce,
}

impl AdaptationKind {
    /// Normalize (trim, uppercase) and check membership
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "DRILL" => Some(AdaptationKind::Drill),
            "RETEACH" => Some(AdaptationKind::Reteach),
            "ADVANCE" => Some(AdaptationKind::Advance),
            "REINFORCE" => Some(AdaptationKind::Reinforce),
            _ => None,
        }
    }

    /// Difficulty of follow-up problems, if this action generates any
    pub fn follow_up_difficulty(&self) -> Option<Difficulty> {
        match self {
            AdaptationKind::Drill => Some(Difficulty::Hard),
            AdaptationKind::Reinforce => Some(Difficulty::Medium),
            AdaptationKind::Reteach | AdaptationKind::Advance => None,
        }
    }
}

impl std::fmt::Display for AdaptationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdaptationKind::Drill => write!(f, "DRILL"),
            AdaptationKind::Reteach => write!(f, "RETEACH"),
            AdaptationKind::Advance => write!(f, "ADVANCE"),
            AdaptationKind::Reinforce => write!(f, "REINFORCE"),
        }
    }
}

/// Where a decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Model,
    Fallback,
}

/// The adaptive engine's output for one quiz submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationDecision {
    #[serde(rename = "type")]
    pub kind: AdaptationKind,
    pub feedback: String,
    #[serde(default)]
    pub follow_up_problems: Vec<Problem>,
    pub source: DecisionSource,
}

/// Problem difficulty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// A follow-up practice problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    #[serde(deserialize_with = "lenient::string")]
    pub problem: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub topic: String,
    #[serde(default, deserialize_with = "lenient::difficulty")]
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A topic known to the progress store, used as a prerequisite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub difficulty_level: Option<u8>,
}

/// Lenient deserializers for fields models like to get slightly wrong
///
/// Models return ids as numbers, minutes as "20 minutes", indices as "2".
pub(crate) mod lenient {
    use super::*;
    use serde_json::Value;

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    pub fn string_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let items = match value {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            Value::String(s) if s.trim().is_empty() => Vec::new(),
            single => vec![single],
        };
        Ok(items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect())
    }

    pub fn minutes<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().map(|f| f.max(0.0).round() as u64))
                .unwrap_or(0)
                .min(u64::from(u32::MAX)) as u32,
            Value::String(s) => s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse()
                .unwrap_or(0),
            _ => 0,
        })
    }

    pub fn index<'de, D>(deserializer: D) -> Result<usize, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let value = Value::deserialize(deserializer)?;
        match &value {
            Value::Number(n) => n
                .as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| D::Error::custom(format!("invalid option index {}", n))),
            Value::String(s) => s
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid option index {:?}", s))),
            other => Err(D::Error::custom(format!("invalid option index {}", other))),
        }
    }

    pub fn difficulty<'de, D>(deserializer: D) -> Result<Difficulty, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let text = match value {
            Value::String(s) => s.to_lowercase(),
            _ => return Ok(Difficulty::default()),
        };
        Ok(if text.contains("hard") {
            Difficulty::Hard
        } else if text.contains("easy") {
            Difficulty::Easy
        } else {
            Difficulty::Medium
        })
    }
}
