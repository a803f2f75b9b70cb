//! Progress storage - mastery, quiz attempts, topics and learning sessions
//!
//! `ProgressStore` is the contract the learning agent and the cycle
//! orchestrator write through. `InMemoryProgressStore` backs tests and
//! one-shot runs; `SqliteProgressStore` (see `sqlite.rs`) persists to disk.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::orchestrator::mastery::clamp_unit;
use crate::types::{AdaptationKind, Problem, Topic};

/// One graded quiz submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub user_id: String,
    pub topic_id: String,
    /// Percentage in `[0, 100]`
    pub score: f64,
    pub answers: serde_json::Value,
    pub attempted_at: DateTime<Utc>,
}

/// Outcome of one learning-agent run, kept for later review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub topic_id: String,
    pub decision: AdaptationKind,
    pub feedback: String,
    pub problems: Vec<Problem>,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence contract for learner progress.
///
/// Mastery values are stored in `[0, 1]`; implementations clamp on write.
/// List queries return newest first.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn mastery(&self, user_id: &str, topic_id: &str) -> Result<Option<f64>>;

    async fn set_mastery(&self, user_id: &str, topic_id: &str, level: f64) -> Result<()>;

    async fn record_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<()>;

    async fn recent_attempts(
        &self,
        user_id: &str,
        topic_id: &str,
        limit: usize,
    ) -> Result<Vec<QuizAttempt>>;

    /// Topics that must be understood before `topic_id`
    async fn prerequisites(&self, topic_id: &str) -> Result<Vec<Topic>>;

    async fn record_session(&self, session: &SessionRecord) -> Result<()>;

    async fn sessions(
        &self,
        user_id: &str,
        topic_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionRecord>>;

    async fn upsert_topic(&self, topic: &Topic) -> Result<()>;

    async fn add_prerequisite(&self, topic_id: &str, prerequisite_id: &str) -> Result<()>;
}

#[derive(Default)]
struct Tables {
    topics: BTreeMap<String, Topic>,
    prerequisites: BTreeMap<String, Vec<String>>,
    mastery: HashMap<(String, String), f64>,
    attempts: Vec<QuizAttempt>,
    sessions: Vec<SessionRecord>,
}

/// Process-local store
#[derive(Default)]
pub struct InMemoryProgressStore {
    tables: RwLock<Tables>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T: Clone>(items: &[T], keep: impl Fn(&T) -> bool, limit: usize) -> Vec<T> {
    items.iter().rev().filter(|item| keep(item)).take(limit).cloned().collect()
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn mastery(&self, user_id: &str, topic_id: &str) -> Result<Option<f64>> {
        let tables = self.tables.read().await;
        Ok(tables
            .mastery
            .get(&(user_id.to_string(), topic_id.to_string()))
            .copied())
    }

    async fn set_mastery(&self, user_id: &str, topic_id: &str, level: f64) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .mastery
            .insert((user_id.to_string(), topic_id.to_string()), clamp_unit(level));
        Ok(())
    }

    async fn record_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<()> {
        self.tables.write().await.attempts.push(attempt.clone());
        Ok(())
    }

    async fn recent_attempts(
        &self,
        user_id: &str,
        topic_id: &str,
        limit: usize,
    ) -> Result<Vec<QuizAttempt>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            &tables.attempts,
            |a| a.user_id == user_id && a.topic_id == topic_id,
            limit,
        ))
    }

    async fn prerequisites(&self, topic_id: &str) -> Result<Vec<Topic>> {
        let tables = self.tables.read().await;
        let ids = match tables.prerequisites.get(topic_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| tables.topics.get(id).cloned())
            .collect())
    }

    async fn record_session(&self, session: &SessionRecord) -> Result<()> {
        self.tables.write().await.sessions.push(session.clone());
        Ok(())
    }

    async fn sessions(
        &self,
        user_id: &str,
        topic_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionRecord>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            &tables.sessions,
            |s| s.user_id == user_id && s.topic_id == topic_id,
            limit,
        ))
    }

    async fn upsert_topic(&self, topic: &Topic) -> Result<()> {
        self.tables
            .write()
            .await
            .topics
            .insert(topic.id.clone(), topic.clone());
        Ok(())
    }

    async fn add_prerequisite(&self, topic_id: &str, prerequisite_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let ids = tables.prerequisites.entry(topic_id.to_string()).or_default();
        if !ids.iter().any(|id| id == prerequisite_id) {
            ids.push(prerequisite_id.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attempt(user: &str, topic: &str, score: f64) -> QuizAttempt {
        QuizAttempt {
            user_id: user.to_string(),
            topic_id: topic.to_string(),
            score,
            answers: json!([0, 1]),
            attempted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_mastery_defaults_to_none_and_clamps() {
        let store = InMemoryProgressStore::new();
        assert_eq!(store.mastery("u1", "limits").await.unwrap(), None);

        store.set_mastery("u1", "limits", 1.4).await.unwrap();
        assert_eq!(store.mastery("u1", "limits").await.unwrap(), Some(1.0));
        assert_eq!(store.mastery("u2", "limits").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_recent_attempts_newest_first_and_limited() {
        let store = InMemoryProgressStore::new();
        for score in [10.0, 20.0, 30.0] {
            store.record_quiz_attempt(&attempt("u1", "limits", score)).await.unwrap();
        }
        store.record_quiz_attempt(&attempt("u1", "derivatives", 99.0)).await.unwrap();

        let recent = store.recent_attempts("u1", "limits", 2).await.unwrap();
        let scores: Vec<f64> = recent.iter().map(|a| a.score).collect();
        assert_eq!(scores, vec![30.0, 20.0]);
    }

    #[tokio::test]
    async fn test_prerequisites_resolve_known_topics() {
        let store = InMemoryProgressStore::new();
        for (id, name) in [("algebra", "Algebra"), ("limits", "Limits")] {
            let topic = Topic {
                id: id.into(),
                name: name.into(),
                difficulty_level: Some(2),
            };
            store.upsert_topic(&topic).await.unwrap();
        }
        store.add_prerequisite("limits", "algebra").await.unwrap();
        store.add_prerequisite("limits", "algebra").await.unwrap();
        store.add_prerequisite("limits", "unknown").await.unwrap();

        let prereqs = store.prerequisites("limits").await.unwrap();
        assert_eq!(prereqs.len(), 1);
        assert_eq!(prereqs[0].name, "Algebra");
        assert!(store.prerequisites("algebra").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_filtered_by_user_and_topic() {
        let store = InMemoryProgressStore::new();
        let session = SessionRecord {
            id: "s1".into(),
            user_id: "u1".into(),
            topic_id: "limits".into(),
            decision: AdaptationKind::Drill,
            feedback: "practice".into(),
            problems: vec![],
            rationale: "gaps".into(),
            created_at: Utc::now(),
        };
        store.record_session(&session).await.unwrap();

        assert_eq!(store.sessions("u1", "limits", 10).await.unwrap(), vec![session]);
        assert!(store.sessions("u1", "other", 10).await.unwrap().is_empty());
    }
}
