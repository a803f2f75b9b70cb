//! SQLite-backed progress store

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::store::{ProgressStore, QuizAttempt, SessionRecord};
use crate::orchestrator::mastery::clamp_unit;
use crate::types::{AdaptationKind, Topic};

/// Progress store persisted in a single SQLite file
pub struct SqliteProgressStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProgressStore {
    /// Open (or create) the database at `path`
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open progress database {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;
        debug!(path = %path.display(), "Progress database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS topics (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                difficulty_level INTEGER
            );

            CREATE TABLE IF NOT EXISTS topic_prerequisites (
                topic_id TEXT NOT NULL,
                prerequisite_id TEXT NOT NULL,
                PRIMARY KEY (topic_id, prerequisite_id)
            );

            CREATE TABLE IF NOT EXISTS user_mastery (
                user_id TEXT NOT NULL,
                topic_id TEXT NOT NULL,
                mastery_level REAL NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, topic_id)
            );

            CREATE TABLE IF NOT EXISTS quiz_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                topic_id TEXT NOT NULL,
                score REAL NOT NULL,
                answers TEXT NOT NULL,
                attempted_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS learning_sessions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                topic_id TEXT NOT NULL,
                decision TEXT NOT NULL,
                feedback TEXT NOT NULL,
                problems TEXT NOT NULL DEFAULT '[]',
                rationale TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_attempts_user_topic ON quiz_attempts(user_id, topic_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_user_topic ON learning_sessions(user_id, topic_id);
        "#)?;

        Ok(())
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn mastery(&self, user_id: &str, topic_id: &str) -> Result<Option<f64>> {
        let conn = self.conn.lock().await;
        let level = conn
            .query_row(
                "SELECT mastery_level FROM user_mastery WHERE user_id = ?1 AND topic_id = ?2",
                params![user_id, topic_id],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;
        Ok(level)
    }

    async fn set_mastery(&self, user_id: &str, topic_id: &str, level: f64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO user_mastery (user_id, topic_id, mastery_level, updated_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT(user_id, topic_id)
               DO UPDATE SET mastery_level = excluded.mastery_level, updated_at = excluded.updated_at"#,
            params![user_id, topic_id, clamp_unit(level), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn record_quiz_attempt(&self, attempt: &QuizAttempt) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO quiz_attempts (user_id, topic_id, score, answers, attempted_at)
               VALUES (?1, ?2, ?3, ?4, ?5)"#,
            params![
                attempt.user_id,
                attempt.topic_id,
                attempt.score,
                serde_json::to_string(&attempt.answers)?,
                attempt.attempted_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn recent_attempts(
        &self,
        user_id: &str,
        topic_id: &str,
        limit: usize,
    ) -> Result<Vec<QuizAttempt>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            r#"SELECT user_id, topic_id, score, answers, attempted_at
               FROM quiz_attempts
               WHERE user_id = ?1 AND topic_id = ?2
               ORDER BY id DESC
               LIMIT ?3"#,
        )?;

        let attempts = stmt
            .query_map(params![user_id, topic_id, limit as i64], |row| {
                let answers_json: String = row.get(3)?;
                let attempted_at: String = row.get(4)?;
                Ok(QuizAttempt {
                    user_id: row.get(0)?,
                    topic_id: row.get(1)?,
                    score: row.get(2)?,
                    answers: serde_json::from_str(&answers_json).unwrap_or_default(),
                    attempted_at: parse_timestamp(&attempted_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(attempts)
    }

    async fn prerequisites(&self, topic_id: &str) -> Result<Vec<Topic>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            r#"SELECT t.id, t.name, t.difficulty_level
               FROM topics t
               JOIN topic_prerequisites tp ON t.id = tp.prerequisite_id
               WHERE tp.topic_id = ?1
               ORDER BY t.id"#,
        )?;

        let topics = stmt
            .query_map(params![topic_id], |row| {
                Ok(Topic {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    difficulty_level: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(topics)
    }

    async fn record_session(&self, session: &SessionRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO learning_sessions
               (id, user_id, topic_id, decision, feedback, problems, rationale, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                session.id,
                session.user_id,
                session.topic_id,
                session.decision.to_string(),
                session.feedback,
                serde_json::to_string(&session.problems)?,
                session.rationale,
                session.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn sessions(
        &self,
        user_id: &str,
        topic_id: &str,
        limit: usize,
    ) -> Result<Vec<SessionRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            r#"SELECT id, user_id, topic_id, decision, feedback, problems, rationale, created_at
               FROM learning_sessions
               WHERE user_id = ?1 AND topic_id = ?2
               ORDER BY seq DESC
               LIMIT ?3"#,
        )?;

        let rows = stmt
            .query_map(params![user_id, topic_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, user_id, topic_id, decision, feedback, problems, rationale, created_at)| {
                let decision = AdaptationKind::parse(&decision)
                    .ok_or_else(|| anyhow!("Unknown decision '{}' in session {}", decision, id))?;
                Ok(SessionRecord {
                    decision,
                    problems: serde_json::from_str(&problems).unwrap_or_default(),
                    created_at: parse_timestamp(&created_at),
                    id,
                    user_id,
                    topic_id,
                    feedback,
                    rationale,
                })
            })
            .collect()
    }

    async fn upsert_topic(&self, topic: &Topic) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO topics (id, name, difficulty_level) VALUES (?1, ?2, ?3)
               ON CONFLICT(id) DO UPDATE SET name = excluded.name, difficulty_level = excluded.difficulty_level"#,
            params![topic.id, topic.name, topic.difficulty_level],
        )?;
        Ok(())
    }

    async fn add_prerequisite(&self, topic_id: &str, prerequisite_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO topic_prerequisites (topic_id, prerequisite_id) VALUES (?1, ?2)",
            params![topic_id, prerequisite_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Difficulty, Problem};
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_mastery_upsert() {
        let dir = tempdir().unwrap();
        let store = SqliteProgressStore::new(dir.path().join("progress.db")).await.unwrap();

        assert_eq!(store.mastery("u1", "limits").await.unwrap(), None);
        store.set_mastery("u1", "limits", 0.25).await.unwrap();
        store.set_mastery("u1", "limits", 0.4).await.unwrap();
        assert_eq!(store.mastery("u1", "limits").await.unwrap(), Some(0.4));

        store.set_mastery("u1", "limits", -3.0).await.unwrap();
        assert_eq!(store.mastery("u1", "limits").await.unwrap(), Some(0.0));
    }

    #[tokio::test]
    async fn test_attempts_newest_first() {
        let dir = tempdir().unwrap();
        let store = SqliteProgressStore::new(dir.path().join("nested/dir/progress.db"))
            .await
            .unwrap();

        for score in [40.0, 60.0, 80.0] {
            store
                .record_quiz_attempt(&QuizAttempt {
                    user_id: "u1".into(),
                    topic_id: "limits".into(),
                    score,
                    answers: json!({"q1": 2}),
                    attempted_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        let recent = store.recent_attempts("u1", "limits", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].score, 80.0);
        assert_eq!(recent[1].score, 60.0);
        assert_eq!(recent[0].answers, json!({"q1": 2}));
    }

    #[tokio::test]
    async fn test_topics_and_prerequisites() {
        let dir = tempdir().unwrap();
        let store = SqliteProgressStore::new(dir.path().join("progress.db")).await.unwrap();

        let algebra = Topic {
            id: "algebra".into(),
            name: "Algebra".into(),
            difficulty_level: Some(1),
        };
        let limits = Topic {
            id: "limits".into(),
            name: "Limits".into(),
            difficulty_level: None,
        };
        store.upsert_topic(&algebra).await.unwrap();
        store.upsert_topic(&limits).await.unwrap();
        store.add_prerequisite("limits", "algebra").await.unwrap();
        store.add_prerequisite("limits", "algebra").await.unwrap();

        let prereqs = store.prerequisites("limits").await.unwrap();
        assert_eq!(prereqs, vec![algebra]);
    }

    #[tokio::test]
    async fn test_session_roundtrip_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.db");
        let session = SessionRecord {
            id: "session-1".into(),
            user_id: "u1".into(),
            topic_id: "limits".into(),
            decision: AdaptationKind::Reinforce,
            feedback: "Keep going".into(),
            problems: vec![Problem {
                problem: "Evaluate lim x->0 sin(x)/x".into(),
                topic: "Limits".into(),
                difficulty: Difficulty::Medium,
                hint: None,
            }],
            rationale: "Mixed understanding".into(),
            created_at: Utc::now(),
        };

        {
            let store = SqliteProgressStore::new(&path).await.unwrap();
            store.record_session(&session).await.unwrap();
        }

        let store = SqliteProgressStore::new(&path).await.unwrap();
        let loaded = store.sessions("u1", "limits", 5).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].decision, AdaptationKind::Reinforce);
        assert_eq!(loaded[0].problems, session.problems);
        assert_eq!(loaded[0].id, "session-1");
    }
}
