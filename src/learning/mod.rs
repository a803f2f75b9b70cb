//! Learner progress and the quiz-submission learning agent

pub mod agent;
pub mod sqlite;
pub mod store;

pub use agent::{LearningAgent, LearningOutcome, QuizSubmission};
pub use sqlite::SqliteProgressStore;
pub use store::{InMemoryProgressStore, ProgressStore, QuizAttempt, SessionRecord};
