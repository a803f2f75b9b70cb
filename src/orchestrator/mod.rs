//! Learning-cycle orchestration
//!
//! Each stage owns its prompts and turns model text into typed values;
//! `cycle` chains them into plan, lesson, quiz, evaluation and re-plan.

pub mod analyzer;
pub mod cycle;
pub mod decision;
pub mod mastery;
pub mod planner;
pub mod problems;
pub mod quiz;
pub mod router;
pub mod tutor;

pub use cycle::{
    extract_next_subtopic, CycleOrchestrator, CycleResult, EvaluationComplete, PlanResult,
    QuizReady,
};
pub use decision::DecisionEngine;
pub use planner::{CurriculumPlan, Planner, SubtopicMapPlan};
pub use quiz::QuizMaster;
pub use router::{ModelRouter, Purpose};
pub use tutor::Tutor;
