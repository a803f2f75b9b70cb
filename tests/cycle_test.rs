//! End-to-end learning cycle tests against a scripted gateway

use std::sync::Arc;

use tempfile::tempdir;
use tutor_agent::config::PlannerConfig;
use tutor_agent::error::GatewayError;
use tutor_agent::learning::{InMemoryProgressStore, ProgressStore};
use tutor_agent::orchestrator::{CycleOrchestrator, CycleResult, PlanResult, Purpose, QuizReady};
use tutor_agent::{Level, PipelineError, ScriptedGateway, UserModel};

const SUBTOPICS: &str = r#"Here is the map:
```json
{
  "subtopics": [
    {"id": "s1", "name": "Limits", "prerequisites": []},
    {"id": "s2", "name": "Continuity", "prerequisites": ["s1"]},
    {"id": "s3", "name": "Derivatives", "prerequisites": ["s1", "s2"]},
    {"id": "s4", "name": "Chain Rule", "prerequisites": ["s3"]},
    {"id": "s5", "name": "Implicit Differentiation", "prerequisites": ["s4"]},
    {"id": "s6", "name": "Related Rates", "prerequisites": ["s5"]},
    {"id": "s7", "name": "Optimization", "prerequisites": ["s3"]},
    {"id": "s8", "name": "Integrals", "prerequisites": ["s3"]},
  ]
}
```"#;

const LESSON: &str = r#"{
  "lessonId": "lesson-limits",
  "title": "Understanding Limits",
  "subtopic": "Limits",
  "level": "beginner",
  "objectives": ["Evaluate simple limits"],
  "explanation": "A limit describes the value a function approaches.",
  "examples": [{"header": "Polynomial limit", "steps": ["Substitute x = 2", "Result is 4"]}],
  "miniCheck": "What is lim x->1 of 3x?",
  "practiceProblems": ["lim x->3 of x^2"],
  "asciiVisual": "  /\n /  \n"
}"#;

const QUIZ: &str = r#"{
  "quizId": "quiz-limits-1",
  "questions": [
    {"id": "q1", "concept": "Limits", "question": "lim x->2 of x^2?", "options": ["2", "4", "8", "0"], "correctOptionIndex": 1},
    {"id": "q2", "concept": "Limits", "question": "lim x->0 of sin(x)/x?", "options": ["0", "inf", "-1", "1"], "correctOptionIndex": 3},
    {"id": "q3", "concept": "One-sided limits", "question": "lim x->0+ of 1/x?", "options": ["+inf", "-inf", "0", "1"], "correctOptionIndex": 0},
    {"id": "q4", "concept": "One-sided limits", "question": "lim x->0- of 1/x?", "options": ["+inf", "-inf", "0", "1"], "correctOptionIndex": 1},
    {"id": "q5", "concept": "Limits at infinity", "question": "lim x->inf of 1/x?", "options": ["1", "inf", "0", "-1"], "correctOptionIndex": 2}
  ]
}"#;

const GRADING: &str = r#"{
  "updatedMastery": {"Limits": 0.6, "One-sided limits": 0.2},
  "recommendations": ["Reteach one-sided limits from the left"]
}"#;

const WEAKNESS: &str = r#"{
  "weakConcepts": ["One-sided limits"],
  "strongConcepts": ["Limits"],
  "criticalFailures": ["One-sided limits"],
  "primaryFocus": "One-sided limits"
}"#;

const DRAFT: &str = r#"{"curriculum": [
  {"lessonId": "l1", "title": "Approaching from one side", "subtopic": "Limits", "estimatedTime": "20 minutes", "skillsTargeted": ["One-sided limits"]},
  {"lessonId": "l2", "title": "Continuity basics", "subtopic": "Continuity", "estimatedTime": 25, "skillsTargeted": []}
]}"#;

const OPTIMIZED: &str = r#"{"optimizedCurriculum": [
  {"lessonId": "l1", "title": "Approaching from one side", "subtopic": "Limits", "estimatedTime": 20, "skillsTargeted": ["One-sided limits"]},
  {"lessonId": "l2", "title": "Continuity basics", "subtopic": "Continuity", "estimatedTime": 25, "skillsTargeted": []}
]}"#;

const VALIDATED: &str = r#"{
  "finalCurriculum": [
    {"lessonId": "l1", "title": "Approaching from one side", "subtopic": "Continuity", "estimatedTime": 20, "skillsTargeted": ["One-sided limits"]}
  ],
  "notes": "Critical failure addressed first."
}"#;

fn calculus_gateway() -> ScriptedGateway {
    ScriptedGateway::new()
        .on("subject-mapping AI", SUBTOPICS)
        .on("lesson generation AI", LESSON)
        .on("quiz generation AI", QUIZ)
        .on("grading and learning analytics AI", GRADING)
        .on("educational analytics AI", WEAKNESS)
        .on("curriculum designer AI", DRAFT)
        .on("curriculum optimization AI", OPTIMIZED)
        .on("curriculum validation AI", VALIDATED)
}

fn learner() -> UserModel {
    UserModel::new("ada", "Calculus", Level::Beginner)
}

#[tokio::test]
async fn test_first_pass_returns_quiz_ready() {
    let gateway = Arc::new(calculus_gateway());
    let orchestrator = CycleOrchestrator::new(gateway.clone(), PlannerConfig::default());

    let result = orchestrator.run_cycle(learner(), None).await.unwrap();

    let ready = match result {
        CycleResult::QuizReady(ready) => ready,
        other => panic!("expected quiz_ready, got {:?}", other),
    };
    assert_eq!(ready.next_subtopic, "Limits");
    assert!(matches!(ready.plan, PlanResult::SubtopicMap(_)));
    assert_eq!(ready.lesson.title, "Understanding Limits");
    assert_eq!(ready.quiz.questions.len(), 5);
    assert_eq!(ready.user_model.generated_subtopics.as_ref().map(Vec::len), Some(8));

    // map, lesson, quiz and nothing else
    assert_eq!(gateway.requests().len(), 3);
    assert_eq!(gateway.count(Purpose::Analysis), 0);
}

#[tokio::test]
async fn test_full_cycle_with_answers() {
    let gateway = Arc::new(calculus_gateway());
    let orchestrator = CycleOrchestrator::new(gateway.clone(), PlannerConfig::default());

    let result = orchestrator
        .run_cycle(learner(), Some(&[1, 3, 0, 0, 2]))
        .await
        .unwrap();

    let value = serde_json::to_value(&result).unwrap();
    assert_eq!(value["cycle"], "evaluation_complete");

    let done = match result {
        CycleResult::EvaluationComplete(done) => done,
        other => panic!("expected evaluation_complete, got {:?}", other),
    };
    assert_eq!(done.eval_result.score, 4);
    assert_eq!(done.eval_result.total, 5);
    assert!(done.eval_result.incorrect_concepts.contains("One-sided limits"));
    assert!(!done.eval_result.updated_mastery.is_empty());
    assert_eq!(done.updated_model.mastery, done.eval_result.updated_mastery);
    assert_eq!(done.updated_model.history.len(), 1);
    assert_eq!(done.updated_model.history[0].subtopic, "Limits");

    match &done.followup_plan {
        PlanResult::Curriculum(plan) => {
            assert!(plan.used_final_test);
            assert_eq!(plan.weakness_analysis.primary_focus, "One-sided limits");
            assert_eq!(plan.notes, "Critical failure addressed first.");
        }
        other => panic!("expected a curriculum, got {:?}", other),
    }
    assert_eq!(done.recommended_next.as_deref(), Some("Continuity"));
}

#[tokio::test]
async fn test_cycle_persists_progress_when_store_attached() {
    let store = Arc::new(InMemoryProgressStore::new());
    let orchestrator =
        CycleOrchestrator::new(Arc::new(calculus_gateway()), PlannerConfig::default())
            .with_store(store.clone());

    orchestrator
        .run_cycle(learner(), Some(&[1, 3, 0, 0, 2]))
        .await
        .unwrap();

    let attempts = store.recent_attempts("ada", "Limits", 5).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!((attempts[0].score - 80.0).abs() < 1e-9);
    let limits = store.mastery("ada", "Limits").await.unwrap();
    assert_eq!(limits, Some(0.6));
}

#[tokio::test]
async fn test_resume_from_state_file_grades_saved_quiz() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("cycle.json");

    let first = CycleOrchestrator::new(Arc::new(calculus_gateway()), PlannerConfig::default());
    let ready = match first.run_cycle(learner(), None).await.unwrap() {
        CycleResult::QuizReady(ready) => ready,
        other => panic!("expected quiz_ready, got {:?}", other),
    };
    CycleResult::QuizReady(ready.clone()).sync_state_file(&state).unwrap();
    assert!(state.exists());

    let gateway = Arc::new(calculus_gateway());
    let second = CycleOrchestrator::new(gateway.clone(), PlannerConfig::default());
    let pending = QuizReady::load(&state).unwrap();
    assert_eq!(pending, ready);

    let result = second.resume_cycle(pending, &[1, 3, 0, 1, 2]).await.unwrap();
    result.sync_state_file(&state).unwrap();
    assert!(!state.exists(), "graded state must not be resumable again");

    match result {
        CycleResult::EvaluationComplete(done) => {
            assert_eq!(done.eval_result.score, 5);
            assert_eq!(done.quiz.quiz_id, "quiz-limits-1");
        }
        other => panic!("expected evaluation_complete, got {:?}", other),
    }
    let prompts: Vec<String> = gateway.requests().into_iter().map(|r| r.system_prompt).collect();
    assert!(!prompts.iter().any(|p| p.contains("quiz generation AI")));
    assert!(!prompts.iter().any(|p| p.contains("lesson generation AI")));
}

#[tokio::test]
async fn test_wrong_answer_count_is_rejected() {
    let orchestrator =
        CycleOrchestrator::new(Arc::new(calculus_gateway()), PlannerConfig::default());

    let err = orchestrator
        .run_cycle(learner(), Some(&[1, 3]))
        .await
        .unwrap_err();

    assert_eq!(err.stage(), "evaluation");
}

#[tokio::test]
async fn test_empty_map_has_no_subtopic() {
    let gateway = Arc::new(ScriptedGateway::new().on("subject-mapping AI", r#"{"subtopics": []}"#));
    let orchestrator = CycleOrchestrator::new(gateway.clone(), PlannerConfig::default());

    let err = orchestrator.run_cycle(learner(), None).await.unwrap_err();

    assert!(matches!(err, PipelineError::NoSubtopic));
    assert_eq!(gateway.requests().len(), 1);
}

#[tokio::test]
async fn test_missing_topic_fails_before_any_call() {
    let gateway = Arc::new(calculus_gateway());
    let orchestrator = CycleOrchestrator::new(gateway.clone(), PlannerConfig::default());

    let err = orchestrator
        .run_cycle(UserModel::new("ada", "   ", Level::Beginner), None)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::MissingTopic));
    assert!(gateway.requests().is_empty());
}

#[tokio::test]
async fn test_lesson_failure_stops_the_cycle() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .on("subject-mapping AI", SUBTOPICS)
            .fail_on(
                "lesson generation AI",
                GatewayError::Upstream { status: 502, body: "bad gateway".into() },
            )
            .on("quiz generation AI", QUIZ),
    );
    let orchestrator = CycleOrchestrator::new(gateway.clone(), PlannerConfig::default());

    let err = orchestrator.run_cycle(learner(), None).await.unwrap_err();

    assert!(matches!(err, PipelineError::Lesson(_)));
    assert_eq!(err.stage(), "lesson");
    assert_eq!(gateway.requests().len(), 2);
}

#[tokio::test]
async fn test_unparseable_lesson_is_a_lesson_error() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .on("subject-mapping AI", SUBTOPICS)
            .on("lesson generation AI", "Sorry, I can only chat about the weather."),
    );
    let orchestrator = CycleOrchestrator::new(gateway, PlannerConfig::default());

    let err = orchestrator.run_cycle(learner(), None).await.unwrap_err();

    assert!(matches!(err, PipelineError::Lesson(_)));
}

#[tokio::test]
async fn test_full_plan_on_first_pass_builds_curriculum() {
    let gateway = Arc::new(calculus_gateway());
    let orchestrator = CycleOrchestrator::new(
        gateway.clone(),
        PlannerConfig { full_plan_on_first_pass: true },
    );

    let ready = match orchestrator.run_cycle(learner(), None).await.unwrap() {
        CycleResult::QuizReady(ready) => ready,
        other => panic!("expected quiz_ready, got {:?}", other),
    };

    assert!(matches!(ready.plan, PlanResult::Curriculum(_)));
    assert_eq!(ready.next_subtopic, "Continuity");
    // baseline weakness is derived locally, no analytics call
    let prompts: Vec<String> = gateway.requests().into_iter().map(|r| r.system_prompt).collect();
    assert!(!prompts.iter().any(|p| p.contains("educational analytics AI")));
}
