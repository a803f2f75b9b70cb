//! Adaptive decision engine
//!
//! Maps error analysis, mastery, score and prerequisites to one of four
//! actions. The model is asked first; anything other than a clean member of
//! the enumeration (or a failed call) falls through to fixed rules, so a
//! decision is always produced.

use tracing::{debug, info, warn};

use crate::agent::gateway::{GatewayRequest, SharedGateway};
use crate::orchestrator::mastery::{as_percent, clamp_unit};
use crate::orchestrator::problems::generate_follow_up_problems;
use crate::orchestrator::router::Purpose;
use crate::types::{AdaptationDecision, AdaptationKind, DecisionSource, Topic};

const DECISION_TEMPERATURE: f32 = 0.2;

const DECISION_SYSTEM: &str = "You are an educational decision engine. Make precise adaptive learning decisions.";

/// Chooses and executes the next pedagogical action
pub struct DecisionEngine {
    gateway: SharedGateway,
}

impl DecisionEngine {
    pub fn new(gateway: SharedGateway) -> Self {
        Self { gateway }
    }

    /// Decide the next action. `mastery` in `[0, 1]`, `score` in `[0, 100]`.
    pub async fn decide(
        &self,
        error_analysis: &str,
        mastery: f64,
        score: f64,
        prerequisites: &[Topic],
    ) -> AdaptationDecision {
        let mastery = clamp_unit(mastery);
        let prereq_names = if prerequisites.is_empty() {
            "None".to_string()
        } else {
            prerequisites
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        let user = format!(
            "Based on this analysis:\n{}\n\nStudent Metrics:\n- Quiz Score: {}/100\n- Mastery Level: {}%\n- Prerequisites Available: {}\n\nDECIDE what the learning system should do:\n1. DRILL - Generate more practice problems on the same topic\n2. RETEACH - Go back to prerequisites first\n3. ADVANCE - Move to next topic\n4. REINFORCE - Consolidate current understanding\n\nDecision Logic:\n- If mastery < 30% or score < 40% and there are prerequisite gaps -> RETEACH\n- If mastery < 50% and trending up -> DRILL\n- If 50% < mastery < 80% -> REINFORCE or DRILL\n- If mastery > 80% -> ADVANCE\n- If score high but low mastery -> ADVANCE quickly\n\nRespond with EXACTLY ONE of these: DRILL | RETEACH | ADVANCE | REINFORCE\nRespond with ONLY the decision word (no explanation).",
            error_analysis,
            score.round(),
            as_percent(mastery),
            prereq_names
        );

        let request =
            GatewayRequest::new(Purpose::Tutoring, DECISION_SYSTEM, user, DECISION_TEMPERATURE);
        let (kind, source) = match self.gateway.invoke(request).await {
            Ok(raw) => match AdaptationKind::parse(&raw) {
                Some(kind) => (kind, DecisionSource::Model),
                None => {
                    warn!(
                        response = %raw.trim(),
                        "Decision outside the allowed set, using fallback rules"
                    );
                    (fallback_decision(mastery, prerequisites), DecisionSource::Fallback)
                }
            },
            Err(e) => {
                warn!(error = %e, "Decision request failed, using fallback rules");
                (fallback_decision(mastery, prerequisites), DecisionSource::Fallback)
            }
        };

        info!(decision = %kind, ?source, mastery, score, "Adaptive decision made");
        AdaptationDecision {
            kind,
            feedback: feedback_for(kind, mastery, prerequisites),
            follow_up_problems: Vec::new(),
            source,
        }
    }

    /// Attach follow-up problems where the action calls for them
    pub async fn execute(
        &self,
        mut decision: AdaptationDecision,
        error_analysis: &str,
        topic_id: &str,
    ) -> AdaptationDecision {
        if let Some(difficulty) = decision.kind.follow_up_difficulty() {
            decision.follow_up_problems =
                generate_follow_up_problems(&self.gateway, error_analysis, topic_id, difficulty)
                    .await;
            debug!(
                count = decision.follow_up_problems.len(),
                %difficulty,
                "Follow-up problems attached"
            );
        }
        decision
    }
}

/// Fixed rules used whenever the model's answer cannot be used
pub fn fallback_decision(mastery: f64, prerequisites: &[Topic]) -> AdaptationKind {
    if mastery < 0.3 && !prerequisites.is_empty() {
        AdaptationKind::Reteach
    } else if mastery < 0.5 {
        AdaptationKind::Drill
    } else if mastery > 0.8 {
        AdaptationKind::Advance
    } else {
        AdaptationKind::Reinforce
    }
}

/// Canned learner-facing feedback for each action
pub fn feedback_for(kind: AdaptationKind, mastery: f64, prerequisites: &[Topic]) -> String {
    match kind {
        AdaptationKind::Drill => format!(
            "Great effort! Your understanding is improving. Let's practice more problems to solidify these concepts. You're {}% of the way to mastery!",
            as_percent(mastery)
        ),
        AdaptationKind::Reteach => {
            let review = prerequisites
                .first()
                .map(|p| p.name.as_str())
                .unwrap_or("fundamentals");
            format!(
                "I noticed you might benefit from reviewing {} first. Let's strengthen those foundations before moving forward.",
                review
            )
        }
        AdaptationKind::Advance => {
            "Excellent! You've mastered this concept. You're ready to move to the next topic and expand your knowledge!"
                .to_string()
        }
        AdaptationKind::Reinforce => {
            "You're on the right track! Let's review and solidify what you've learned to build a strong foundation for what comes next."
                .to_string()
        }
    }
}
