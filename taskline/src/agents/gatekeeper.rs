//! Evaluation stage: scores the run and decides on lessons and promotion.
//!
//! The provider judges the run first; when it fails or its reply cannot be
//! parsed, a deterministic scorecard is used instead. This is the only stage
//! that recovers from a provider failure.
//!
//! Lesson disposition is decided here but persisted by the orchestrator
//! through [`dispose_lessons`] once the whole run has succeeded.

use chrono::Utc;
use minijinja::context;
use serde::Serialize;
use tracing::{debug, warn};

use crate::agents::StageDeps;
use crate::agents::learner::propose_lessons;
use crate::core::context::StageView;
use crate::core::scorecard::{
    FallbackInputs, decide, fallback_scorecard, feedback, improvement_notes, parse_provider_scores,
};
use crate::core::types::{CandidateLesson, EvaluationOutput, ScoreSource, StageId};
use crate::error::PipelineError;
use crate::io::memory::MemoryStore;

#[derive(Debug, Serialize)]
struct StageSummary {
    name: &'static str,
    summary: String,
}

pub fn run(deps: &StageDeps<'_>, view: StageView<'_>) -> Result<EvaluationOutput, PipelineError> {
    let observation = view.observation()?;
    let decomposition = view.decomposition()?;
    let retrieval = view.retrieval()?;
    let guidance = view.guidance()?;
    let planning = view.planning()?;
    let safety = view.safety()?;
    let action = view.action()?;
    let execution = view.execution()?;

    let stages = vec![
        StageSummary {
            name: StageId::Observation.as_str(),
            summary: format!("{} ({})", observation.summary, observation.domain),
        },
        StageSummary {
            name: StageId::Decomposition.as_str(),
            summary: format!("{} sub-problem(s)", decomposition.sub_problems.len()),
        },
        StageSummary {
            name: StageId::Retrieval.as_str(),
            summary: format!(
                "{} lesson(s), {} playbook(s), {} example(s)",
                retrieval.lessons.len(),
                retrieval.playbooks.len(),
                retrieval.examples.len()
            ),
        },
        StageSummary {
            name: StageId::TaskPlanning.as_str(),
            summary: format!("{} task(s)", planning.tasks.len()),
        },
        StageSummary {
            name: StageId::SafetyValidation.as_str(),
            summary: if safety.safe {
                "safe".to_string()
            } else {
                format!("unsafe: {} risk(s)", safety.risks.len())
            },
        },
        StageSummary {
            name: StageId::ActionGeneration.as_str(),
            summary: action.explanation.clone(),
        },
        StageSummary {
            name: StageId::Execution.as_str(),
            summary: format!(
                "{} executed, {} skipped",
                execution.executed.len(),
                execution.skipped.len()
            ),
        },
    ];

    let judged = deps.generate(
        StageId::Evaluation,
        context! {
            request => view.request(),
            stages => stages,
            total_actions => action.actions.len(),
            blocked_actions => action.blocked.len(),
            risk_count => safety.risks.len(),
            skipped => execution.skipped.len(),
        },
    );
    let provider_scores = match judged {
        Ok(text) => {
            let parsed = parse_provider_scores(&text);
            if parsed.is_none() {
                warn!("provider scores unparseable; using deterministic scorecard");
            }
            parsed
        }
        Err(PipelineError::Provider { source, .. }) => {
            warn!(err = %source, "provider failed to score; using deterministic scorecard");
            None
        }
        Err(err) => return Err(err),
    };
    let (scorecard, scored_by) = match provider_scores {
        Some(card) => (card, ScoreSource::Provider),
        None => (
            fallback_scorecard(&FallbackInputs {
                total_actions: action.actions.len(),
                blocked_actions: action.blocked.len(),
                plan_steps: guidance.steps.len(),
                explanation_len: action.explanation.chars().count(),
            }),
            ScoreSource::Fallback,
        ),
    };

    let total_score = scorecard.total();
    let decision = decide(total_score, &deps.config.thresholds, deps.policy.level);
    let titles: Vec<String> = propose_lessons(observation, guidance, action, view.run_id())
        .into_iter()
        .map(|lesson| lesson.title)
        .collect();
    let (approved_lessons, rejected_lessons) = if decision.approve_lessons {
        (titles, Vec::new())
    } else {
        (Vec::new(), titles)
    };
    debug!(
        total_score,
        scored_by = ?scored_by,
        promote = decision.promote,
        approved = approved_lessons.len(),
        "run evaluated"
    );

    Ok(EvaluationOutput {
        completed_at: Utc::now(),
        feedback: feedback(&scorecard, action.blocked.len()),
        improvements: improvement_notes(&scorecard, safety.risks.len()),
        scorecard,
        total_score,
        scored_by,
        decision,
        approved_lessons,
        rejected_lessons,
    })
}

/// Persist `candidates`, then approve or reject every one of them.
///
/// Returns the ids the candidates were stored under.
pub fn dispose_lessons(
    store: &dyn MemoryStore,
    candidates: &[CandidateLesson],
    run_id: &str,
    approve: bool,
) -> anyhow::Result<Vec<String>> {
    let mut ids = Vec::with_capacity(candidates.len());
    for lesson in candidates {
        let id = store.save_candidate_lesson(lesson, run_id)?;
        if approve {
            store.approve_lesson(&id)?;
        } else {
            store.reject_lesson(&id)?;
        }
        ids.push(id);
    }
    Ok(ids)
}
