//! Guidance stage: turns sub-problems into an ordered plan.

use chrono::Utc;

use crate::core::context::StageView;
use crate::core::types::{
    Complexity, DecompositionOutput, GuidanceOutput, PlanStep, RetrievalOutput, VERIFY_STEP_ACTION,
};
use crate::error::PipelineError;

const MAX_LESSON_PRACTICES: usize = 3;
const MAX_IMPROVEMENT_PRACTICES: usize = 3;
const GENERIC_PRACTICE: &str = "Work in small steps and verify each result before moving on";

pub fn run(view: StageView<'_>) -> Result<GuidanceOutput, PipelineError> {
    Ok(guide(
        view.decomposition()?,
        view.retrieval()?,
        view.carried_improvements(),
    ))
}

pub fn guide(
    decomposition: &DecompositionOutput,
    retrieval: &RetrievalOutput,
    improvements: &[String],
) -> GuidanceOutput {
    let mut steps: Vec<PlanStep> = decomposition
        .sub_problems
        .iter()
        .zip(1u32..)
        .map(|(sub_problem, step)| PlanStep {
            step,
            action: sub_problem.clone(),
            rationale: format!("Required to solve: {}", decomposition.core_problem),
            expected_output: format!("{sub_problem} completed"),
        })
        .collect();
    let verify_number = u32::try_from(steps.len()).unwrap_or(u32::MAX - 1) + 1;
    steps.push(PlanStep {
        step: verify_number,
        action: VERIFY_STEP_ACTION.to_string(),
        rationale: "Confirm the plan solved the core problem".to_string(),
        expected_output: "All sub-problems verified".to_string(),
    });

    GuidanceOutput {
        completed_at: Utc::now(),
        steps,
        complexity: complexity_for(decomposition.sub_problems.len()),
        warnings: decomposition.constraints.clone(),
        best_practices: best_practices(retrieval, improvements),
    }
}

pub fn complexity_for(sub_problems: usize) -> Complexity {
    match sub_problems {
        0..=2 => Complexity::Low,
        3..=5 => Complexity::Medium,
        _ => Complexity::High,
    }
}

fn best_practices(retrieval: &RetrievalOutput, improvements: &[String]) -> Vec<String> {
    let mut practices: Vec<String> = retrieval
        .lessons
        .iter()
        .take(MAX_LESSON_PRACTICES)
        .map(|lesson| format!("Lesson: {}", lesson.title))
        .collect();
    practices.extend(
        improvements
            .iter()
            .take(MAX_IMPROVEMENT_PRACTICES)
            .map(|note| format!("Improvement: {note}")),
    );
    if practices.is_empty() {
        practices.push(GENERIC_PRACTICE.to_string());
    }
    practices
}
