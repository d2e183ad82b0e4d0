//! Task planning stage: one task per plan step, chained linearly.

use chrono::Utc;

use crate::core::context::StageView;
use crate::core::types::{GuidanceOutput, OwnerRole, PlanStep, PlanningOutput, Task};
use crate::error::PipelineError;

pub const MAX_TITLE_CHARS: usize = 60;
const NO_ERRORS_CRITERION: &str = "No errors or warnings";

pub fn run(view: StageView<'_>) -> Result<PlanningOutput, PipelineError> {
    // Declared input; the plan steps already carry what the tasks need.
    view.decomposition()?;
    Ok(plan(view.guidance()?))
}

pub fn plan(guidance: &GuidanceOutput) -> PlanningOutput {
    let mut tasks: Vec<Task> = Vec::with_capacity(guidance.steps.len());
    for (idx, step) in guidance.steps.iter().enumerate() {
        let depends_on = tasks.last().map(|prev| vec![prev.id.clone()]).unwrap_or_default();
        tasks.push(task_for(idx + 1, step, depends_on));
    }
    PlanningOutput {
        completed_at: Utc::now(),
        tasks,
    }
}

fn task_for(number: usize, step: &PlanStep, depends_on: Vec<String>) -> Task {
    let owner = if step.action.to_lowercase().contains("verify") {
        OwnerRole::Qa
    } else {
        OwnerRole::Implementor
    };
    Task {
        id: format!("task-{number:03}"),
        title: truncate_title(&step.action),
        description: format!(
            "Step {}: {}. Rationale: {}",
            step.step, step.action, step.rationale
        ),
        owner,
        sub_steps: vec![
            format!("Analyse: {}", step.rationale),
            format!("Execute: {}", step.action),
            format!("Verify: {}", step.expected_output),
        ],
        done_criteria: vec![step.expected_output.clone(), NO_ERRORS_CRITERION.to_string()],
        depends_on,
    }
}

pub fn truncate_title(text: &str) -> String {
    if text.chars().count() <= MAX_TITLE_CHARS {
        return text.to_string();
    }
    let mut title: String = text.chars().take(MAX_TITLE_CHARS - 3).collect();
    title.push_str("...");
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Complexity, VERIFY_STEP_ACTION};

    fn step(number: u32, action: &str) -> PlanStep {
        PlanStep {
            step: number,
            action: action.to_string(),
            rationale: "because".to_string(),
            expected_output: format!("{action} done"),
        }
    }

    fn guidance(actions: &[&str]) -> GuidanceOutput {
        GuidanceOutput {
            completed_at: Utc::now(),
            steps: actions
                .iter()
                .zip(1u32..)
                .map(|(action, number)| step(number, action))
                .collect(),
            complexity: Complexity::Low,
            warnings: Vec::new(),
            best_practices: Vec::new(),
        }
    }

    #[test]
    fn tasks_form_a_linear_chain() {
        let out = plan(&guidance(&["Address hello", "Address world", VERIFY_STEP_ACTION]));
        let ids: Vec<&str> = out.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["task-001", "task-002", "task-003"]);
        assert!(out.tasks[0].depends_on.is_empty());
        assert_eq!(out.tasks[1].depends_on, vec!["task-001"]);
        assert_eq!(out.tasks[2].depends_on, vec!["task-002"]);
        assert_eq!(out.tasks[0].owner, OwnerRole::Implementor);
        assert_eq!(out.tasks[2].owner, OwnerRole::Qa);
        assert_eq!(out.tasks[0].sub_steps[1], "Execute: Address hello");
        assert_eq!(out.tasks[0].done_criteria[1], NO_ERRORS_CRITERION);
    }

    #[test]
    fn long_titles_are_truncated() {
        let long = "a".repeat(80);
        let title = truncate_title(&long);
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
        assert!(title.ends_with("..."));
        assert_eq!(truncate_title("short"), "short");
    }
}
