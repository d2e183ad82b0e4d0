//! Semantic invariants not expressible via JSON Schema.

use std::collections::HashSet;

use crate::core::artifact::RunArtifact;
use crate::core::types::{
    ActionOutput, EvaluationOutput, GuidanceOutput, PlanningOutput, SafetyOutput, StageId,
    StageOutput, VERIFY_STEP_ACTION,
};
use crate::error::Violation;

/// Check the cross-field rules of one stage output.
pub fn stage_invariants(output: &StageOutput) -> Vec<Violation> {
    let mut errors = Vec::new();
    match output {
        StageOutput::Guidance(out) => guidance(out, &mut errors),
        StageOutput::TaskPlanning(out) => planning(out, &mut errors),
        StageOutput::SafetyValidation(out) => safety(out, &mut errors),
        StageOutput::ActionGeneration(out) => actions(out, &mut errors),
        StageOutput::Evaluation(out) => evaluation(out, &mut errors),
        _ => {}
    }
    errors
}

/// Check the assembled artifact:
/// - exactly eleven outputs in stage order
/// - `started_at <= completed_at`
/// - every stage output satisfies its own invariants
pub fn artifact_invariants(artifact: &RunArtifact) -> Vec<Violation> {
    let mut errors = Vec::new();
    if artifact.stages.len() != StageId::ALL.len() {
        errors.push(Violation::new(
            "/stages",
            format!(
                "expected {} stage outputs, found {}",
                StageId::ALL.len(),
                artifact.stages.len()
            ),
        ));
    }
    for (idx, (output, expected)) in artifact.stages.iter().zip(StageId::ALL).enumerate() {
        if output.stage() != expected {
            errors.push(Violation::new(
                format!("/stages/{idx}/stage"),
                format!("expected {expected}, found {}", output.stage()),
            ));
        }
        for violation in stage_invariants(output) {
            errors.push(Violation::new(
                format!("/stages/{idx}{}", violation.path),
                violation.message,
            ));
        }
    }
    if artifact.started_at > artifact.completed_at {
        errors.push(Violation::new(
            "/completed_at",
            "completed_at precedes started_at",
        ));
    }
    errors
}

fn guidance(out: &GuidanceOutput, errors: &mut Vec<Violation>) {
    for (idx, step) in out.steps.iter().enumerate() {
        let expected = idx as u32 + 1;
        if step.step != expected {
            errors.push(Violation::new(
                format!("/steps/{idx}/step"),
                format!("steps must be numbered consecutively (expected {expected})"),
            ));
        }
    }
    if out.steps.last().map(|step| step.action.as_str()) != Some(VERIFY_STEP_ACTION) {
        errors.push(Violation::new(
            "/steps",
            format!("plan must end with '{VERIFY_STEP_ACTION}'"),
        ));
    }
}

fn planning(out: &PlanningOutput, errors: &mut Vec<Violation>) {
    let mut seen = HashSet::new();
    for (idx, task) in out.tasks.iter().enumerate() {
        if !seen.insert(task.id.as_str()) {
            errors.push(Violation::new(
                format!("/tasks/{idx}/id"),
                format!("duplicate task id '{}'", task.id),
            ));
        }
        let expected: Vec<&str> = idx
            .checked_sub(1)
            .and_then(|prev| out.tasks.get(prev))
            .map(|prev| vec![prev.id.as_str()])
            .unwrap_or_default();
        let actual: Vec<&str> = task.depends_on.iter().map(String::as_str).collect();
        if actual != expected {
            errors.push(Violation::new(
                format!("/tasks/{idx}/depends_on"),
                format!("expected dependency chain {expected:?}, found {actual:?}"),
            ));
        }
    }
}

fn safety(out: &SafetyOutput, errors: &mut Vec<Violation>) {
    let expected = out.blocked_actions.is_empty() && !out.requires_approval;
    if out.safe != expected {
        errors.push(Violation::new(
            "/safe",
            "safe must be true exactly when nothing is blocked and no approval is required",
        ));
    }
}

fn actions(out: &ActionOutput, errors: &mut Vec<Violation>) {
    let blocked: Vec<_> = out.actions.iter().filter(|a| a.is_blocked()).collect();
    if blocked.len() != out.blocked.len() {
        errors.push(Violation::new(
            "/blocked",
            format!(
                "{} actions carry a blocked reason but {} are listed",
                blocked.len(),
                out.blocked.len()
            ),
        ));
    }
    for action in blocked {
        let leaked_path = action.path.as_ref().is_some_and(|path| {
            out.files_created.contains(path) || out.files_modified.contains(path)
        });
        let leaked_command = action
            .command
            .as_ref()
            .is_some_and(|command| out.commands_run.contains(command));
        if leaked_path || leaked_command {
            errors.push(Violation::new(
                "/blocked",
                format!("blocked action '{}' appears in an accepted list", action.describe()),
            ));
        }
    }
}

fn evaluation(out: &EvaluationOutput, errors: &mut Vec<Violation>) {
    if out.total_score != out.scorecard.total() {
        errors.push(Violation::new(
            "/total_score",
            format!(
                "total_score {} does not equal the scorecard sum {}",
                out.total_score,
                out.scorecard.total()
            ),
        ));
    }
    if out.decision.promote != out.decision.new_level.is_some() {
        errors.push(Violation::new(
            "/decision/new_level",
            "new_level must be present exactly when promote is set",
        ));
    }
    if out.decision.allow_clone && !out.decision.promote {
        errors.push(Violation::new(
            "/decision/allow_clone",
            "clone requires promotion",
        ));
    }
    let approved: HashSet<&String> = out.approved_lessons.iter().collect();
    if out.rejected_lessons.iter().any(|title| approved.contains(title)) {
        errors.push(Violation::new(
            "/rejected_lessons",
            "a lesson cannot be both approved and rejected",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::permission::PermissionLevel;
    use crate::core::scorecard::Scorecard;
    use crate::core::types::{
        ActionKind, Decision, OwnerRole, ProposedAction, ScoreSource, Task,
    };
    use chrono::Utc;

    fn task(id: &str, depends_on: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            owner: OwnerRole::Implementor,
            sub_steps: Vec::new(),
            done_criteria: Vec::new(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn broken_dependency_chain_is_reported() {
        let out = StageOutput::TaskPlanning(PlanningOutput {
            completed_at: Utc::now(),
            tasks: vec![
                task("task-001", &[]),
                task("task-002", &["task-001"]),
                task("task-003", &["task-001"]),
            ],
        });
        let errors = stage_invariants(&out);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/tasks/2/depends_on");
    }

    #[test]
    fn evaluation_total_must_match_scorecard() {
        let scorecard = Scorecard::new(4, 4, 5, 4, 4).expect("scorecard");
        let out = StageOutput::Evaluation(EvaluationOutput {
            completed_at: Utc::now(),
            scorecard,
            total_score: 20,
            scored_by: ScoreSource::Provider,
            decision: Decision {
                approve_lessons: true,
                promote: true,
                new_level: Some(PermissionLevel::Trusted),
                allow_clone: false,
            },
            feedback: String::new(),
            improvements: Vec::new(),
            approved_lessons: Vec::new(),
            rejected_lessons: Vec::new(),
        });
        let errors = stage_invariants(&out);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/total_score");
    }

    #[test]
    fn blocked_action_in_accepted_list_is_reported() {
        let blocked = ProposedAction {
            kind: ActionKind::FileCreate,
            path: Some("/work/a.md".to_string()),
            command: None,
            content: None,
            requires_approval: false,
            destructive: false,
            blocked_reason: Some("read-only level".to_string()),
        };
        let out = StageOutput::ActionGeneration(ActionOutput {
            completed_at: Utc::now(),
            actions: vec![blocked],
            explanation: String::new(),
            files_created: vec!["/work/a.md".to_string()],
            files_modified: Vec::new(),
            commands_run: Vec::new(),
            blocked: vec!["file-create: /work/a.md (read-only level)".to_string()],
        });
        let errors = stage_invariants(&out);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("accepted list"));
    }

    #[test]
    fn safe_flag_must_agree_with_findings() {
        let out = StageOutput::SafetyValidation(SafetyOutput {
            completed_at: Utc::now(),
            safe: true,
            risks: vec!["dangerous".to_string()],
            blocked_actions: vec!["rm -rf".to_string()],
            requires_approval: false,
        });
        assert_eq!(stage_invariants(&out)[0].path, "/safe");
    }
}
