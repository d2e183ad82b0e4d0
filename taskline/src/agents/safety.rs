//! Safety validation stage.
//!
//! Reports risks in the plan before anything is generated; it never
//! enforces. Enforcement happens later in the permission evaluator, which
//! shares the same dangerous-substring list.

use chrono::Utc;
use tracing::warn;

use crate::agents::StageDeps;
use crate::core::context::StageView;
use crate::core::patterns::{SYSTEM_PATHS, find_dangerous, find_matches, logs_secret};
use crate::core::permission::{PermissionLevel, PermissionPolicy};
use crate::core::types::{Complexity, GuidanceOutput, OwnerRole, PlanningOutput, SafetyOutput};
use crate::error::PipelineError;

pub fn run(deps: &StageDeps<'_>, view: StageView<'_>) -> Result<SafetyOutput, PipelineError> {
    let output = assess(view.planning()?, view.guidance()?, deps.policy);
    if !output.safe {
        warn!(
            risks = output.risks.len(),
            blocked = output.blocked_actions.len(),
            requires_approval = output.requires_approval,
            "plan flagged by safety validation"
        );
    }
    Ok(output)
}

pub fn assess(
    planning: &PlanningOutput,
    guidance: &GuidanceOutput,
    policy: &PermissionPolicy,
) -> SafetyOutput {
    let mut risks = Vec::new();
    let mut blocked_actions = Vec::new();
    let mut requires_approval = false;

    for task in &planning.tasks {
        for sub_step in &task.sub_steps {
            for pattern in find_dangerous(sub_step) {
                blocked_actions.push(format!("{}: {sub_step}", task.id));
                risks.push(format!(
                    "{}: dangerous pattern '{pattern}' in sub-step '{sub_step}'",
                    task.id
                ));
            }
            if logs_secret(sub_step) {
                requires_approval = true;
                risks.push(format!(
                    "{}: sub-step may log sensitive data: '{sub_step}'",
                    task.id
                ));
            }
        }

        for prefix in find_matches(&task.description, SYSTEM_PATHS) {
            blocked_actions.push(format!("{}: {}", task.id, task.description));
            risks.push(format!("{}: touches system path '{prefix}'", task.id));
        }
    }

    if policy.level == PermissionLevel::ReadOnly
        && planning.tasks.iter().any(|task| task.owner == OwnerRole::Implementor)
    {
        requires_approval = true;
        risks.push("Implementation tasks under read-only permission level".to_string());
    }

    if guidance.complexity == Complexity::High {
        risks.push("High complexity plan: review the task breakdown".to_string());
    }

    SafetyOutput {
        completed_at: Utc::now(),
        safe: blocked_actions.is_empty() && !requires_approval,
        risks,
        blocked_actions,
        requires_approval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::planner::plan;
    use crate::core::types::{PlanStep, VERIFY_STEP_ACTION};
    use std::path::PathBuf;

    fn guidance(actions: &[&str], complexity: Complexity) -> GuidanceOutput {
        GuidanceOutput {
            completed_at: Utc::now(),
            steps: actions
                .iter()
                .zip(1u32..)
                .map(|(action, step)| PlanStep {
                    step,
                    action: action.to_string(),
                    rationale: "r".to_string(),
                    expected_output: "e".to_string(),
                })
                .collect(),
            complexity,
            warnings: Vec::new(),
            best_practices: Vec::new(),
        }
    }

    fn policy(level: PermissionLevel) -> PermissionPolicy {
        PermissionPolicy::new(level, vec![PathBuf::from("/work")])
    }

    fn check(actions: &[&str], complexity: Complexity, level: PermissionLevel) -> SafetyOutput {
        let guidance = guidance(actions, complexity);
        assess(&plan(&guidance), &guidance, &policy(level))
    }

    #[test]
    fn benign_plan_is_safe() {
        let out = check(
            &["Address hello", VERIFY_STEP_ACTION],
            Complexity::Low,
            PermissionLevel::WorkspaceWrite,
        );
        assert!(out.safe);
        assert!(out.risks.is_empty());
        assert!(out.blocked_actions.is_empty());
    }

    #[test]
    fn dangerous_sub_step_is_blocked() {
        let out = check(
            &["Run rm -rf /tmp/data", VERIFY_STEP_ACTION],
            Complexity::Low,
            PermissionLevel::WorkspaceWrite,
        );
        assert!(!out.safe);
        assert!(!out.blocked_actions.is_empty());
        assert!(out.risks.iter().any(|r| r.contains("rm -rf")));
    }

    #[test]
    fn logging_secrets_requires_approval() {
        let out = check(
            &["console.log the api token", VERIFY_STEP_ACTION],
            Complexity::Low,
            PermissionLevel::WorkspaceWrite,
        );
        assert!(out.requires_approval);
        assert!(!out.safe);
        assert!(out.blocked_actions.is_empty());
    }

    #[test]
    fn system_path_in_description_is_blocked() {
        let out = check(
            &["Edit /etc/hosts", VERIFY_STEP_ACTION],
            Complexity::Low,
            PermissionLevel::WorkspaceWrite,
        );
        assert_eq!(out.blocked_actions.len(), 1);
        assert!(out.risks.iter().any(|r| r.contains("/etc/")));
    }

    #[test]
    fn read_only_level_requires_approval_for_implementor_tasks() {
        let out = check(
            &["Address hello", VERIFY_STEP_ACTION],
            Complexity::Low,
            PermissionLevel::ReadOnly,
        );
        assert!(out.requires_approval);
        assert_eq!(out.risks.len(), 1);
    }

    #[test]
    fn read_only_risk_is_reported_once_per_plan() {
        let out = check(
            &["Address hello", "Address world", "Address again", VERIFY_STEP_ACTION],
            Complexity::Medium,
            PermissionLevel::ReadOnly,
        );
        assert!(out.requires_approval);
        assert!(!out.safe);
        assert_eq!(
            out.risks,
            vec!["Implementation tasks under read-only permission level".to_string()]
        );
    }

    #[test]
    fn read_only_plan_without_implementor_tasks_has_no_risk() {
        let out = check(&[VERIFY_STEP_ACTION], Complexity::Low, PermissionLevel::ReadOnly);
        assert!(out.safe);
        assert!(out.risks.is_empty());
    }

    #[test]
    fn high_complexity_is_informational() {
        let out = check(&["Address a"], Complexity::High, PermissionLevel::WorkspaceWrite);
        assert!(out.safe);
        assert_eq!(out.risks.len(), 1);
    }
}
