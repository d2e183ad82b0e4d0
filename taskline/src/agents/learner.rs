//! Reflection stage and candidate-lesson derivation.
//!
//! Candidate lessons are a pure function of the observation, guidance and
//! action outputs, so the evaluation stage can decide on them before the
//! reflection stage reports them.

use chrono::Utc;
use minijinja::context;

use crate::agents::StageDeps;
use crate::core::context::StageView;
use crate::core::permission::PermissionLevel;
use crate::core::types::{
    ActionOutput, CandidateLesson, Complexity, GuidanceOutput, ObservationOutput, ReflectionOutput,
    StageId,
};
use crate::error::PipelineError;

const TITLE_KEYWORDS: usize = 3;

pub fn run(deps: &StageDeps<'_>, view: StageView<'_>) -> Result<ReflectionOutput, PipelineError> {
    let observation = view.observation()?;
    let guidance = view.guidance()?;
    let action = view.action()?;

    let reflection = deps.generate(
        StageId::Reflection,
        context! {
            request => view.request(),
            domain => observation.domain.as_str(),
            steps => &guidance.steps,
            total_actions => action.actions.len(),
            blocked => &action.blocked,
            level => deps.learner_level.to_string(),
        },
    )?;

    Ok(ReflectionOutput {
        completed_at: Utc::now(),
        reflection,
        candidate_lessons: propose_lessons(observation, guidance, action, view.run_id()),
        growth_areas: growth_areas(guidance, action, deps.learner_level),
        permission_level: deps.learner_level,
        questions: questions(observation, action),
    })
}

/// Lessons a run proposes: always a domain-pattern lesson, plus a
/// permission-boundary lesson when anything was blocked.
pub fn propose_lessons(
    observation: &ObservationOutput,
    guidance: &GuidanceOutput,
    action: &ActionOutput,
    run_id: &str,
) -> Vec<CandidateLesson> {
    let domain = observation.domain;
    let focus = observation
        .keywords
        .iter()
        .take(TITLE_KEYWORDS)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let plan = guidance
        .steps
        .iter()
        .map(|step| format!("{}. {}", step.step, step.action))
        .collect::<Vec<_>>()
        .join("\n");

    let mut tags = vec![domain.to_string()];
    tags.extend(observation.keywords.iter().take(TITLE_KEYWORDS).cloned());
    let mut lessons = vec![CandidateLesson {
        title: format!("{domain} pattern: {focus}"),
        content: format!(
            "Requests about {focus} were handled as a {domain} task with a {}-step plan:\n\n{plan}\n",
            guidance.steps.len()
        ),
        tags,
        source_run: run_id.to_string(),
    }];

    if !action.blocked.is_empty() {
        let blocked = action
            .blocked
            .iter()
            .map(|entry| format!("- {entry}"))
            .collect::<Vec<_>>()
            .join("\n");
        lessons.push(CandidateLesson {
            title: format!("Permission boundary: {focus}"),
            content: format!(
                "{} of {} proposed action(s) were blocked by the permission policy:\n\n{blocked}\n",
                action.blocked.len(),
                action.actions.len()
            ),
            tags: vec!["permissions".to_string(), domain.to_string()],
            source_run: run_id.to_string(),
        });
    }
    lessons
}

fn growth_areas(
    guidance: &GuidanceOutput,
    action: &ActionOutput,
    level: PermissionLevel,
) -> Vec<String> {
    let mut areas = Vec::new();
    if !action.blocked.is_empty() {
        areas.push(format!("Propose actions that fit permission level {level}"));
    }
    if guidance.complexity == Complexity::High {
        areas.push("Split high-complexity requests into smaller runs".to_string());
    }
    if action.explanation.chars().count() < 20 {
        areas.push("Explain proposed actions in more detail".to_string());
    }
    if areas.is_empty() {
        areas.push("Keep verification steps explicit".to_string());
    }
    areas
}

fn questions(observation: &ObservationOutput, action: &ActionOutput) -> Vec<String> {
    let mut questions = vec![format!(
        "Were the keywords ({}) the right focus for this request?",
        observation.keywords.join(", ")
    )];
    if !action.blocked.is_empty() {
        questions.push("Which blocked actions should be requested with approval next time?".to_string());
    }
    questions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Domain, PlanStep, VERIFY_STEP_ACTION};

    fn observation() -> ObservationOutput {
        ObservationOutput {
            completed_at: Utc::now(),
            summary: "Task request: hello world".to_string(),
            keywords: vec!["hello".to_string(), "world".to_string()],
            domain: Domain::Development,
            input: "hello world".to_string(),
        }
    }

    fn guidance() -> GuidanceOutput {
        GuidanceOutput {
            completed_at: Utc::now(),
            steps: vec![PlanStep {
                step: 1,
                action: VERIFY_STEP_ACTION.to_string(),
                rationale: "r".to_string(),
                expected_output: "e".to_string(),
            }],
            complexity: Complexity::Low,
            warnings: Vec::new(),
            best_practices: Vec::new(),
        }
    }

    fn action(blocked: &[&str]) -> ActionOutput {
        ActionOutput {
            completed_at: Utc::now(),
            actions: Vec::new(),
            explanation: "A sufficiently long explanation.".to_string(),
            files_created: Vec::new(),
            files_modified: Vec::new(),
            commands_run: Vec::new(),
            blocked: blocked.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn clean_run_proposes_one_lesson() {
        let lessons = propose_lessons(&observation(), &guidance(), &action(&[]), "run-1");
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].title, "development pattern: hello, world");
        assert_eq!(lessons[0].source_run, "run-1");
        assert!(lessons[0].tags.contains(&"development".to_string()));
    }

    #[test]
    fn blocked_actions_add_a_distinct_boundary_lesson() {
        let lessons = propose_lessons(
            &observation(),
            &guidance(),
            &action(&["file-create: /w/a.md (read-only level)"]),
            "run-1",
        );
        assert_eq!(lessons.len(), 2);
        assert_ne!(lessons[0].title, lessons[1].title);
        assert!(lessons[1].content.contains("read-only level"));
    }

    #[test]
    fn growth_areas_follow_blocked_actions() {
        let areas = growth_areas(
            &guidance(),
            &action(&["x (y)"]),
            PermissionLevel::ReadOnly,
        );
        assert_eq!(areas.len(), 1);
        assert!(areas[0].starts_with("Propose actions that fit permission level"));
        let clean = growth_areas(&guidance(), &action(&[]), PermissionLevel::ReadOnly);
        assert_eq!(clean, vec!["Keep verification steps explicit".to_string()]);
    }
}
