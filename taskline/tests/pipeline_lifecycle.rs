//! End-to-end pipeline runs against a temporary workspace.
//!
//! These tests drive `Orchestrator::run` through all eleven stages and check
//! the persisted memory, the feedback loops and failure atomicity.

use std::thread;

use taskline::core::artifact::RunArtifact;
use taskline::core::permission::PermissionLevel;
use taskline::core::scorecard::Scorecard;
use taskline::core::state_machine::PipelineState;
use taskline::core::types::{
    ActionOutput, Domain, EvaluationOutput, ExecutionOutput, GuidanceOutput, ObservationOutput,
    ReflectionOutput, SafetyOutput, ScoreSource, StageId, StageOutput,
};
use taskline::error::{PipelineError, ProviderError};
use taskline::io::config::ExecutionMode;
use taskline::io::memory::{APPROVER, ApprovedLesson, MemoryStore};
use taskline::io::provider::StubProvider;
use taskline::test_support::{FailingProvider, ScriptedProvider, TestWorkspace};

fn observation(artifact: &RunArtifact) -> &ObservationOutput {
    match &artifact.stages[StageId::Observation.index()] {
        StageOutput::Observation(out) => out,
        other => panic!("unexpected stage {:?}", other.stage()),
    }
}

fn guidance(artifact: &RunArtifact) -> &GuidanceOutput {
    match &artifact.stages[StageId::Guidance.index()] {
        StageOutput::Guidance(out) => out,
        other => panic!("unexpected stage {:?}", other.stage()),
    }
}

fn safety(artifact: &RunArtifact) -> &SafetyOutput {
    match &artifact.stages[StageId::SafetyValidation.index()] {
        StageOutput::SafetyValidation(out) => out,
        other => panic!("unexpected stage {:?}", other.stage()),
    }
}

fn actions(artifact: &RunArtifact) -> &ActionOutput {
    match &artifact.stages[StageId::ActionGeneration.index()] {
        StageOutput::ActionGeneration(out) => out,
        other => panic!("unexpected stage {:?}", other.stage()),
    }
}

fn execution(artifact: &RunArtifact) -> &ExecutionOutput {
    match &artifact.stages[StageId::Execution.index()] {
        StageOutput::Execution(out) => out,
        other => panic!("unexpected stage {:?}", other.stage()),
    }
}

fn reflection(artifact: &RunArtifact) -> &ReflectionOutput {
    match &artifact.stages[StageId::Reflection.index()] {
        StageOutput::Reflection(out) => out,
        other => panic!("unexpected stage {:?}", other.stage()),
    }
}

/// Stored lessons equal the run's candidate lessons field for field.
fn assert_lessons_match_candidates(stored: &[ApprovedLesson], artifact: &RunArtifact) {
    let mut stored: Vec<_> = stored
        .iter()
        .map(|l| (l.title.clone(), l.content.clone(), l.tags.clone(), l.source_run.clone()))
        .collect();
    let mut expected: Vec<_> = reflection(artifact)
        .candidate_lessons
        .iter()
        .map(|l| (l.title.clone(), l.content.clone(), l.tags.clone(), l.source_run.clone()))
        .collect();
    stored.sort();
    expected.sort();
    assert_eq!(stored, expected);
}

fn evaluation(artifact: &RunArtifact) -> &EvaluationOutput {
    artifact.evaluation().expect("evaluation output")
}

fn scores(c: u8, v: u8, s: u8, cl: u8, a: u8) -> String {
    format!("correctness: {c}\nverification: {v}\nsafety: {s}\nclarity: {cl}\nautonomy: {a}")
}

/// Hello-world request through the stub provider at the default level.
#[test]
fn hello_world_run_completes_and_persists() {
    let ws = TestWorkspace::new();
    let orchestrator = ws.orchestrator(StubProvider);

    let artifact = orchestrator
        .run("Create a hello world function")
        .expect("run");

    assert!(artifact.success);
    assert_eq!(artifact.stages.len(), 11);
    for (output, stage) in artifact.stages.iter().zip(StageId::ALL) {
        assert_eq!(output.stage(), stage);
    }
    assert!(artifact.started_at <= artifact.completed_at);

    let obs = observation(&artifact);
    assert_eq!(obs.domain, Domain::Development);
    assert_eq!(obs.summary, "Task request: Create a hello world function");
    assert_eq!(obs.keywords, vec!["create", "hello", "world", "function"]);
    assert!(safety(&artifact).safe);
    assert!(actions(&artifact).blocked.is_empty());
    assert!(execution(&artifact).executed.iter().all(|e| e.mock));

    let eval = evaluation(&artifact);
    assert_eq!(eval.scored_by, ScoreSource::Provider);
    assert_eq!(eval.scorecard, Scorecard::new(4, 4, 5, 4, 4).expect("card"));
    assert_eq!(eval.total_score, 21);
    assert!(eval.decision.approve_lessons);
    assert!(eval.decision.promote);
    assert_eq!(eval.decision.new_level, Some(PermissionLevel::Trusted));
    assert!(!eval.decision.allow_clone);
    assert_eq!(eval.approved_lessons.len(), 1);
    assert!(eval.rejected_lessons.is_empty());

    let reloaded = orchestrator
        .load_run_artifact(&artifact.run_id)
        .expect("load")
        .expect("artifact present");
    assert_eq!(reloaded, artifact);

    let store = ws.store();
    let portfolio = store.list_portfolio().expect("portfolio");
    assert_eq!(portfolio.len(), 1);
    assert_eq!(portfolio[0].run_id, artifact.run_id);
    assert_eq!(portfolio[0].total_score, 21);
    let lessons = store.list_lessons().expect("lessons");
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0].approved_by, APPROVER);
    assert_eq!(lessons[0].source_run, artifact.run_id);
    assert_lessons_match_candidates(&lessons, &artifact);
    assert!(store.list_candidate_lessons().expect("candidates").is_empty());

    let session = orchestrator.session().snapshot();
    assert_eq!(session.policy.level, PermissionLevel::Trusted);
    assert_eq!(session.learner_level, PermissionLevel::Trusted);
    assert!(session.carried_improvements.is_empty());
}

/// Read-only level: every write is blocked, both lessons are approved at 21.
#[test]
fn read_only_run_blocks_writes_and_approves_both_lessons() {
    let ws = TestWorkspace::at_level(PermissionLevel::ReadOnly);
    let orchestrator = ws.orchestrator(StubProvider);

    let artifact = orchestrator
        .run("Create a hello world function")
        .expect("run");

    let acts = actions(&artifact);
    assert!(acts.files_created.is_empty());
    assert!(acts.commands_run.is_empty());
    assert!(!acts.blocked.is_empty());
    assert!(acts.blocked.iter().all(|entry| entry.ends_with("(read-only level)")));

    let safe = safety(&artifact);
    assert!(safe.requires_approval);
    assert!(!safe.safe);

    let exec = execution(&artifact);
    assert!(exec.executed.is_empty());
    assert!(exec.skipped.iter().all(|s| s.starts_with("skipped: blocked by policy")));

    let eval = evaluation(&artifact);
    assert_eq!(eval.total_score, 21);
    assert_eq!(eval.approved_lessons.len(), 2);
    assert!(eval.rejected_lessons.is_empty());
    assert_eq!(eval.decision.new_level, Some(PermissionLevel::WorkspaceWrite));
    let lessons = ws.store().list_lessons().expect("lessons");
    assert_eq!(lessons.len(), 2);
    assert_lessons_match_candidates(&lessons, &artifact);
}

/// Live mode never reads a backticked path that lies outside the workspace.
#[test]
fn live_run_skips_reads_outside_the_workspace() {
    let outside = tempfile::tempdir().expect("tempdir");
    let secret = outside.path().join("outside.txt");
    std::fs::write(&secret, "TOP-SECRET").expect("write secret");

    let mut ws = TestWorkspace::new();
    ws.config.execution.mode = ExecutionMode::Live;
    ws.config.execution.verify_command = "true".to_string();
    let orchestrator = ws.orchestrator(StubProvider);

    let artifact = orchestrator
        .run(&format!("Summarize `{}`", secret.display()))
        .expect("run");

    let exec = execution(&artifact);
    assert!(
        exec.skipped
            .iter()
            .any(|s| s.starts_with("skipped: outside workspace") && s.contains("outside.txt"))
    );
    assert!(exec.executed.iter().all(|e| !e.output.contains("TOP-SECRET")));
    let persisted = std::fs::read_to_string(
        ws.memory_root()
            .join("runs")
            .join(format!("{}.json", artifact.run_id)),
    )
    .expect("persisted artifact");
    assert!(!persisted.contains("TOP-SECRET"));
}

/// A backticked destructive command is blocked and never executed.
#[test]
fn destructive_command_is_blocked_before_execution() {
    let ws = TestWorkspace::new();
    let orchestrator = ws.orchestrator(StubProvider);

    let artifact = orchestrator
        .run("Clean up with `rm -rf /tmp/data`")
        .expect("run");

    let acts = actions(&artifact);
    assert!(
        acts.blocked
            .contains(&"run-command: rm -rf /tmp/data (destructive action requires approval)".to_string())
    );
    assert!(!acts.commands_run.iter().any(|c| c.contains("rm -rf")));
    let exec = execution(&artifact);
    assert!(
        exec.skipped
            .iter()
            .any(|s| s.starts_with("blocked: dangerous pattern 'rm -rf'"))
    );
    assert!(!exec.executed.iter().any(|e| e.command.contains("rm -rf")));
}

/// Improvement notes from one run show up in the next run's guidance.
#[test]
fn improvement_notes_carry_into_next_run() {
    let ws = TestWorkspace::new();
    let provider = ScriptedProvider::new().with_reply(StageId::Evaluation, scores(2, 2, 5, 3, 3));
    let orchestrator = ws.orchestrator(provider);

    let first = orchestrator
        .run("Create a hello world function")
        .expect("first run");
    let first_eval = evaluation(&first);
    assert_eq!(first_eval.total_score, 15);
    assert!(!first_eval.decision.promote);
    assert_eq!(first_eval.improvements.len(), 4);
    assert_eq!(
        orchestrator.session().snapshot().carried_improvements,
        first_eval.improvements
    );

    let second = orchestrator
        .run("Create a hello world function")
        .expect("second run");
    let practices = &guidance(&second).best_practices;
    assert!(practices[0].starts_with("Lesson: "));
    let carried: Vec<&String> = practices
        .iter()
        .filter(|p| p.starts_with("Improvement: "))
        .collect();
    assert_eq!(carried.len(), 3);
    assert_eq!(
        carried[0].as_str(),
        format!("Improvement: {}", first_eval.improvements[0])
    );
}

/// The promotion boundary is inclusive.
#[test]
fn total_of_twenty_promotes_and_nineteen_does_not() {
    let ws = TestWorkspace::new();
    let at_twenty = ws
        .orchestrator(ScriptedProvider::new().with_reply(StageId::Evaluation, scores(4, 4, 4, 4, 4)))
        .run("Create a hello world function")
        .expect("run");
    let eval = evaluation(&at_twenty);
    assert_eq!(eval.total_score, 20);
    assert!(eval.decision.promote);
    assert_eq!(eval.decision.new_level, Some(PermissionLevel::Trusted));

    let below = ws
        .orchestrator(ScriptedProvider::new().with_reply(StageId::Evaluation, scores(4, 4, 4, 4, 3)))
        .run("Create a hello world function")
        .expect("run");
    let eval = evaluation(&below);
    assert_eq!(eval.total_score, 19);
    assert!(!eval.decision.promote);
    assert_eq!(eval.decision.new_level, None);
}

/// Low totals reject every candidate and leave no lesson behind.
#[test]
fn low_score_rejects_candidates() {
    let ws = TestWorkspace::new();
    let artifact = ws
        .orchestrator(ScriptedProvider::new().with_reply(StageId::Evaluation, scores(1, 1, 1, 1, 1)))
        .run("Create a hello world function")
        .expect("run");
    let eval = evaluation(&artifact);
    assert!(!eval.decision.approve_lessons);
    assert!(eval.approved_lessons.is_empty());
    assert_eq!(eval.rejected_lessons.len(), 1);
    let store = ws.store();
    assert!(store.list_lessons().expect("lessons").is_empty());
    assert!(store.list_candidate_lessons().expect("candidates").is_empty());
    assert_eq!(store.list_portfolio().expect("portfolio").len(), 1);
}

/// Provider failure at evaluation falls back to deterministic scoring.
#[test]
fn evaluation_provider_failure_uses_fallback_scores() {
    let ws = TestWorkspace::new();
    let artifact = ws
        .orchestrator(FailingProvider {
            stage: StageId::Evaluation,
            error: ProviderError::Failed("offline".to_string()),
        })
        .run("Create a hello world function")
        .expect("run");
    let eval = evaluation(&artifact);
    assert_eq!(eval.scored_by, ScoreSource::Fallback);
    assert_eq!(eval.scorecard, Scorecard::new(5, 5, 5, 4, 5).expect("card"));
    assert_eq!(eval.total_score, 24);
}

/// Unparseable scores fall back the same way.
#[test]
fn unparseable_scores_use_fallback() {
    let ws = TestWorkspace::new();
    let artifact = ws
        .orchestrator(
            ScriptedProvider::new().with_reply(StageId::Evaluation, "looks good to me"),
        )
        .run("Create a hello world function")
        .expect("run");
    assert_eq!(evaluation(&artifact).scored_by, ScoreSource::Fallback);
}

/// A provider failure outside evaluation aborts the run and persists nothing.
#[test]
fn failed_run_persists_nothing_and_keeps_session() {
    let ws = TestWorkspace::new();
    let orchestrator = ws.orchestrator(FailingProvider {
        stage: StageId::Reflection,
        error: ProviderError::Failed("boom".to_string()),
    });
    let before = orchestrator.session().snapshot();

    let err = orchestrator
        .run("Create a hello world function")
        .expect_err("run fails");

    assert_eq!(err.state, PipelineState::Reflecting);
    assert!(matches!(
        err.source,
        PipelineError::Provider {
            stage: StageId::Reflection,
            ..
        }
    ));
    let message = err.to_string();
    assert!(message.starts_with(&format!("Pipeline run `{}` failed: ", err.run_id)));
    assert!(message.contains("boom"));

    assert_eq!(ws.memory_file_count(), 0);
    assert_eq!(orchestrator.session().snapshot(), before);
    assert!(
        orchestrator
            .load_run_artifact(&err.run_id)
            .expect("load")
            .is_none()
    );
}

/// Blank provider output is a failure, not an empty summary.
#[test]
fn blank_observation_fails_the_run() {
    let ws = TestWorkspace::new();
    let err = ws
        .orchestrator(ScriptedProvider::new().with_reply(StageId::Observation, "   \n"))
        .run("Create a hello world function")
        .expect_err("run fails");
    assert_eq!(err.state, PipelineState::Observing);
    assert!(matches!(
        err.source,
        PipelineError::Provider {
            source: ProviderError::Empty,
            ..
        }
    ));
    assert_eq!(ws.memory_file_count(), 0);
}

/// Runs sharing one orchestrator keep separate contexts.
#[test]
fn concurrent_runs_share_an_orchestrator() {
    let ws = TestWorkspace::new();
    let orchestrator = ws.orchestrator(StubProvider);

    let (a, b) = thread::scope(|scope| {
        let a = scope.spawn(|| orchestrator.run("Create a hello world function"));
        let b = scope.spawn(|| orchestrator.run("Deploy the api server"));
        (
            a.join().expect("join a").expect("run a"),
            b.join().expect("join b").expect("run b"),
        )
    });

    assert_ne!(a.run_id, b.run_id);
    assert_eq!(observation(&a).domain, Domain::Development);
    assert_eq!(observation(&b).domain, Domain::Operations);
    assert_eq!(ws.store().list_portfolio().expect("portfolio").len(), 2);
}
