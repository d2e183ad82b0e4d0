//! Action-generation stage.
//!
//! Derives concrete actions from the plan and the request, runs each through
//! the permission evaluator, and asks the provider to explain the result.
//! Actions are derived as follows:
//!
//! - every non-verification plan step proposes a step note under
//!   `<workspace>/<output_dir>/<run_id>/step-NN.md`
//! - backticked tokens in the request become commands (when they contain
//!   whitespace or no path characters) or file reads (when they look like paths)
//! - the verification step proposes the configured verify command

use std::path::Path;
use std::sync::LazyLock;

use chrono::Utc;
use minijinja::context;
use regex::Regex;
use tracing::{debug, warn};

use crate::agents::StageDeps;
use crate::core::context::StageView;
use crate::core::patterns::is_destructive;
use crate::core::permission::{PermissionDecision, PermissionPolicy, evaluate_action};
use crate::core::types::{
    ActionKind, ActionOutput, GuidanceOutput, ProposedAction, StageId, VERIFY_STEP_ACTION,
};
use crate::error::PipelineError;

static BACKTICK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("backtick regex should compile"));

/// Settings the derivation needs besides the plan.
#[derive(Debug, Clone, Copy)]
pub struct DeriveSettings<'a> {
    pub workspace: &'a Path,
    pub output_dir: &'a Path,
    pub run_id: &'a str,
    pub verify_command: &'a str,
}

pub fn run(deps: &StageDeps<'_>, view: StageView<'_>) -> Result<ActionOutput, PipelineError> {
    let guidance = view.guidance()?;
    let observation = view.observation()?;
    let settings = DeriveSettings {
        workspace: deps.workspace,
        output_dir: &deps.config.execution.output_dir,
        run_id: view.run_id(),
        verify_command: &deps.config.execution.verify_command,
    };
    let proposed = derive_actions(guidance, &observation.input, &settings);
    let mut output = gate_actions(proposed, deps.policy);

    let accepted: Vec<String> = output
        .actions
        .iter()
        .filter(|action| !action.is_blocked())
        .map(ProposedAction::describe)
        .collect();
    output.explanation = deps.generate(
        StageId::ActionGeneration,
        context! {
            request => view.request(),
            steps => &guidance.steps,
            accepted => accepted,
            blocked => &output.blocked,
            level => deps.policy.level.to_string(),
        },
    )?;
    Ok(output)
}

/// Propose actions for `guidance`; nothing is evaluated yet.
pub fn derive_actions(
    guidance: &GuidanceOutput,
    request: &str,
    settings: &DeriveSettings<'_>,
) -> Vec<ProposedAction> {
    let note_dir = settings
        .workspace
        .join(settings.output_dir)
        .join(settings.run_id);
    let mut actions = Vec::new();

    for step in &guidance.steps {
        if step.action == VERIFY_STEP_ACTION {
            continue;
        }
        let path = note_dir.join(format!("step-{:02}.md", step.step));
        actions.push(ProposedAction {
            kind: ActionKind::FileCreate,
            path: Some(path.display().to_string()),
            command: None,
            content: Some(format!(
                "# Step {}: {}\n\nExpected: {}\n",
                step.step, step.action, step.expected_output
            )),
            requires_approval: false,
            destructive: is_destructive(&step.action),
            blocked_reason: None,
        });
    }

    let mut seen: Vec<&str> = Vec::new();
    for caps in BACKTICK_RE.captures_iter(request) {
        let Some(token) = caps.get(1).map(|m| m.as_str().trim()) else {
            continue;
        };
        if token.is_empty() || seen.contains(&token) {
            continue;
        }
        seen.push(token);
        actions.push(action_for_token(token, settings.workspace));
    }

    if guidance
        .steps
        .iter()
        .any(|step| step.action == VERIFY_STEP_ACTION)
        && !settings.verify_command.trim().is_empty()
    {
        actions.push(command_action(settings.verify_command));
    }
    actions
}

fn action_for_token(token: &str, workspace: &Path) -> ProposedAction {
    let looks_like_command =
        token.contains(char::is_whitespace) || !token.contains(['/', '.']);
    if looks_like_command {
        return command_action(token);
    }
    let path = Path::new(token);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    };
    ProposedAction {
        kind: ActionKind::ReadFile,
        path: Some(path.display().to_string()),
        command: None,
        content: None,
        requires_approval: false,
        destructive: false,
        blocked_reason: None,
    }
}

fn command_action(command: &str) -> ProposedAction {
    ProposedAction {
        kind: ActionKind::RunCommand,
        path: None,
        command: Some(command.to_string()),
        content: None,
        requires_approval: false,
        destructive: is_destructive(command),
        blocked_reason: None,
    }
}

/// Evaluate every action and sort the accepted ones into the output lists.
///
/// The explanation is left empty for the caller to fill in.
pub fn gate_actions(proposed: Vec<ProposedAction>, policy: &PermissionPolicy) -> ActionOutput {
    let mut output = ActionOutput {
        completed_at: Utc::now(),
        actions: Vec::with_capacity(proposed.len()),
        explanation: String::new(),
        files_created: Vec::new(),
        files_modified: Vec::new(),
        commands_run: Vec::new(),
        blocked: Vec::new(),
    };

    for mut action in proposed {
        match evaluate_action(&action, policy) {
            PermissionDecision::Allowed => match action.kind {
                ActionKind::FileCreate => output.files_created.extend(action.path.clone()),
                ActionKind::FileEdit => output.files_modified.extend(action.path.clone()),
                ActionKind::RunCommand => output.commands_run.extend(action.command.clone()),
                ActionKind::ReadFile => {}
            },
            PermissionDecision::Blocked {
                reason,
                requires_approval,
            } => {
                warn!(action = %action.describe(), reason = %reason, "action blocked by policy");
                output.blocked.push(format!("{} ({reason})", action.describe()));
                action.requires_approval |= requires_approval;
                action.blocked_reason = Some(reason);
            }
        }
        output.actions.push(action);
    }
    debug!(
        actions = output.actions.len(),
        blocked = output.blocked.len(),
        "gated proposed actions"
    );
    output
}
