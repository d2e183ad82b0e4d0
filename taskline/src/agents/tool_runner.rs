//! Execution scaffold stage.
//!
//! Mock mode records what would happen. Live mode runs commands with `sh -c`
//! inside the workspace and performs file writes and reads. Path-bearing
//! actions that resolve outside the workspace are skipped in both modes.
//! Failures are recorded on the executed entry and never abort the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, warn};

use crate::agents::StageDeps;
use crate::core::context::StageView;
use crate::core::patterns::find_dangerous;
use crate::core::permission::is_within;
use crate::core::types::{ActionKind, ActionOutput, ExecutedCommand, ExecutionOutput, ProposedAction};
use crate::error::PipelineError;
use crate::io::config::ExecutionMode;
use crate::io::process::run_command_with_timeout;

/// Execution settings for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings<'a> {
    pub mode: ExecutionMode,
    pub workspace: &'a Path,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

pub fn run(deps: &StageDeps<'_>, view: StageView<'_>) -> Result<ExecutionOutput, PipelineError> {
    let settings = RunnerSettings {
        mode: deps.config.execution.mode,
        workspace: deps.workspace,
        timeout: deps.config.stage_timeout(),
        output_limit_bytes: deps.config.execution.output_limit_bytes,
    };
    Ok(execute(view.action()?, &settings))
}

pub fn execute(actions: &ActionOutput, settings: &RunnerSettings<'_>) -> ExecutionOutput {
    let mut output = ExecutionOutput {
        completed_at: Utc::now(),
        executed: Vec::new(),
        skipped: Vec::new(),
    };
    for action in &actions.actions {
        match skip_reason(action, settings.workspace) {
            Some(reason) => {
                warn!(reason = %reason, "execution skipped");
                output.skipped.push(reason);
            }
            None => output.executed.push(perform(action, settings)),
        }
    }
    output.completed_at = Utc::now();
    debug!(
        executed = output.executed.len(),
        skipped = output.skipped.len(),
        mode = ?settings.mode,
        "execution finished"
    );
    output
}

fn skip_reason(action: &ProposedAction, workspace: &Path) -> Option<String> {
    let described = action.describe();
    match action.kind {
        ActionKind::RunCommand => {
            let command = action.command.as_deref().unwrap_or_default();
            if let Some(pattern) = find_dangerous(command).first() {
                return Some(format!("blocked: dangerous pattern '{pattern}' ({described})"));
            }
            if action.requires_approval {
                return Some(format!("skipped: requires approval ({described})"));
            }
        }
        ActionKind::FileCreate | ActionKind::FileEdit if action.destructive => {
            return Some(format!("blocked: destructive file op ({described})"));
        }
        _ => {}
    }
    if action.kind != ActionKind::RunCommand {
        let inside = action
            .path
            .as_deref()
            .is_some_and(|path| is_within(&resolve(workspace, path), workspace));
        if !inside {
            return Some(format!("skipped: outside workspace ({described})"));
        }
    }
    action
        .blocked_reason
        .as_ref()
        .map(|reason| format!("skipped: blocked by policy ({described}: {reason})"))
}

fn perform(action: &ProposedAction, settings: &RunnerSettings<'_>) -> ExecutedCommand {
    let described = action.describe();
    if settings.mode == ExecutionMode::Mock {
        return ExecutedCommand {
            output: format!("[MOCK] would execute {described}"),
            command: described,
            success: true,
            mock: true,
        };
    }
    match perform_live(action, settings) {
        Ok((success, output)) => ExecutedCommand {
            command: described,
            success,
            output,
            mock: false,
        },
        Err(err) => {
            warn!(action = %described, err = %format!("{err:#}"), "live execution failed");
            ExecutedCommand {
                command: described,
                success: false,
                output: format!("{err:#}"),
                mock: false,
            }
        }
    }
}

fn perform_live(action: &ProposedAction, settings: &RunnerSettings<'_>) -> Result<(bool, String)> {
    match action.kind {
        ActionKind::RunCommand => {
            let command = action.command.as_deref().unwrap_or_default();
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command).current_dir(settings.workspace);
            let out = run_command_with_timeout(cmd, None, settings.timeout, settings.output_limit_bytes)
                .with_context(|| format!("run `{command}`"))?;
            Ok((out.success(), out.combined_text()))
        }
        ActionKind::FileCreate | ActionKind::FileEdit => {
            let path = action_path(action, settings.workspace)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            let contents = action.content.as_deref().unwrap_or_default();
            fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
            Ok((true, format!("wrote {} bytes to {}", contents.len(), path.display())))
        }
        ActionKind::ReadFile => {
            let path = action_path(action, settings.workspace)?;
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            let shown: String = contents.chars().take(settings.output_limit_bytes).collect();
            Ok((true, shown))
        }
    }
}

fn action_path(action: &ProposedAction, workspace: &Path) -> Result<PathBuf> {
    action
        .path
        .as_deref()
        .map(|path| resolve(workspace, path))
        .with_context(|| format!("{} has no path", action.describe()))
}

/// Relative paths are taken relative to the workspace.
fn resolve(workspace: &Path, path: &str) -> PathBuf {
    workspace.join(path)
}
