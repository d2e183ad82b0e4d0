//! Generation provider abstraction.
//!
//! The [`Provider`] trait decouples stages from the text-generation backend.
//! [`StubProvider`] is deterministic and needs nothing installed;
//! [`CommandProvider`] spawns an external command (by default `codex exec -`)
//! with the prompt on stdin. Tests use scripted providers instead.

use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::types::StageId;
use crate::error::ProviderError;
use crate::io::config::{ProviderKind, TasklineConfig};
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::stage_marker;

/// "Produce text given a system directive and a user payload."
pub trait Provider: Send + Sync {
    fn generate(&self, directive: &str, payload: &str) -> Result<String, ProviderError>;
}

impl<P: Provider + ?Sized> Provider for &P {
    fn generate(&self, directive: &str, payload: &str) -> Result<String, ProviderError> {
        (**self).generate(directive, payload)
    }
}

impl<P: Provider + ?Sized> Provider for Box<P> {
    fn generate(&self, directive: &str, payload: &str) -> Result<String, ProviderError> {
        (**self).generate(directive, payload)
    }
}

/// Scores returned by [`StubProvider`] for the evaluation stage (total 21).
pub const STUB_EVALUATION: &str = "correctness: 4\nverification: 4\nsafety: 5\nclarity: 4\nautonomy: 4";

const STUB_SUMMARY_CHARS: usize = 80;

/// Deterministic provider keyed on the stage marker of the directive.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubProvider;

impl StubProvider {
    /// Stub reply for `stage`; `request` is the payload's request text.
    pub fn reply(stage: Option<StageId>, payload: &str) -> String {
        match stage {
            Some(StageId::Observation) => {
                let request = request_line(payload);
                let truncated: String = request.chars().take(STUB_SUMMARY_CHARS).collect();
                format!("Task request: {truncated}")
            }
            Some(StageId::ActionGeneration) => {
                "Derived one action per plan step and checked each against the permission policy."
                    .to_string()
            }
            Some(StageId::Evaluation) => STUB_EVALUATION.to_string(),
            Some(StageId::Reflection) => {
                "The run followed the plan step by step. Blocked actions were recorded rather than forced. Next time, confirm the permission level before proposing commands."
                    .to_string()
            }
            _ => "OK".to_string(),
        }
    }
}

impl Provider for StubProvider {
    fn generate(&self, directive: &str, payload: &str) -> Result<String, ProviderError> {
        let stage = stage_marker(directive);
        debug!(stage = ?stage, "stub provider reply");
        Ok(Self::reply(stage, payload))
    }
}

/// First non-heading, non-empty line of the payload.
fn request_line(payload: &str) -> &str {
    payload
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .unwrap_or_default()
}

/// Provider that shells out to a configured command.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    argv: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandProvider {
    pub fn new(argv: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            argv,
            timeout,
            output_limit_bytes,
        }
    }
}

impl Provider for CommandProvider {
    #[instrument(skip_all, fields(program = self.argv.first().map(String::as_str), timeout_secs = self.timeout.as_secs()))]
    fn generate(&self, directive: &str, payload: &str) -> Result<String, ProviderError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| ProviderError::Failed("provider command is empty".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(args);

        let prompt = format!("{directive}\n\n{payload}\n");
        info!("invoking provider command");
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| ProviderError::Failed(format!("{err:#}")))?;

        if output.timed_out {
            warn!("provider command timed out");
            return Err(ProviderError::TimedOut(self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "provider command failed");
            return Err(ProviderError::Failed(format!(
                "exit status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let text = output.stdout_text().trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(text)
    }
}

/// Provider selected by the `[provider]` section of `config`.
pub fn provider_from_config(config: &TasklineConfig) -> Box<dyn Provider> {
    match config.provider.kind {
        ProviderKind::Stub => Box::new(StubProvider),
        ProviderKind::Command => Box::new(CommandProvider::new(
            config.provider.command.clone(),
            config.stage_timeout(),
            config.execution.output_limit_bytes,
        )),
    }
}
