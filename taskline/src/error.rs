//! Typed errors raised by the pipeline.
//!
//! Permission denials and dangerous-pattern hits are not errors: they are
//! recorded as data in the stage outputs.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::core::state_machine::PipelineState;
use crate::core::types::StageId;

/// Failure of a single generation call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("provider returned empty output")]
    Empty,
    #[error("provider failed: {0}")]
    Failed(String),
    #[error("provider timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// One schema or invariant failure, located by a JSON-pointer-like path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path}: {}", self.message)
    }
}

/// Stage output (or whole artifact) that failed its contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{subject} failed schema validation: {}", join_violations(.errors))]
pub struct SchemaViolation {
    /// Stage name, or `run_artifact` for the assembled record.
    pub subject: String,
    pub errors: Vec<Violation>,
}

fn join_violations(errors: &[Violation]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Anything that aborts a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage {stage} provider call failed: {source}")]
    Provider {
        stage: StageId,
        #[source]
        source: ProviderError,
    },
    #[error("stage {stage} prompt rendering failed: {source}")]
    Prompt {
        stage: StageId,
        #[source]
        source: minijinja::Error,
    },
    #[error(transparent)]
    Schema(#[from] SchemaViolation),
    #[error("stage {stage} requires missing context: {missing}")]
    MissingContext { stage: StageId, missing: StageId },
    #[error("stage {stage} recorded out of order (expected {expected})")]
    OutOfOrder { stage: StageId, expected: String },
    #[error("illegal pipeline transition {from} -> {to}")]
    IllegalTransition {
        from: PipelineState,
        to: PipelineState,
    },
    #[error("memory store: {0:#}")]
    Store(anyhow::Error),
}

impl PipelineError {
    pub fn provider(stage: StageId, source: ProviderError) -> Self {
        Self::Provider { stage, source }
    }
}

/// Terminal failure of one run. Nothing is persisted when this is returned.
#[derive(Debug, Error)]
#[error("Pipeline run `{run_id}` failed: {source}")]
pub struct RunError {
    pub run_id: String,
    /// State the machine was in when the failure happened.
    pub state: PipelineState,
    #[source]
    pub source: PipelineError,
}
