//! The eleven stage processors.
//!
//! Each stage reads earlier outputs through a [`StageView`] and returns its
//! own typed output. Deterministic stages are plain functions of their
//! inputs; the four provider-backed stages go through [`StageDeps::generate`].

use std::path::Path;

use minijinja::Value;

use crate::core::context::PipelineContext;
use crate::core::permission::{PermissionLevel, PermissionPolicy};
use crate::core::types::{StageId, StageOutput};
use crate::error::{PipelineError, ProviderError};
use crate::io::config::TasklineConfig;
use crate::io::memory::MemoryStore;
use crate::io::prompt::PromptEngine;
use crate::io::provider::Provider;

pub mod decomposer;
pub mod gatekeeper;
pub mod guide;
pub mod implementor;
pub mod learner;
pub mod observer;
pub mod pattern;
pub mod planner;
pub mod retriever;
pub mod safety;
pub mod tool_runner;

/// Collaborators and per-run settings shared by every stage.
pub struct StageDeps<'a> {
    pub provider: &'a dyn Provider,
    pub prompts: &'a PromptEngine,
    pub store: &'a dyn MemoryStore,
    pub config: &'a TasklineConfig,
    pub workspace: &'a Path,
    /// Policy snapshot taken when the run started.
    pub policy: &'a PermissionPolicy,
    /// Learner level snapshot taken when the run started.
    pub learner_level: PermissionLevel,
}

impl StageDeps<'_> {
    /// Render the prompt of `stage` and ask the provider; blank replies fail.
    pub(crate) fn generate(&self, stage: StageId, ctx: Value) -> Result<String, PipelineError> {
        let prompt = self
            .prompts
            .render(stage, ctx)
            .map_err(|source| PipelineError::Prompt { stage, source })?;
        let text = self
            .provider
            .generate(&prompt.directive, &prompt.payload)
            .map_err(|err| PipelineError::provider(stage, err))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::provider(stage, ProviderError::Empty));
        }
        Ok(text.to_string())
    }
}

/// Run `stage` against the outputs recorded so far.
pub fn run_stage(
    stage: StageId,
    deps: &StageDeps<'_>,
    ctx: &PipelineContext,
) -> Result<StageOutput, PipelineError> {
    let view = ctx.view(stage);
    let output = match stage {
        StageId::Observation => StageOutput::Observation(observer::run(deps, view)?),
        StageId::PatternRecognition => StageOutput::PatternRecognition(pattern::run(view)?),
        StageId::Decomposition => StageOutput::Decomposition(decomposer::run(view)?),
        StageId::Retrieval => StageOutput::Retrieval(retriever::run(deps, view)?),
        StageId::Guidance => StageOutput::Guidance(guide::run(view)?),
        StageId::TaskPlanning => StageOutput::TaskPlanning(planner::run(view)?),
        StageId::SafetyValidation => StageOutput::SafetyValidation(safety::run(deps, view)?),
        StageId::ActionGeneration => StageOutput::ActionGeneration(implementor::run(deps, view)?),
        StageId::Execution => StageOutput::Execution(tool_runner::run(deps, view)?),
        StageId::Evaluation => StageOutput::Evaluation(gatekeeper::run(deps, view)?),
        StageId::Reflection => StageOutput::Reflection(learner::run(deps, view)?),
    };
    Ok(output)
}
