//! Orchestration of one run through the eleven stages.
//!
//! Every stage output passes the schema gate before it is recorded. Nothing
//! is persisted until the assembled artifact has been validated; a failure
//! at any point leaves the memory store and the session untouched.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{Span, debug, info, instrument, warn};

use crate::agents::gatekeeper::dispose_lessons;
use crate::agents::{StageDeps, run_stage};
use crate::core::artifact::{PortfolioEntry, RunArtifact, generate_run_id};
use crate::core::context::PipelineContext;
use crate::core::state_machine::{PipelineState, StateMachine};
use crate::core::types::{StageId, StageOutput};
use crate::error::{PipelineError, RunError};
use crate::io::config::TasklineConfig;
use crate::io::memory::MemoryStore;
use crate::io::prompt::PromptEngine;
use crate::io::provider::Provider;
use crate::session::{Session, SessionState};
use crate::validate::SchemaGate;

pub struct Orchestrator {
    provider: Box<dyn Provider>,
    store: Box<dyn MemoryStore>,
    config: TasklineConfig,
    workspace: PathBuf,
    gate: SchemaGate,
    prompts: PromptEngine,
    session: Session,
}

impl Orchestrator {
    /// Build an orchestrator whose session starts from `config`.
    pub fn new(
        provider: Box<dyn Provider>,
        store: Box<dyn MemoryStore>,
        config: TasklineConfig,
        workspace: impl Into<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        let workspace = workspace.into();
        let session = Session::new(
            config.initial_policy(&workspace),
            config.policy.learner_level,
        );
        Ok(Self {
            provider,
            store,
            config,
            workspace,
            gate: SchemaGate::new()?,
            prompts: PromptEngine::new(),
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &dyn MemoryStore {
        self.store.as_ref()
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Run `request` through every stage and persist the result.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub fn run(&self, request: &str) -> Result<RunArtifact, RunError> {
        let started_at = Utc::now();
        let run_id = generate_run_id(started_at);
        Span::current().record("run_id", run_id.as_str());
        info!(request_len = request.len(), "run started");

        let snapshot = self.session.snapshot();
        let mut machine = StateMachine::new();
        match self.execute(&run_id, request, started_at, &snapshot, &mut machine) {
            Ok(artifact) => {
                info!(
                    transitions = machine.transitions().len(),
                    "run completed"
                );
                Ok(artifact)
            }
            Err(source) => {
                let state = machine.fail();
                warn!(state = %state, err = %source, "run failed");
                Err(RunError {
                    run_id,
                    state,
                    source,
                })
            }
        }
    }

    /// Reload a persisted artifact.
    pub fn load_run_artifact(&self, run_id: &str) -> Result<Option<RunArtifact>> {
        self.store.load_run_artifact(run_id)
    }

    fn execute(
        &self,
        run_id: &str,
        request: &str,
        started_at: DateTime<Utc>,
        snapshot: &SessionState,
        machine: &mut StateMachine,
    ) -> Result<RunArtifact, PipelineError> {
        let deps = StageDeps {
            provider: self.provider.as_ref(),
            prompts: &self.prompts,
            store: self.store.as_ref(),
            config: &self.config,
            workspace: &self.workspace,
            policy: &snapshot.policy,
            learner_level: snapshot.learner_level,
        };
        let mut ctx = PipelineContext::new(run_id, request, snapshot.carried_improvements.clone());
        for stage in StageId::ALL {
            machine.advance(PipelineState::for_stage(stage))?;
            let output = run_stage(stage, &deps, &ctx)?;
            let output = self.gate.check_stage(output)?;
            debug!(stage = %stage, agent = stage.agent_name(), "stage recorded");
            ctx.record(output)?;
        }

        machine.advance(PipelineState::Finalizing)?;
        let artifact = RunArtifact {
            run_id: run_id.to_string(),
            request: request.to_string(),
            started_at,
            completed_at: Utc::now(),
            stages: ctx.into_outputs()?,
            success: true,
        };
        self.gate.check_artifact(&artifact)?;
        self.persist(&artifact)?;
        if let Some(evaluation) = artifact.evaluation() {
            self.session.apply_feedback(evaluation);
        }
        machine.advance(PipelineState::Completed)?;
        Ok(artifact)
    }

    /// Lessons first, then the artifact, then its portfolio entry.
    fn persist(&self, artifact: &RunArtifact) -> Result<(), PipelineError> {
        let missing = |missing| PipelineError::MissingContext {
            stage: StageId::Reflection,
            missing,
        };
        let evaluation = artifact
            .evaluation()
            .ok_or_else(|| missing(StageId::Evaluation))?;
        let candidates = artifact
            .stages
            .iter()
            .find_map(|stage| match stage {
                StageOutput::Reflection(out) => Some(&out.candidate_lessons),
                _ => None,
            })
            .ok_or_else(|| missing(StageId::Reflection))?;

        let store = self.store.as_ref();
        let ids = dispose_lessons(
            store,
            candidates,
            &artifact.run_id,
            evaluation.decision.approve_lessons,
        )
        .map_err(PipelineError::Store)?;
        let path = store
            .save_run_artifact(artifact)
            .map_err(PipelineError::Store)?;
        let entry = PortfolioEntry::from_artifact(artifact, path.display().to_string())
            .ok_or_else(|| missing(StageId::Evaluation))?;
        store
            .save_portfolio_entry(&entry)
            .map_err(PipelineError::Store)?;
        debug!(
            lessons = ids.len(),
            approved = evaluation.decision.approve_lessons,
            path = %path.display(),
            "run persisted"
        );
        Ok(())
    }
}
