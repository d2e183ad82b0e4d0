//! Per-run context: one typed slot per stage, filled strictly in order.
//!
//! Stages read earlier outputs through a [`StageView`], which refuses access to
//! the reader's own slot and to anything later. A missing slot is reported as
//! [`PipelineError::MissingContext`], never a panic.

use crate::core::types::{
    ActionOutput, DecompositionOutput, EvaluationOutput, ExecutionOutput, GuidanceOutput,
    ObservationOutput, PatternOutput, PlanningOutput, ReflectionOutput, RetrievalOutput,
    SafetyOutput, StageId, StageOutput,
};
use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct PipelineContext {
    run_id: String,
    request: String,
    carried_improvements: Vec<String>,
    recorded: usize,
    observation: Option<ObservationOutput>,
    pattern: Option<PatternOutput>,
    decomposition: Option<DecompositionOutput>,
    retrieval: Option<RetrievalOutput>,
    guidance: Option<GuidanceOutput>,
    planning: Option<PlanningOutput>,
    safety: Option<SafetyOutput>,
    action: Option<ActionOutput>,
    execution: Option<ExecutionOutput>,
    evaluation: Option<EvaluationOutput>,
    reflection: Option<ReflectionOutput>,
}

impl PipelineContext {
    pub fn new(
        run_id: impl Into<String>,
        request: impl Into<String>,
        carried_improvements: Vec<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            request: request.into(),
            carried_improvements,
            recorded: 0,
            observation: None,
            pattern: None,
            decomposition: None,
            retrieval: None,
            guidance: None,
            planning: None,
            safety: None,
            action: None,
            execution: None,
            evaluation: None,
            reflection: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    /// Stage whose output must be recorded next, or `None` once all are in.
    pub fn next_stage(&self) -> Option<StageId> {
        StageId::ALL.get(self.recorded).copied()
    }

    /// Store a validated output in its slot.
    pub fn record(&mut self, output: StageOutput) -> Result<(), PipelineError> {
        let stage = output.stage();
        if self.next_stage() != Some(stage) {
            let expected = self
                .next_stage()
                .map_or_else(|| "none".to_string(), |next| next.to_string());
            return Err(PipelineError::OutOfOrder { stage, expected });
        }
        match output {
            StageOutput::Observation(out) => self.observation = Some(out),
            StageOutput::PatternRecognition(out) => self.pattern = Some(out),
            StageOutput::Decomposition(out) => self.decomposition = Some(out),
            StageOutput::Retrieval(out) => self.retrieval = Some(out),
            StageOutput::Guidance(out) => self.guidance = Some(out),
            StageOutput::TaskPlanning(out) => self.planning = Some(out),
            StageOutput::SafetyValidation(out) => self.safety = Some(out),
            StageOutput::ActionGeneration(out) => self.action = Some(out),
            StageOutput::Execution(out) => self.execution = Some(out),
            StageOutput::Evaluation(out) => self.evaluation = Some(out),
            StageOutput::Reflection(out) => self.reflection = Some(out),
        }
        self.recorded += 1;
        Ok(())
    }

    /// Read access for the stage `reader`.
    pub fn view(&self, reader: StageId) -> StageView<'_> {
        StageView { ctx: self, reader }
    }

    /// All eleven outputs in stage order; fails if any slot is empty.
    pub fn into_outputs(self) -> Result<Vec<StageOutput>, PipelineError> {
        if let Some(missing) = self.next_stage() {
            return Err(PipelineError::MissingContext {
                stage: StageId::Reflection,
                missing,
            });
        }
        let slots = [
            self.observation.map(StageOutput::Observation),
            self.pattern.map(StageOutput::PatternRecognition),
            self.decomposition.map(StageOutput::Decomposition),
            self.retrieval.map(StageOutput::Retrieval),
            self.guidance.map(StageOutput::Guidance),
            self.planning.map(StageOutput::TaskPlanning),
            self.safety.map(StageOutput::SafetyValidation),
            self.action.map(StageOutput::ActionGeneration),
            self.execution.map(StageOutput::Execution),
            self.evaluation.map(StageOutput::Evaluation),
            self.reflection.map(StageOutput::Reflection),
        ];
        slots
            .into_iter()
            .zip(StageId::ALL)
            .map(|(slot, stage)| {
                slot.ok_or(PipelineError::MissingContext {
                    stage: StageId::Reflection,
                    missing: stage,
                })
            })
            .collect()
    }
}

/// Read-only window onto the outputs that precede `reader`.
#[derive(Debug, Clone, Copy)]
pub struct StageView<'a> {
    ctx: &'a PipelineContext,
    reader: StageId,
}

impl<'a> StageView<'a> {
    pub fn run_id(&self) -> &'a str {
        &self.ctx.run_id
    }

    pub fn request(&self) -> &'a str {
        &self.ctx.request
    }

    /// Improvement notes carried over from the previous completed run.
    pub fn carried_improvements(&self) -> &'a [String] {
        &self.ctx.carried_improvements
    }

    fn slot<T>(&self, stage: StageId, value: Option<&'a T>) -> Result<&'a T, PipelineError> {
        let missing = PipelineError::MissingContext {
            stage: self.reader,
            missing: stage,
        };
        if stage >= self.reader {
            return Err(missing);
        }
        value.ok_or(missing)
    }

    pub fn observation(&self) -> Result<&'a ObservationOutput, PipelineError> {
        self.slot(StageId::Observation, self.ctx.observation.as_ref())
    }

    pub fn pattern(&self) -> Result<&'a PatternOutput, PipelineError> {
        self.slot(StageId::PatternRecognition, self.ctx.pattern.as_ref())
    }

    pub fn decomposition(&self) -> Result<&'a DecompositionOutput, PipelineError> {
        self.slot(StageId::Decomposition, self.ctx.decomposition.as_ref())
    }

    pub fn retrieval(&self) -> Result<&'a RetrievalOutput, PipelineError> {
        self.slot(StageId::Retrieval, self.ctx.retrieval.as_ref())
    }

    pub fn guidance(&self) -> Result<&'a GuidanceOutput, PipelineError> {
        self.slot(StageId::Guidance, self.ctx.guidance.as_ref())
    }

    pub fn planning(&self) -> Result<&'a PlanningOutput, PipelineError> {
        self.slot(StageId::TaskPlanning, self.ctx.planning.as_ref())
    }

    pub fn safety(&self) -> Result<&'a SafetyOutput, PipelineError> {
        self.slot(StageId::SafetyValidation, self.ctx.safety.as_ref())
    }

    pub fn action(&self) -> Result<&'a ActionOutput, PipelineError> {
        self.slot(StageId::ActionGeneration, self.ctx.action.as_ref())
    }

    pub fn execution(&self) -> Result<&'a ExecutionOutput, PipelineError> {
        self.slot(StageId::Execution, self.ctx.execution.as_ref())
    }

    pub fn evaluation(&self) -> Result<&'a EvaluationOutput, PipelineError> {
        self.slot(StageId::Evaluation, self.ctx.evaluation.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Domain;
    use chrono::Utc;

    fn observation() -> StageOutput {
        StageOutput::Observation(ObservationOutput {
            completed_at: Utc::now(),
            summary: "Task request: hello".to_string(),
            keywords: vec!["hello".to_string()],
            domain: Domain::Development,
            input: "hello".to_string(),
        })
    }

    fn pattern() -> StageOutput {
        StageOutput::PatternRecognition(PatternOutput {
            completed_at: Utc::now(),
            patterns: Vec::new(),
            similar_runs: Vec::new(),
            suggested_approach: "Start small".to_string(),
        })
    }

    #[test]
    fn records_in_order_and_exposes_earlier_slots() {
        let mut ctx = PipelineContext::new("run-1", "hello", Vec::new());
        ctx.record(observation()).expect("observation");
        ctx.record(pattern()).expect("pattern");

        let view = ctx.view(StageId::Decomposition);
        assert_eq!(view.observation().expect("obs").input, "hello");
        assert!(view.pattern().is_ok());
        assert_eq!(ctx.next_stage(), Some(StageId::Decomposition));
    }

    #[test]
    fn out_of_order_record_is_an_error() {
        let mut ctx = PipelineContext::new("run-1", "hello", Vec::new());
        let err = ctx.record(pattern()).expect_err("out of order");
        assert!(matches!(
            err,
            PipelineError::OutOfOrder {
                stage: StageId::PatternRecognition,
                ..
            }
        ));
        ctx.record(observation()).expect("observation");
        assert!(ctx.record(observation()).is_err());
    }

    #[test]
    fn view_refuses_own_and_later_slots() {
        let mut ctx = PipelineContext::new("run-1", "hello", Vec::new());
        ctx.record(observation()).expect("observation");

        // Filled, but not readable by the stage that produced it.
        let err = ctx
            .view(StageId::Observation)
            .observation()
            .expect_err("own slot");
        assert!(matches!(
            err,
            PipelineError::MissingContext {
                stage: StageId::Observation,
                missing: StageId::Observation,
            }
        ));
        // Earlier than the reader, but still empty.
        assert!(ctx.view(StageId::Retrieval).pattern().is_err());
    }

    #[test]
    fn incomplete_context_cannot_be_assembled() {
        let mut ctx = PipelineContext::new("run-1", "hello", vec!["note".to_string()]);
        ctx.record(observation()).expect("observation");
        assert_eq!(
            ctx.view(StageId::Guidance).carried_improvements(),
            ["note".to_string()]
        );
        let err = ctx.into_outputs().expect_err("incomplete");
        assert!(matches!(
            err,
            PipelineError::MissingContext {
                missing: StageId::PatternRecognition,
                ..
            }
        ));
    }
}
