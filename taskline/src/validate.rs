//! Schema gate applied after every stage and to the assembled artifact.
//!
//! Each stage output is checked against its embedded JSON Schema (Draft
//! 2020-12) and then against the semantic invariants in
//! [`crate::core::invariants`]. Both kinds of failure are reported as one
//! [`SchemaViolation`].

use anyhow::{Context, Result};
use jsonschema::{Draft, Validator};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::artifact::RunArtifact;
use crate::core::invariants::{artifact_invariants, stage_invariants};
use crate::core::types::{StageId, StageOutput};
use crate::error::{SchemaViolation, Violation};

macro_rules! stage_schema {
    ($name:literal) => {
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../schemas/stages/",
            $name,
            ".schema.json"
        ))
    };
}

const STAGE_SCHEMAS: [(StageId, &str); 11] = [
    (StageId::Observation, stage_schema!("observation")),
    (
        StageId::PatternRecognition,
        stage_schema!("pattern_recognition"),
    ),
    (StageId::Decomposition, stage_schema!("decomposition")),
    (StageId::Retrieval, stage_schema!("retrieval")),
    (StageId::Guidance, stage_schema!("guidance")),
    (StageId::TaskPlanning, stage_schema!("task_planning")),
    (StageId::SafetyValidation, stage_schema!("safety_validation")),
    (StageId::ActionGeneration, stage_schema!("action_generation")),
    (StageId::Execution, stage_schema!("execution")),
    (StageId::Evaluation, stage_schema!("evaluation")),
    (StageId::Reflection, stage_schema!("reflection")),
];

const ARTIFACT_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/run_artifact.schema.json"
));

/// Subject name used for artifact-level violations.
pub const ARTIFACT_SUBJECT: &str = "run_artifact";

/// Validate `value` against `schema`, handing the value back on success.
pub fn validate<T: Serialize>(
    schema: &Validator,
    subject: &str,
    value: T,
) -> Result<T, SchemaViolation> {
    let errors = match serde_json::to_value(&value) {
        Ok(instance) => schema_errors(schema, &instance),
        Err(err) => vec![Violation::new("", format!("not serializable: {err}"))],
    };
    if errors.is_empty() {
        Ok(value)
    } else {
        Err(SchemaViolation {
            subject: subject.to_string(),
            errors,
        })
    }
}

fn schema_errors(schema: &Validator, instance: &Value) -> Vec<Violation> {
    schema
        .iter_errors(instance)
        .map(|err| Violation::new(err.instance_path().to_string(), err.to_string()))
        .collect()
}

/// Compiled schemas for every stage plus the run artifact.
pub struct SchemaGate {
    stages: Vec<Validator>,
    artifact: Validator,
}

impl std::fmt::Debug for SchemaGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaGate")
            .field("stages", &self.stages.len())
            .finish_non_exhaustive()
    }
}

impl SchemaGate {
    /// Compile the embedded schemas.
    pub fn new() -> Result<Self> {
        let mut stages = Vec::with_capacity(STAGE_SCHEMAS.len());
        for (stage, raw) in STAGE_SCHEMAS {
            stages.push(compile(raw).with_context(|| format!("compile {stage} schema"))?);
        }
        let artifact = compile(ARTIFACT_SCHEMA).context("compile run artifact schema")?;
        Ok(Self { stages, artifact })
    }

    /// Schema plus invariants for one stage output.
    pub fn check_stage(&self, output: StageOutput) -> Result<StageOutput, SchemaViolation> {
        let stage = output.stage();
        let schema = &self.stages[stage.index()];
        let output = validate(schema, stage.as_str(), output)?;
        let violations = stage_invariants(&output);
        if !violations.is_empty() {
            return Err(SchemaViolation {
                subject: stage.as_str().to_string(),
                errors: violations,
            });
        }
        debug!(stage = %stage, "stage output passed schema gate");
        Ok(output)
    }

    /// Whole-artifact schema, every stage schema, and artifact invariants.
    pub fn check_artifact(&self, artifact: &RunArtifact) -> Result<(), SchemaViolation> {
        validate(&self.artifact, ARTIFACT_SUBJECT, artifact)?;
        let mut errors = Vec::new();
        for (idx, output) in artifact.stages.iter().enumerate() {
            let schema = &self.stages[output.stage().index()];
            if let Err(violation) = validate(schema, output.stage().as_str(), output) {
                errors.extend(violation.errors.into_iter().map(|v| {
                    Violation::new(format!("/stages/{idx}{}", v.path), v.message)
                }));
            }
        }
        errors.extend(artifact_invariants(artifact));
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolation {
                subject: ARTIFACT_SUBJECT.to_string(),
                errors,
            })
        }
    }
}

fn compile(raw: &str) -> Result<Validator> {
    let schema: Value = serde_json::from_str(raw).context("parse json schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("build json schema")?;
    Ok(compiled)
}
