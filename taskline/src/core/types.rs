//! Stage identifiers and the typed output contract of every stage.
//!
//! Each output carries a literal `stage` tag (via [`StageOutput`]) and a
//! completion timestamp. Field names are part of the persisted artifact
//! format and the embedded JSON schemas; renaming one is a format change.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::permission::PermissionLevel;
use crate::core::scorecard::Scorecard;

/// The eleven pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Observation,
    PatternRecognition,
    Decomposition,
    Retrieval,
    Guidance,
    TaskPlanning,
    SafetyValidation,
    ActionGeneration,
    Execution,
    Evaluation,
    Reflection,
}

impl StageId {
    pub const ALL: [StageId; 11] = [
        StageId::Observation,
        StageId::PatternRecognition,
        StageId::Decomposition,
        StageId::Retrieval,
        StageId::Guidance,
        StageId::TaskPlanning,
        StageId::SafetyValidation,
        StageId::ActionGeneration,
        StageId::Execution,
        StageId::Evaluation,
        StageId::Reflection,
    ];

    /// Zero-based position in the pipeline.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::PatternRecognition => "pattern_recognition",
            Self::Decomposition => "decomposition",
            Self::Retrieval => "retrieval",
            Self::Guidance => "guidance",
            Self::TaskPlanning => "task_planning",
            Self::SafetyValidation => "safety_validation",
            Self::ActionGeneration => "action_generation",
            Self::Execution => "execution",
            Self::Evaluation => "evaluation",
            Self::Reflection => "reflection",
        }
    }

    /// Name of the agent that owns the stage.
    pub fn agent_name(self) -> &'static str {
        match self {
            Self::Observation => "Observer",
            Self::PatternRecognition => "PatternRecognizer",
            Self::Decomposition => "ProblemDecomposer",
            Self::Retrieval => "Retriever",
            Self::Guidance => "Guide",
            Self::TaskPlanning => "Planner",
            Self::SafetyValidation => "SafetyValidator",
            Self::ActionGeneration => "Implementor",
            Self::Execution => "ToolRunner",
            Self::Evaluation => "Gatekeeper",
            Self::Reflection => "Learner",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse domain of a request, derived from keyword families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Development,
    QualityAssurance,
    Design,
    Operations,
}

impl Domain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::QualityAssurance => "quality_assurance",
            Self::Design => "design",
            Self::Operations => "operations",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationOutput {
    pub completed_at: DateTime<Utc>,
    pub summary: String,
    pub keywords: Vec<String>,
    pub domain: Domain,
    /// The original request, echoed back.
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternHint {
    pub name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternOutput {
    pub completed_at: DateTime<Utc>,
    pub patterns: Vec<PatternHint>,
    /// Run ids of similar historical runs (empty without a similarity index).
    pub similar_runs: Vec<String>,
    pub suggested_approach: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionOutput {
    pub completed_at: DateTime<Utc>,
    pub core_problem: String,
    pub sub_problems: Vec<String>,
    pub assumptions: Vec<String>,
    pub constraints: Vec<String>,
    pub required_knowledge: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonExcerpt {
    pub title: String,
    pub excerpt: String,
    pub matches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookExcerpt {
    pub excerpt: String,
    pub matches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleRun {
    pub run_id: String,
    pub request: String,
    pub total_score: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutput {
    pub completed_at: DateTime<Utc>,
    pub lessons: Vec<LessonExcerpt>,
    pub playbooks: Vec<PlaybookExcerpt>,
    pub examples: Vec<ExampleRun>,
}

/// Action text of the final step of every plan.
pub const VERIFY_STEP_ACTION: &str = "Verify all sub-problems resolved";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub step: u32,
    pub action: String,
    pub rationale: String,
    pub expected_output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceOutput {
    pub completed_at: DateTime<Utc>,
    pub steps: Vec<PlanStep>,
    pub complexity: Complexity,
    pub warnings: Vec<String>,
    pub best_practices: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerRole {
    Implementor,
    Qa,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub owner: OwnerRole,
    pub sub_steps: Vec<String>,
    pub done_criteria: Vec<String>,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningOutput {
    pub completed_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyOutput {
    pub completed_at: DateTime<Utc>,
    pub safe: bool,
    pub risks: Vec<String>,
    pub blocked_actions: Vec<String>,
    pub requires_approval: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    FileCreate,
    FileEdit,
    RunCommand,
    ReadFile,
}

impl ActionKind {
    pub fn is_file_write(self) -> bool {
        matches!(self, Self::FileCreate | Self::FileEdit)
    }
}

/// One action proposed by the implementor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAction {
    pub kind: ActionKind,
    pub path: Option<String>,
    pub command: Option<String>,
    pub content: Option<String>,
    pub requires_approval: bool,
    pub destructive: bool,
    /// Permission evaluator reason when the action was blocked.
    pub blocked_reason: Option<String>,
}

impl ProposedAction {
    pub fn is_blocked(&self) -> bool {
        self.blocked_reason.is_some()
    }

    /// Human-readable one-liner (`run-command: cargo test`).
    pub fn describe(&self) -> String {
        let kind = match self.kind {
            ActionKind::FileCreate => "file-create",
            ActionKind::FileEdit => "file-edit",
            ActionKind::RunCommand => "run-command",
            ActionKind::ReadFile => "read-file",
        };
        let target = self
            .command
            .as_deref()
            .or(self.path.as_deref())
            .unwrap_or("<none>");
        format!("{kind}: {target}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutput {
    pub completed_at: DateTime<Utc>,
    pub actions: Vec<ProposedAction>,
    pub explanation: String,
    pub files_created: Vec<String>,
    pub files_modified: Vec<String>,
    pub commands_run: Vec<String>,
    /// `"<action> (<reason>)"` for every action the evaluator blocked.
    pub blocked: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedCommand {
    pub command: String,
    pub success: bool,
    pub output: String,
    pub mock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub completed_at: DateTime<Utc>,
    pub executed: Vec<ExecutedCommand>,
    pub skipped: Vec<String>,
}

/// Where the scorecard came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Provider,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub approve_lessons: bool,
    pub promote: bool,
    pub new_level: Option<PermissionLevel>,
    pub allow_clone: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutput {
    pub completed_at: DateTime<Utc>,
    pub scorecard: Scorecard,
    pub total_score: u8,
    pub scored_by: ScoreSource,
    pub decision: Decision,
    pub feedback: String,
    pub improvements: Vec<String>,
    pub approved_lessons: Vec<String>,
    pub rejected_lessons: Vec<String>,
}

/// A learning proposed by a run, pending gatekeeper disposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLesson {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    /// Run id that proposed the lesson.
    pub source_run: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionOutput {
    pub completed_at: DateTime<Utc>,
    pub reflection: String,
    pub candidate_lessons: Vec<CandidateLesson>,
    pub growth_areas: Vec<String>,
    pub permission_level: PermissionLevel,
    pub questions: Vec<String>,
}

/// Output of any stage, tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageOutput {
    Observation(ObservationOutput),
    PatternRecognition(PatternOutput),
    Decomposition(DecompositionOutput),
    Retrieval(RetrievalOutput),
    Guidance(GuidanceOutput),
    TaskPlanning(PlanningOutput),
    SafetyValidation(SafetyOutput),
    ActionGeneration(ActionOutput),
    Execution(ExecutionOutput),
    Evaluation(EvaluationOutput),
    Reflection(ReflectionOutput),
}

impl StageOutput {
    pub fn stage(&self) -> StageId {
        match self {
            Self::Observation(_) => StageId::Observation,
            Self::PatternRecognition(_) => StageId::PatternRecognition,
            Self::Decomposition(_) => StageId::Decomposition,
            Self::Retrieval(_) => StageId::Retrieval,
            Self::Guidance(_) => StageId::Guidance,
            Self::TaskPlanning(_) => StageId::TaskPlanning,
            Self::SafetyValidation(_) => StageId::SafetyValidation,
            Self::ActionGeneration(_) => StageId::ActionGeneration,
            Self::Execution(_) => StageId::Execution,
            Self::Evaluation(_) => StageId::Evaluation,
            Self::Reflection(_) => StageId::Reflection,
        }
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        match self {
            Self::Observation(out) => out.completed_at,
            Self::PatternRecognition(out) => out.completed_at,
            Self::Decomposition(out) => out.completed_at,
            Self::Retrieval(out) => out.completed_at,
            Self::Guidance(out) => out.completed_at,
            Self::TaskPlanning(out) => out.completed_at,
            Self::SafetyValidation(out) => out.completed_at,
            Self::ActionGeneration(out) => out.completed_at,
            Self::Execution(out) => out.completed_at,
            Self::Evaluation(out) => out.completed_at,
            Self::Reflection(out) => out.completed_at,
        }
    }
}
