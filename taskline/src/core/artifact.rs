//! Persisted run records and run identifiers.

use chrono::{DateTime, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};

use crate::core::scorecard::Scorecard;
use crate::core::types::{EvaluationOutput, StageOutput};

/// Full record of one completed run. Failed runs never produce one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    pub run_id: String,
    pub request: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// All eleven stage outputs, in stage order.
    pub stages: Vec<StageOutput>,
    pub success: bool,
}

impl RunArtifact {
    pub fn evaluation(&self) -> Option<&EvaluationOutput> {
        self.stages.iter().find_map(|stage| match stage {
            StageOutput::Evaluation(out) => Some(out),
            _ => None,
        })
    }
}

/// Compact scorecard summary written once per successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub run_id: String,
    pub request: String,
    pub completed_at: DateTime<Utc>,
    pub scorecard: Scorecard,
    pub total_score: u8,
    /// Where the full artifact was written.
    pub artifact_path: String,
}

impl PortfolioEntry {
    /// Derive the entry from an artifact; `None` if it has no evaluation.
    pub fn from_artifact(artifact: &RunArtifact, artifact_path: impl Into<String>) -> Option<Self> {
        let evaluation = artifact.evaluation()?;
        Some(Self {
            run_id: artifact.run_id.clone(),
            request: artifact.request.clone(),
            completed_at: artifact.completed_at,
            scorecard: evaluation.scorecard,
            total_score: evaluation.total_score,
            artifact_path: artifact_path.into(),
        })
    }
}

/// `run-<yyyymmddHHMMSS>-<6 lowercase alphanumerics>`.
pub fn generate_run_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix = std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase();
    format!("run-{}-{suffix}", now.format("%Y%m%d%H%M%S"))
}
