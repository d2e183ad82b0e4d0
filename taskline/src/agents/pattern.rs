//! Pattern recognition stage.

use chrono::Utc;

use crate::core::context::StageView;
use crate::core::types::{ObservationOutput, PatternHint, PatternOutput};
use crate::error::PipelineError;

const TOP_CONFIDENCE: f64 = 0.9;
const CONFIDENCE_STEP: f64 = 0.1;
const MIN_CONFIDENCE: f64 = 0.5;

pub fn run(view: StageView<'_>) -> Result<PatternOutput, PipelineError> {
    Ok(recognize(view.observation()?))
}

/// One hint per keyword, confidence decaying by position.
pub fn recognize(observation: &ObservationOutput) -> PatternOutput {
    let domain = observation.domain;
    let mut patterns: Vec<PatternHint> = observation
        .keywords
        .iter()
        .enumerate()
        .map(|(idx, keyword)| PatternHint {
            name: format!("{domain}:{keyword}"),
            confidence: confidence_at(idx),
        })
        .collect();
    if patterns.is_empty() {
        patterns.push(PatternHint {
            name: format!("{domain}:generic"),
            confidence: MIN_CONFIDENCE,
        });
    }

    let lead = observation
        .keywords
        .first()
        .map_or("the request", String::as_str);
    PatternOutput {
        completed_at: Utc::now(),
        suggested_approach: format!(
            "Treat this as a {domain} task led by '{lead}': resolve each keyword in turn, then verify."
        ),
        patterns,
        similar_runs: Vec::new(),
    }
}

/// Rounded to two decimals so the decay stays exact in the artifact.
fn confidence_at(position: usize) -> f64 {
    let raw = (TOP_CONFIDENCE - CONFIDENCE_STEP * position as f64).max(MIN_CONFIDENCE);
    (raw * 100.0).round() / 100.0
}
