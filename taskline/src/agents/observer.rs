//! Observation stage: summary, keywords and domain of the raw request.

use chrono::Utc;
use minijinja::context;
use tracing::debug;

use crate::agents::StageDeps;
use crate::core::context::StageView;
use crate::core::keywords::{FALLBACK_KEYWORD, classify_domain, extract_keywords};
use crate::core::types::{ObservationOutput, StageId};
use crate::error::PipelineError;

pub fn run(deps: &StageDeps<'_>, view: StageView<'_>) -> Result<ObservationOutput, PipelineError> {
    let request = view.request();
    let summary = deps.generate(StageId::Observation, context! { request => request })?;

    let mut keywords = extract_keywords(request);
    if keywords.is_empty() {
        keywords.push(FALLBACK_KEYWORD.to_string());
    }
    let domain = classify_domain(&keywords);
    debug!(keywords = keywords.len(), domain = %domain, "observed request");

    Ok(ObservationOutput {
        completed_at: Utc::now(),
        summary,
        keywords,
        domain,
        input: request.to_string(),
    })
}
