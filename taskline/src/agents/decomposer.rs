//! Core-problem decomposition stage.

use chrono::Utc;

use crate::core::context::StageView;
use crate::core::types::{DecompositionOutput, ObservationOutput, PatternOutput};
use crate::error::PipelineError;

/// Constraint appended to every decomposition.
pub const POLICY_CONSTRAINT: &str =
    "Respect the permission policy: destructive actions and blocked commands need approval";

pub fn run(view: StageView<'_>) -> Result<DecompositionOutput, PipelineError> {
    Ok(decompose(view.observation()?, view.pattern()?))
}

pub fn decompose(observation: &ObservationOutput, pattern: &PatternOutput) -> DecompositionOutput {
    let mut sub_problems: Vec<String> = observation
        .keywords
        .iter()
        .map(|keyword| format!("Address {keyword}"))
        .collect();
    if sub_problems.is_empty() {
        sub_problems.push("Address the request as a whole".to_string());
    }

    let mut assumptions = vec!["The request text is the complete task description".to_string()];
    if let Some(top) = pattern.patterns.first() {
        assumptions.push(format!(
            "Pattern '{}' applies (confidence {:.1})",
            top.name, top.confidence
        ));
    }

    DecompositionOutput {
        completed_at: Utc::now(),
        core_problem: observation.summary.clone(),
        sub_problems,
        assumptions,
        constraints: vec![
            format!("Domain: {}", observation.domain),
            POLICY_CONSTRAINT.to_string(),
        ],
        required_knowledge: observation
            .keywords
            .iter()
            .map(|keyword| format!("{keyword} fundamentals"))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::pattern::recognize;
    use crate::core::types::Domain;

    #[test]
    fn one_sub_problem_and_knowledge_item_per_keyword() {
        let observation = ObservationOutput {
            completed_at: Utc::now(),
            summary: "Task request: hello world".to_string(),
            keywords: vec!["hello".to_string(), "world".to_string()],
            domain: Domain::Development,
            input: "hello world".to_string(),
        };
        let out = decompose(&observation, &recognize(&observation));
        assert_eq!(out.sub_problems, vec!["Address hello", "Address world"]);
        assert_eq!(
            out.required_knowledge,
            vec!["hello fundamentals", "world fundamentals"]
        );
        assert_eq!(out.constraints[0], "Domain: development");
        assert_eq!(out.constraints[1], POLICY_CONSTRAINT);
        assert_eq!(out.core_problem, "Task request: hello world");
    }
}
