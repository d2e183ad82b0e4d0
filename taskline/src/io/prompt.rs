//! Stage prompts rendered from embedded minijinja templates.
//!
//! Each template holds two sections, `directive` and `payload`, separated by
//! `<!-- section:KEY -->` markers. Every directive opens with a
//! `<!-- stage:NAME -->` marker so providers can tell stages apart.

use std::sync::LazyLock;

use minijinja::{Environment, Value};
use regex::Regex;
use tracing::debug;

use crate::core::types::StageId;

const TEMPLATES: [(StageId, &str); 4] = [
    (StageId::Observation, include_str!("prompts/observation.md")),
    (
        StageId::ActionGeneration,
        include_str!("prompts/action_generation.md"),
    ),
    (StageId::Evaluation, include_str!("prompts/evaluation.md")),
    (StageId::Reflection, include_str!("prompts/reflection.md")),
];

static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*section:(\w+)\s*-->").expect("section marker regex"));

static STAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*stage:(\w+)\s*-->").expect("stage marker regex"));

/// Directive and payload for one provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePrompt {
    pub directive: String,
    pub payload: String,
}

/// Template engine wrapper around minijinja.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (stage, source) in TEMPLATES {
            env.add_template(stage.as_str(), source)
                .expect("embedded stage template should be valid");
        }
        Self { env }
    }

    /// Render the template of `stage` with `ctx` (built with `context!`).
    pub fn render(&self, stage: StageId, ctx: Value) -> Result<StagePrompt, minijinja::Error> {
        let rendered = self.env.get_template(stage.as_str())?.render(ctx)?;
        let prompt = split_sections(&rendered);
        debug!(
            stage = %stage,
            directive_bytes = prompt.directive.len(),
            payload_bytes = prompt.payload.len(),
            "rendered stage prompt"
        );
        Ok(prompt)
    }
}

fn split_sections(rendered: &str) -> StagePrompt {
    let mut prompt = StagePrompt {
        directive: String::new(),
        payload: String::new(),
    };
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    for (idx, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let body = rendered[whole.end()..end].trim().to_string();
        match key.as_str() {
            "directive" => prompt.directive = body,
            "payload" => prompt.payload = body,
            _ => {}
        }
    }
    prompt
}

/// Stage named by the `<!-- stage:NAME -->` marker in `directive`, if any.
pub fn stage_marker(directive: &str) -> Option<StageId> {
    let name = STAGE_RE.captures(directive)?.get(1)?.as_str();
    StageId::ALL.into_iter().find(|stage| stage.as_str() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn observation_prompt_carries_marker_and_request() {
        let prompt = PromptEngine::new()
            .render(
                StageId::Observation,
                context! { request => "Create a hello world function" },
            )
            .expect("render");
        assert!(prompt.directive.starts_with("<!-- stage:observation -->"));
        assert_eq!(stage_marker(&prompt.directive), Some(StageId::Observation));
        assert!(prompt.payload.contains("Create a hello world function"));
        assert!(!prompt.payload.contains("section:"));
    }

    #[test]
    fn action_prompt_lists_blocked_entries_only_when_present() {
        let engine = PromptEngine::new();
        let steps = vec![context! { step => 1, action => "Address hello", expected_output => "done" }];
        let clean = engine
            .render(
                StageId::ActionGeneration,
                context! { request => "r", steps => steps.clone(), accepted => vec!["read-file: a"], blocked => Vec::<String>::new(), level => 1 },
            )
            .expect("render");
        assert!(!clean.payload.contains("### Blocked actions"));

        let blocked = engine
            .render(
                StageId::ActionGeneration,
                context! { request => "r", steps => steps, accepted => Vec::<String>::new(), blocked => vec!["run-command: rm -rf / (blocked)"], level => 1 },
            )
            .expect("render");
        assert!(blocked.payload.contains("### Blocked actions"));
        assert!(blocked.payload.contains("- none"));
    }

    #[test]
    fn stages_without_templates_fail_to_render() {
        let err = PromptEngine::new()
            .render(StageId::Retrieval, context! {})
            .expect_err("no template");
        assert_eq!(err.kind(), minijinja::ErrorKind::TemplateNotFound);
    }

    #[test]
    fn unknown_marker_is_ignored() {
        assert_eq!(stage_marker("<!-- stage:bogus -->"), None);
        assert_eq!(stage_marker("no marker"), None);
    }
}
