//! Retrieval stage: keyword-ranked lessons, playbooks and example runs.

use chrono::Utc;
use tracing::debug;

use crate::agents::StageDeps;
use crate::core::context::StageView;
use crate::core::retrieval::{rank_by_matches, search_terms};
use crate::core::types::{
    ExampleRun, LessonExcerpt, PatternHint, PlaybookExcerpt, RetrievalOutput,
};
use crate::error::PipelineError;
use crate::io::memory::MemoryStore;

pub const MAX_LESSONS: usize = 5;
pub const MAX_PLAYBOOKS: usize = 3;
pub const MAX_EXAMPLES: usize = 3;
const EXCERPT_CHARS: usize = 200;

pub fn run(deps: &StageDeps<'_>, view: StageView<'_>) -> Result<RetrievalOutput, PipelineError> {
    let observation = view.observation()?;
    let pattern = view.pattern()?;
    let decomposition = view.decomposition()?;
    let pattern_names: Vec<String> = pattern
        .patterns
        .iter()
        .map(|PatternHint { name, .. }| name.clone())
        .collect();
    let terms = search_terms([
        decomposition.sub_problems.as_slice(),
        decomposition.required_knowledge.as_slice(),
        observation.keywords.as_slice(),
        pattern_names.as_slice(),
    ]);
    retrieve(
        deps.store,
        &terms,
        deps.config.thresholds.example_min_score,
    )
    .map_err(PipelineError::Store)
}

/// Query the store with `terms`.
pub fn retrieve(
    store: &dyn MemoryStore,
    terms: &[String],
    example_min_score: u8,
) -> anyhow::Result<RetrievalOutput> {
    let lessons = rank_by_matches(
        store.list_lessons()?,
        terms,
        |lesson| format!("{} {} {}", lesson.title, lesson.content, lesson.tags.join(" ")),
        MAX_LESSONS,
    )
    .into_iter()
    .map(|(lesson, matches)| LessonExcerpt {
        excerpt: excerpt(&lesson.content),
        title: lesson.title,
        matches,
    })
    .collect::<Vec<_>>();

    let playbooks = rank_by_matches(store.list_playbooks()?, terms, Clone::clone, MAX_PLAYBOOKS)
        .into_iter()
        .map(|(text, matches)| PlaybookExcerpt {
            excerpt: excerpt(&text),
            matches,
        })
        .collect::<Vec<_>>();

    let examples = store
        .list_portfolio()?
        .into_iter()
        .filter(|entry| entry.total_score >= example_min_score)
        .take(MAX_EXAMPLES)
        .map(|entry| ExampleRun {
            run_id: entry.run_id,
            request: entry.request,
            total_score: entry.total_score,
        })
        .collect::<Vec<_>>();

    debug!(
        terms = terms.len(),
        lessons = lessons.len(),
        playbooks = playbooks.len(),
        examples = examples.len(),
        "retrieved memory"
    );
    Ok(RetrievalOutput {
        completed_at: Utc::now(),
        lessons,
        playbooks,
        examples,
    })
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut cut: String = trimmed.chars().take(EXCERPT_CHARS - 3).collect();
    cut.push_str("...");
    cut
}
