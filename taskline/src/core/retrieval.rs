//! Keyword-count ranking used by the retrieval stage.

/// Build the lowercased search-term set, deduplicated in first-seen order.
pub fn search_terms<'a, I>(groups: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut terms: Vec<String> = Vec::new();
    for group in groups {
        for term in group {
            let lowered = term.trim().to_lowercase();
            if lowered.is_empty() || terms.contains(&lowered) {
                continue;
            }
            terms.push(lowered);
        }
    }
    terms
}

/// Count how many `terms` occur as substrings of `text` (case-insensitive).
pub fn count_matches(terms: &[String], text: &str) -> usize {
    let lowered = text.to_lowercase();
    terms
        .iter()
        .filter(|term| lowered.contains(term.as_str()))
        .count()
}

/// Keep items with at least one match, sorted by descending match count.
///
/// The sort is stable, so ties keep enumeration order.
pub fn rank_by_matches<T, F>(items: Vec<T>, terms: &[String], text_of: F, cap: usize) -> Vec<(T, usize)>
where
    F: Fn(&T) -> String,
{
    let mut scored: Vec<(T, usize)> = items
        .into_iter()
        .map(|item| {
            let count = count_matches(terms, &text_of(&item));
            (item, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.truncate(cap);
    scored
}
