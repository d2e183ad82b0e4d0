//! Deterministic keyword extraction and domain classification.

use crate::core::types::Domain;

/// Maximum number of keywords kept per request.
pub const MAX_KEYWORDS: usize = 10;

/// Keyword used when nothing survives filtering.
pub const FALLBACK_KEYWORD: &str = "task";

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "onto", "are", "was", "were",
    "will", "would", "should", "could", "can", "please", "need", "needs", "want", "some", "any",
    "all", "our", "your", "you", "they", "them", "their", "its", "has", "have", "had", "not",
    "but", "use", "using", "via", "per", "also", "then", "than", "there", "here", "what", "when",
    "where", "which", "who", "how", "why", "about", "make", "sure", "just", "very", "more",
];

/// Keyword families checked in order; the first family with a hit wins.
const DOMAIN_FAMILIES: &[(Domain, &[&str])] = &[
    (
        Domain::QualityAssurance,
        &[
            "test", "tests", "testing", "qa", "bug", "bugs", "regression", "coverage", "verify",
            "validation", "flaky",
        ],
    ),
    (
        Domain::Design,
        &[
            "design", "ui", "ux", "layout", "style", "styling", "css", "mockup", "wireframe",
            "theme", "color",
        ],
    ),
    (
        Domain::Operations,
        &[
            "deploy", "deployment", "docker", "kubernetes", "infrastructure", "server", "monitor",
            "monitoring", "ops", "ci", "release", "backup",
        ],
    ),
];

/// Extract up to [`MAX_KEYWORDS`] keywords from `text`.
///
/// Lowercases, strips punctuation, splits on whitespace, drops stop words and
/// tokens of two characters or fewer, and deduplicates keeping first
/// occurrence order. The result is a pure function of `text`.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    let mut keywords: Vec<String> = Vec::new();
    for token in cleaned.split_whitespace() {
        if token.chars().count() <= 2 || STOP_WORDS.contains(&token) {
            continue;
        }
        if keywords.iter().any(|existing| existing == token) {
            continue;
        }
        keywords.push(token.to_string());
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
    }
    keywords
}

/// Classify keywords into a domain; defaults to [`Domain::Development`].
pub fn classify_domain(keywords: &[String]) -> Domain {
    DOMAIN_FAMILIES
        .iter()
        .find(|(_, family)| keywords.iter().any(|k| family.contains(&k.as_str())))
        .map(|(domain, _)| *domain)
        .unwrap_or(Domain::Development)
}
