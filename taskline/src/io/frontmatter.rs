//! Markdown documents with a `key: value` frontmatter block.
//!
//! Approved lessons are stored this way so they stay readable and editable
//! by hand. Values are single-line JSON; hand-written plain values and
//! comma-separated lists are accepted when reading.

use anyhow::{Result, anyhow};
use serde_json::Value;

/// Validate that an id is safe to use as a file stem.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("id must not be empty"));
    }
    if id.contains('/') || id.contains('\\') {
        return Err(anyhow!("id must not contain path separators"));
    }
    if id.starts_with('.') {
        return Err(anyhow!("id must not start with '.' (got '{id}')"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!("id must be [A-Za-z0-9._-] only (got '{id}')"));
    }
    Ok(())
}

/// Lowercase, hyphen-separated, at most `max` characters.
pub fn slugify(text: &str, max: usize) -> String {
    let mut slug = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= max {
            break;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "item".to_string()
    } else {
        slug
    }
}

/// Render `fields` as frontmatter followed by `body`.
///
/// Each value is written as single-line JSON, so quotes, commas and line
/// breaks survive. The body is written verbatim after one blank line.
pub fn render_document(fields: &[(&str, Value)], body: &str) -> String {
    let mut buf = String::from("---\n");
    for (key, value) in fields {
        buf.push_str(&format!("{key}: {value}\n"));
    }
    buf.push_str("---\n\n");
    buf.push_str(body);
    buf
}

/// Parsed frontmatter document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Raw values as written after `key:`.
    pub fields: Vec<(String, String)>,
    pub body: String,
}

impl Document {
    fn raw(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// String value: JSON-decoded when quoted, otherwise the raw text.
    pub fn get(&self, key: &str) -> Option<String> {
        self.raw(key).map(|raw| {
            serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw.to_string())
        })
    }

    /// List value: a JSON array, or comma-separated for hand-written files.
    /// Empty when missing.
    pub fn list(&self, key: &str) -> Vec<String> {
        let Some(raw) = self.raw(key) else {
            return Vec::new();
        };
        if let Ok(items) = serde_json::from_str::<Vec<String>>(raw) {
            return items;
        }
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Parse a document; `None` if it does not start with a frontmatter block.
pub fn parse_document(contents: &str) -> Option<Document> {
    let (frontmatter, rest) = split_frontmatter(contents)?;
    let mut fields = Vec::new();
    for line in frontmatter.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        fields.push((key.trim().to_string(), value.trim().to_string()));
    }
    let body = rest.strip_prefix('\n').unwrap_or(rest).to_string();
    Some(Document { fields, body })
}

fn split_frontmatter(contents: &str) -> Option<(&str, &str)> {
    let after = contents.strip_prefix("---\n")?;
    if let Some(rest) = after.strip_prefix("---\n") {
        return Some(("", rest));
    }
    let end = after.find("\n---\n")?;
    Some((&after[..end], &after[end + 5..]))
}
