//! File-backed memory: run artifacts, lessons, playbooks, and the portfolio.
//!
//! Layout under the memory root:
//!
//! ```text
//! runs/<run_id>.json          full RunArtifact
//! candidates/<id>.json        pending CandidateLesson
//! lessons/<id>.md             approved lesson (frontmatter + content)
//! playbooks/*                 raw playbook text, read-only
//! portfolio/<run_id>.json     PortfolioEntry
//! ```
//!
//! Every record is one file written atomically (temp file + rename). There is
//! no multi-record transaction.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::core::artifact::{PortfolioEntry, RunArtifact};
use crate::core::types::CandidateLesson;
use crate::io::frontmatter::{parse_document, render_document, slugify, validate_id};

/// Approver recorded on every lesson approved by the pipeline.
pub const APPROVER: &str = "Gatekeeper";

const RUNS_DIR: &str = "runs";
const CANDIDATES_DIR: &str = "candidates";
const LESSONS_DIR: &str = "lessons";
const PLAYBOOKS_DIR: &str = "playbooks";
const PORTFOLIO_DIR: &str = "portfolio";

/// A candidate lesson persisted while awaiting disposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCandidate {
    pub id: String,
    pub lesson: CandidateLesson,
    pub saved_at: DateTime<Utc>,
}

/// A durable lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovedLesson {
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub source_run: String,
    pub approved_at: DateTime<Utc>,
    pub approved_by: String,
}

/// Read/write contract of the memory store.
pub trait MemoryStore: Send + Sync {
    fn save_run_artifact(&self, artifact: &RunArtifact) -> Result<PathBuf>;
    fn load_run_artifact(&self, run_id: &str) -> Result<Option<RunArtifact>>;
    fn save_candidate_lesson(&self, lesson: &CandidateLesson, run_id: &str) -> Result<String>;
    fn list_candidate_lessons(&self) -> Result<Vec<StoredCandidate>>;
    fn approve_lesson(&self, candidate_id: &str) -> Result<PathBuf>;
    fn reject_lesson(&self, candidate_id: &str) -> Result<()>;
    fn list_lessons(&self) -> Result<Vec<ApprovedLesson>>;
    fn list_playbooks(&self) -> Result<Vec<String>>;
    fn save_portfolio_entry(&self, entry: &PortfolioEntry) -> Result<PathBuf>;
    fn list_portfolio(&self) -> Result<Vec<PortfolioEntry>>;
}

/// [`MemoryStore`] over a directory tree.
#[derive(Debug, Clone)]
pub struct FileMemoryStore {
    root: PathBuf,
}

impl FileMemoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create every subdirectory of the layout.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [RUNS_DIR, CANDIDATES_DIR, LESSONS_DIR, PLAYBOOKS_DIR, PORTFOLIO_DIR] {
            let path = self.root.join(dir);
            fs::create_dir_all(&path)
                .with_context(|| format!("create memory dir {}", path.display()))?;
        }
        Ok(())
    }

    fn record_path(&self, dir: &str, id: &str, ext: &str) -> Result<PathBuf> {
        validate_id(id).with_context(|| format!("invalid record id for {dir}"))?;
        Ok(self.root.join(dir).join(format!("{id}.{ext}")))
    }

    fn candidate_path(&self, id: &str) -> Result<PathBuf> {
        self.record_path(CANDIDATES_DIR, id, "json")
    }

    fn read_candidate(&self, id: &str) -> Result<StoredCandidate> {
        let path = self.candidate_path(id)?;
        if !path.exists() {
            return Err(anyhow!("unknown candidate lesson '{id}'"));
        }
        read_json(&path)
    }
}

impl MemoryStore for FileMemoryStore {
    fn save_run_artifact(&self, artifact: &RunArtifact) -> Result<PathBuf> {
        let path = self.record_path(RUNS_DIR, &artifact.run_id, "json")?;
        write_json(&path, artifact)?;
        debug!(run_id = %artifact.run_id, path = %path.display(), "saved run artifact");
        Ok(path)
    }

    fn load_run_artifact(&self, run_id: &str) -> Result<Option<RunArtifact>> {
        let path = self.record_path(RUNS_DIR, run_id, "json")?;
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn save_candidate_lesson(&self, lesson: &CandidateLesson, run_id: &str) -> Result<String> {
        validate_id(run_id)?;
        let base = format!("{run_id}-{}", slugify(&lesson.title, 40));
        let mut id = base.clone();
        let mut suffix = 2;
        while self.candidate_path(&id)?.exists() {
            id = format!("{base}-{suffix}");
            suffix += 1;
        }
        let stored = StoredCandidate {
            id: id.clone(),
            lesson: CandidateLesson {
                source_run: run_id.to_string(),
                ..lesson.clone()
            },
            saved_at: Utc::now(),
        };
        write_json(&self.candidate_path(&id)?, &stored)?;
        debug!(candidate = %id, "saved candidate lesson");
        Ok(id)
    }

    fn list_candidate_lessons(&self) -> Result<Vec<StoredCandidate>> {
        sorted_files(&self.root.join(CANDIDATES_DIR), Some("json"))?
            .iter()
            .map(|path| read_json(path))
            .collect()
    }

    fn approve_lesson(&self, candidate_id: &str) -> Result<PathBuf> {
        let candidate = self.read_candidate(candidate_id)?;
        let lesson = candidate.lesson;
        let path = self.record_path(LESSONS_DIR, candidate_id, "md")?;
        let doc = render_document(
            &[
                ("title", json!(lesson.title)),
                ("tags", json!(lesson.tags)),
                ("source_run", json!(lesson.source_run)),
                ("approved_at", json!(Utc::now().to_rfc3339())),
                ("approved_by", json!(APPROVER)),
            ],
            &lesson.content,
        );
        write_atomic(&path, &doc)?;
        let candidate_path = self.candidate_path(candidate_id)?;
        fs::remove_file(&candidate_path)
            .with_context(|| format!("remove candidate {}", candidate_path.display()))?;
        debug!(candidate = %candidate_id, "approved lesson");
        Ok(path)
    }

    fn reject_lesson(&self, candidate_id: &str) -> Result<()> {
        let path = self.candidate_path(candidate_id)?;
        if !path.exists() {
            return Err(anyhow!("unknown candidate lesson '{candidate_id}'"));
        }
        fs::remove_file(&path).with_context(|| format!("remove candidate {}", path.display()))?;
        debug!(candidate = %candidate_id, "rejected lesson");
        Ok(())
    }

    fn list_lessons(&self) -> Result<Vec<ApprovedLesson>> {
        let mut lessons = Vec::new();
        for path in sorted_files(&self.root.join(LESSONS_DIR), Some("md"))? {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            match parse_lesson(&contents) {
                Some(lesson) => lessons.push(lesson),
                None => warn!(path = %path.display(), "skipping malformed lesson file"),
            }
        }
        Ok(lessons)
    }

    fn list_playbooks(&self) -> Result<Vec<String>> {
        sorted_files(&self.root.join(PLAYBOOKS_DIR), None)?
            .iter()
            .map(|path| {
                fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
            })
            .collect()
    }

    fn save_portfolio_entry(&self, entry: &PortfolioEntry) -> Result<PathBuf> {
        let path = self.record_path(PORTFOLIO_DIR, &entry.run_id, "json")?;
        write_json(&path, entry)?;
        Ok(path)
    }

    fn list_portfolio(&self) -> Result<Vec<PortfolioEntry>> {
        sorted_files(&self.root.join(PORTFOLIO_DIR), Some("json"))?
            .iter()
            .map(|path| read_json(path))
            .collect()
    }
}

fn parse_lesson(contents: &str) -> Option<ApprovedLesson> {
    let doc = parse_document(contents)?;
    let approved_at = DateTime::parse_from_rfc3339(&doc.get("approved_at")?)
        .ok()?
        .with_timezone(&Utc);
    Some(ApprovedLesson {
        title: doc.get("title")?,
        tags: doc.list("tags"),
        source_run: doc.get("source_run").unwrap_or_default(),
        approved_at,
        approved_by: doc.get("approved_by").unwrap_or_else(|| APPROVER.to_string()),
        content: doc.body,
    })
}

/// Regular files in `dir` sorted by name, optionally filtered by extension.
/// A missing directory is empty.
fn sorted_files(dir: &Path, ext: Option<&str>) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read dir entry in {}", dir.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.starts_with('.') || name.ends_with(".tmp") {
            continue;
        }
        if ext.is_some_and(|ext| path.extension().and_then(|e| e.to_str()) != Some(ext)) {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)
        .with_context(|| format!("serialize {}", path.display()))?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("record path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("record")
    ));
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp record {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace record {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lesson(title: &str) -> CandidateLesson {
        CandidateLesson {
            title: title.to_string(),
            content: "Split work per keyword.\nVerify at the end.".to_string(),
            tags: vec!["development".to_string(), "hello".to_string()],
            source_run: String::new(),
        }
    }

    #[test]
    fn approve_round_trip_keeps_lesson_fields() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(temp.path());
        let candidate = lesson("Pattern: development");
        let id = store
            .save_candidate_lesson(&candidate, "run-20260101000000-abc123")
            .expect("save");
        assert_eq!(store.list_candidate_lessons().expect("list").len(), 1);

        store.approve_lesson(&id).expect("approve");
        assert!(store.list_candidate_lessons().expect("list").is_empty());

        let lessons = store.list_lessons().expect("lessons");
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].title, candidate.title);
        assert_eq!(lessons[0].content, candidate.content);
        assert_eq!(lessons[0].tags, candidate.tags);
        assert_eq!(lessons[0].source_run, "run-20260101000000-abc123");
        assert_eq!(lessons[0].approved_by, APPROVER);
    }

    #[test]
    fn approve_round_trip_is_lossless_for_awkward_values() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(temp.path());
        let candidate = CandidateLesson {
            title: "\"quoted\"\nsecond line".to_string(),
            content: "body\n".to_string(),
            tags: vec!["a,b".to_string(), "c".to_string()],
            source_run: String::new(),
        };
        let id = store.save_candidate_lesson(&candidate, "run-1").expect("save");
        store.approve_lesson(&id).expect("approve");

        let lessons = store.list_lessons().expect("lessons");
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].title, candidate.title);
        assert_eq!(lessons[0].content, candidate.content);
        assert_eq!(lessons[0].tags, candidate.tags);
    }

    #[test]
    fn reject_deletes_candidate() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(temp.path());
        let id = store
            .save_candidate_lesson(&lesson("Boundary"), "run-1")
            .expect("save");
        store.reject_lesson(&id).expect("reject");
        assert!(store.list_candidate_lessons().expect("list").is_empty());
        assert!(store.list_lessons().expect("lessons").is_empty());
        assert!(store.reject_lesson(&id).is_err());
    }

    #[test]
    fn same_title_gets_distinct_candidate_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(temp.path());
        let first = store.save_candidate_lesson(&lesson("Same"), "run-1").expect("save");
        let second = store.save_candidate_lesson(&lesson("Same"), "run-1").expect("save");
        assert_ne!(first, second);
        assert_eq!(second, "run-1-same-2");
    }

    #[test]
    fn missing_artifact_is_none_and_traversal_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(temp.path());
        assert!(store.load_run_artifact("run-missing").expect("load").is_none());
        assert!(store.load_run_artifact("../secrets").is_err());
    }

    #[test]
    fn playbooks_are_read_in_name_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(temp.path());
        store.ensure_layout().expect("layout");
        let dir = temp.path().join(PLAYBOOKS_DIR);
        fs::write(dir.join("b.md"), "second").expect("write");
        fs::write(dir.join("a.md"), "first").expect("write");
        assert_eq!(store.list_playbooks().expect("list"), vec!["first", "second"]);
    }

    #[test]
    fn empty_store_lists_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FileMemoryStore::new(temp.path().join("never-created"));
        assert!(store.list_lessons().expect("lessons").is_empty());
        assert!(store.list_portfolio().expect("portfolio").is_empty());
        assert!(store.list_playbooks().expect("playbooks").is_empty());
    }
}
