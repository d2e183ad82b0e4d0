//! Session state carried between CLI invocations (`.taskline/session.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::permission::PermissionLevel;
use crate::session::SessionState;

/// Persisted feedback-loop state: the promoted levels and the carried notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub policy_level: PermissionLevel,
    pub learner_level: PermissionLevel,
    #[serde(default)]
    pub carried_improvements: Vec<String>,
}

impl From<&SessionState> for SessionRecord {
    fn from(state: &SessionState) -> Self {
        Self {
            policy_level: state.policy.level,
            learner_level: state.learner_level,
            carried_improvements: state.carried_improvements.clone(),
        }
    }
}

/// Load the session record; `None` if the file does not exist yet.
pub fn load_session(path: &Path) -> Result<Option<SessionRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read session {}", path.display()))?;
    let record: SessionRecord = serde_json::from_str(&contents)
        .with_context(|| format!("parse session {}", path.display()))?;
    debug!(level = %record.policy_level, notes = record.carried_improvements.len(), "session loaded");
    Ok(Some(record))
}

/// Atomically write the session record (temp file + rename).
pub fn write_session(path: &Path, record: &SessionRecord) -> Result<()> {
    debug!(path = %path.display(), level = %record.policy_level, "writing session");
    let mut buf = serde_json::to_string_pretty(record)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("session path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace session {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_session_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(load_session(&temp.path().join("session.json")).expect("load").is_none());
    }

    #[test]
    fn session_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".taskline/session.json");
        let record = SessionRecord {
            policy_level: PermissionLevel::Trusted,
            learner_level: PermissionLevel::Trusted,
            carried_improvements: vec!["Improve clarity".to_string()],
        };
        write_session(&path, &record).expect("write");
        assert_eq!(load_session(&path).expect("load"), Some(record));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn levels_are_stored_as_integers() {
        let record: SessionRecord =
            serde_json::from_str(r#"{"policy_level": 2, "learner_level": 0}"#).expect("parse");
        assert_eq!(record.policy_level, PermissionLevel::Trusted);
        assert_eq!(record.learner_level, PermissionLevel::ReadOnly);
        assert!(record.carried_improvements.is_empty());
    }
}
