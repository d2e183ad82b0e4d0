//! Initialization helpers for `.taskline/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{TasklineConfig, write_config};
use super::memory::FileMemoryStore;

/// Canonical paths within `.taskline/` for a workspace root.
#[derive(Debug, Clone)]
pub struct TasklinePaths {
    pub root: PathBuf,
    pub taskline_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
    /// Feedback-loop state carried between runs.
    pub session_path: PathBuf,
}

impl TasklinePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let taskline_dir = root.join(".taskline");
        Self {
            root,
            config_path: taskline_dir.join("config.toml"),
            gitignore_path: taskline_dir.join(".gitignore"),
            session_path: taskline_dir.join("session.json"),
            taskline_dir,
        }
    }
}

/// Options for `init_workspace`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config and gitignore.
    pub force: bool,
}

/// Create `.taskline/` scaffolding in `root`: default config, gitignore and
/// the memory store layout.
///
/// Fails if `.taskline/` already exists unless `options.force` is set. Memory
/// contents are never removed, even with `force`.
pub fn init_workspace(root: &Path, options: &InitOptions) -> Result<TasklinePaths> {
    let paths = TasklinePaths::new(root);
    if paths.taskline_dir.exists() && !options.force {
        return Err(anyhow!(
            "taskline init: .taskline already exists (use --force to overwrite)"
        ));
    }
    if paths.taskline_dir.exists() && !paths.taskline_dir.is_dir() {
        return Err(anyhow!(
            "taskline init: .taskline exists but is not a directory"
        ));
    }

    fs::create_dir_all(&paths.taskline_dir)
        .with_context(|| format!("create directory {}", paths.taskline_dir.display()))?;
    let config = TasklineConfig::default();
    write_config(&paths.config_path, &config)?;
    fs::write(&paths.gitignore_path, TASKLINE_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;
    FileMemoryStore::new(config.memory_root(root)).ensure_layout()?;

    Ok(paths)
}

const TASKLINE_GITIGNORE: &str = "outputs/\n";
