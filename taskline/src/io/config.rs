//! Pipeline configuration stored under `.taskline/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::permission::{PermissionLevel, PermissionPolicy};
use crate::core::scorecard::{MAX_TOTAL, ScoreThresholds};

/// Pipeline configuration (TOML).
///
/// Missing fields fall back to defaults so a hand-edited file only needs the
/// values it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TasklineConfig {
    /// Memory store root, relative to the workspace unless absolute.
    pub memory_dir: PathBuf,

    /// Deadline for each provider call, in seconds.
    pub stage_timeout_secs: u64,

    pub policy: PolicyConfig,
    pub thresholds: ScoreThresholds,
    pub execution: ExecutionConfig,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Starting permission level of a new session.
    pub initial_level: PermissionLevel,
    /// Starting level of the Learner's standalone state.
    pub learner_level: PermissionLevel,
    /// Extra workspace prefixes; the workspace root is always included.
    pub workspace_paths: Vec<PathBuf>,
    /// Extra forbidden command substrings, on top of the dangerous list.
    pub blocked_commands: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            initial_level: PermissionLevel::WorkspaceWrite,
            learner_level: PermissionLevel::ReadOnly,
            workspace_paths: Vec::new(),
            blocked_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Record what would run without touching anything.
    #[default]
    Mock,
    /// Run commands and write files inside the workspace.
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
    /// Command proposed by the verification step.
    pub verify_command: String,
    /// Directory (under the workspace) that receives per-run step notes.
    pub output_dir: PathBuf,
    pub output_limit_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Mock,
            verify_command: "cargo test".to_string(),
            output_dir: PathBuf::from(".taskline/outputs"),
            output_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Stub,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Argv of the generation command; the prompt is written to stdin.
    pub command: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Stub,
            command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
        }
    }
}

impl Default for TasklineConfig {
    fn default() -> Self {
        Self {
            memory_dir: PathBuf::from(".taskline/memory"),
            stage_timeout_secs: 5 * 60,
            policy: PolicyConfig::default(),
            thresholds: ScoreThresholds::default(),
            execution: ExecutionConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl TasklineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stage_timeout_secs == 0 {
            return Err(anyhow!("stage_timeout_secs must be > 0"));
        }
        if self.execution.output_limit_bytes == 0 {
            return Err(anyhow!("execution.output_limit_bytes must be > 0"));
        }
        if self.execution.verify_command.trim().is_empty() {
            return Err(anyhow!("execution.verify_command must not be empty"));
        }
        let t = &self.thresholds;
        for (name, value) in [
            ("lesson_approval", t.lesson_approval),
            ("promotion", t.promotion),
            ("clone", t.clone),
            ("example_min_score", t.example_min_score),
        ] {
            if value > MAX_TOTAL {
                return Err(anyhow!(
                    "thresholds.{name} must be <= {MAX_TOTAL} (got {value})"
                ));
            }
        }
        if !(t.lesson_approval <= t.promotion && t.promotion <= t.clone) {
            return Err(anyhow!(
                "thresholds must satisfy lesson_approval <= promotion <= clone"
            ));
        }
        if self.provider.kind == ProviderKind::Command
            && self
                .provider
                .command
                .first()
                .is_none_or(|program| program.trim().is_empty())
        {
            return Err(anyhow!("provider.command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    /// Resolve the memory root against `workspace`.
    pub fn memory_root(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.memory_dir)
    }

    /// Build the initial policy: workspace root plus configured prefixes, and
    /// the dangerous list plus configured blocked commands.
    pub fn initial_policy(&self, workspace: &Path) -> PermissionPolicy {
        let mut paths = vec![workspace.to_path_buf()];
        paths.extend(self.policy.workspace_paths.iter().map(|p| workspace.join(p)));
        let mut policy = PermissionPolicy::new(self.policy.initial_level, paths);
        policy
            .blocked_commands
            .extend(self.policy.blocked_commands.iter().cloned());
        policy
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TasklineConfig::default()`.
pub fn load_config(path: &Path) -> Result<TasklineConfig> {
    if !path.exists() {
        let cfg = TasklineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TasklineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TasklineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, TasklineConfig::default());
        assert_eq!(cfg.policy.initial_level, PermissionLevel::WorkspaceWrite);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let mut cfg = TasklineConfig::default();
        cfg.execution.mode = ExecutionMode::Live;
        cfg.thresholds.promotion = 18;
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[policy]\ninitial_level = 0\n\n[thresholds]\nclone = 24\n")
            .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.policy.initial_level, PermissionLevel::ReadOnly);
        assert_eq!(cfg.thresholds.clone, 24);
        assert_eq!(cfg.thresholds.promotion, 20);
        assert_eq!(cfg.execution.verify_command, "cargo test");
    }

    #[test]
    fn rejects_out_of_order_thresholds() {
        let mut cfg = TasklineConfig::default();
        cfg.thresholds.promotion = 23;
        let err = cfg.validate().expect_err("promotion above clone");
        assert!(err.to_string().contains("lesson_approval <= promotion <= clone"));

        let mut cfg = TasklineConfig::default();
        cfg.thresholds.clone = 26;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_permission_level() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "[policy]\ninitial_level = 9\n").expect("write");
        let err = load_config(&path).expect_err("level 9");
        assert!(format!("{err:#}").contains("0..=3"));
    }

    #[test]
    fn initial_policy_includes_workspace_and_extra_blocks() {
        let mut cfg = TasklineConfig::default();
        cfg.policy.blocked_commands = vec!["npm publish".to_string()];
        let policy = cfg.initial_policy(Path::new("/work"));
        assert_eq!(policy.workspace_paths, vec![PathBuf::from("/work")]);
        assert!(policy.blocked_commands.iter().any(|c| c == "npm publish"));
        assert!(policy.blocked_commands.iter().any(|c| c == "rm -rf"));
    }
}
