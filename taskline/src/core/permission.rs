//! Permission levels, the live policy, and the per-action decision function.
//!
//! [`evaluate_action`] is pure: it never mutates the policy and never fails.
//! A blocked action is a normal result carrying a reason, not an error.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::patterns::DANGEROUS_PATTERNS;
use crate::core::types::{ActionKind, ProposedAction};

/// Ordinal permission tier. Higher tiers are cumulative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PermissionLevel {
    /// Read actions only.
    ReadOnly = 0,
    /// File writes inside the workspace and non-git commands.
    WorkspaceWrite = 1,
    /// Adds git operations.
    Trusted = 2,
    Autonomous = 3,
}

impl PermissionLevel {
    pub const MIN: PermissionLevel = PermissionLevel::ReadOnly;
    pub const MAX: PermissionLevel = PermissionLevel::Autonomous;

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::ReadOnly),
            1 => Some(Self::WorkspaceWrite),
            2 => Some(Self::Trusted),
            3 => Some(Self::Autonomous),
            _ => None,
        }
    }

    /// One tier up, capped at [`PermissionLevel::MAX`].
    pub fn next(self) -> Self {
        Self::from_u8(self.as_u8() + 1).unwrap_or(Self::MAX)
    }
}

impl TryFrom<u8> for PermissionLevel {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::from_u8(raw).ok_or_else(|| format!("permission level must be 0..=3 (got {raw})"))
    }
}

impl From<PermissionLevel> for u8 {
    fn from(level: PermissionLevel) -> Self {
        level.as_u8()
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Process-scoped permission state read by every permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPolicy {
    pub level: PermissionLevel,
    /// Path prefixes considered inside the workspace.
    pub workspace_paths: Vec<PathBuf>,
    /// Command substrings that are always forbidden (matched case-insensitively).
    pub blocked_commands: Vec<String>,
}

impl PermissionPolicy {
    /// Policy with the shared dangerous-pattern list as blocked commands.
    pub fn new(level: PermissionLevel, workspace_paths: Vec<PathBuf>) -> Self {
        Self {
            level,
            workspace_paths,
            blocked_commands: DANGEROUS_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn is_inside_workspace(&self, path: &Path) -> bool {
        self.workspace_paths
            .iter()
            .any(|prefix| is_within(path, prefix))
    }

    fn blocked_command_match(&self, command: &str) -> Option<&str> {
        let lowered = command.to_lowercase();
        self.blocked_commands
            .iter()
            .map(String::as_str)
            .find(|blocked| !blocked.is_empty() && lowered.contains(&blocked.to_lowercase()))
    }
}

/// Resolve `.` and `..` lexically; `..` never climbs above the root.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Component-wise containment of `path` in `root` after normalizing both.
pub fn is_within(path: &Path, root: &Path) -> bool {
    normalize_path(path).starts_with(normalize_path(root))
}

/// Outcome of evaluating one action against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Allowed,
    Blocked {
        reason: String,
        requires_approval: bool,
    },
}

impl PermissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    fn blocked(reason: impl Into<String>, requires_approval: bool) -> Self {
        Self::Blocked {
            reason: reason.into(),
            requires_approval,
        }
    }
}

/// Decide whether `action` may proceed under `policy`.
///
/// Rules are applied in order: read-only tier, destructive flag, command
/// checks, workspace containment. The destructive rule applies at every level.
pub fn evaluate_action(action: &ProposedAction, policy: &PermissionPolicy) -> PermissionDecision {
    if policy.level == PermissionLevel::ReadOnly {
        if action.kind == ActionKind::ReadFile {
            return PermissionDecision::Allowed;
        }
        return PermissionDecision::blocked("read-only level", false);
    }

    if action.destructive {
        return PermissionDecision::blocked("destructive action requires approval", true);
    }

    if action.kind == ActionKind::RunCommand {
        let command = action.command.as_deref().unwrap_or_default();
        if let Some(blocked) = policy.blocked_command_match(command) {
            return PermissionDecision::blocked(format!("blocked command pattern '{blocked}'"), true);
        }
        if policy.level == PermissionLevel::WorkspaceWrite && command.to_lowercase().contains("git")
        {
            return PermissionDecision::blocked(
                "git operations require permission level 2",
                false,
            );
        }
        return PermissionDecision::Allowed;
    }

    if action.kind.is_file_write() {
        let inside = action
            .path
            .as_deref()
            .is_some_and(|path| policy.is_inside_workspace(Path::new(path)));
        if !inside {
            return PermissionDecision::blocked("outside workspace", false);
        }
    }

    PermissionDecision::Allowed
}

/// Actions partitioned by [`evaluate_action`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionPartition {
    pub allowed: Vec<ProposedAction>,
    /// Blocked actions paired with the evaluator reason.
    pub blocked: Vec<(ProposedAction, String)>,
}

/// Evaluate every action, preserving input order within each partition.
pub fn evaluate_actions(actions: &[ProposedAction], policy: &PermissionPolicy) -> ActionPartition {
    let mut partition = ActionPartition::default();
    for action in actions {
        match evaluate_action(action, policy) {
            PermissionDecision::Allowed => partition.allowed.push(action.clone()),
            PermissionDecision::Blocked { reason, .. } => {
                partition.blocked.push((action.clone(), reason));
            }
        }
    }
    partition
}
