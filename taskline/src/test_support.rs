//! Test-only providers and workspace fixtures.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::permission::PermissionLevel;
use crate::core::types::StageId;
use crate::error::ProviderError;
use crate::io::config::TasklineConfig;
use crate::io::memory::FileMemoryStore;
use crate::io::prompt::stage_marker;
use crate::io::provider::{Provider, StubProvider};
use crate::pipeline::Orchestrator;

/// Stub replies with per-stage overrides, recording every call.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    replies: HashMap<StageId, String>,
    calls: Mutex<Vec<(Option<StageId>, String)>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `text` whenever `stage` asks.
    pub fn with_reply(mut self, stage: StageId, text: impl Into<String>) -> Self {
        self.replies.insert(stage, text.into());
        self
    }

    /// Stages asked so far, with the payload each one sent.
    pub fn calls(&self) -> Vec<(Option<StageId>, String)> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Provider for ScriptedProvider {
    fn generate(&self, directive: &str, payload: &str) -> Result<String, ProviderError> {
        let stage = stage_marker(directive);
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((stage, payload.to_string()));
        Ok(stage
            .and_then(|stage| self.replies.get(&stage).cloned())
            .unwrap_or_else(|| StubProvider::reply(stage, payload)))
    }
}

/// Stub provider that fails with `error` at `stage`.
#[derive(Debug, Clone)]
pub struct FailingProvider {
    pub stage: StageId,
    pub error: ProviderError,
}

impl Provider for FailingProvider {
    fn generate(&self, directive: &str, payload: &str) -> Result<String, ProviderError> {
        let stage = stage_marker(directive);
        if stage == Some(self.stage) {
            return Err(self.error.clone());
        }
        Ok(StubProvider::reply(stage, payload))
    }
}

/// Temporary workspace with an initialized memory store.
pub struct TestWorkspace {
    dir: tempfile::TempDir,
    pub config: TasklineConfig,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = TasklineConfig::default();
        FileMemoryStore::new(config.memory_root(dir.path()))
            .ensure_layout()
            .expect("memory layout");
        Self { dir, config }
    }

    /// Workspace whose session starts at `level`.
    pub fn at_level(level: PermissionLevel) -> Self {
        let mut ws = Self::new();
        ws.config.policy.initial_level = level;
        ws
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn memory_root(&self) -> PathBuf {
        self.config.memory_root(self.root())
    }

    pub fn store(&self) -> FileMemoryStore {
        FileMemoryStore::new(self.memory_root())
    }

    pub fn orchestrator(&self, provider: impl Provider + 'static) -> Orchestrator {
        Orchestrator::new(
            Box::new(provider),
            Box::new(self.store()),
            self.config.clone(),
            self.root(),
        )
        .expect("orchestrator")
    }

    /// Number of regular files anywhere under the memory root.
    pub fn memory_file_count(&self) -> usize {
        fn count(dir: &Path) -> usize {
            std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .map(|entry| {
                            let path = entry.path();
                            if path.is_dir() { count(&path) } else { 1 }
                        })
                        .sum()
                })
                .unwrap_or(0)
        }
        count(&self.memory_root())
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
