//! Cross-run session state: the two single-slot feedback loops.
//!
//! A run snapshots the state when it starts and writes its feedback back
//! when it completes. Concurrent runs on one orchestrator therefore see the
//! state as of their own start, and the last run to finish wins.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::core::permission::{PermissionLevel, PermissionPolicy};
use crate::core::types::EvaluationOutput;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub policy: PermissionPolicy,
    pub learner_level: PermissionLevel,
    /// Improvement notes from the most recent completed run.
    pub carried_improvements: Vec<String>,
}

#[derive(Debug)]
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(policy: PermissionPolicy, learner_level: PermissionLevel) -> Self {
        Self {
            state: Mutex::new(SessionState {
                policy,
                learner_level,
                carried_improvements: Vec::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    /// Replace the carried state, e.g. with what an earlier process left.
    pub fn restore(
        &self,
        policy_level: PermissionLevel,
        learner_level: PermissionLevel,
        carried_improvements: Vec<String>,
    ) {
        let mut state = self.lock();
        state.policy.level = policy_level;
        state.learner_level = learner_level;
        state.carried_improvements = carried_improvements;
    }

    /// Apply the feedback of a completed run.
    ///
    /// Promotion raises both the policy level and the learner level; the
    /// improvement notes replace whatever was carried before.
    pub fn apply_feedback(&self, evaluation: &EvaluationOutput) {
        let mut state = self.lock();
        if let Some(level) = evaluation.decision.new_level {
            info!(from = %state.policy.level, to = %level, "permission level promoted");
            state.policy.level = level;
            state.learner_level = level;
        }
        state.carried_improvements = evaluation.improvements.clone();
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Writes are whole-field assignments; a poisoned value is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
