//! Run-level state machine with a linear transition graph.
//!
//! Every run starts at `Initialized` and ends at `Completed` or `Failed`.
//! Transitions are recorded so a failure report can say where the run died.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::StageId;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Initialized,
    Observing,
    PatternMatching,
    Decomposing,
    Retrieving,
    Guiding,
    Planning,
    SafetyChecking,
    Acting,
    Executing,
    Evaluating,
    Reflecting,
    Finalizing,
    Completed,
    Failed,
}

impl PipelineState {
    /// Non-terminal states in order; `Completed` follows the last one.
    const LINEAR: [PipelineState; 14] = [
        Self::Initialized,
        Self::Observing,
        Self::PatternMatching,
        Self::Decomposing,
        Self::Retrieving,
        Self::Guiding,
        Self::Planning,
        Self::SafetyChecking,
        Self::Acting,
        Self::Executing,
        Self::Evaluating,
        Self::Reflecting,
        Self::Finalizing,
        Self::Completed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// State the machine is in while `stage` runs.
    pub fn for_stage(stage: StageId) -> Self {
        Self::LINEAR[stage.index() + 1]
    }

    fn successor(self) -> Option<Self> {
        let idx = Self::LINEAR.iter().position(|state| *state == self)?;
        Self::LINEAR.get(idx + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "Initialized",
            Self::Observing => "Observing",
            Self::PatternMatching => "PatternMatching",
            Self::Decomposing => "Decomposing",
            Self::Retrieving => "Retrieving",
            Self::Guiding => "Guiding",
            Self::Planning => "Planning",
            Self::SafetyChecking => "SafetyChecking",
            Self::Acting => "Acting",
            Self::Executing => "Executing",
            Self::Evaluating => "Evaluating",
            Self::Reflecting => "Reflecting",
            Self::Finalizing => "Finalizing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strictly linear, plus `any non-terminal -> Failed`.
fn is_legal_transition(from: PipelineState, to: PipelineState) -> bool {
    if to == PipelineState::Failed {
        return !from.is_terminal();
    }
    from.successor() == Some(to)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: PipelineState,
    pub to: PipelineState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StateMachine {
    current: PipelineState,
    transitions: Vec<TransitionRecord>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: PipelineState::Initialized,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> PipelineState {
        self.current
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Move to `to`, rejecting skips, re-entry and exits from terminal states.
    pub fn advance(&mut self, to: PipelineState) -> Result<(), PipelineError> {
        if !is_legal_transition(self.current, to) {
            return Err(PipelineError::IllegalTransition {
                from: self.current,
                to,
            });
        }
        tracing::debug!(from = %self.current, to = %to, "pipeline transition");
        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            at: Utc::now(),
        });
        self.current = to;
        Ok(())
    }

    /// Move to `Failed` from any non-terminal state.
    ///
    /// Returns the state the failure happened in. Failing an already
    /// terminal machine is a no-op.
    pub fn fail(&mut self) -> PipelineState {
        let at = self.current;
        if !at.is_terminal() {
            self.transitions.push(TransitionRecord {
                from: at,
                to: PipelineState::Failed,
                at: Utc::now(),
            });
            self.current = PipelineState::Failed;
        }
        at
    }
}
