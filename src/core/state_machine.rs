//! State machine for the release sequence
//!
//! The chain is linear: each state may only move to its successor or to
//! `Failed`. History is kept in memory for the report and is discarded with
//! the run.

use crate::core::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    CheckingOut,
    ProvisioningRuntime,
    RestoringCache,
    InstallingDependencies,
    Building,
    Publishing,
    Succeeded,
    Failed,
}

impl JobState {
    /// The only non-failure state reachable from `self`
    pub fn successor(self) -> Option<JobState> {
        match self {
            Self::Pending => Some(Self::CheckingOut),
            Self::CheckingOut => Some(Self::ProvisioningRuntime),
            Self::ProvisioningRuntime => Some(Self::RestoringCache),
            Self::RestoringCache => Some(Self::InstallingDependencies),
            Self::InstallingDependencies => Some(Self::Building),
            Self::Building => Some(Self::Publishing),
            Self::Publishing => Some(Self::Succeeded),
            Self::Succeeded | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::CheckingOut => "checking-out",
            Self::ProvisioningRuntime => "provisioning-runtime",
            Self::RestoringCache => "restoring-cache",
            Self::InstallingDependencies => "installing-dependencies",
            Self::Building => "building",
            Self::Publishing => "publishing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: JobState,
    pub to: JobState,
    pub timestamp: DateTime<Utc>,
}

/// State machine for one job run
#[derive(Debug)]
pub struct JobStateMachine {
    current_state: JobState,
    transitions: Vec<StateTransition>,
}

impl Default for JobStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: JobState::Pending,
            transitions: Vec::new(),
        }
    }

    /// Move to `to`, which must be the successor of the current state
    /// or `Failed`
    pub fn transition(&mut self, to: JobState) -> Result<(), PipelineError> {
        let from = self.current_state;
        let allowed = self.current_state.successor() == Some(to)
            || (to == JobState::Failed && !from.is_terminal());

        if !allowed {
            return Err(PipelineError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        log::debug!("state: {} -> {}", from, to);
        self.transitions.push(StateTransition {
            from,
            to,
            timestamp: Utc::now(),
        });
        self.current_state = to;

        Ok(())
    }

    /// Mark the run failed; a no-op once terminal
    pub fn fail(&mut self) {
        if !self.current_state.is_terminal() {
            // Cannot fail: every non-terminal state may move to Failed
            let _ = self.transition(JobState::Failed);
        }
    }

    pub fn get_state(&self) -> JobState {
        self.current_state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Get transition history as human-readable string
    pub fn get_history(&self) -> String {
        self.transitions
            .iter()
            .map(|t| format!("{}: {} → {}", t.timestamp.to_rfc3339(), t.from, t.to))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
