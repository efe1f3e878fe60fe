//! Core traits and types for the release sequence
//!
//! Every stage of a release (checkout, runtime setup, cache, install, build,
//! publish) is a [`Step`]. The sequence owns ordering and failure handling;
//! a step only knows how to do its own work against the [`JobContext`].

use crate::core::context::JobContext;
use crate::core::error::PipelineError;
use crate::core::state_machine::JobState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Step Outcome
// ============================================================================

/// What a successful step reports back
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    /// One-line summary for the progress output
    pub summary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StepOutcome {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

// ============================================================================
// Step Trait
// ============================================================================

/// One stage of the release sequence
#[async_trait]
pub trait Step: Send + Sync {
    /// Short name used in logs and reports (`checkout`, `build`, ...)
    fn name(&self) -> &str;

    /// State the job enters while this step runs
    fn state(&self) -> JobState;

    /// Whether an error from this step fails the job.
    ///
    /// Non-fatal steps have their errors downgraded to warnings.
    fn is_fatal(&self) -> bool {
        true
    }

    /// Perform the step
    async fn run(&self, ctx: &mut JobContext) -> Result<StepOutcome, PipelineError>;

    /// Runs after every step succeeded, in reverse order.
    ///
    /// Errors are reported as warnings and never fail the job.
    async fn post(&self, _ctx: &mut JobContext) -> Result<Option<String>, PipelineError> {
        Ok(None)
    }
}
