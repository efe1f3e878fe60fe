//! Job report - what a finished run looked like
//!
//! The report is the only thing a run leaves behind, and only on stdout. It
//! never contains the credential: every free-text field is redacted before it
//! is stored here.

use crate::core::state_machine::{JobState, StateTransition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-step result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    /// A non-fatal step failed; the job went on
    Warning,
    Failed,
    /// Not executed because an earlier step failed
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub state: JobState,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn skipped(name: &str, state: JobState) -> Self {
        Self {
            name: name.to_string(),
            state,
            status: StepStatus::Skipped,
            summary: None,
            error: None,
            duration_ms: 0,
        }
    }
}

/// Outcome of one job run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub run_id: Uuid,
    pub tag: String,
    pub runner_os: String,
    pub success: bool,
    pub final_state: JobState,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    pub cache_hit: bool,
    pub artifacts: Vec<String>,
    pub steps: Vec<StepRecord>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `Some(false)` when running the same release again cannot succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerunnable: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
    /// State history of the run
    pub transitions: Vec<StateTransition>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl JobReport {
    /// Process exit status: 0 only when every fatal step succeeded
    pub fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }

    /// The step that failed the job
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    /// Human-readable summary
    pub fn render_summary(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Run {} for {}", self.run_id, self.tag));
        for step in &self.steps {
            let icon = match step.status {
                StepStatus::Succeeded => "✅",
                StepStatus::Warning => "⚠️ ",
                StepStatus::Failed => "❌",
                StepStatus::Skipped => "⏭️ ",
            };
            let detail = step
                .error
                .as_deref()
                .or(step.summary.as_deref())
                .unwrap_or("");
            lines.push(format!(
                "  {} {:<8} {:>6} ms  {}",
                icon, step.name, step.duration_ms, detail
            ));
        }

        if let Some(key) = &self.cache_key {
            lines.push(format!(
                "  cache: {} ({})",
                key,
                if self.cache_hit { "hit" } else { "miss" }
            ));
        }

        if self.rerunnable == Some(false) {
            lines.push("  re-running this release will not help".to_string());
        }

        if !self.warnings.is_empty() {
            lines.push("  warnings:".to_string());
            for warning in &self.warnings {
                lines.push(format!("    - {}", warning));
            }
        }

        lines.push(format!(
            "  result: {} in {} ms",
            if self.success { "success" } else { "failure" },
            self.duration_ms
        ));

        lines.join("\n")
    }
}
