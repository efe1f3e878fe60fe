//! Orchestration layer for release runs
//!
//! This module sequences the steps of a release and reports the outcome.

pub mod release_sequence;
pub mod report;

// Re-export main types for convenience
pub use release_sequence::ReleaseSequence;
pub use report::{JobReport, StepRecord, StepStatus};
