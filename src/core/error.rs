//! Error handling for the release sequence
//!
//! Every failure a step can produce maps onto one variant of [`PipelineError`].
//! All of them are fatal for the run; the enum only adds a stable code,
//! whether a re-run can help, and hints for the operator.

use crate::security::command_executor::CommandError;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the release sequence
#[derive(Error, Debug)]
pub enum PipelineError {
    // Trigger errors
    #[error("Invalid release event: {message}")]
    InvalidEvent { message: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Dependency manifest not found: {path}")]
    ManifestNotFound { path: String },

    // Step errors
    #[error("[checkout] Failed to fetch sources at {reference}: {message}")]
    SourceFetchFailed { reference: String, message: String },

    #[error("[runtime] Failed to provision runtime {specifier}: {message}")]
    RuntimeSetupFailed { specifier: String, message: String },

    #[error("[cache] {message}")]
    CacheFailed { message: String },

    #[error("[install] Dependency installation failed: {message}")]
    DependencyInstallFailed { message: String },

    #[error("[build] Build failed: {message}")]
    BuildFailed { message: String },

    #[error("[publish] Publishing failed: {message}")]
    PublishFailed { message: String },

    #[error("[publish] Version {version} has already been published")]
    VersionConflict { version: String },

    #[error("[publish] Credential is not set (expected in ${env_var})")]
    CredentialMissing { env_var: String },

    // Sequence errors
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Step {step} timed out after {timeout:?}")]
    Timeout { step: String, timeout: Duration },

    #[error("Command execution error: {0}")]
    Command(#[from] CommandError),
}

impl PipelineError {
    /// Whether re-running the same release could succeed without changes.
    ///
    /// A duplicate version never succeeds on re-run; a new version is needed.
    pub fn is_rerunnable(&self) -> bool {
        !matches!(
            self,
            Self::VersionConflict { .. }
                | Self::InvalidEvent { .. }
                | Self::InvalidTransition { .. }
        )
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidEvent { .. } => vec![
                "Check the event payload (GITHUB_EVENT_PATH or --event)",
                "Release tags must look like a version (e.g. v1.2.0)",
            ],
            Self::ConfigError(_) => vec!["Check .release-pipeline.yaml"],
            Self::ManifestNotFound { .. } => vec![
                "Check cache.manifest in .release-pipeline.yaml",
                "Make sure the checkout step produced the expected tree",
            ],
            Self::SourceFetchFailed { .. } => vec![
                "Check that the release ref exists in the repository",
                "Check repository access from the worker",
            ],
            Self::RuntimeSetupFailed { .. } => vec![
                "Install a runtime matching runtime.version",
                "Set runtime.command to the interpreter path",
            ],
            Self::CacheFailed { .. } => vec![
                "Check permissions on cache.dir and cache.store",
                "The job continues without the cache",
            ],
            Self::DependencyInstallFailed { .. } => vec![
                "Check the package list in install.packages",
                "Check network access to the package index",
            ],
            Self::BuildFailed { .. } => vec![
                "Read the build log above",
                "Run the build command locally",
            ],
            Self::PublishFailed { .. } => vec![
                "Read the uploader output above",
                "Check the registry status",
            ],
            Self::VersionConflict { .. } => vec![
                "Bump the package version and publish a new release",
            ],
            Self::CredentialMissing { .. } => vec![
                "Expose the registry token to the job as an environment variable",
                "Set publish.token_env if the variable has a different name",
            ],
            Self::InvalidTransition { .. } => vec!["This is a bug in the sequence definition"],
            Self::Timeout { .. } => vec!["Increase timeouts.step_seconds"],
            Self::Command(_) => vec![
                "Check that the tool is installed and on PATH",
                "Check the working directory",
            ],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEvent { .. } => "INVALID_EVENT",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::ManifestNotFound { .. } => "MANIFEST_NOT_FOUND",
            Self::SourceFetchFailed { .. } => "SOURCE_FETCH_FAILED",
            Self::RuntimeSetupFailed { .. } => "RUNTIME_SETUP_FAILED",
            Self::CacheFailed { .. } => "CACHE_FAILED",
            Self::DependencyInstallFailed { .. } => "DEPENDENCY_INSTALL_FAILED",
            Self::BuildFailed { .. } => "BUILD_FAILED",
            Self::PublishFailed { .. } => "PUBLISH_FAILED",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::CredentialMissing { .. } => "CREDENTIAL_MISSING",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Command(_) => "COMMAND_ERROR",
        }
    }
}
