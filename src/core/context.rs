//! Per-run context shared by the steps
//!
//! A `JobContext` is the Job Run: created when an event is accepted, dropped
//! when the sequence finishes. Nothing in it is persisted.

use crate::cache::cache_key::{CacheKey, runner_os};
use crate::core::config::PipelineConfig;
use crate::core::error::PipelineError;
use crate::core::event::ReleaseEvent;
use crate::security::command_executor::SafeCommandExecutor;
use crate::security::credential::Redactor;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Variable twine reads the upload password from
pub const TWINE_PASSWORD: &str = "TWINE_PASSWORD";

/// State of one job run
#[derive(Debug)]
pub struct JobContext {
    pub run_id: Uuid,
    pub event: ReleaseEvent,
    pub config: PipelineConfig,
    /// Working directory owned by this run
    pub workspace: PathBuf,
    pub runner_os: String,
    /// Replace the upload with an artifact check
    pub dry_run: bool,
    /// Interpreter resolved by the runtime step
    pub runtime_command: Option<String>,
    pub cache_key: Option<CacheKey>,
    pub cache_hit: bool,
    pub artifacts: Vec<PathBuf>,
    redactor: Redactor,
}

impl JobContext {
    pub fn new<P: AsRef<Path>>(event: ReleaseEvent, config: PipelineConfig, workspace: P) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            event,
            config,
            workspace: workspace.as_ref().to_path_buf(),
            runner_os: runner_os(),
            dry_run: false,
            runtime_command: None,
            cache_key: None,
            cache_hit: false,
            artifacts: Vec::new(),
            redactor: Redactor::none(),
        }
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_runner_os(mut self, os: impl Into<String>) -> Self {
        self.runner_os = os.into();
        self
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    /// Executor rooted at the workspace that redacts the credential.
    ///
    /// Children never inherit the credential variable or `TWINE_PASSWORD`;
    /// the publish step passes the token explicitly.
    pub fn executor(&self) -> Result<SafeCommandExecutor, PipelineError> {
        let mut executor = SafeCommandExecutor::new(&self.workspace)?;
        executor.set_redactor(self.redactor.clone());
        executor.scrub_env(&self.config.publish.token_env);
        executor.scrub_env(TWINE_PASSWORD);
        Ok(executor)
    }

    /// Interpreter to invoke for `-m` modules
    pub fn runtime(&self) -> &str {
        self.runtime_command
            .as_deref()
            .or(self.config.runtime.command.as_deref())
            .unwrap_or("python3")
    }

    /// Resolve a config path against the workspace
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.resolve(&self.config.cache.manifest)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.config.cache.dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.config.build.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> JobContext {
        JobContext::new(
            ReleaseEvent::for_tag("v1.2.0"),
            PipelineConfig::default(),
            "/work/queuesync",
        )
    }

    #[test]
    fn test_paths_resolve_against_workspace() {
        let ctx = context();
        assert_eq!(ctx.manifest_path(), PathBuf::from("/work/queuesync/setup.py"));
        assert_eq!(ctx.output_dir(), PathBuf::from("/work/queuesync/dist"));
        assert_eq!(
            ctx.cache_dir(),
            PathBuf::from("/work/queuesync/.release-cache/pip")
        );
        assert_eq!(ctx.resolve("/abs/dir"), PathBuf::from("/abs/dir"));
    }

    #[test]
    fn test_runtime_preference() {
        let mut ctx = context();
        assert_eq!(ctx.runtime(), "python3");

        ctx.config.runtime.command = Some("python".to_string());
        assert_eq!(ctx.runtime(), "python");

        ctx.runtime_command = Some("/usr/bin/python3.11".to_string());
        assert_eq!(ctx.runtime(), "/usr/bin/python3.11");
    }

    #[test]
    fn test_builders() {
        let ctx = context()
            .with_dry_run(true)
            .with_runner_os("Linux")
            .with_redactor(Redactor::new(&["tok"]));
        assert!(ctx.dry_run);
        assert_eq!(ctx.runner_os, "Linux");
        assert!(ctx.redactor().is_active());
    }

    #[test]
    fn test_executor_requires_existing_workspace() {
        let ctx = context();
        assert!(ctx.executor().is_err());

        let dir = tempfile::TempDir::new().unwrap();
        let ctx = JobContext::new(
            ReleaseEvent::for_tag("v1.2.0"),
            PipelineConfig::default(),
            dir.path(),
        );
        assert!(ctx.executor().is_ok());
    }
}
