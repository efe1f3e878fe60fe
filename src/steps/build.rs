//! Build step - run the build frontend and collect distributable artifacts

use crate::core::config::is_workspace_subdir;
use crate::core::context::JobContext;
use crate::core::error::PipelineError;
use crate::core::state_machine::JobState;
use crate::core::traits::{Step, StepOutcome};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File suffixes of distributable artifacts
const ARTIFACT_SUFFIXES: &[&str] = &[".whl", ".tar.gz", ".zip"];

/// Distributable artifacts directly inside `dir`, sorted by path
pub fn collect_artifacts(dir: &Path) -> Vec<PathBuf> {
    let mut artifacts: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| ARTIFACT_SUFFIXES.iter().any(|s| name.ends_with(s)))
        })
        .map(|entry| entry.into_path())
        .collect();
    artifacts.sort();
    artifacts
}

#[derive(Debug, Default)]
pub struct BuildStep {
    _private: (),
}

impl BuildStep {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn args(ctx: &JobContext) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            ctx.config.build.frontend.clone(),
            "--outdir".to_string(),
            ctx.output_dir().display().to_string(),
        ];
        args.extend(ctx.config.build.args.iter().cloned());
        args
    }
}

#[async_trait]
impl Step for BuildStep {
    fn name(&self) -> &str {
        "build"
    }

    fn state(&self) -> JobState {
        JobState::Building
    }

    async fn run(&self, ctx: &mut JobContext) -> Result<StepOutcome, PipelineError> {
        if !is_workspace_subdir(&ctx.config.build.output_dir) {
            return Err(PipelineError::BuildFailed {
                message: format!(
                    "refusing to use {} as output directory",
                    ctx.config.build.output_dir
                ),
            });
        }
        let output_dir = ctx.output_dir();

        // Stale artifacts from an earlier build would be uploaded too
        for stale in collect_artifacts(&output_dir) {
            log::info!("Removing previous artifact {}", stale.display());
            tokio::fs::remove_file(&stale)
                .await
                .map_err(|e| PipelineError::BuildFailed {
                    message: format!("cannot remove {}: {}", stale.display(), e),
                })?;
        }

        let executor = ctx.executor()?;
        let args = Self::args(ctx);
        let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();

        let output = executor
            .execute(ctx.runtime(), &args)
            .await
            .map_err(|e| PipelineError::BuildFailed {
                message: e.to_string(),
            })?;

        if !output.success {
            // Surface the whole (redacted) build log
            for line in output.combined().lines() {
                eprintln!("    | {}", line);
            }
            return Err(PipelineError::BuildFailed {
                message: format!("build frontend exited with {:?}", output.code),
            });
        }

        let artifacts = collect_artifacts(&output_dir);
        if artifacts.is_empty() {
            return Err(PipelineError::BuildFailed {
                message: format!("no distributable artifacts in {}", output_dir.display()),
            });
        }

        let names: Vec<String> = artifacts
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
            .collect();
        ctx.artifacts = artifacts;

        let mut outcome = StepOutcome::new(names.join(", "));
        if !names.iter().any(|n| n.ends_with(".whl")) {
            outcome = outcome.with_warning("no wheel was built");
        }
        Ok(outcome)
    }
}
