//! Install step - build-time dependencies through pip

use crate::core::context::JobContext;
use crate::core::error::PipelineError;
use crate::core::state_machine::JobState;
use crate::core::traits::{Step, StepOutcome};
use async_trait::async_trait;

#[derive(Debug, Default)]
pub struct InstallStep {
    _private: (),
}

impl InstallStep {
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Argument vectors passed to `<runtime> -m pip`
    fn commands(ctx: &JobContext) -> Vec<Vec<String>> {
        let mut commands = Vec::new();
        let install = &ctx.config.install;

        if install.upgrade_installer {
            commands.push(
                ["-m", "pip", "install", "--upgrade", "pip"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            );
        }

        if !install.packages.is_empty() {
            let mut args: Vec<String> = ["-m", "pip", "install", "--upgrade"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            args.extend(install.packages.iter().cloned());
            commands.push(args);
        }

        commands
    }
}

#[async_trait]
impl Step for InstallStep {
    fn name(&self) -> &str {
        "install"
    }

    fn state(&self) -> JobState {
        JobState::InstallingDependencies
    }

    async fn run(&self, ctx: &mut JobContext) -> Result<StepOutcome, PipelineError> {
        let commands = Self::commands(ctx);
        if commands.is_empty() {
            return Ok(StepOutcome::new("nothing to install"));
        }

        let executor = ctx.executor()?;
        let runtime = ctx.runtime().to_string();
        let cache_dir = ctx.cache_dir().display().to_string();

        let mut envs = vec![("PIP_DISABLE_PIP_VERSION_CHECK", "1")];
        if ctx.config.cache.enabled {
            envs.push(("PIP_CACHE_DIR", cache_dir.as_str()));
        }

        for args in &commands {
            let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
            let output = executor
                .execute_with_env(&runtime, &args, &envs)
                .await
                .map_err(|e| PipelineError::DependencyInstallFailed {
                    message: e.to_string(),
                })?;

            if !output.success {
                return Err(PipelineError::DependencyInstallFailed {
                    message: output.tail(20),
                });
            }
        }

        Ok(StepOutcome::new(if ctx.config.install.packages.is_empty() {
            "installer upgraded".to_string()
        } else {
            ctx.config.install.packages.join(", ")
        }))
    }
}
